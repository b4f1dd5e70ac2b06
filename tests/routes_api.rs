#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;
use wishwall::auth::create_jwt;
use wishwall::models::Author;
use wishwall::repo::inmem::InMemRepo;
use wishwall::{config, AppState, SecurityHeaders};

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn token_for(username: &str) -> String {
    let who = Author { id: Uuid::new_v4(), username: username.into(), display_name: None };
    create_jwt(&who, chrono::Duration::hours(1)).unwrap()
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::default())
                .app_data(actix_web::web::Data::new(AppState::new(InMemRepo::ephemeral())))
                .configure(config),
        )
        .await
    };
}

#[actix_web::test]
#[serial]
async fn wish_and_blessing_thread_flow() {
    setup_env();
    let app = app!();
    let wisher = token_for("wisher");
    let blesser = token_for("blesser");

    // post a wish
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(bearer(&wisher))
        .set_json(json!({"content": "  I wish for a garden  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let msg: Value = test::read_body_json(resp).await;
    assert_eq!(msg["content"], "I wish for a garden");
    assert_eq!(msg["author"]["username"], "wisher");
    let message_id = msg["id"].as_str().unwrap().to_string();

    // empty thread
    let req = test::TestRequest::get().uri(&format!("/api/v1/messages/{message_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let detail: Value = test::read_body_json(resp).await;
    assert_eq!(detail["comments"], json!([]));
    assert_eq!(detail["comment_count"], 0);

    // A top, B -> A, C top, D -> B
    let mut ids: Vec<String> = Vec::new();
    for (content, parent) in [("A blessing", None), ("B reply", Some(0usize)), ("C blessing", None), ("D reply", Some(1))] {
        let parent_id = parent.map(|i: usize| ids[i].clone());
        let req = test::TestRequest::post()
            .uri("/api/v1/comments")
            .insert_header(bearer(&blesser))
            .set_json(json!({"message_id": message_id, "content": content, "parent_id": parent_id}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let c: Value = test::read_body_json(resp).await;
        assert_eq!(c["author"]["username"], "blesser");
        assert_eq!(c["parent_id"], json!(parent_id));
        ids.push(c["id"].as_str().unwrap().to_string());
    }

    let req = test::TestRequest::get().uri(&format!("/api/v1/messages/{message_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let detail: Value = test::read_body_json(resp).await;
    assert_eq!(detail["comment_count"], 4);
    let top = detail["comments"].as_array().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["content"], "A blessing");
    assert_eq!(top[0]["replies"][0]["content"], "B reply");
    assert_eq!(top[0]["replies"][0]["replies"][0]["content"], "D reply");
    assert_eq!(top[1]["content"], "C blessing");
    assert_eq!(top[1]["replies"], json!([]));

    // list carries the count only
    let req = test::TestRequest::get().uri("/api/v1/messages").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let page: Value = test::read_body_json(resp).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["page_index"], 1);
    assert_eq!(page["messages"][0]["comment_count"], 4);
    assert!(page["messages"][0].get("comments").is_none());
}

#[actix_web::test]
#[serial]
async fn comment_errors_map_to_status_codes() {
    setup_env();
    let app = app!();
    let user = token_for("someone");

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(bearer(&user))
        .set_json(json!({"content": "a wish"}))
        .to_request();
    let msg: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let message_id = msg["id"].as_str().unwrap().to_string();

    // no token
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .set_json(json!({"message_id": message_id, "content": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UNAUTHORIZED");

    // garbage token is the same as none
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer("garbage"))
        .set_json(json!({"message_id": message_id, "content": "hello"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // too short
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": message_id, "content": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");

    // missing content
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": message_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // malformed body
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": "not-a-uuid", "content": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");

    // unknown message
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": Uuid::new_v4(), "content": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "NOT_FOUND");

    // unknown parent
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": message_id, "content": "hello", "parent_id": Uuid::new_v4()}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // nothing was stored along the way
    let req = test::TestRequest::get().uri(&format!("/api/v1/messages/{message_id}")).to_request();
    let detail: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(detail["comment_count"], 0);
}

#[actix_web::test]
#[serial]
async fn message_reads_and_listing_params() {
    setup_env();
    let app = app!();

    let req = test::TestRequest::get().uri(&format!("/api/v1/messages/{}", Uuid::new_v4())).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/messages/not-a-uuid").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/messages?page_size=500").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/api/v1/messages?page_index=abc").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/api/v1/messages?search=x").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // unauthenticated wish
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .set_json(json!({"content": "a wish"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn auth_me_and_health() {
    setup_env();
    let app = app!();

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(bearer(&token_for("meself")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let me: Value = test::read_body_json(resp).await;
    assert_eq!(me["username"], "meself");

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn writes_fail_with_500_when_secret_is_missing() {
    setup_env();
    let app = app!();
    let user = token_for("someone");

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(bearer(&user))
        .set_json(json!({"content": "a wish"}))
        .to_request();
    let msg: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let message_id = msg["id"].as_str().unwrap().to_string();

    std::env::remove_var("JWT_SECRET");
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer(&user))
        .set_json(json!({"message_id": message_id, "content": "hello"}))
        .to_request();
    let comment_status = test::call_service(&app, req).await.status();
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(bearer(&user))
        .set_json(json!({"content": "another wish"}))
        .to_request();
    let message_status = test::call_service(&app, req).await.status();
    setup_env();

    assert_eq!(comment_status, 500);
    assert_eq!(message_status, 500);
}
