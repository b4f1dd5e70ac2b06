use std::sync::Arc;
use actix_web::{web, HttpResponse};

use crate::auth::{Auth, MaybeAuth};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;
use crate::service::{self, ListParams};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::Validation(format!("invalid JSON body: {err}")).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::Validation(format!("invalid query string: {err}")).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|_err, _req| ApiError::NotFound("resource not found".into()).into()),
    )
    .service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(
                web::resource("/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(create_message)),
            )
            .service(web::resource("/messages/{id}").route(web::get().to(get_message)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

impl AppState {
    pub fn new(repo: impl Repo + 'static) -> Self {
        Self { repo: Arc::new(repo) }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[utoipa::path(
    get,
    path = "/api/v1/messages",
    params(ListParams),
    responses(
        (status = 200, description = "Page of messages, newest first", body = MessagePage),
        (status = 400, description = "Invalid paging or search parameters")
    ),
    tag = "messages"
)]
pub async fn list_messages(data: web::Data<AppState>, query: web::Query<ListParams>) -> Result<HttpResponse, ApiError> {
    let page = service::list_messages(data.repo.as_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/messages",
    request_body = NewMessage,
    responses(
        (status = 201, description = "Message created", body = Message),
        (status = 400, description = "Content missing or not 3-200 characters"),
        (status = 401, description = "Authentication required")
    ),
    security(("bearer" = [])),
    tag = "messages"
)]
pub async fn create_message(
    auth: MaybeAuth,
    data: web::Data<AppState>,
    payload: web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    let message = service::create_message(data.repo.as_ref(), auth.author(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(message))
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/{id}",
    params(("id" = String, Path, description = "Message id (UUID)")),
    responses(
        (status = 200, description = "Message with nested comments", body = MessageDetail),
        (status = 404, description = "Message not found")
    ),
    tag = "messages"
)]
pub async fn get_message(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let detail = service::get_message_with_comments(data.repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Content missing or not 3-200 characters"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Message or parent comment not found")
    ),
    security(("bearer" = [])),
    tag = "comments"
)]
pub async fn create_comment(
    auth: MaybeAuth,
    data: web::Data<AppState>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let comment = service::create_comment(data.repo.as_ref(), auth.author(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = Author),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn auth_me(auth: Auth) -> HttpResponse {
    HttpResponse::Ok().json(auth.0)
}
