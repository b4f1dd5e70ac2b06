use actix_web::{middleware::Compress, App, HttpServer};
use actix_cors::Cors;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

use wishwall::config::AppConfig;
use wishwall::openapi::ApiDoc;
use wishwall::{config, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env is a development convenience; deployments set the environment directly.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("Bootstrapping Wish Wall server");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("(none)"));

    let state = build_state(&cfg).await?;
    let openapi = ApiDoc::openapi();

    let server_cfg = cfg.clone();
    let server = HttpServer::new(move || {
        let cfg = &server_cfg;
        let mut cors = Cors::default()
            // Vite dev server and the containerised frontend
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);
        if let Some(front) = cfg.frontend_url.as_deref() {
            cors = cors.allowed_origin(front);
        }

        let swagger = cfg
            .swagger_ui
            .then(|| SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()));

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(cfg.enable_hsts))
            .wrap(cors)
            .app_data(actix_web::web::Data::new(state.clone()))
            .configure(config)
            .configure(|svc| {
                if let Some(ui) = swagger {
                    svc.service(ui);
                }
            })
    })
    .bind((cfg.bind.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind, cfg.port);
    server.run().await?;
    Ok(())
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    use wishwall::repo::inmem::InMemRepo;
    info!("Using in-memory repository backend (snapshot dir '{}')", cfg.data_dir.display());
    Ok(AppState::new(InMemRepo::with_data_dir(&cfg.data_dir)?))
}

#[cfg(feature = "postgres-store")]
async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    use sqlx::postgres::PgPoolOptions;
    use wishwall::repo::pg::PgRepo;

    let db_url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(db_url)
        .await?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(AppState::new(repo))
}
