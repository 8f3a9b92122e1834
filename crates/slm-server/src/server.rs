use std::io;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use crate::error::ApiError;
use crate::handlers;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Register the `/api/v1` routes and the JSON body error mapping.
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|error, _req| {
        ApiError::InvalidRequest(error.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|error, _req| {
        ApiError::InvalidRequest(error.to_string()).into()
    }))
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health::handler))
            .route("/models", web::get().to(handlers::models::list))
            .route("/tokens/check", web::post().to(handlers::models::check_tokens))
            .route("/chat", web::post().to(handlers::chat::handler))
            .route("/style", web::post().to(handlers::style::handler))
            .service(
                web::scope("/conversations")
                    .route("", web::post().to(handlers::conversations::create))
                    .route("", web::get().to(handlers::conversations::list))
                    .route("/import", web::post().to(handlers::conversations::import))
                    .route("/{conversation_id}", web::get().to(handlers::conversations::get))
                    .route(
                        "/{conversation_id}",
                        web::patch().to(handlers::conversations::rename),
                    )
                    .route(
                        "/{conversation_id}",
                        web::delete().to(handlers::conversations::delete),
                    )
                    .route(
                        "/{conversation_id}/export",
                        web::get().to(handlers::conversations::export),
                    )
                    .route(
                        "/{conversation_id}/retry",
                        web::post().to(handlers::conversations::retry),
                    ),
            ),
    );
}

pub async fn run_server(config: ServerConfig, state: AppState) -> io::Result<()> {
    let state = web::Data::new(state);

    log::info!("Listening on http://{}:{}/api/v1", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::new("%r %s %Dms"))
            .configure(app_config)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
