//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional OpenAPI document (disable with `SLOPPY_ENABLE_OPENAPI=false`)
//! - Health routes
//! - Task dispatch, script repository and realtime routes
//! - admin `/admin` routes (optionally protected by bearer token)

mod admin;
pub mod doc;
mod health;
mod realtime;
mod scripts;
mod tasks;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router, middleware};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let config = state.config.current();

    let mut app = Router::new()
        .merge(health::router())
        .merge(tasks::router())
        .merge(scripts::router())
        .merge(realtime::router())
        .nest("/admin", admin::router(state.clone()));

    if config.enable_openapi {
        let api_doc = doc::get_docs();
        app = app.route(
            "/api-docs/openapi.json",
            get(move || {
                let doc = api_doc.clone();
                async move { Json(doc) }
            }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&config.cors_origins)))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use sloppy_core::config::Config;

    use super::testing::call;
    use crate::state::testing::app_state;

    #[tokio::test]
    async fn openapi_document_lists_task_routes() {
        let app = super::build(app_state(Config::default()).await);
        let (status, doc) = call(&app, Method::GET, "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/tasks/generate-script"].is_object());
        assert!(doc["paths"]["/scripts/{id}"].is_object());
    }

    #[tokio::test]
    async fn openapi_document_can_be_disabled() {
        let config = Config {
            enable_openapi: false,
            ..Config::default()
        };
        let app = super::build(app_state(config).await);
        let (status, _) = call(&app, Method::GET, "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
