use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::State,
    http::HeaderValue,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppSection;
use crate::state::AppState;
use crate::{auth, docs, files, payment, users};

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let app_cfg = state.config.app.clone();
    let prefix = app_cfg.versioned_prefix();

    let api = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(files::router(state.config.storage.max_file_size))
        .merge(payment::router())
        .route("/health", get(|| async { "ok" }));

    let router = Router::new()
        .route("/", get(home))
        .nest(&prefix, api)
        .merge(SwaggerUi::new("/docs").url("/docs-json", docs::openapi(&prefix)))
        .with_state(state)
        .layer(cors(&app_cfg)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        );
    Ok(router)
}

/// Single allowed origin; credentials require echoing methods and headers.
fn cors(cfg: &AppSection) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = cfg
        .frontend_domain
        .parse()
        .with_context(|| format!("invalid FRONTEND_DOMAIN {:?}", cfg.frontend_domain))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn home(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "name": state.config.app.name }))
}

pub async fn serve(app: Router, cfg: &AppSection) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
