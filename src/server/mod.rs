pub mod chat_request;
pub mod enhancer;
pub mod handlers;
pub mod relay;
pub mod request_logging;
pub(crate) mod streaming;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::Result as AppResult;
use crate::providers::OpenAIProvider;
use crate::providers::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub upstream: Arc<dyn UpstreamClient>,
    /// Root token; every request works under a child of it.
    pub shutdown: CancellationToken,
}

pub fn create_app(config: Settings, shutdown: CancellationToken) -> AppResult<Router> {
    let upstream = OpenAIProvider::new(&config.upstream, &config.enhancement)?;
    tracing::info!(
        base_url = %config.upstream.base_url,
        default_model = %config.relay.default_model,
        "Upstream configured"
    );

    let app_state = AppState {
        config,
        upstream: Arc::new(upstream),
        shutdown,
    };
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    let mut app = handlers::routes().with_state(Arc::new(app_state));

    // CORS（开发环境便于前端联调；生产应收敛来源）
    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    use tower_http::trace::TraceLayer;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::mirror_request());
    app = app.layer(cors).layer(TraceLayer::new_for_http());

    app
}
