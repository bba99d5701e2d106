use crate::layers::auth::bearer_auth_checker;
use crate::routers::promo_code::{
    create_promo_code, list_promo_codes, preview_promo_code, redeem_promo_code,
};
use crate::services::promo::PromoService;
use crate::services::states::BrewState;
use axum::Router;
use axum::http::{HeaderName, Request};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info_span;

mod promo_code;

pub fn router(state: Arc<BrewState>) -> Router {
    let promo_service = Arc::new(PromoService::new(state.clone()));
    let promo_code_router = {
        Router::new()
            .route("/", post(create_promo_code))
            .route("/redeem", post(redeem_promo_code))
            .route("/list", post(list_promo_codes))
            .route("/{code}", get(preview_promo_code))
            .layer(from_fn_with_state(state.clone(), bearer_auth_checker))
            .with_state(promo_service)
    };
    let trace_header = HeaderName::from_static("x-request-id");
    Router::new()
        .nest(
            "/api/v1",
            Router::new().nest("/promo-codes", promo_code_router),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    trace_header.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                        let rid = req
                            .extensions()
                            .get::<RequestId>()
                            .and_then(|r| r.header_value().to_str().ok())
                            .unwrap_or("-");
                        info_span!(
                            "http.request",
                            request_id = %rid,
                            method = %req.method(),
                            uri = %req.uri(),
                            version = ?req.version(),
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::new(trace_header))
                .concurrency_limit(state.config.common.concurrency_limit),
        )
}
