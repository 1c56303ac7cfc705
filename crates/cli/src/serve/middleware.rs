//! HTTP middleware: bearer-token authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::handlers::pipeline_error_response;
use super::state::AppState;

/// Resolve `Authorization: Bearer <token>` to a [`UserId`] and attach it to
/// the request. Applied with `route_layer` to the routes that need an owner.
///
/// [`UserId`]: playcoach_core::UserId
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match state.pipeline.authenticate(token).await {
        Ok(owner) => {
            request.extensions_mut().insert(owner);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), error = %e, "rejected unauthenticated request");
            pipeline_error_response(&e)
        }
    }
}
