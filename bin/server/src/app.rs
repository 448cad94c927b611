//! HTTP router.

use axum::{
    Extension, Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState, require_session};
use crate::{api, graphql};

/// Builds the application router.
///
/// - `/auth/*`: login flow, public
/// - `/api/*`: REST, behind [`require_session`]
/// - `/graphql`: authorized per field by the schema's scope guard
pub fn router(state: Arc<AppState>) -> Router {
    let schema = graphql::schema(state.clone());

    let protected = api::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_session,
    ));

    Router::new()
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", get(auth::logout).post(auth::logout))
        .nest("/api", protected)
        .route("/graphql", post(graphql::graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(schema)),
        )
        .with_state(state)
}
