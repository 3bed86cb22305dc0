use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::{require_auth, throttle_by_ip};
use crate::{members, organizations, premium, redemptions, tags};

/// All `/api` routes. The caller adds tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/deals", get(premium::deals))
        .route(
            "/tags/{organization}/verifyweb/{tag}",
            post(tags::verify_tag_web),
        );

    let protected_routes = Router::new()
        .route("/tags/{organization}/generate", post(tags::generate_tag))
        .route("/tags/{organization}/verify/{tag}", post(tags::verify_tag))
        .route(
            "/groups",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/groups/{organization}",
            get(organizations::read_organization).delete(organizations::delete_organization),
        )
        .route(
            "/groups/{organization}/instagram",
            post(organizations::verify_instagram),
        )
        .route("/groups/{organization}/premium", post(premium::upgrade))
        .route(
            "/groups/{organization}/members",
            get(members::list_members).post(members::add_member),
        )
        .route(
            "/groups/{organization}/members/{member}",
            put(members::update_member).delete(members::delete_member),
        )
        .route(
            "/groups/{organization}/redemptions",
            get(redemptions::list_redemptions),
        )
        .route(
            "/groups/{organization}/redemptions/{member}",
            get(redemptions::read_redemption),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(state.clone(), throttle_by_ip))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
}

pub async fn health() -> &'static str {
    "ok"
}
