mod docs;
mod error;
mod session;
mod state;
mod util;

pub mod routes;
pub mod services;

pub use docs::ApiDoc;
pub use error::{ApiError, ErrorResponse};
pub use session::{verified_session, VerifiedSession};
pub use state::AppState;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/docs/openapi.json", get(openapi_json))
        // Accounts and verification flows
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        .route(
            "/api/auth/forgot-password",
            post(routes::auth::forgot_password),
        )
        .route(
            "/api/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route(
            "/api/auth/reset-password",
            post(routes::auth::reset_password),
        )
        .route("/api/auth/verify-email", get(routes::auth::verify_email))
        .route(
            "/api/auth/email-change",
            post(routes::auth::request_email_change),
        )
        .route(
            "/api/auth/verify-email-change",
            get(routes::auth::verify_email_change),
        )
        // Team invites
        .route("/api/team/invites", post(routes::team::create_invite))
        .route("/api/team/invite-info", get(routes::team::invite_info))
        .route(
            "/api/team/invites/accept",
            post(routes::team::accept_invite),
        )
        // Forms
        .route("/api/forms/list", post(routes::forms::list_forms))
        .route("/api/forms/:form_id", delete(routes::forms::delete_form))
        .route(
            "/api/forms/:form_id/leads/export",
            get(routes::forms::export_leads),
        )
        .route("/api/account/quota", get(routes::account::quota))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
