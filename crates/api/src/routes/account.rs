use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::session::VerifiedSession;
use crate::{ApiError, AppState};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub plan: String,
    /// `null` when no limit is known for the plan.
    pub otp_limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/account/quota",
    tag = "Account",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    responses(
        (status = 200, description = "OTP allowance of the current user's plan", body = QuotaResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn quota(
    State(state): State<AppState>,
    verified: VerifiedSession,
) -> Result<Json<QuotaResponse>, ApiError> {
    let otp_limit = state.quota().resolve_otp_limit(&verified.user.plan).await?;

    Ok(Json(QuotaResponse {
        plan: verified.user.plan,
        otp_limit,
    }))
}
