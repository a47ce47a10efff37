use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use leadforge_identity::validation::validate_email;
use leadforge_identity::MailTemplate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::routes::auth::{MessageResponse, TokenQuery};
use crate::session::VerifiedSession;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AcceptInviteRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InviteCreatedResponse {
    pub email: String,
    pub expires_at: String,
    pub mail_delivered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InviteInfoResponse {
    pub email: String,
    pub owner_name: String,
    pub owner_username: String,
    pub inviter_name: String,
    pub expired: bool,
}

#[utoipa::path(
    post,
    path = "/api/team/invites",
    tag = "Team",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    request_body = CreateInviteRequest,
    responses(
        (status = 201, description = "Invite issued", body = InviteCreatedResponse),
        (status = 400, description = "Invalid invitee address", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_invite(
    State(state): State<AppState>,
    verified: VerifiedSession,
    Json(payload): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteCreatedResponse>), ApiError> {
    let email = validate_email(&payload.email)?;
    if email == verified.user.email {
        return Err(ApiError::bad_request("You cannot invite yourself"));
    }

    let issued = state
        .tokens()
        .issue_team_invite(verified.user_id(), &email)
        .await?;

    // Invites issued by a team member target the owner's workspace.
    let owner_name = if issued.user_id == verified.user_id() {
        verified.user.display_name.clone()
    } else {
        state
            .authenticator()
            .user_profile(issued.user_id)
            .await?
            .display_name
    };

    let mail_delivered = state
        .dispatch_mail(
            &issued.recipient,
            MailTemplate::TeamInvite,
            json!({
                "inviterName": verified.user.display_name,
                "ownerName": owner_name,
                "inviteUrl": state.link("/invite", &issued.token),
                "expiresAt": issued.expires_at.to_rfc3339(),
            }),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(InviteCreatedResponse {
            email: issued.recipient,
            expires_at: issued.expires_at.to_rfc3339(),
            mail_delivered,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/team/invite-info",
    tag = "Team",
    params(TokenQuery),
    responses(
        (status = 200, description = "Invite preview; does not consume the invite", body = InviteInfoResponse),
        (status = 400, description = "Missing token", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown or already used invite", body = crate::error::ErrorResponse)
    )
)]
pub async fn invite_info(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<InviteInfoResponse>, ApiError> {
    let token = query.token.unwrap_or_default();

    let preview = state
        .tokens()
        .peek_invite(&token)
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    Ok(Json(InviteInfoResponse {
        email: preview.email,
        owner_name: preview.owner_name,
        owner_username: preview.owner_username,
        inviter_name: preview.inviter_name,
        expired: preview.expired,
    }))
}

#[utoipa::path(
    post,
    path = "/api/team/invites/accept",
    tag = "Team",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    request_body = AcceptInviteRequest,
    responses(
        (status = 200, description = "Joined the team", body = MessageResponse),
        (status = 400, description = "Invalid, expired or foreign invite", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_invite(
    State(state): State<AppState>,
    verified: VerifiedSession,
    Json(payload): Json<AcceptInviteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .tokens()
        .accept_invite(&payload.token, verified.user_id(), &verified.user.email)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired invitation"))?;

    Ok(Json(MessageResponse::new("You have joined the team")))
}
