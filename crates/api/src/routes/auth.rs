use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use leadforge_identity::validation::{validate_email, validate_password};
use leadforge_identity::{AuthSession, MailTemplate, NewAccount, ResendOutcome, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::session::VerifiedSession;
use crate::util::{expired_session_cookie, session_cookie};
use crate::{ApiError, AppState};

/// Body of both anti-enumeration responses. Must not vary with the outcome.
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that address, a password reset link has been sent";

const LOGIN_PATH: &str = "/login";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailChangeRequest {
    pub new_email: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub email_verified: bool,
    pub plan: String,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        Self {
            id: value.public_id,
            email: value.email,
            username: value.username,
            display_name: value.display_name,
            email_verified: value.email_verified,
            plan: value.plan,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
    pub expires_at: String,
}

impl SessionResponse {
    pub fn new(session: AuthSession, user: User) -> Self {
        Self {
            token: session.token,
            user: user.into(),
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub mail_delivered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    pub message: String,
    pub mail_delivered: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email sent", body = RegisterResponse),
        (status = 400, description = "Invalid input or account exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = state
        .authenticator()
        .register(NewAccount {
            email: payload.email,
            password: payload.password,
            username: payload.username,
            display_name: payload.display_name,
        })
        .await?;

    let issued = state.tokens().issue_email_verification(user.id).await?;
    let mail_delivered = state
        .dispatch_mail(
            &issued.recipient,
            MailTemplate::VerifyEmail,
            json!({
                "name": user.display_name,
                "verifyUrl": state.link("/api/auth/verify-email", &issued.token),
            }),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            mail_delivered,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued and set as cookie", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let (user, session) = state
        .authenticator()
        .login_with_password(&payload.email, &payload.password)
        .await?;

    let secure = state.config().http.public_url.starts_with("https://");
    let cookie = session_cookie(&state.config().auth.session_cookie, &session.token, secure);

    Ok((jar.add(cookie), Json(SessionResponse::new(session, user))))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    verified: VerifiedSession,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    state.authenticator().logout(&verified.session.token).await?;

    let jar = jar.remove(expired_session_cookie(&state.config().auth.session_cookie));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(verified: VerifiedSession) -> Json<MeResponse> {
    Json(MeResponse {
        user: verified.user.into(),
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Always returned, whether or not the account exists", body = MessageResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Json<MessageResponse> {
    if let Ok(email) = validate_email(&payload.email) {
        // Detached: response time must not depend on whether the account exists.
        tokio::spawn(send_password_reset(state, email));
    }

    Json(MessageResponse::new(RESET_REQUESTED_MESSAGE))
}

async fn send_password_reset(state: AppState, email: String) {
    let issued = match state.tokens().request_password_reset(&email).await {
        Ok(Some(issued)) => issued,
        Ok(None) => return,
        Err(err) => {
            error!(error = ?err, "password reset issuance failed");
            return;
        }
    };

    state
        .dispatch_mail(
            &issued.recipient,
            MailTemplate::PasswordReset,
            json!({
                "resetUrl": state.link("/reset-password", &issued.token),
                "expiresAt": issued.expires_at.to_rfc3339(),
            }),
        )
        .await;
}

#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    tag = "Auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Verification email sent", body = MessageResponse),
        (status = 400, description = "Invalid address, unknown or already verified account", body = crate::error::ErrorResponse),
        (status = 502, description = "Mail transport failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = validate_email(&payload.email)?;

    let issued = match state.tokens().resend_verification(&email).await? {
        ResendOutcome::Issued(issued) => issued,
        ResendOutcome::AlreadyVerified => {
            return Err(ApiError::bad_request("Email is already verified"))
        }
        ResendOutcome::UnknownAccount => {
            return Err(ApiError::bad_request("No account found for that address"))
        }
    };

    let delivered = state
        .dispatch_mail(
            &issued.recipient,
            MailTemplate::VerifyEmail,
            json!({ "verifyUrl": state.link("/api/auth/verify-email", &issued.token) }),
        )
        .await;
    if !delivered {
        return Err(ApiError::bad_gateway(
            "Verification email could not be sent, please try again",
        ));
    }

    Ok(Json(MessageResponse::new("Verification email sent")))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed, all sessions revoked", body = MessageResponse),
        (status = 400, description = "Invalid password or invalid/expired token", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_password(&payload.password)?;

    let Some(user_id) = state
        .tokens()
        .reset_password(&payload.token, &payload.password)
        .await?
    else {
        return Err(ApiError::bad_request("Invalid or expired token"));
    };

    info!(user_id, "password reset via token");
    Ok(Json(MessageResponse::new("Password has been reset")))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify-email",
    tag = "Auth",
    params(TokenQuery),
    responses(
        (status = 303, description = "Redirect to the login page with a success or error marker")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Redirect {
    let token = query.token.unwrap_or_default();

    match state.tokens().verify_email(&token).await {
        Ok(Some(verified)) => {
            state
                .dispatch_mail(
                    &verified.email,
                    MailTemplate::Welcome,
                    json!({ "name": verified.display_name }),
                )
                .await;
            Redirect::to(&format!("{LOGIN_PATH}?verified=1"))
        }
        Ok(None) | Err(leadforge_identity::TokenError::MissingToken) => invalid_token_redirect(),
        Err(err) => {
            error!(error = ?err, "email verification failed");
            server_error_redirect()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/email-change",
    tag = "Auth",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    request_body = EmailChangeRequest,
    responses(
        (status = 200, description = "Confirmation link sent to the new address", body = DeliveryResponse),
        (status = 400, description = "Invalid or taken address", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_email_change(
    State(state): State<AppState>,
    verified: VerifiedSession,
    Json(payload): Json<EmailChangeRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let new_email = validate_email(&payload.new_email)?;
    if new_email == verified.user.email {
        return Err(ApiError::bad_request("That is already your email address"));
    }

    let issued = state
        .tokens()
        .request_email_change(verified.user_id(), &new_email)
        .await?;

    let mail_delivered = state
        .dispatch_mail(
            &issued.recipient,
            MailTemplate::EmailChange,
            json!({
                "name": verified.user.display_name,
                "confirmUrl": state.link("/api/auth/verify-email-change", &issued.token),
            }),
        )
        .await;

    Ok(Json(DeliveryResponse {
        message: "Check your new inbox to confirm the change".to_string(),
        mail_delivered,
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/verify-email-change",
    tag = "Auth",
    params(TokenQuery),
    responses(
        (status = 303, description = "Redirect to the login page with a success or error marker")
    )
)]
pub async fn verify_email_change(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Redirect {
    let token = query.token.unwrap_or_default();

    match state.tokens().confirm_email_change(&token).await {
        Ok(Some(_)) => Redirect::to(&format!("{LOGIN_PATH}?emailChanged=1")),
        Ok(None) | Err(leadforge_identity::TokenError::MissingToken) => invalid_token_redirect(),
        Err(err) => {
            error!(error = ?err, "email change confirmation failed");
            server_error_redirect()
        }
    }
}

fn invalid_token_redirect() -> Redirect {
    Redirect::to(&format!("{LOGIN_PATH}?error=invalid_token"))
}

fn server_error_redirect() -> Redirect {
    Redirect::to(&format!("{LOGIN_PATH}?error=server_error"))
}
