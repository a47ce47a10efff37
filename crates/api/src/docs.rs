use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::auth::forgot_password,
        crate::routes::auth::resend_verification,
        crate::routes::auth::reset_password,
        crate::routes::auth::verify_email,
        crate::routes::auth::request_email_change,
        crate::routes::auth::verify_email_change,
        crate::routes::team::create_invite,
        crate::routes::team::invite_info,
        crate::routes::team::accept_invite,
        crate::routes::forms::list_forms,
        crate::routes::forms::delete_form,
        crate::routes::forms::export_leads,
        crate::routes::account::quota
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::EmailRequest,
            crate::routes::auth::ResetPasswordRequest,
            crate::routes::auth::EmailChangeRequest,
            crate::routes::auth::UserResponse,
            crate::routes::auth::SessionResponse,
            crate::routes::auth::RegisterResponse,
            crate::routes::auth::MessageResponse,
            crate::routes::auth::DeliveryResponse,
            crate::routes::auth::MeResponse,
            crate::routes::team::CreateInviteRequest,
            crate::routes::team::AcceptInviteRequest,
            crate::routes::team::InviteCreatedResponse,
            crate::routes::team::InviteInfoResponse,
            crate::routes::forms::FormsResponse,
            crate::routes::forms::LeadExportResponse,
            crate::services::form::FormSummary,
            crate::services::form::LeadRecord,
            crate::routes::account::QuotaResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Accounts, sessions and verification flows"),
        (name = "Team", description = "Workspace invitations"),
        (name = "Forms", description = "Form listing, deletion and lead export"),
        (name = "Account", description = "Plan and quota information")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
        schemes.insert(
            "sessionCookie".to_string(),
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("leadforge_session"))),
        );
    }
}
