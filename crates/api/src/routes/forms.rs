use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use leadforge_identity::AuditAction;
use serde::Serialize;
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

use crate::services::form::{self as form_service, FormSummary, LeadRecord};
use crate::session::VerifiedSession;
use crate::{ApiError, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct FormsResponse {
    pub forms: Vec<FormSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadExportResponse {
    pub form_id: String,
    pub count: usize,
    pub leads: Vec<LeadRecord>,
    pub audit_recorded: bool,
}

#[utoipa::path(
    post,
    path = "/api/forms/list",
    tag = "Forms",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    responses(
        (status = 200, description = "Forms owned by the current user, by name", body = FormsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_forms(
    State(state): State<AppState>,
    verified: VerifiedSession,
) -> Result<Json<FormsResponse>, ApiError> {
    let forms = form_service::list_forms(state.db_pool(), verified.user_id()).await?;
    Ok(Json(FormsResponse { forms }))
}

#[utoipa::path(
    delete,
    path = "/api/forms/{form_id}",
    tag = "Forms",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    params(
        ("form_id" = String, Path, description = "Form public identifier")
    ),
    responses(
        (status = 204, description = "Form and its leads deleted"),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_form(
    State(state): State<AppState>,
    verified: VerifiedSession,
    Path(form_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    form_service::delete_form(state.db_pool(), verified.user_id(), &form_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/forms/{form_id}/leads/export",
    tag = "Forms",
    security(("bearerAuth" = []), ("sessionCookie" = [])),
    params(
        ("form_id" = String, Path, description = "Form public identifier")
    ),
    responses(
        (status = 200, description = "Leads of the form; the export is audited", body = LeadExportResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::error::ErrorResponse),
        (status = 500, description = "Export could not be audited and auditing is mandatory", body = crate::error::ErrorResponse)
    )
)]
pub async fn export_leads(
    State(state): State<AppState>,
    verified: VerifiedSession,
    Path(form_id): Path<String>,
) -> Result<Json<LeadExportResponse>, ApiError> {
    let leads = form_service::export_leads(state.db_pool(), verified.user_id(), &form_id).await?;
    let count = leads.len();

    let audit_recorded = match state
        .audit()
        .record(
            verified.user_id(),
            AuditAction::LeadExport,
            Some(json!({ "formId": form_id, "count": count })),
        )
        .await
    {
        Ok(_) => true,
        Err(err) if state.config().audit.abort_on_failure => return Err(err.into()),
        Err(err) => {
            error!(error = ?err, user_id = verified.user_id(), "lead export not audited");
            false
        }
    };

    Ok(Json(LeadExportResponse {
        form_id,
        count,
        leads,
        audit_recorded,
    }))
}
