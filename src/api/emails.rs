//! Email template, sending and delivery log endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::dispatch::OutgoingEmail;
use crate::error::Result;
use crate::server::AppState;
use crate::service::SendRequest;
use crate::store::{
    DeliveryAttempt, DeliveryAttemptFilter, Email, EmailFilter, EmailPatch, NewEmail,
};

use super::validation::Validate;
use super::{request_scope, ApiJson};

/// POST /api/v1/emails - Create a template
#[tracing::instrument(
    name = "http.create_email",
    skip(state, request),
    fields(folder_id = ?request.folder_id)
)]
pub async fn create_email(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewEmail>,
) -> Result<(StatusCode, Json<Email>)> {
    request.validate()?;
    let (cancel, _guard) = request_scope();

    let email = state.service.create_email(request, &cancel).await?;
    Ok((StatusCode::CREATED, Json(email)))
}

/// POST /api/v1/emails/filter - Filter templates
#[tracing::instrument(name = "http.filter_emails", skip(state, filter))]
pub async fn filter_emails(
    State(state): State<AppState>,
    ApiJson(filter): ApiJson<EmailFilter>,
) -> Result<Json<Vec<Email>>> {
    let (cancel, _guard) = request_scope();
    let emails = state.service.filter_emails(&filter, &cancel).await?;
    Ok(Json(emails))
}

/// PATCH /api/v1/emails/{id} - Update supplied fields of a template
#[tracing::instrument(name = "http.update_email", skip(state, patch))]
pub async fn update_email(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(patch): ApiJson<EmailPatch>,
) -> Result<StatusCode> {
    patch.validate()?;
    let (cancel, _guard) = request_scope();

    state.service.update_email(id, patch, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/emails/{id} - Delete a template
#[tracing::instrument(name = "http.delete_email", skip(state))]
pub async fn delete_email(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let (cancel, _guard) = request_scope();
    state.service.delete_email(id, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/emails/send - Render a stored template and send it
///
/// A provider rejection is still `201`: the attempt was made and logged
/// with `status = "error"`.
#[tracing::instrument(
    name = "http.send_email",
    skip(state, request),
    fields(email_id = request.email_id)
)]
pub async fn send_email(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendRequest>,
) -> Result<(StatusCode, Json<DeliveryAttempt>)> {
    request.validate()?;
    let (cancel, _guard) = request_scope();

    let attempt = state.service.send_by_id(request, &cancel).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

/// POST /api/v1/emails/send-custom - Send caller-supplied content
#[tracing::instrument(name = "http.send_custom_email", skip(state, request))]
pub async fn send_custom_email(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<OutgoingEmail>,
) -> Result<(StatusCode, Json<DeliveryAttempt>)> {
    request.validate()?;
    let (cancel, _guard) = request_scope();

    let attempt = state.service.send_custom(request, &cancel).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

/// POST /api/v1/emails/logs/filter - Filter delivery attempts
#[tracing::instrument(name = "http.filter_delivery_attempts", skip(state, filter))]
pub async fn filter_delivery_attempts(
    State(state): State<AppState>,
    ApiJson(filter): ApiJson<DeliveryAttemptFilter>,
) -> Result<Json<Vec<DeliveryAttempt>>> {
    let (cancel, _guard) = request_scope();
    let attempts = state
        .service
        .filter_delivery_attempts(&filter, &cancel)
        .await?;
    Ok(Json(attempts))
}
