//! Notification service: the use cases behind the HTTP API.
//!
//! Orchestrates the template store, the renderer and the dispatch gateway.
//! Every operation takes the caller's `CancellationToken`; cancelling it
//! before the operation completes yields `ServiceError::Cancelled`.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ProviderConfig, RenderingConfig};
use crate::dispatch::{DispatchError, DispatchGateway, HttpTransport, OutgoingEmail};
use crate::metrics::StorageMetrics;
use crate::render::{TemplateError, TemplateRenderer};
use crate::store::{
    DeliveryAttempt, DeliveryAttemptFilter, DeliveryStatus, Email, EmailFilter, EmailPatch,
    Folder, FolderFilter, FolderPatch, NewEmail, NewFolder, StorageBackend, StorageError,
    StoreError, TemplateStore,
};

/// Service error type
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<DispatchError> for ServiceError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Cancelled => ServiceError::Cancelled,
            other => ServiceError::Dispatch(other),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Store(StoreError::Storage(e))
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Send a stored template by id
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub email_id: i64,
    pub to_email: String,

    /// Variables for subject, HTML and text; without them the stored
    /// content goes out as-is
    #[serde(default, rename = "vars")]
    pub variables: Option<Value>,
}

pub struct NotificationService {
    store: TemplateStore,
    renderer: TemplateRenderer,
    gateway: DispatchGateway,
    backend: Arc<dyn StorageBackend>,
}

impl NotificationService {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        transport: Arc<dyn HttpTransport>,
        provider: &ProviderConfig,
        rendering: &RenderingConfig,
    ) -> Self {
        Self {
            store: TemplateStore::new(backend.clone()),
            renderer: TemplateRenderer::new(rendering.strict_variables),
            gateway: DispatchGateway::new(transport, backend.clone(), provider),
            backend,
        }
    }

    pub fn backend_type(&self) -> &'static str {
        self.backend.backend_type()
    }

    /// Run `operation` unless `cancel` fires first.
    async fn guarded<T, E, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        future: F,
    ) -> ServiceResult<T>
    where
        F: Future<Output = Result<T, E>>,
        ServiceError: From<E>,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(operation, "Operation cancelled");
                return Err(ServiceError::Cancelled);
            }
            result = future => result.map_err(ServiceError::from),
        };

        if let Err(ServiceError::Store(StoreError::Storage(e))) = &result {
            StorageMetrics::record_error(operation);
            tracing::error!(operation, error = %e, "Storage backend error");
        }
        result
    }

    // ========================================================================
    // Folders
    // ========================================================================

    pub async fn create_folder(
        &self,
        folder: NewFolder,
        cancel: &CancellationToken,
    ) -> ServiceResult<Folder> {
        self.guarded("create_folder", cancel, self.store.create_folder(folder))
            .await
    }

    pub async fn filter_folders(
        &self,
        filter: &FolderFilter,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<Folder>> {
        self.guarded("filter_folders", cancel, self.store.filter_folders(filter))
            .await
    }

    pub async fn update_folder(
        &self,
        id: i64,
        patch: FolderPatch,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        self.guarded("update_folder", cancel, self.store.update_folder(id, patch))
            .await
    }

    pub async fn delete_folder(&self, id: i64, cancel: &CancellationToken) -> ServiceResult<()> {
        self.guarded("delete_folder", cancel, self.store.delete_folder(id))
            .await
    }

    // ========================================================================
    // Email templates
    // ========================================================================

    pub async fn create_email(
        &self,
        email: NewEmail,
        cancel: &CancellationToken,
    ) -> ServiceResult<Email> {
        self.guarded("create_email", cancel, self.store.create_email(email))
            .await
    }

    pub async fn filter_emails(
        &self,
        filter: &EmailFilter,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<Email>> {
        self.guarded("filter_emails", cancel, self.store.filter_emails(filter))
            .await
    }

    pub async fn update_email(
        &self,
        id: i64,
        patch: EmailPatch,
        cancel: &CancellationToken,
    ) -> ServiceResult<()> {
        self.guarded("update_email", cancel, self.store.update_email(id, patch))
            .await
    }

    pub async fn delete_email(&self, id: i64, cancel: &CancellationToken) -> ServiceResult<()> {
        self.guarded("delete_email", cancel, self.store.delete_email(id))
            .await
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Dispatch caller-supplied content as-is.
    #[tracing::instrument(name = "service.send_custom", skip(self, email, cancel))]
    pub async fn send_custom(
        &self,
        email: OutgoingEmail,
        cancel: &CancellationToken,
    ) -> ServiceResult<DeliveryAttempt> {
        let attempt = self.gateway.dispatch(email, cancel).await?;
        log_rejection(&attempt);
        Ok(attempt)
    }

    /// Render a stored template and dispatch it from the template's sender.
    #[tracing::instrument(
        name = "service.send_by_id",
        skip(self, request, cancel),
        fields(email_id = request.email_id)
    )]
    pub async fn send_by_id(
        &self,
        request: SendRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<DeliveryAttempt> {
        let template = self
            .filter_emails(&EmailFilter::by_id(request.email_id), cancel)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::EmailNotFound(request.email_id))?;

        let variables = request.variables.as_ref();
        let email = OutgoingEmail {
            subject: self.renderer.render(&template.subject, variables)?,
            html: self.renderer.render(&template.html, variables)?,
            text: self.renderer.render(&template.text, variables)?,
            from_email: template.from_email,
            from_name: template.from_name,
            to_email: request.to_email,
        };

        let attempt = self.gateway.dispatch(email, cancel).await?;
        log_rejection(&attempt);
        Ok(attempt)
    }

    // ========================================================================
    // Delivery log
    // ========================================================================

    pub async fn filter_delivery_attempts(
        &self,
        filter: &DeliveryAttemptFilter,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<DeliveryAttempt>> {
        self.guarded(
            "filter_delivery_attempts",
            cancel,
            self.backend.find_delivery_attempts(filter),
        )
        .await
    }
}

fn log_rejection(attempt: &DeliveryAttempt) {
    if attempt.status == DeliveryStatus::Error {
        tracing::warn!(
            attempt_id = attempt.id,
            detail = attempt.error_detail.as_deref().unwrap_or(""),
            "Provider rejected message"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ProviderRequest, ProviderResponse, TransportError};
    use crate::store::MemoryStorageBackend;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn post_multipart(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let message_id = format!("m-{}", request.field("to").unwrap_or(""));
            let body = json!({"result": true, "messageid": message_id});
            Ok(ProviderResponse {
                status: 200,
                body: body.to_string().into_bytes(),
            })
        }
    }

    fn service(strict: bool) -> (NotificationService, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
        });
        let provider = ProviderConfig {
            base_url: "https://provider.test".to_string(),
            send_path: "/send".to_string(),
            api_key: "key".to_string(),
            timeout_seconds: 5,
        };
        let rendering = RenderingConfig {
            strict_variables: strict,
        };
        let service = NotificationService::new(
            Arc::new(MemoryStorageBackend::new()),
            transport.clone(),
            &provider,
            &rendering,
        );
        (service, transport)
    }

    fn template(html: &str) -> NewEmail {
        NewEmail {
            folder_id: None,
            from_email: "noreply@example.com".to_string(),
            from_name: "Example".to_string(),
            subject: "Your code".to_string(),
            html: html.to_string(),
            text: "{{code}}".to_string(),
            description: String::new(),
            system_flag: false,
        }
    }

    #[tokio::test]
    async fn test_send_by_id_renders_template() {
        let (service, _) = service(false);
        let cancel = CancellationToken::new();
        let stored = service
            .create_email(template("Code: {{code}}"), &cancel)
            .await
            .unwrap();

        let attempt = service
            .send_by_id(
                SendRequest {
                    email_id: stored.id,
                    to_email: "a@b.com".to_string(),
                    variables: Some(json!({"code": "42"})),
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(attempt.html, "Code: 42");
        assert_eq!(attempt.text, "42");
        assert_eq!(attempt.to_email, "a@b.com");
        assert_eq!(attempt.from_email, "noreply@example.com");
        assert_eq!(attempt.from_name, "Example");
        assert_eq!(attempt.message_id.as_deref(), Some("m-a@b.com"));
    }

    #[tokio::test]
    async fn test_send_by_missing_id_skips_provider() {
        let (service, transport) = service(false);
        let result = service
            .send_by_id(
                SendRequest {
                    email_id: 99,
                    to_email: "a@b.com".to_string(),
                    variables: None,
                },
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Store(StoreError::EmailNotFound(99)))
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_render_failure_skips_provider() {
        let (service, transport) = service(true);
        let cancel = CancellationToken::new();
        let stored = service
            .create_email(template("Code: {{code}}"), &cancel)
            .await
            .unwrap();

        let result = service
            .send_by_id(
                SendRequest {
                    email_id: stored.id,
                    to_email: "a@b.com".to_string(),
                    variables: Some(json!({"other": 1})),
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(ServiceError::Template(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let (service, _) = service(false);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service
            .filter_folders(&FolderFilter::default(), &cancel)
            .await;
        assert!(matches!(result, Err(ServiceError::Cancelled)));

        let result = service
            .send_custom(
                OutgoingEmail {
                    from_email: "a@b.com".to_string(),
                    from_name: "A".to_string(),
                    subject: "S".to_string(),
                    to_email: "c@d.com".to_string(),
                    html: "h".to_string(),
                    text: "t".to_string(),
                },
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_send_custom_logs_attempt() {
        let (service, _) = service(false);
        let cancel = CancellationToken::new();
        let email = OutgoingEmail {
            from_email: "a@b.com".to_string(),
            from_name: "A".to_string(),
            subject: "Hello {{name}}".to_string(),
            to_email: "c@d.com".to_string(),
            html: "h".to_string(),
            text: "t".to_string(),
        };

        let attempt = service.send_custom(email, &cancel).await.unwrap();
        // Custom content is never rendered
        assert_eq!(attempt.subject, "Hello {{name}}");

        let filter = DeliveryAttemptFilter {
            to_email_in: Some(vec!["c@d.com".to_string()]),
            ..Default::default()
        };
        let found = service
            .filter_delivery_attempts(&filter, &cancel)
            .await
            .unwrap();
        assert_eq!(found, vec![attempt]);
    }
}
