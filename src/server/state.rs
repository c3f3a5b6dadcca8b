use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::dispatch::HttpTransport;
use crate::postgres::PostgresPool;
use crate::service::NotificationService;
use crate::store::StorageBackend;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: Arc<NotificationService>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn StorageBackend>,
        transport: Arc<dyn HttpTransport>,
        postgres_pool: Option<Arc<PostgresPool>>,
    ) -> Self {
        let service = Arc::new(NotificationService::new(
            backend,
            transport,
            &settings.provider,
            &settings.rendering,
        ));

        Self {
            settings: Arc::new(settings),
            service,
            postgres_pool,
            start_time: Instant::now(),
        }
    }
}
