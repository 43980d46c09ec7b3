use metrics_exporter_prometheus::PrometheusHandle;
use order_desk::config::NotificationConfig;
use order_desk::marketplace::{
    Audience, CatalogService, MemoryMarketplace, NotificationDispatcher, NotificationError,
    OrderNotice, RepositoryError,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const CATALOG: &[(&str, &str, bool)] = &[
    ("GST Registration", "All India", true),
    ("Partnership Registration", "All India", true),
    ("Private Limited Incorporation", "All India", true),
    ("Trademark Filing", "All India", false),
];

/// Loads the default document services into the in-process catalog.
pub(crate) fn seed_catalog(
    store: &MemoryMarketplace,
) -> Result<Vec<CatalogService>, RepositoryError> {
    CATALOG
        .iter()
        .map(|(document_type, region, is_active)| {
            store.add_service(document_type, region, *is_active)
        })
        .collect()
}

pub(crate) fn recipients(audience: Audience) -> &'static str {
    match audience {
        Audience::Customer => "order owner",
        Audience::VerifiedPartners => "verified partners",
    }
}

/// Mail transport stand-in that writes each notice to the log.
pub(crate) struct LoggingMailer {
    config: NotificationConfig,
}

impl LoggingMailer {
    pub(crate) fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    fn order_link(&self, notice: &OrderNotice) -> Option<String> {
        self.config
            .dashboard_url
            .as_ref()
            .map(|base| format!("{base}/orders/{}", notice.order.id))
    }
}

impl NotificationDispatcher for LoggingMailer {
    fn dispatch(&self, notice: &OrderNotice) -> Result<(), NotificationError> {
        info!(
            from = %self.config.from_address,
            to = recipients(notice.event.audience()),
            subject = %notice.subject(),
            summary = %notice.summary(),
            link = ?self.order_link(notice),
            "notification sent"
        );
        Ok(())
    }
}

/// Keeps every subject so the demo can print its outbox.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    outbox: Mutex<Vec<(Audience, String)>>,
}

impl RecordingMailer {
    pub(crate) fn outbox(&self) -> Vec<(Audience, String)> {
        self.outbox
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingMailer {
    fn dispatch(&self, notice: &OrderNotice) -> Result<(), NotificationError> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
        outbox.push((notice.event.audience(), notice.subject()));
        Ok(())
    }
}
