//! Job store clients
//!
//! The store owns the print queue; the agent only reads pending jobs and
//! reports outcomes. Two implementations:
//! - [`HttpJobStore`]: the hosted `printer-orders` / `printer-config` functions
//! - [`MemoryJobStore`]: in-process store for tests and local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::{PrintJob, PrintStatus, ReceiptLayout, StoreConfig};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PrintStatus,
        to: PrintStatus,
    },

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of one print attempt on one printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintLogStatus {
    Success,
    Error,
}

/// Audit row written for every print attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintLogEntry {
    pub restaurant_id: String,
    pub order_id: String,
    pub order_number: String,
    pub event_type: String,
    pub status: PrintLogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub printer_name: String,
    pub items_count: usize,
}

impl PrintLogEntry {
    /// Row for an automatic print of `job` on `printer_name`
    pub fn auto_print(
        restaurant_id: &str,
        job: &PrintJob,
        printer_name: &str,
        error: Option<String>,
    ) -> Self {
        Self {
            restaurant_id: restaurant_id.to_string(),
            order_id: job.id.clone(),
            order_number: job
                .order_number
                .clone()
                .unwrap_or_else(|| job.label().trim_start_matches('#').to_string()),
            event_type: "auto_print".to_string(),
            status: if error.is_some() {
                PrintLogStatus::Error
            } else {
                PrintLogStatus::Success
            },
            error_message: error,
            printer_name: printer_name.to_string(),
            items_count: job.items.len(),
        }
    }
}

/// Liveness report so the dashboard can show the agent online
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub restaurant_id: String,
    pub client_id: String,
    pub client_name: String,
    pub client_version: String,
    pub platform: String,
    pub printers_count: usize,
    pub is_printing: bool,
    pub pending_orders: usize,
    pub sent_at: DateTime<Utc>,
}

/// Operations the agent needs from the job store
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs currently pending for a restaurant, oldest first
    async fn list_pending(&self, restaurant_id: &str) -> StoreResult<Vec<PrintJob>>;

    /// pending -> printed; bumps `print_count` and sets `printed_at`
    ///
    /// Ids that are unknown or no longer pending are skipped.
    async fn mark_printed(&self, job_ids: &[String]) -> StoreResult<()>;

    /// pending -> failed with a reason
    async fn mark_failed(&self, job_id: &str, reason: &str) -> StoreResult<()>;

    /// printed | failed -> pending
    async fn request_reprint(&self, job_id: &str) -> StoreResult<()>;

    /// Every pending job -> skipped; returns how many moved
    async fn clear_pending(&self, restaurant_id: &str) -> StoreResult<u64>;

    /// Printers and receipt layout for a restaurant
    async fn fetch_config(&self, restaurant_id: &str) -> StoreResult<StoreConfig>;

    /// Append a print audit row
    async fn log_print(&self, entry: &PrintLogEntry) -> StoreResult<()>;

    /// Report the agent as alive
    async fn heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()>;
}

// ============================================================================
// HTTP store
// ============================================================================

#[derive(Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct ClearedResponse {
    #[serde(default)]
    cleared: u64,
}

#[derive(Deserialize, Default)]
struct RestaurantInfo {
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    cnpj: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigSettings {
    #[serde(alias = "print_layout")]
    print_layout: Option<serde_json::Value>,
    show_address: Option<bool>,
    show_phone: Option<bool>,
    show_cnpj: Option<bool>,
}

#[derive(Deserialize)]
struct ConfigResponse {
    #[serde(default)]
    restaurant: Option<RestaurantInfo>,
    #[serde(default)]
    settings: Option<ConfigSettings>,
    #[serde(default)]
    printers: Option<Vec<serde_json::Value>>,
}

/// Parse each row on its own; a malformed row is logged and dropped
fn parse_rows<T: DeserializeOwned>(rows: Option<Vec<serde_json::Value>>, kind: &str) -> Vec<T> {
    rows.unwrap_or_default()
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or_default();
            match serde_json::from_value(row) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(kind, id = %id, error = %e, "Skipping malformed row");
                    None
                }
            }
        })
        .collect()
}

impl ConfigResponse {
    fn into_config(self, fallback: &ReceiptLayout) -> StoreConfig {
        let settings = self.settings.unwrap_or_default();
        let saved = settings
            .print_layout
            .filter(|value| value.as_object().is_some_and(|o| !o.is_empty()))
            .and_then(|value| match serde_json::from_value::<ReceiptLayout>(value) {
                Ok(layout) => Some(layout),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed print layout");
                    None
                }
            });

        let mut layout = match saved {
            Some(layout) => layout,
            None => {
                // No saved layout: the receipt settings switches apply
                let mut layout = fallback.clone();
                if let Some(show) = settings.show_address {
                    layout.show_address = show;
                }
                if let Some(show) = settings.show_phone {
                    layout.show_phone = show;
                }
                if let Some(show) = settings.show_cnpj {
                    layout.show_cnpj = show;
                }
                layout
            }
        };
        let restaurant = self.restaurant.unwrap_or_default();

        // Layout values win; restaurant profile fills the gaps
        layout.store_name = layout.store_name.or(restaurant.name);
        layout.store_phone = layout.store_phone.or(restaurant.phone);
        layout.store_address = layout.store_address.or(restaurant.address);
        layout.store_cnpj = layout.store_cnpj.or(restaurant.cnpj);

        StoreConfig {
            printers: parse_rows(self.printers, "printer"),
            layout,
        }
    }
}

/// Client for the hosted store functions
#[derive(Debug, Clone)]
pub struct HttpJobStore {
    client: Client,
    base_url: String,
    api_key: String,
    restaurant_id: String,
    default_layout: ReceiptLayout,
}

impl HttpJobStore {
    /// `restaurant_id` scopes the status updates
    pub fn new(base_url: &str, api_key: &str, restaurant_id: &str) -> StoreResult<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            restaurant_id: restaurant_id.to_string(),
            default_layout: ReceiptLayout::default(),
        })
    }

    /// Layout used when the store has no print layout saved
    pub fn with_default_layout(mut self, layout: ReceiptLayout) -> Self {
        self.default_layout = layout;
        self
    }

    fn orders_url(&self, restaurant_id: &str, action: &str) -> String {
        format!(
            "{}/functions/v1/printer-orders?restaurant_id={}&action={}",
            self.base_url, restaurant_id, action
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn post_action<T: DeserializeOwned>(
        &self,
        restaurant_id: &str,
        action: &str,
        body: serde_json::Value,
    ) -> StoreResult<T> {
        let url = self.orders_url(restaurant_id, action);
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    #[instrument(skip(self))]
    async fn list_pending(&self, restaurant_id: &str) -> StoreResult<Vec<PrintJob>> {
        let url = self.orders_url(restaurant_id, "get");
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body: OrdersResponse = Self::handle_response(response).await?;
        let orders: Vec<PrintJob> = parse_rows(body.orders, "order");
        debug!(count = orders.len(), "Fetched pending orders");
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn mark_printed(&self, job_ids: &[String]) -> StoreResult<()> {
        let _: serde_json::Value = self
            .post_action(
                &self.restaurant_id,
                "mark-printed",
                serde_json::json!({ "order_ids": job_ids }),
            )
            .await?;
        Ok(())
    }

    /// Posts `action=mark-failed`; hosts without that action answer 400
    #[instrument(skip(self))]
    async fn mark_failed(&self, job_id: &str, reason: &str) -> StoreResult<()> {
        let _: serde_json::Value = self
            .post_action(
                &self.restaurant_id,
                "mark-failed",
                serde_json::json!({ "order_id": job_id, "reason": reason }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn request_reprint(&self, job_id: &str) -> StoreResult<()> {
        let _: serde_json::Value = self
            .post_action(
                &self.restaurant_id,
                "reprint",
                serde_json::json!({ "order_id": job_id }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_pending(&self, restaurant_id: &str) -> StoreResult<u64> {
        let body: ClearedResponse = self
            .post_action(restaurant_id, "clear-pending", serde_json::json!({}))
            .await?;
        Ok(body.cleared)
    }

    #[instrument(skip(self))]
    async fn fetch_config(&self, restaurant_id: &str) -> StoreResult<StoreConfig> {
        let url = format!(
            "{}/functions/v1/printer-config?restaurant_id={}",
            self.base_url, restaurant_id
        );
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body: ConfigResponse = Self::handle_response(response).await?;
        Ok(body.into_config(&self.default_layout))
    }

    #[instrument(skip(self, entry), fields(order_id = %entry.order_id))]
    async fn log_print(&self, entry: &PrintLogEntry) -> StoreResult<()> {
        let url = format!("{}/rest/v1/print_logs", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .header("Prefer", "return=minimal")
            .json(entry)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, heartbeat))]
    async fn heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()> {
        let url = format!("{}/functions/v1/printer-heartbeat", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(heartbeat)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

struct StoredJob {
    restaurant_id: String,
    job: PrintJob,
    failure: Option<String>,
}

/// Job store kept in memory, enforcing the same transitions as the hosted one
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<StoredJob>>,
    config: RwLock<StoreConfig>,
    print_logs: Mutex<Vec<PrintLogEntry>>,
    heartbeats: Mutex<Vec<Heartbeat>>,
}

impl MemoryJobStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: RwLock::new(config),
            ..Self::default()
        }
    }

    /// Queue a job as pending
    pub fn insert(&self, restaurant_id: &str, mut job: PrintJob) {
        job.print_status = PrintStatus::Pending;
        self.jobs.lock().push(StoredJob {
            restaurant_id: restaurant_id.to_string(),
            job,
            failure: None,
        });
    }

    pub fn get(&self, job_id: &str) -> Option<PrintJob> {
        self.jobs
            .lock()
            .iter()
            .find(|s| s.job.id == job_id)
            .map(|s| s.job.clone())
    }

    /// Reason recorded by the last `mark_failed`
    pub fn failure_reason(&self, job_id: &str) -> Option<String> {
        self.jobs
            .lock()
            .iter()
            .find(|s| s.job.id == job_id)
            .and_then(|s| s.failure.clone())
    }

    pub fn set_config(&self, config: StoreConfig) {
        *self.config.write() = config;
    }

    pub fn print_logs(&self) -> Vec<PrintLogEntry> {
        self.print_logs.lock().clone()
    }

    pub fn heartbeats(&self) -> Vec<Heartbeat> {
        self.heartbeats.lock().clone()
    }

    fn transition(
        stored: &mut StoredJob,
        allowed_from: &[PrintStatus],
        to: PrintStatus,
    ) -> StoreResult<()> {
        if !allowed_from.contains(&stored.job.print_status) {
            return Err(StoreError::InvalidTransition {
                id: stored.job.id.clone(),
                from: stored.job.print_status,
                to,
            });
        }
        stored.job.print_status = to;
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list_pending(&self, restaurant_id: &str) -> StoreResult<Vec<PrintJob>> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|s| {
                s.restaurant_id == restaurant_id && s.job.print_status == PrintStatus::Pending
            })
            .map(|s| s.job.clone())
            .collect())
    }

    async fn mark_printed(&self, job_ids: &[String]) -> StoreResult<()> {
        let mut jobs = self.jobs.lock();
        let now = Utc::now();

        for id in job_ids {
            match jobs.iter_mut().find(|s| &s.job.id == id) {
                Some(stored) if stored.job.print_status == PrintStatus::Pending => {
                    stored.job.print_status = PrintStatus::Printed;
                    stored.job.print_count += 1;
                    stored.job.printed_at = Some(now);
                    stored.failure = None;
                }
                Some(stored) => {
                    debug!(job_id = %id, status = %stored.job.print_status, "Not pending, left as is");
                }
                None => debug!(job_id = %id, "Unknown job, skipped"),
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: &str, reason: &str) -> StoreResult<()> {
        let mut jobs = self.jobs.lock();
        let stored = jobs
            .iter_mut()
            .find(|s| s.job.id == job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Self::transition(stored, &[PrintStatus::Pending], PrintStatus::Failed)?;
        stored.failure = Some(reason.to_string());
        Ok(())
    }

    async fn request_reprint(&self, job_id: &str) -> StoreResult<()> {
        let mut jobs = self.jobs.lock();
        let stored = jobs
            .iter_mut()
            .find(|s| s.job.id == job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Self::transition(
            stored,
            &[PrintStatus::Printed, PrintStatus::Failed],
            PrintStatus::Pending,
        )
    }

    async fn clear_pending(&self, restaurant_id: &str) -> StoreResult<u64> {
        let mut cleared = 0;
        for stored in self.jobs.lock().iter_mut().filter(|s| {
            s.restaurant_id == restaurant_id && s.job.print_status == PrintStatus::Pending
        }) {
            stored.job.print_status = PrintStatus::Skipped;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn fetch_config(&self, _restaurant_id: &str) -> StoreResult<StoreConfig> {
        Ok(self.config.read().clone())
    }

    async fn log_print(&self, entry: &PrintLogEntry) -> StoreResult<()> {
        self.print_logs.lock().push(entry.clone());
        Ok(())
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat) -> StoreResult<()> {
        self.heartbeats.lock().push(heartbeat.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn job(id: &str) -> PrintJob {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "order_number": 1,
            "order_type": "counter",
            "items": [{"name": "Pastel", "quantity": 1, "unit_price": 8.0}],
            "total": 8.0
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryJobStore::default();
        store.insert("r1", job("a"));
        store.insert("r1", job("b"));
        store.insert("r2", job("c"));

        assert_eq!(store.list_pending("r1").await.unwrap().len(), 2);

        store.mark_printed(&["a".to_string()]).await.unwrap();
        store.mark_failed("b", "paper out").await.unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.print_status, PrintStatus::Printed);
        assert_eq!(a.print_count, 1);
        assert!(a.printed_at.is_some());
        assert_eq!(store.failure_reason("b").as_deref(), Some("paper out"));
        assert!(store.list_pending("r1").await.unwrap().is_empty());

        store.request_reprint("b").await.unwrap();
        assert_eq!(store.get("b").unwrap().print_status, PrintStatus::Pending);

        assert_eq!(store.clear_pending("r1").await.unwrap(), 1);
        assert_eq!(store.get("b").unwrap().print_status, PrintStatus::Skipped);
        assert_eq!(store.get("c").unwrap().print_status, PrintStatus::Pending);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_invalid_transitions() {
        let store = MemoryJobStore::default();
        store.insert("r1", job("a"));

        assert!(matches!(
            store.request_reprint("a").await,
            Err(StoreError::InvalidTransition { .. })
        ));

        store.mark_printed(&["a".to_string()]).await.unwrap();
        assert!(matches!(
            store.mark_failed("a", "late").await,
            Err(StoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.mark_failed("zzz", "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_printed_skips_unknown_and_settled_ids() {
        let store = MemoryJobStore::default();
        store.insert("r1", job("a"));
        store.insert("r1", job("b"));
        store.mark_printed(&["b".to_string()]).await.unwrap();

        store
            .mark_printed(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .await
            .unwrap();

        let a = store.get("a").unwrap();
        assert_eq!(a.print_status, PrintStatus::Printed);
        assert_eq!(a.print_count, 1);
        // Already printed: not counted twice
        assert_eq!(store.get("b").unwrap().print_count, 1);
    }

    #[tokio::test]
    async fn test_memory_store_records_audit_and_heartbeats() {
        let store = MemoryJobStore::default();
        let entry = PrintLogEntry::auto_print("r1", &job("a"), "Cozinha", Some("timeout".into()));
        store.log_print(&entry).await.unwrap();

        let logs = store.print_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, PrintLogStatus::Error);
        assert_eq!(logs[0].order_number, "1");
        assert_eq!(logs[0].items_count, 1);
        assert_eq!(logs[0].event_type, "auto_print");
        assert!(store.heartbeats().is_empty());
    }

    #[test]
    fn test_config_response_merges_restaurant() {
        let body: ConfigResponse = serde_json::from_value(serde_json::json!({
            "restaurant": {"name": "Bar do Ze", "phone": "1133334444", "address": "Rua A, 1", "cnpj": "12.345.678/0001-90"},
            "settings": {"printLayout": {"paperWidth": 32, "store_phone": "999"}},
            "printers": [{
                "id": "p1",
                "display_name": "Balcao",
                "transport": {"kind": "network", "ip": "192.168.0.50", "port": 9100}
            }]
        }))
        .unwrap();

        let config = body.into_config(&ReceiptLayout::default());
        assert_eq!(config.printers.len(), 1);
        assert_eq!(config.layout.paper_width, 32);
        assert_eq!(config.layout.store_name.as_deref(), Some("Bar do Ze"));
        assert_eq!(config.layout.store_phone.as_deref(), Some("999"));
        assert_eq!(config.layout.store_cnpj.as_deref(), Some("12.345.678/0001-90"));
    }

    #[test]
    fn test_config_response_without_layout_uses_fallback() {
        let body: ConfigResponse = serde_json::from_value(serde_json::json!({
            "settings": {"printLayout": {}, "showPhone": false, "showCnpj": true},
            "printers": []
        }))
        .unwrap();
        let fallback = ReceiptLayout {
            paper_width: 32,
            ..ReceiptLayout::default()
        };
        let layout = body.into_config(&fallback).layout;
        assert_eq!(layout.paper_width, 32);
        assert!(!layout.show_phone);
        assert!(layout.show_cnpj);
        assert!(layout.show_address);
    }

    #[test]
    fn test_config_response_tolerates_null_and_bad_rows() {
        let body: ConfigResponse = serde_json::from_value(serde_json::json!({
            "restaurant": {"name": "Bar do Ze", "phone": null, "address": null, "cnpj": null},
            "settings": {"printLayout": null, "receiptHeader": null},
            "printers": [
                {"id": "p1", "name": "Cozinha", "printer_name": "192.168.0.87", "is_active": true},
                {"id": "p2", "name": "Caixa", "printer_name": "EPSON TM-T20"},
                {"name": "no id"}
            ],
            "categories": null
        }))
        .unwrap();

        let config = body.into_config(&ReceiptLayout::default());
        assert_eq!(config.printers.len(), 1);
        assert_eq!(config.printers[0].display_name, "Cozinha");
        assert_eq!(config.layout.store_name.as_deref(), Some("Bar do Ze"));

        let body: ConfigResponse =
            serde_json::from_value(serde_json::json!({"printers": null})).unwrap();
        assert!(body.into_config(&ReceiptLayout::default()).printers.is_empty());
    }

    #[test]
    fn test_http_store_rejects_bad_url() {
        assert!(matches!(
            HttpJobStore::new("localhost:54321", "key", "r1"),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(HttpJobStore::new("http://localhost:54321/", "key", "r1").is_ok());
    }

    // ------------------------------------------------------------------------
    // Loopback HTTP store
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }

        fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Answers each connection with the next canned (status, body), then closes
    async fn store_server(replies: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = recorded.clone();

        tokio::spawn(async move {
            for (status, reply) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.lines();
                let mut request_line = lines.next().unwrap().split_whitespace();
                let method = request_line.next().unwrap().to_string();
                let path = request_line.next().unwrap().to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                    .collect();
                let length = headers
                    .iter()
                    .find(|(k, _)| k == "content-length")
                    .map(|(_, v)| v.parse::<usize>().unwrap())
                    .unwrap_or(0);
                while buf.len() < header_end + length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[header_end..header_end + length]).to_string();
                log.lock().push(Recorded {
                    method,
                    path,
                    headers,
                    body,
                });

                let response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reply.len(),
                    reply
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (base, recorded)
    }

    #[tokio::test]
    async fn test_http_store_lists_pending_orders() {
        let orders = serde_json::json!({
            "orders": [
                {
                    "id": "o-1",
                    "order_number": 88,
                    "order_type": null,
                    "status": "preparing",
                    "total": null,
                    "created_by_name": "Ana",
                    "order_items": [{"product_name": "Pastel", "quantity": 2, "product_price": 8.0, "product_size": null}]
                },
                {"order_number": 89}
            ]
        });
        let (base, recorded) = store_server(vec![(200, orders.to_string())]).await;
        let store = HttpJobStore::new(&base, "anon-key", "r1").unwrap();

        let jobs = store.list_pending("r1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "o-1");
        assert_eq!(jobs[0].order_status.as_deref(), Some("preparing"));
        assert_eq!(jobs[0].print_status, PrintStatus::Pending);

        let requests = recorded.lock().clone();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(
            requests[0].path,
            "/functions/v1/printer-orders?restaurant_id=r1&action=get"
        );
        assert_eq!(requests[0].header("apikey"), Some("anon-key"));
        assert_eq!(requests[0].header("authorization"), Some("Bearer anon-key"));
    }

    #[tokio::test]
    async fn test_http_store_status_updates() {
        let (base, recorded) = store_server(vec![
            (200, r#"{"success":true,"marked":2}"#.to_string()),
            (200, r#"{"success":true}"#.to_string()),
            (400, r#"{"error":"Invalid action"}"#.to_string()),
        ])
        .await;
        let store = HttpJobStore::new(&base, "anon-key", "r1").unwrap();

        store
            .mark_printed(&["o-1".to_string(), "o-2".to_string()])
            .await
            .unwrap();
        store.mark_failed("o-3", "Cozinha: connection refused").await.unwrap();
        let rejected = store.mark_failed("o-4", "x").await;
        assert!(matches!(rejected, Err(StoreError::Status { status: 400, .. })));

        let requests = recorded.lock().clone();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].path,
            "/functions/v1/printer-orders?restaurant_id=r1&action=mark-printed"
        );
        assert_eq!(requests[0].json(), serde_json::json!({"order_ids": ["o-1", "o-2"]}));

        assert_eq!(
            requests[1].path,
            "/functions/v1/printer-orders?restaurant_id=r1&action=mark-failed"
        );
        assert_eq!(
            requests[1].json(),
            serde_json::json!({"order_id": "o-3", "reason": "Cozinha: connection refused"})
        );
        assert_eq!(requests[1].header("authorization"), Some("Bearer anon-key"));
    }

    #[tokio::test]
    async fn test_http_store_audit_and_heartbeat() {
        let (base, recorded) =
            store_server(vec![(201, String::new()), (200, r#"{"success":true}"#.to_string())])
                .await;
        let store = HttpJobStore::new(&base, "anon-key", "r1").unwrap();

        let entry = PrintLogEntry::auto_print("r1", &job("o-1"), "Cozinha", None);
        store.log_print(&entry).await.unwrap();
        store
            .heartbeat(&Heartbeat {
                restaurant_id: "r1".into(),
                client_id: "agent-1".into(),
                client_name: "print-agent".into(),
                client_version: "0.1.0".into(),
                platform: "linux".into(),
                printers_count: 2,
                is_printing: false,
                pending_orders: 3,
                sent_at: Utc::now(),
            })
            .await
            .unwrap();

        let requests = recorded.lock().clone();
        assert_eq!(requests[0].path, "/rest/v1/print_logs");
        assert_eq!(requests[0].header("prefer"), Some("return=minimal"));
        let row = requests[0].json();
        assert_eq!(row["status"], "success");
        assert_eq!(row["order_id"], "o-1");
        assert!(row.get("error_message").is_none());

        assert_eq!(requests[1].path, "/functions/v1/printer-heartbeat");
        let beat = requests[1].json();
        assert_eq!(beat["client_id"], "agent-1");
        assert_eq!(beat["pending_orders"], 3);
    }
}
