//! Print job executor
//!
//! Renders a job for one printer and sends the bytes over its transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use parking_lot::Mutex;
use receipt_printer::{
    NetworkPrinter, NetworkTimeouts, PrintError, Printer, PrinterVendors, UsbBackend, UsbPrinter,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{PrintJob, PrinterConfig, ReceiptLayout, TransportDescriptor};
use crate::renderer::{ReceiptRenderer, RenderError};

#[derive(Debug, Error)]
pub enum PrintExecutorError {
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Transport(#[from] PrintError),

    #[error("USB printing is unavailable on this host")]
    UsbUnavailable,
}

pub type PrintExecutorResult<T> = Result<T, PrintExecutorError>;

/// Open USB printers, one per (vendor, product)
///
/// Each entry carries its own lock, so jobs for the same device queue up
/// while different devices print in parallel.
pub struct UsbRegistry {
    backend: Arc<dyn UsbBackend>,
    vendors: Arc<PrinterVendors>,
    write_timeout: Duration,
    printers: Mutex<HashMap<(u16, u16), Arc<UsbPrinter>>>,
}

impl UsbRegistry {
    pub fn new(
        backend: Arc<dyn UsbBackend>,
        vendors: Arc<PrinterVendors>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            vendors,
            write_timeout,
            printers: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> Arc<dyn UsbBackend> {
        self.backend.clone()
    }

    pub fn vendors(&self) -> &PrinterVendors {
        &self.vendors
    }

    /// Printer handle for a device, created on first use
    pub fn get(&self, vendor_id: u16, product_id: u16) -> Arc<UsbPrinter> {
        self.printers
            .lock()
            .entry((vendor_id, product_id))
            .or_insert_with(|| {
                Arc::new(
                    UsbPrinter::new(self.backend.clone(), self.vendors.clone())
                        .with_write_timeout(self.write_timeout),
                )
            })
            .clone()
    }
}

/// Print job executor
///
/// Sends rendered print data to physical printers.
pub struct PrintExecutor {
    renderer: ReceiptRenderer,
    network_timeouts: NetworkTimeouts,
    usb: Option<UsbRegistry>,
}

impl PrintExecutor {
    pub fn new(timezone: Tz) -> Self {
        Self {
            renderer: ReceiptRenderer::new(timezone),
            network_timeouts: NetworkTimeouts::default(),
            usb: None,
        }
    }

    pub fn with_network_timeouts(mut self, timeouts: NetworkTimeouts) -> Self {
        self.network_timeouts = timeouts;
        self
    }

    pub fn with_usb(mut self, registry: UsbRegistry) -> Self {
        self.usb = Some(registry);
        self
    }

    pub fn usb(&self) -> Option<&UsbRegistry> {
        self.usb.as_ref()
    }

    /// Render `job` for `printer` and send it
    #[instrument(skip_all, fields(job_id = %job.id, printer_id = %printer.id))]
    pub async fn print_job(
        &self,
        job: &PrintJob,
        printer: &PrinterConfig,
        layout: &ReceiptLayout,
    ) -> PrintExecutorResult<usize> {
        let layout = layout.for_printer(printer);
        let data = self.renderer.render(job, &layout)?;

        match self.send(&printer.transport, &data).await {
            Ok(sent) => {
                info!(printer = %printer.display_name, bytes = sent, "Receipt printed");
                Ok(sent)
            }
            Err(e) => {
                warn!(printer = %printer.display_name, transport = %printer.transport, error = %e, "Receipt failed");
                Err(e)
            }
        }
    }

    /// Send raw bytes over a transport
    pub async fn send(
        &self,
        transport: &TransportDescriptor,
        data: &[u8],
    ) -> PrintExecutorResult<usize> {
        match transport {
            TransportDescriptor::Network { ip, port } => {
                let printer = NetworkPrinter::new(ip, *port)?.with_timeouts(self.network_timeouts);
                Ok(printer.print(data).await?)
            }
            TransportDescriptor::Usb {
                vendor_id,
                product_id,
            } => self.send_usb(*vendor_id, *product_id, data).await,
        }
    }

    async fn send_usb(
        &self,
        vendor_id: u16,
        product_id: u16,
        data: &[u8],
    ) -> PrintExecutorResult<usize> {
        let registry = self.usb.as_ref().ok_or(PrintExecutorError::UsbUnavailable)?;
        let printer = registry.get(vendor_id, product_id);

        if printer.target().await.is_none() {
            printer.connect(vendor_id, product_id).await?;
        }

        match printer.print(data).await {
            Ok(sent) => Ok(sent),
            Err(PrintError::NotConnected) => {
                // Reconnects exhausted; the next job starts with a fresh connect
                printer.disconnect().await;
                Err(PrintError::NotConnected.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for PrintExecutor {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;

    fn job() -> PrintJob {
        serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "order_number": 7,
            "order_type": "counter",
            "items": [{"name": "Cafe", "quantity": 1, "unit_price": 4.5}],
            "total": 4.5
        }))
        .unwrap()
    }

    fn usb_printer() -> PrinterConfig {
        PrinterConfig {
            id: "p-usb".into(),
            display_name: "Caixa".into(),
            transport: TransportDescriptor::Usb {
                vendor_id: 0x04B8,
                product_id: 0x0202,
            },
            linked_order_types: vec![OrderType::Counter],
            linked_categories: None,
            is_active: true,
            paper_width: None,
        }
    }

    #[tokio::test]
    async fn test_usb_without_backend() {
        let executor = PrintExecutor::default();
        let err = executor
            .print_job(&job(), &usb_printer(), &ReceiptLayout::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrintExecutorError::UsbUnavailable));
    }

    #[tokio::test]
    async fn test_render_error_before_send() {
        let mut bad = job();
        bad.items.clear();
        let executor = PrintExecutor::default();
        let err = executor
            .print_job(&bad, &usb_printer(), &ReceiptLayout::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrintExecutorError::Render(RenderError::NoItems)));
    }

    #[tokio::test]
    async fn test_invalid_network_address() {
        let executor = PrintExecutor::default();
        let err = executor
            .send(
                &TransportDescriptor::Network {
                    ip: "not-an-ip".into(),
                    port: 9100,
                },
                b"x",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PrintExecutorError::Transport(PrintError::InvalidConfig(_))
        ));
    }
}
