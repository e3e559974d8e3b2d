//! USB printer transport
//!
//! The bus sits behind [`UsbBackend`] so tests can swap in a fake; the
//! production backend is libusb via `rusb`. All libusb calls block, so
//! [`UsbPrinter`] runs them on the blocking pool.

use crate::discovery::{PrinterVendors, UsbDeviceSummary, UsbPrinterInfo, classify};
use crate::error::{PrintError, PrintResult};
use crate::network::Printer;
use rusb::{Direction, TransferType, UsbContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Consecutive reconnects tried by `write` after a failed transfer
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

const PRINTER_INTERFACE: u8 = 0;

/// Access to the USB bus
pub trait UsbBackend: Send + Sync {
    /// List every device on the bus with whatever descriptors could be read
    fn enumerate(&self) -> PrintResult<Vec<UsbDeviceSummary>>;

    /// Open, claim interface 0 and locate the bulk OUT endpoint
    fn open(&self, vendor_id: u16, product_id: u16) -> PrintResult<Box<dyn UsbChannel>>;
}

/// An open, claimed printer interface
pub trait UsbChannel: Send {
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> PrintResult<usize>;

    /// Release the interface and close the handle
    fn close(self: Box<Self>) -> PrintResult<()>;
}

/// libusb backend
pub struct RusbBackend {
    context: rusb::Context,
}

impl RusbBackend {
    pub fn new() -> PrintResult<Self> {
        Ok(Self {
            context: rusb::Context::new()?,
        })
    }
}

impl UsbBackend for RusbBackend {
    fn enumerate(&self) -> PrintResult<Vec<UsbDeviceSummary>> {
        let devices = self.context.devices()?;
        let mut summaries = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    debug!(
                        bus = device.bus_number(),
                        address = device.address(),
                        error = %e,
                        "Could not read device descriptor"
                    );
                    None
                }
            };

            let mut summary = UsbDeviceSummary {
                vendor_id: descriptor.as_ref().map_or(0, |d| d.vendor_id()),
                product_id: descriptor.as_ref().map_or(0, |d| d.product_id()),
                ..Default::default()
            };

            if let Ok(config) = device.config_descriptor(0) {
                summary.interface_classes = config
                    .interfaces()
                    .flat_map(|interface| {
                        interface
                            .descriptors()
                            .map(|d| d.class_code())
                            .collect::<Vec<_>>()
                    })
                    .collect();
            }

            // Listed with fallback names when the descriptor is unreadable
            let Some(descriptor) = descriptor else {
                summaries.push(summary);
                continue;
            };

            // Opened only for the string descriptors; dropped right after
            match device.open() {
                Ok(handle) => {
                    summary.manufacturer = handle.read_manufacturer_string_ascii(&descriptor).ok();
                    summary.product = handle.read_product_string_ascii(&descriptor).ok();
                }
                Err(e) => debug!(
                    vendor_id = summary.vendor_id,
                    product_id = summary.product_id,
                    error = %e,
                    "Could not open device for descriptors"
                ),
            }

            summaries.push(summary);
        }

        Ok(summaries)
    }

    fn open(&self, vendor_id: u16, product_id: u16) -> PrintResult<Box<dyn UsbChannel>> {
        let handle = self
            .context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(PrintError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        match handle.kernel_driver_active(PRINTER_INTERFACE) {
            Ok(true) => handle.detach_kernel_driver(PRINTER_INTERFACE)?,
            Ok(false) | Err(rusb::Error::NotSupported) => {}
            Err(e) => return Err(e.into()),
        }

        handle.claim_interface(PRINTER_INTERFACE)?;

        let endpoint = match find_bulk_out(&handle.device()) {
            Some(endpoint) => endpoint,
            None => {
                let _ = handle.release_interface(PRINTER_INTERFACE);
                return Err(PrintError::NoOutEndpoint);
            }
        };

        debug!(vendor_id, product_id, endpoint, "USB interface claimed");
        Ok(Box::new(RusbChannel { handle, endpoint }))
    }
}

fn find_bulk_out<T: UsbContext>(device: &rusb::Device<T>) -> Option<u8> {
    let config = device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0))
        .ok()?;

    config
        .interfaces()
        .filter(|interface| interface.number() == PRINTER_INTERFACE)
        .flat_map(|interface| interface.descriptors().collect::<Vec<_>>())
        .flat_map(|descriptor| {
            descriptor
                .endpoint_descriptors()
                .filter(|ep| {
                    ep.direction() == Direction::Out && ep.transfer_type() == TransferType::Bulk
                })
                .map(|ep| ep.address())
                .collect::<Vec<_>>()
        })
        .next()
}

struct RusbChannel {
    handle: rusb::DeviceHandle<rusb::Context>,
    endpoint: u8,
}

impl UsbChannel for RusbChannel {
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> PrintResult<usize> {
        let written = self.handle.write_bulk(self.endpoint, data, timeout)?;
        if written != data.len() {
            return Err(PrintError::IncompleteWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(written)
    }

    fn close(self: Box<Self>) -> PrintResult<()> {
        // Handle is closed on drop whether or not release succeeds
        self.handle.release_interface(PRINTER_INTERFACE)?;
        Ok(())
    }
}

#[derive(Default)]
struct UsbState {
    channel: Option<Box<dyn UsbChannel>>,
    target: Option<(u16, u16)>,
    reconnect_attempts: u32,
}

/// One physical USB printer
///
/// The inner lock serialises every operation on the device, so concurrent
/// jobs aimed at the same printer queue up instead of interleaving.
pub struct UsbPrinter {
    backend: Arc<dyn UsbBackend>,
    vendors: Arc<PrinterVendors>,
    state: Mutex<UsbState>,
    write_timeout: Duration,
}

impl UsbPrinter {
    pub fn new(backend: Arc<dyn UsbBackend>, vendors: Arc<PrinterVendors>) -> Self {
        Self {
            backend,
            vendors,
            state: Mutex::new(UsbState::default()),
            write_timeout: Duration::from_millis(10000),
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// List bus devices that look like receipt printers
    pub async fn list_printers(&self) -> PrintResult<Vec<UsbPrinterInfo>> {
        list_printers(self.backend.clone(), &self.vendors).await
    }

    /// Open a device and keep it for subsequent writes
    #[instrument(skip(self))]
    pub async fn connect(&self, vendor_id: u16, product_id: u16) -> PrintResult<()> {
        let mut state = self.state.lock().await;
        if let Some(old) = state.channel.take() {
            close_channel(old).await;
        }

        let channel = self.open(vendor_id, product_id).await?;
        state.channel = Some(channel);
        state.target = Some((vendor_id, product_id));
        state.reconnect_attempts = 0;
        info!("USB printer connected");
        Ok(())
    }

    /// Connect to the first known-vendor printer, else the first candidate
    pub async fn auto_connect(&self) -> PrintResult<UsbPrinterInfo> {
        let printers = self.list_printers().await?;
        let chosen = printers
            .iter()
            .find(|p| p.known_vendor)
            .or_else(|| printers.first())
            .cloned()
            .ok_or(PrintError::NoPrinters)?;

        info!(name = %chosen.name, "Auto-selected USB printer");
        self.connect(chosen.vendor_id, chosen.product_id).await?;
        Ok(chosen)
    }

    /// Send the whole buffer in one bulk transfer
    ///
    /// A failed transfer drops the handle; the next call reopens the last
    /// device, giving up after [`MAX_RECONNECT_ATTEMPTS`] consecutive tries.
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub async fn write(&self, data: &[u8]) -> PrintResult<usize> {
        let mut state = self.state.lock().await;

        let mut channel = match state.channel.take() {
            Some(channel) => channel,
            None => {
                let (vendor_id, product_id) = state.target.ok_or(PrintError::NotConnected)?;
                if state.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                    warn!(vendor_id, product_id, "Reconnect attempts exhausted");
                    return Err(PrintError::NotConnected);
                }
                state.reconnect_attempts += 1;
                info!(
                    vendor_id,
                    product_id,
                    attempt = state.reconnect_attempts,
                    "Reconnecting USB printer"
                );
                self.open(vendor_id, product_id).await?
            }
        };

        let payload = data.to_vec();
        let timeout = self.write_timeout;
        let (channel, result) = tokio::task::spawn_blocking(move || {
            let result = channel.write_bulk(&payload, timeout);
            (channel, result)
        })
        .await
        .map_err(|e| PrintError::Task(e.to_string()))?;

        match result {
            Ok(written) => {
                state.channel = Some(channel);
                state.reconnect_attempts = 0;
                info!(bytes = written, "USB print job sent");
                Ok(written)
            }
            Err(e) => {
                warn!(error = %e, "USB write failed, dropping handle");
                close_channel(channel).await;
                Err(e)
            }
        }
    }

    /// Release and forget the device; state is cleared even if release fails
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(channel) = state.channel.take() {
            close_channel(channel).await;
        }
        state.target = None;
        state.reconnect_attempts = 0;
        info!("USB printer disconnected");
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.channel.is_some()
    }

    /// Ids of the device this printer was last connected to
    pub async fn target(&self) -> Option<(u16, u16)> {
        self.state.lock().await.target
    }

    async fn open(&self, vendor_id: u16, product_id: u16) -> PrintResult<Box<dyn UsbChannel>> {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || backend.open(vendor_id, product_id))
            .await
            .map_err(|e| PrintError::Task(e.to_string()))?
    }
}

impl Printer for UsbPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<usize> {
        self.write(data).await
    }

    async fn is_online(&self) -> bool {
        self.is_connected().await
    }
}

/// Enumerate the bus and keep printer candidates
pub async fn list_printers(
    backend: Arc<dyn UsbBackend>,
    vendors: &PrinterVendors,
) -> PrintResult<Vec<UsbPrinterInfo>> {
    let devices = tokio::task::spawn_blocking(move || backend.enumerate())
        .await
        .map_err(|e| PrintError::Task(e.to_string()))??;

    let printers: Vec<UsbPrinterInfo> = devices
        .iter()
        .filter_map(|device| classify(device, vendors))
        .collect();
    debug!(
        devices = devices.len(),
        printers = printers.len(),
        "USB enumeration finished"
    );
    Ok(printers)
}

async fn close_channel(channel: Box<dyn UsbChannel>) {
    match tokio::task::spawn_blocking(move || channel.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "USB release failed"),
        Err(e) => warn!(error = %e, "USB release task failed"),
    }
}
