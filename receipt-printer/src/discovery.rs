//! Printer discovery
//!
//! - LAN: probe port 9100 across a /24 or a list of factory-default IPs
//! - USB: decide which bus devices look like receipt printers

use crate::network::{ConnectionProbe, DEFAULT_PORT, NetworkPrinter, NetworkTimeouts};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// USB interface class for printers
pub const PRINTER_CLASS: u8 = 0x07;

/// Factory-default addresses of common thermal printer brands
pub const COMMON_PRINTER_IPS: &[&str] = &[
    "192.168.1.100",
    "192.168.1.200",
    "192.168.1.250",
    "192.168.0.100",
    "192.168.0.200",
    "192.168.0.250",
    "10.0.0.100",
    "10.0.0.200",
    "192.168.1.50",
    "192.168.1.51",
    "192.168.1.52",
    "192.168.0.50",
    "192.168.0.51",
    "192.168.0.52",
];

/// A host that accepted a connection on the printer port
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPrinter {
    pub ip: String,
    pub port: u16,
    pub latency_ms: u64,
}

/// Concurrent TCP sweep for raw-printing ports
#[derive(Debug, Clone)]
pub struct NetworkScanner {
    port: u16,
    connect_timeout: Duration,
}

impl Default for NetworkScanner {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: NetworkTimeouts::default().connect,
        }
    }
}

impl NetworkScanner {
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }

    /// Probe `{prefix}.{start..=end}` concurrently
    ///
    /// All probes are in flight at once; the call returns when every probe
    /// has finished. Only hosts that answered are returned, in address order.
    pub async fn scan_subnet(&self, prefix: &str, start: u8, end: u8) -> Vec<DiscoveredPrinter> {
        let prefix = prefix.trim_end_matches('.');
        let hosts: Vec<String> = (start..=end).map(|i| format!("{}.{}", prefix, i)).collect();
        info!(prefix, start, end, port = self.port, "Scanning subnet");

        let found = self.probe_all(&hosts).await;
        info!(count = found.len(), "Subnet scan finished");
        found
    }

    /// Probe the factory-default addresses in [`COMMON_PRINTER_IPS`]
    pub async fn quick_scan(&self) -> Vec<DiscoveredPrinter> {
        let hosts: Vec<String> = COMMON_PRINTER_IPS.iter().map(|s| s.to_string()).collect();
        let found = self.probe_all(&hosts).await;
        info!(count = found.len(), "Quick scan finished");
        found
    }

    async fn probe_all(&self, hosts: &[String]) -> Vec<DiscoveredPrinter> {
        let timeouts = NetworkTimeouts {
            connect: self.connect_timeout,
            ..NetworkTimeouts::default()
        };

        let probes = hosts.iter().map(|host| async move {
            match NetworkPrinter::new(host, self.port) {
                Ok(printer) => printer.with_timeouts(timeouts).test_connection().await,
                Err(e) => ConnectionProbe {
                    ip: host.clone(),
                    port: self.port,
                    success: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            }
        });

        futures::future::join_all(probes)
            .await
            .into_iter()
            .filter_map(|probe| {
                if !probe.success {
                    return None;
                }
                debug!(ip = %probe.ip, latency_ms = ?probe.latency_ms, "Printer port open");
                Some(DiscoveredPrinter {
                    ip: probe.ip,
                    port: probe.port,
                    latency_ms: probe.latency_ms.unwrap_or(0),
                })
            })
            .collect()
    }
}

/// Known receipt-printer USB vendors (vendor id -> display name)
#[derive(Debug, Clone)]
pub struct PrinterVendors {
    names: HashMap<u16, String>,
}

impl PrinterVendors {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    /// An empty table; only class-0x07 devices will be candidates
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    pub fn name(&self, vendor_id: u16) -> Option<&str> {
        self.names.get(&vendor_id).map(String::as_str)
    }

    pub fn contains(&self, vendor_id: u16) -> bool {
        self.names.contains_key(&vendor_id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for PrinterVendors {
    fn default() -> Self {
        Self::new([
            (0x04B8, "Epson"),
            (0x0519, "Star Micronics"),
            (0x0DD4, "Custom"),
            (0x0FE6, "Bematech"),
            (0x0483, "Elgin"),
            (0x1504, "Citizen"),
            (0x1FC9, "HOIN"),
            (0x6868, "Generic POS"),
            (0x0416, "Winbond (Generic)"),
            (0x0493, "SNBC"),
            (0x20D1, "Daruma"),
            (0x0B00, "Sweda"),
            (0x0525, "Generic Thermal"),
            (0x1A86, "QinHeng (CH340)"),
            (0x067B, "Prolific (USB-Serial)"),
        ])
    }
}

/// What enumeration learned about one USB device
///
/// String descriptors are `None` when the device could not be opened or
/// did not answer.
#[derive(Debug, Clone, Default)]
pub struct UsbDeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_classes: Vec<u8>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A USB device classified as a receipt printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbPrinterInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub product: String,
    pub name: String,
    pub known_vendor: bool,
}

/// Known vendor, or any interface of the printer class
pub fn is_printer_candidate(device: &UsbDeviceSummary, vendors: &PrinterVendors) -> bool {
    vendors.contains(device.vendor_id) || device.interface_classes.contains(&PRINTER_CLASS)
}

/// Classify a device, filling unreadable descriptors with defaults
pub fn classify(device: &UsbDeviceSummary, vendors: &PrinterVendors) -> Option<UsbPrinterInfo> {
    if !is_printer_candidate(device, vendors) {
        return None;
    }

    let vendor_name = vendors.name(device.vendor_id);
    let manufacturer = device
        .manufacturer
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| vendor_name.map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string());
    let product = device
        .product
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "USB Device".to_string());

    Some(UsbPrinterInfo {
        vendor_id: device.vendor_id,
        product_id: device.product_id,
        name: format!("{} - {}", manufacturer, product),
        manufacturer,
        product,
        known_vendor: vendor_name.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_scan_finds_single_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let scanner = NetworkScanner::new(port, Duration::from_millis(300));
        let found = scanner.scan_subnet("127.0.0", 1, 1).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ip, "127.0.0.1");
        assert_eq!(found[0].port, port);
    }

    #[tokio::test]
    async fn test_scan_filters_closed_hosts() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let scanner = NetworkScanner::new(port, Duration::from_millis(300));
        assert!(scanner.scan_subnet("127.0.0.", 1, 1).await.is_empty());
    }

    #[test]
    fn test_default_vendor_table() {
        let vendors = PrinterVendors::default();
        assert_eq!(vendors.len(), 15);
        assert_eq!(vendors.name(0x04B8), Some("Epson"));
        assert_eq!(vendors.name(0x0FE6), Some("Bematech"));
        assert!(!vendors.contains(0x046D));
    }

    #[test]
    fn test_classification() {
        let vendors = PrinterVendors::default();

        let epson = UsbDeviceSummary {
            vendor_id: 0x04B8,
            product_id: 0x0202,
            interface_classes: vec![0xFF],
            manufacturer: None,
            product: None,
        };
        let generic = UsbDeviceSummary {
            vendor_id: 0x28E9,
            product_id: 0x0289,
            interface_classes: vec![PRINTER_CLASS],
            manufacturer: Some("GD".into()),
            product: Some("POS-80".into()),
        };
        let mouse = UsbDeviceSummary {
            vendor_id: 0x046D,
            product_id: 0xC077,
            interface_classes: vec![0x03],
            manufacturer: Some("Logitech".into()),
            product: Some("Mouse".into()),
        };

        let info = classify(&epson, &vendors).unwrap();
        assert_eq!(info.manufacturer, "Epson");
        assert_eq!(info.product, "USB Device");
        assert_eq!(info.name, "Epson - USB Device");
        assert!(info.known_vendor);

        let info = classify(&generic, &vendors).unwrap();
        assert_eq!(info.name, "GD - POS-80");
        assert!(!info.known_vendor);

        assert!(classify(&mouse, &vendors).is_none());
    }

    #[test]
    fn test_unknown_vendor_without_strings() {
        let device = UsbDeviceSummary {
            vendor_id: 0x1234,
            product_id: 0x0001,
            interface_classes: vec![PRINTER_CLASS],
            ..Default::default()
        };
        let info = classify(&device, &PrinterVendors::empty()).unwrap();
        assert_eq!(info.name, "Unknown - USB Device");
    }
}
