//! # receipt-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command encoding and a fluent builder
//! - Codepage handling and fixed-width text layout
//! - Network printing (TCP port 9100)
//! - USB printing (libusb bulk transfers)
//! - Printer discovery on the LAN and the USB bus
//!
//! Business logic (WHAT to print, and when) lives in `print-agent`.
//!
//! ## Example
//!
//! ```ignore
//! use receipt_printer::{CutMode, EscPosBuilder, NetworkPrinter, Printer};
//!
//! let mut builder = EscPosBuilder::new(48);
//! builder.center().double_size().line("PEDIDO #42");
//! builder.reset_size().sep_double().left();
//! builder.line_lr("(2) X-Burger", "R$ 39,80");
//! builder.feed(4).cut(CutMode::Partial);
//!
//! let printer = NetworkPrinter::new("192.168.1.100", 9100)?;
//! printer.print(&builder.build()).await?;
//! ```

pub mod commands;
pub mod discovery;
mod encoding;
mod error;
mod escpos;
mod layout;
pub mod network;
pub mod usb;

// Re-exports
pub use commands::{
    Align, BarcodeType, CutMode, DrawerPin, Font, HriPosition, QrCorrection, TextSize,
};
pub use discovery::{
    DiscoveredPrinter, NetworkScanner, PrinterVendors, UsbDeviceSummary, UsbPrinterInfo,
};
pub use encoding::{Codepage, gbk_width, sanitize_text};
pub use error::{ErrorKind, PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use layout::TextLayout;
pub use network::{ConnectionProbe, NetworkPrinter, NetworkTimeouts, Printer};
pub use usb::{RusbBackend, UsbBackend, UsbChannel, UsbPrinter};
