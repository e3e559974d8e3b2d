//! Print job and printer configuration types
//!
//! Shapes follow the job store's JSON. Field aliases accept the store's
//! column names (`order_items`, `product_name`, `product_price`), and
//! nullable columns read `null` as the field's default.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use receipt_printer::{Codepage, CutMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// How the order reached the kitchen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Counter,
    Table,
    Delivery,
    Tab,
    Takeaway,
    /// Types this agent does not know; never routed
    #[serde(other)]
    Other,
}

impl OrderType {
    /// Label printed on the receipt
    pub fn label(self) -> &'static str {
        match self {
            OrderType::Counter => "BALCAO",
            OrderType::Table => "MESA",
            OrderType::Delivery => "ENTREGA",
            OrderType::Tab => "COMANDA",
            OrderType::Takeaway => "RETIRADA",
            OrderType::Other => "N/A",
        }
    }
}

/// Job status as tracked by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintStatus {
    #[default]
    Pending,
    Printed,
    Failed,
    Skipped,
}

impl std::fmt::Display for PrintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrintStatus::Pending => "pending",
            PrintStatus::Printed => "printed",
            PrintStatus::Failed => "failed",
            PrintStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(alias = "product_name", default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default = "one", deserialize_with = "null_one")]
    pub quantity: u32,
    #[serde(alias = "product_price", default, deserialize_with = "null_default")]
    pub unit_price: Decimal,
    /// Size label such as `G`; printed after the name
    #[serde(alias = "product_size", default)]
    pub size: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub category_id: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// One order waiting to be printed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_number: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub order_type: OrderType,
    /// Kitchen workflow status (`preparing`, `delivered`, ...); not a print state
    #[serde(rename = "status", default)]
    pub order_status: Option<String>,

    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub delivery_phone: Option<String>,
    #[serde(default)]
    pub delivery_fee: Option<Decimal>,

    #[serde(alias = "order_items", default, deserialize_with = "null_default")]
    pub items: Vec<OrderItem>,
    #[serde(default, deserialize_with = "null_default")]
    pub total: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub print_status: PrintStatus,
    #[serde(default, deserialize_with = "null_default")]
    pub print_count: u32,
    #[serde(default)]
    pub printed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub table_number: Option<String>,
    #[serde(default)]
    pub waiter_name: Option<String>,
    /// Staff account that entered the order
    #[serde(default)]
    pub created_by_name: Option<String>,
}

impl PrintJob {
    /// `#123`, or the first 8 chars of the id when the order has no number
    pub fn label(&self) -> String {
        match &self.order_number {
            Some(n) if !n.is_empty() => format!("#{}", n),
            _ => format!("#{}", self.id.chars().take(8).collect::<String>().to_uppercase()),
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Delivery fee when one is charged
    pub fn fee(&self) -> Option<Decimal> {
        self.delivery_fee.filter(|fee| *fee > Decimal::ZERO)
    }

    /// Store total, falling back to subtotal + fee when the store sent none
    pub fn grand_total(&self) -> Decimal {
        if self.total.is_zero() {
            self.subtotal() + self.fee().unwrap_or_default()
        } else {
            self.total
        }
    }
}

/// How a printer is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportDescriptor {
    Network {
        ip: String,
        #[serde(default = "default_port")]
        port: u16,
    },
    Usb {
        vendor_id: u16,
        product_id: u16,
    },
}

impl std::fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportDescriptor::Network { ip, port } => write!(f, "tcp://{}:{}", ip, port),
            TransportDescriptor::Usb {
                vendor_id,
                product_id,
            } => write!(f, "usb://{:04x}:{:04x}", vendor_id, product_id),
        }
    }
}

/// Parses `usb://04b8:0202`, `tcp://10.0.0.5:9100`, `10.0.0.5:9100` or a bare IP
impl FromStr for TransportDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(ids) = s.strip_prefix("usb://") {
            let parse_id = |id: &str| {
                u16::from_str_radix(id, 16).map_err(|_| format!("Invalid USB address: {}", s))
            };
            let (vendor, product) = ids
                .split_once(':')
                .ok_or_else(|| format!("Invalid USB address: {}", s))?;
            return Ok(TransportDescriptor::Usb {
                vendor_id: parse_id(vendor)?,
                product_id: parse_id(product)?,
            });
        }

        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        if let Ok(socket) = addr.parse::<SocketAddr>() {
            return Ok(TransportDescriptor::Network {
                ip: socket.ip().to_string(),
                port: socket.port(),
            });
        }
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return Ok(TransportDescriptor::Network {
                ip: ip.to_string(),
                port: default_port(),
            });
        }
        Err(format!("Not a network or USB printer address: {}", s))
    }
}

fn default_port() -> u16 {
    receipt_printer::network::DEFAULT_PORT
}

fn default_order_types() -> Vec<OrderType> {
    vec![OrderType::Counter, OrderType::Table, OrderType::Delivery]
}

fn default_true() -> bool {
    true
}

fn one() -> u32 {
    1
}

/// A printer row as stored
///
/// `transport` is explicit in configs written by this agent; rows from the
/// printers table carry the address in `printer_name` instead.
#[derive(Deserialize)]
struct PrinterRow {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    printer_name: Option<String>,
    #[serde(default)]
    transport: Option<TransportDescriptor>,
    #[serde(default = "default_order_types", deserialize_with = "null_order_types")]
    linked_order_types: Vec<OrderType>,
    #[serde(default)]
    linked_categories: Option<Vec<String>>,
    #[serde(default = "default_true", deserialize_with = "null_true")]
    is_active: bool,
    #[serde(default)]
    paper_width: Option<usize>,
}

impl TryFrom<PrinterRow> for PrinterConfig {
    type Error = String;

    fn try_from(row: PrinterRow) -> Result<Self, Self::Error> {
        let transport = match (row.transport, row.printer_name.as_deref()) {
            (Some(transport), _) => transport,
            (None, Some(address)) => address
                .parse()
                .map_err(|e| format!("Printer {}: {}", row.id, e))?,
            (None, None) => return Err(format!("Printer {} has no address", row.id)),
        };

        let display_name = row
            .display_name
            .or(row.name)
            .or(row.printer_name)
            .unwrap_or_else(|| row.id.clone());

        Ok(PrinterConfig {
            id: row.id,
            display_name,
            transport,
            linked_order_types: row.linked_order_types,
            linked_categories: row.linked_categories,
            is_active: row.is_active,
            paper_width: row.paper_width,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PrinterRow")]
pub struct PrinterConfig {
    pub id: String,
    pub display_name: String,
    pub transport: TransportDescriptor,
    pub linked_order_types: Vec<OrderType>,
    pub linked_categories: Option<Vec<String>>,
    pub is_active: bool,
    pub paper_width: Option<usize>,
}

impl PrinterConfig {
    /// Whether `job` routes to this printer
    ///
    /// Active, order type linked, and when categories are linked at least
    /// one item in a linked category.
    pub fn accepts(&self, job: &PrintJob) -> bool {
        if !self.is_active || !self.linked_order_types.contains(&job.order_type) {
            return false;
        }
        match &self.linked_categories {
            Some(categories) if !categories.is_empty() => job.items.iter().any(|item| {
                item.category_id
                    .as_ref()
                    .is_some_and(|id| categories.contains(id))
            }),
            _ => true,
        }
    }
}

/// Receipt appearance, shared by every printer of a restaurant
///
/// The `show_*` switches drop a line or block from the receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptLayout {
    #[serde(alias = "paperWidth")]
    pub paper_width: usize,
    pub store_name: Option<String>,
    pub store_address: Option<String>,
    pub store_phone: Option<String>,
    pub store_cnpj: Option<String>,
    #[serde(alias = "receiptTitle")]
    pub title: Option<String>,
    pub footer_lines: Vec<String>,
    pub currency_symbol: String,
    pub decimal_separator: char,
    pub cut: CutMode,
    pub feed_lines: u8,
    pub codepage: Codepage,
    /// IANA zone name; the agent's default zone when unset or unknown
    pub timezone: Option<String>,
    pub open_drawer: bool,

    #[serde(alias = "showRestaurantName")]
    pub show_restaurant_name: bool,
    #[serde(alias = "showAddress")]
    pub show_address: bool,
    #[serde(alias = "showPhone")]
    pub show_phone: bool,
    #[serde(alias = "showCnpj")]
    pub show_cnpj: bool,
    #[serde(alias = "showDateTime")]
    pub show_date_time: bool,
    #[serde(alias = "showOrderNumber")]
    pub show_order_number: bool,
    #[serde(alias = "showOrderType")]
    pub show_order_type: bool,
    #[serde(alias = "showTable")]
    pub show_table: bool,
    #[serde(alias = "showWaiter")]
    pub show_waiter: bool,
    #[serde(alias = "showItemPrices")]
    pub show_item_prices: bool,
    #[serde(alias = "showItemNotes")]
    pub show_item_notes: bool,
    #[serde(alias = "showItemSize")]
    pub show_item_size: bool,
    #[serde(alias = "showCustomerName")]
    pub show_customer_name: bool,
    #[serde(alias = "showCustomerPhone")]
    pub show_customer_phone: bool,
    #[serde(alias = "showDeliveryAddress")]
    pub show_delivery_address: bool,
    #[serde(alias = "showTotals")]
    pub show_totals: bool,
    #[serde(alias = "showDeliveryFee")]
    pub show_delivery_fee: bool,
    #[serde(alias = "showPaymentMethod")]
    pub show_payment_method: bool,
}

impl Default for ReceiptLayout {
    fn default() -> Self {
        Self {
            paper_width: 48,
            store_name: None,
            store_address: None,
            store_phone: None,
            store_cnpj: None,
            title: None,
            footer_lines: Vec::new(),
            currency_symbol: "R$".to_string(),
            decimal_separator: ',',
            cut: CutMode::Partial,
            feed_lines: 4,
            codepage: Codepage::Ascii,
            timezone: None,
            open_drawer: false,
            show_restaurant_name: true,
            show_address: true,
            show_phone: true,
            show_cnpj: false,
            show_date_time: true,
            show_order_number: true,
            show_order_type: true,
            show_table: true,
            show_waiter: true,
            show_item_prices: true,
            show_item_notes: true,
            show_item_size: true,
            show_customer_name: true,
            show_customer_phone: true,
            show_delivery_address: true,
            show_totals: true,
            show_delivery_fee: true,
            show_payment_method: true,
        }
    }
}

impl ReceiptLayout {
    /// Copy of this layout sized for `printer`
    pub fn for_printer(&self, printer: &PrinterConfig) -> ReceiptLayout {
        let mut layout = self.clone();
        if let Some(width) = printer.paper_width
            && width > 0
        {
            layout.paper_width = width;
        }
        layout
    }
}

/// Printers and layout for one restaurant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
    #[serde(default)]
    pub layout: ReceiptLayout,
}

/// `null` reads as `T::default()`
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_one<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(1))
}

fn null_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

fn null_order_types<'de, D>(deserializer: D) -> Result<Vec<OrderType>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<OrderType>>::deserialize(deserializer)?.unwrap_or_else(default_order_types))
}

/// Accept `"12"`, `12` or `null`
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    }))
}
