//! Customer receipt renderer
//!
//! Renders a PrintJob into ESC/POS bytes for thermal printers.

use chrono::Utc;
use chrono_tz::Tz;
use receipt_printer::{DrawerPin, EscPosBuilder, TextLayout};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{PrintJob, ReceiptLayout};

const DEFAULT_FOOTER: &str = "Obrigado pela preferencia!";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Order has no items")]
    NoItems,

    #[error("Item {index} has an empty name")]
    EmptyItemName { index: usize },

    #[error("Item '{name}' has zero quantity")]
    ZeroQuantity { name: String },

    #[error("Paper width must be positive")]
    ZeroWidth,
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Receipt renderer
///
/// One complete receipt per call: header, items, notes, customer block,
/// payment, totals, footer, then feed and cut.
#[derive(Debug, Clone)]
pub struct ReceiptRenderer {
    timezone: Tz,
}

impl ReceiptRenderer {
    /// `timezone` is used when the layout does not name one
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Render a job to ESC/POS bytes
    pub fn render(&self, job: &PrintJob, layout: &ReceiptLayout) -> RenderResult<Vec<u8>> {
        validate(job)?;
        if layout.paper_width == 0 {
            return Err(RenderError::ZeroWidth);
        }

        let text_layout = TextLayout::new(layout.paper_width, layout.codepage);
        let mut b = EscPosBuilder::with_layout(text_layout);

        self.render_header(&mut b, job, layout);
        b.sep_double();

        self.render_items(&mut b, job, layout);
        b.sep_single();

        self.render_notes(&mut b, job);
        self.render_customer(&mut b, job, layout);

        if layout.show_payment_method
            && let Some(method) = non_empty(&job.payment_method)
        {
            b.line(&format!("Pagamento: {}", payment_label(method)));
        }

        if layout.show_totals {
            self.render_totals(&mut b, job, layout);
        }
        self.render_footer(&mut b, layout);

        b.feed(layout.feed_lines);
        b.cut(layout.cut);
        if layout.open_drawer {
            b.open_drawer(DrawerPin::Pin2);
        }

        Ok(b.build())
    }

    fn render_header(&self, b: &mut EscPosBuilder, job: &PrintJob, layout: &ReceiptLayout) {
        let width = layout.paper_width;

        if layout.show_restaurant_name
            && let Some(name) = non_empty(&layout.store_name)
        {
            b.bold();
            b.line_center(&name.to_uppercase());
            b.bold_off();
        }
        if layout.show_address
            && let Some(address) = non_empty(&layout.store_address)
        {
            for line in b.layout().wrap(address, width) {
                b.line_center(&line);
            }
        }
        if layout.show_phone
            && let Some(phone) = non_empty(&layout.store_phone)
        {
            b.line_center(&format!("Tel: {}", phone));
        }
        if layout.show_cnpj
            && let Some(cnpj) = non_empty(&layout.store_cnpj)
        {
            b.line_center(&format!("CNPJ: {}", cnpj));
        }

        if layout.show_date_time {
            b.line_center(&self.format_date(job, layout));
        }
        b.sep_double();

        if let Some(title) = non_empty(&layout.title) {
            b.line_center(title);
        }

        if layout.show_order_number {
            b.bold();
            b.line_center(&format!("Pedido {}", job.label()));
            b.bold_off();
        }
        if layout.show_order_type {
            b.line(&format!("Tipo: {}", job.order_type.label()));
        }

        if layout.show_table
            && let Some(table) = non_empty(&job.table_number)
        {
            // Some stores already send "Mesa 5"
            if table.to_lowercase().contains("mesa") {
                b.line(table);
            } else {
                b.line(&format!("Mesa {}", table));
            }
        }
        if layout.show_waiter {
            if let Some(waiter) = non_empty(&job.waiter_name) {
                b.line(&format!("Garcom: {}", waiter));
            } else if let Some(staff) = non_empty(&job.created_by_name) {
                b.line(&format!("Atendente: {}", staff));
            }
        }
    }

    fn render_items(&self, b: &mut EscPosBuilder, job: &PrintJob, layout: &ReceiptLayout) {
        for item in &job.items {
            let mut name = item.name.trim().to_string();
            if layout.show_item_size
                && let Some(size) = non_empty(&item.size)
            {
                // Names like "Salada (G)" already carry the size
                let tag = format!("({})", size);
                if !name.to_lowercase().contains(&tag.to_lowercase()) {
                    name = format!("{} {}", name, tag);
                }
            }

            let text = format!("({}) {}", item.quantity, name);
            if layout.show_item_prices {
                b.line_lr(&text, &format_money(item.line_total(), layout));
            } else {
                b.line(&text);
            }

            if layout.show_item_notes
                && let Some(notes) = non_empty(&item.notes)
            {
                b.line(&format!("  OBS: {}", notes));
            }
        }
    }

    fn render_notes(&self, b: &mut EscPosBuilder, job: &PrintJob) {
        let Some(notes) = non_empty(&job.notes) else {
            return;
        };
        let width = b.width();
        let wrapped = b.layout().wrap(&format!("OBS: {}", notes), width);
        for line in wrapped {
            b.line(&line);
        }
        b.sep_single();
    }

    fn render_customer(&self, b: &mut EscPosBuilder, job: &PrintJob, layout: &ReceiptLayout) {
        let name = non_empty(&job.customer_name).filter(|_| layout.show_customer_name);
        let phone = non_empty(&job.delivery_phone).filter(|_| layout.show_customer_phone);
        let address = non_empty(&job.delivery_address).filter(|_| layout.show_delivery_address);
        if name.is_none() && phone.is_none() && address.is_none() {
            return;
        }

        if let Some(name) = name {
            b.line(&format!("Cliente: {}", name));
        }
        if let Some(phone) = phone {
            b.line(&format!("Tel: {}", phone));
        }
        if let Some(address) = address {
            let width = b.width().saturating_sub(5).max(1);
            let wrapped = b.layout().wrap(address, width);
            for (i, line) in wrapped.iter().enumerate() {
                let prefix = if i == 0 { "End: " } else { "     " };
                b.line(&format!("{}{}", prefix, line));
            }
        }
        b.sep_single();
    }

    fn render_totals(&self, b: &mut EscPosBuilder, job: &PrintJob, layout: &ReceiptLayout) {
        b.line_lr("Subtotal:", &format_money(job.subtotal(), layout));
        if layout.show_delivery_fee
            && let Some(fee) = job.fee()
        {
            b.line_lr("Taxa entrega:", &format_money(fee, layout));
        }
        b.bold();
        b.line_lr("TOTAL:", &format_money(job.grand_total(), layout));
        b.bold_off();
    }

    fn render_footer(&self, b: &mut EscPosBuilder, layout: &ReceiptLayout) {
        b.sep_double();
        let custom: Vec<&String> = layout
            .footer_lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .collect();

        if custom.is_empty() {
            b.line_center(DEFAULT_FOOTER);
        } else {
            for line in custom {
                b.line_center(line);
            }
        }
    }

    fn format_date(&self, job: &PrintJob, layout: &ReceiptLayout) -> String {
        let tz = layout
            .timezone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(self.timezone);
        let at = job.created_at.unwrap_or_else(Utc::now);
        at.with_timezone(&tz).format("%d/%m/%Y %H:%M").to_string()
    }
}

impl Default for ReceiptRenderer {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

fn validate(job: &PrintJob) -> RenderResult<()> {
    if job.items.is_empty() {
        return Err(RenderError::NoItems);
    }
    for (index, item) in job.items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(RenderError::EmptyItemName { index });
        }
        if item.quantity == 0 {
            return Err(RenderError::ZeroQuantity {
                name: item.name.clone(),
            });
        }
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `R$ 12,50`
pub fn format_money(amount: Decimal, layout: &ReceiptLayout) -> String {
    let fixed = format!("{:.2}", amount.round_dp(2));
    let fixed = if layout.decimal_separator == '.' {
        fixed
    } else {
        fixed.replace('.', &layout.decimal_separator.to_string())
    };
    if layout.currency_symbol.is_empty() {
        fixed
    } else {
        format!("{} {}", layout.currency_symbol, fixed)
    }
}

fn payment_label(method: &str) -> &str {
    match method {
        "cash" => "Dinheiro",
        "credit" => "Cartao Credito",
        "debit" => "Cartao Debito",
        "pix" => "PIX",
        "voucher" => "Voucher",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, OrderType, PrintStatus};
    use receipt_printer::Codepage;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(name: &str, quantity: u32, price: &str) -> OrderItem {
        OrderItem {
            name: name.to_string(),
            quantity,
            unit_price: dec(price),
            size: None,
            notes: None,
            category_id: None,
        }
    }

    fn table_job() -> PrintJob {
        PrintJob {
            id: "job-1".to_string(),
            order_number: Some("1024".to_string()),
            order_type: OrderType::Table,
            order_status: Some("preparing".to_string()),
            customer_name: None,
            delivery_address: None,
            delivery_phone: None,
            delivery_fee: None,
            items: vec![item("X-Burger", 2, "19.90"), item("Suco de Laranja", 1, "8.00")],
            total: dec("47.80"),
            notes: None,
            payment_method: None,
            print_status: PrintStatus::Pending,
            print_count: 0,
            printed_at: None,
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 9, 18, 5, 0).unwrap()),
            table_number: Some("5".to_string()),
            waiter_name: None,
            created_by_name: None,
        }
    }

    // Printable ASCII and line feeds; command bytes mostly drop out
    fn render_text(job: &PrintJob, layout: &ReceiptLayout) -> String {
        let data = ReceiptRenderer::default().render(job, layout).unwrap();
        data.iter()
            .filter(|&&b| b == b'\n' || (0x20..0x7F).contains(&b))
            .map(|&b| b as char)
            .collect()
    }

    fn lr(left: &str, right: &str, width: usize) -> String {
        format!("{}{}{}", left, " ".repeat(width - left.len() - right.len()), right)
    }

    #[test]
    fn test_table_order_receipt() {
        let layout = ReceiptLayout::default();
        let text = render_text(&table_job(), &layout);

        assert!(text.contains("Pedido #1024"));
        assert!(text.contains("Mesa 5\n"));
        assert!(text.contains("09/03/2024 18:05"));
        assert!(text.contains(&lr("(2) X-Burger", "R$ 39,80", 48)));
        assert!(text.contains(&lr("(1) Suco de Laranja", "R$ 8,00", 48)));
        assert!(text.contains(&lr("Subtotal:", "R$ 47,80", 48)));
        assert!(text.contains(&lr("TOTAL:", "R$ 47,80", 48)));
        assert!(!text.contains("Taxa entrega"));
        assert!(!text.contains("Cliente:"));
        assert!(!text.contains("End:"));
        assert!(!text.contains("Pagamento:"));
        assert!(text.contains(DEFAULT_FOOTER));

        // items sit between the header divider and the single divider
        let items_at = text.find("(2) X-Burger").unwrap();
        let single_at = text.find(&"-".repeat(48)).unwrap();
        let subtotal_at = text.find("Subtotal:").unwrap();
        assert!(items_at < single_at && single_at < subtotal_at);
    }

    #[test]
    fn test_delivery_order_receipt() {
        let mut job = table_job();
        job.order_type = OrderType::Delivery;
        job.table_number = None;
        job.customer_name = Some("Maria".to_string());
        job.delivery_address = Some("Rua das Flores, 123 - Centro".to_string());
        job.delivery_phone = Some("(11) 98765-4321".to_string());
        job.delivery_fee = Some(dec("5.00"));
        job.total = dec("52.80");
        job.payment_method = Some("pix".to_string());

        let text = render_text(&job, &ReceiptLayout::default());

        assert!(text.contains("Tipo: ENTREGA"));
        assert!(text.contains("Cliente: Maria"));
        assert!(text.contains("Tel: (11) 98765-4321"));
        assert!(text.contains("End: Rua das Flores, 123 - Centro"));
        assert!(text.contains("Pagamento: PIX"));
        assert!(text.contains(&lr("Subtotal:", "R$ 47,80", 48)));
        assert!(text.contains(&lr("Taxa entrega:", "R$ 5,00", 48)));
        assert!(text.contains(&lr("TOTAL:", "R$ 52,80", 48)));

        let fee_at = text.find("Taxa entrega").unwrap();
        let total_at = text.find("TOTAL:").unwrap();
        assert!(text.find("Subtotal:").unwrap() < fee_at && fee_at < total_at);
    }

    #[test]
    fn test_notes_and_custom_footer() {
        let mut job = table_job();
        job.items[0].notes = Some("sem cebola".to_string());
        job.notes = Some("Entregar rapido".to_string());
        let layout = ReceiptLayout {
            store_name: Some("Lanchonete".to_string()),
            footer_lines: vec!["Volte sempre".to_string()],
            paper_width: 32,
            ..ReceiptLayout::default()
        };

        let text = render_text(&job, &layout);
        assert!(text.contains("  OBS: sem cebola\n"));
        assert!(text.contains("OBS: Entregar rapido\n"));
        assert!(text.contains("LANCHONETE"));
        assert!(text.contains("Volte sempre"));
        assert!(!text.contains(DEFAULT_FOOTER));
    }

    #[test]
    fn test_bytes_frame() {
        let layout = ReceiptLayout {
            open_drawer: true,
            ..ReceiptLayout::default()
        };
        let data = ReceiptRenderer::default()
            .render(&table_job(), &layout)
            .unwrap();

        assert_eq!(&data[..2], &[0x1B, 0x40]);
        assert!(data.ends_with(&[0x1D, 0x56, 0x01, 0x1B, 0x70, 0x00, 0x19, 0xFA]));
    }

    #[test]
    fn test_validation() {
        let renderer = ReceiptRenderer::default();
        let layout = ReceiptLayout::default();

        let mut job = table_job();
        job.items.clear();
        assert_eq!(renderer.render(&job, &layout), Err(RenderError::NoItems));

        let mut job = table_job();
        job.items[1].name = "  ".to_string();
        assert_eq!(
            renderer.render(&job, &layout),
            Err(RenderError::EmptyItemName { index: 1 })
        );

        let mut job = table_job();
        job.items[0].quantity = 0;
        assert!(matches!(
            renderer.render(&job, &layout),
            Err(RenderError::ZeroQuantity { .. })
        ));
    }

    #[test]
    fn test_layout_timezone() {
        let layout = ReceiptLayout {
            timezone: Some("America/Sao_Paulo".to_string()),
            ..ReceiptLayout::default()
        };
        let text = render_text(&table_job(), &layout);
        assert!(text.contains("09/03/2024 15:05"));
    }

    #[test]
    fn test_header_switches_and_cnpj() {
        let layout = ReceiptLayout {
            store_name: Some("Bar do Ze".to_string()),
            store_address: Some("Rua A, 1".to_string()),
            store_phone: Some("1133334444".to_string()),
            store_cnpj: Some("12.345.678/0001-90".to_string()),
            ..ReceiptLayout::default()
        };

        // CNPJ is opt-in
        let text = render_text(&table_job(), &layout);
        assert!(text.contains("BAR DO ZE"));
        assert!(text.contains("Tel: 1133334444"));
        assert!(!text.contains("CNPJ"));

        let layout = ReceiptLayout {
            show_cnpj: true,
            show_restaurant_name: false,
            show_address: false,
            show_phone: false,
            show_date_time: false,
            show_order_number: false,
            show_order_type: false,
            show_table: false,
            ..layout
        };
        let text = render_text(&table_job(), &layout);
        assert!(text.contains("CNPJ: 12.345.678/0001-90"));
        assert!(!text.contains("BAR DO ZE"));
        assert!(!text.contains("Rua A, 1"));
        assert!(!text.contains("Tel:"));
        assert!(!text.contains("09/03/2024"));
        assert!(!text.contains("Pedido #1024"));
        assert!(!text.contains("Tipo:"));
        assert!(!text.contains("Mesa 5"));
    }

    #[test]
    fn test_waiter_falls_back_to_staff() {
        let mut job = table_job();
        job.created_by_name = Some("Ana".to_string());
        let text = render_text(&job, &ReceiptLayout::default());
        assert!(text.contains("Atendente: Ana"));

        job.waiter_name = Some("Joao".to_string());
        let text = render_text(&job, &ReceiptLayout::default());
        assert!(text.contains("Garcom: Joao"));
        assert!(!text.contains("Atendente"));

        let hidden = ReceiptLayout {
            show_waiter: false,
            ..ReceiptLayout::default()
        };
        assert!(!render_text(&job, &hidden).contains("Garcom"));
    }

    #[test]
    fn test_item_size_and_price_switches() {
        let mut job = table_job();
        job.items[0].size = Some("G".to_string());
        job.items[1].name = "Suco (M)".to_string();
        job.items[1].size = Some("m".to_string());
        job.items[1].notes = Some("sem gelo".to_string());

        let text = render_text(&job, &ReceiptLayout::default());
        assert!(text.contains(&lr("(2) X-Burger (G)", "R$ 39,80", 48)));
        assert!(text.contains(&lr("(1) Suco (M)", "R$ 8,00", 48)));
        assert!(text.contains("OBS: sem gelo"));

        let layout = ReceiptLayout {
            show_item_size: false,
            show_item_prices: false,
            show_item_notes: false,
            ..ReceiptLayout::default()
        };
        let text = render_text(&job, &layout);
        assert!(text.contains("(2) X-Burger\n"));
        assert!(!text.contains("R$ 39,80"));
        assert!(!text.contains("sem gelo"));
    }

    #[test]
    fn test_customer_and_totals_switches() {
        let mut job = table_job();
        job.customer_name = Some("Maria".to_string());
        job.delivery_phone = Some("(11) 98765-4321".to_string());
        job.delivery_address = Some("Rua das Flores, 123".to_string());
        job.delivery_fee = Some(dec("5.00"));
        job.payment_method = Some("cash".to_string());

        let layout = ReceiptLayout {
            show_customer_phone: false,
            show_delivery_address: false,
            show_delivery_fee: false,
            show_payment_method: false,
            ..ReceiptLayout::default()
        };
        let text = render_text(&job, &layout);
        assert!(text.contains("Cliente: Maria"));
        assert!(!text.contains("98765"));
        assert!(!text.contains("End:"));
        assert!(!text.contains("Taxa entrega"));
        assert!(!text.contains("Pagamento"));
        assert!(text.contains("TOTAL:"));

        let layout = ReceiptLayout {
            show_totals: false,
            show_customer_name: false,
            ..layout
        };
        let text = render_text(&job, &layout);
        assert!(!text.contains("Cliente:"));
        assert!(!text.contains("Subtotal:"));
        assert!(!text.contains("TOTAL:"));
    }

    #[test]
    fn test_latin1_receipt_replaces_unmappable() {
        let mut job = table_job();
        job.items[0].name = "Pão 🍞".to_string();
        let layout = ReceiptLayout {
            codepage: Codepage::Latin1,
            ..ReceiptLayout::default()
        };
        let data = ReceiptRenderer::default().render(&job, &layout).unwrap();
        assert!(!data.windows(2).any(|w| w == b"&#"));
    }

    #[test]
    fn test_format_money() {
        let layout = ReceiptLayout::default();
        assert_eq!(format_money(dec("12.5"), &layout), "R$ 12,50");
        assert_eq!(format_money(dec("0"), &layout), "R$ 0,00");

        let plain = ReceiptLayout {
            currency_symbol: String::new(),
            decimal_separator: '.',
            ..ReceiptLayout::default()
        };
        assert_eq!(format_money(dec("3.456"), &plain), "3.46");
    }
}
