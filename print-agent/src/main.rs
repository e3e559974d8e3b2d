use std::sync::Arc;

use anyhow::Context;
use print_agent::logger::init_logger_with_file;
use print_agent::{AgentConfig, HttpJobStore, PrintExecutor, PrintWorker, ReceiptLayout, UsbRegistry};
use receipt_printer::{NetworkScanner, PrinterVendors, RusbBackend, UsbBackend};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and logging
    dotenv::dotenv().ok();
    let config = AgentConfig::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    );

    tracing::info!("Print agent starting...");
    if config.restaurant_id.is_empty() {
        tracing::warn!("RESTAURANT_ID is not set; the agent will idle");
    }

    // 2. USB is optional; hosts without libusb print over the network only
    let vendors = Arc::new(PrinterVendors::default());
    let usb = match RusbBackend::new() {
        Ok(backend) => {
            let backend: Arc<dyn UsbBackend> = Arc::new(backend);
            Some(UsbRegistry::new(backend, vendors.clone(), config.usb_write_timeout))
        }
        Err(e) => {
            tracing::warn!(error = %e, "USB unavailable, network printers only");
            None
        }
    };

    if config.discover_on_start {
        discover(&config, usb.as_ref()).await;
    }

    // 3. Store, executor, worker
    let store = HttpJobStore::new(&config.store_url, &config.store_api_key, &config.restaurant_id)
        .context("Failed to create job store client")?
        .with_default_layout(ReceiptLayout {
            paper_width: config.paper_width,
            ..ReceiptLayout::default()
        });

    let mut executor =
        PrintExecutor::new(config.timezone).with_network_timeouts(config.network_timeouts());
    if let Some(registry) = usb {
        executor = executor.with_usb(registry);
    }

    let worker = PrintWorker::new(Arc::new(store), Arc::new(executor), &config.restaurant_id)
        .with_poll_interval(config.poll_interval)
        .with_config_refresh(config.config_refresh)
        .with_heartbeat_interval(config.heartbeat_interval)
        .with_client_id(&config.client_id);
    let stats = worker.stats();

    // 4. Run until Ctrl-C
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();
    handle.await.context("Print worker task failed")?;

    let snapshot = stats.snapshot();
    tracing::info!(
        printed = snapshot.printed,
        failed = snapshot.failed,
        "Print agent stopped"
    );
    Ok(())
}

/// Log printers reachable on the LAN and the USB bus
async fn discover(config: &AgentConfig, usb: Option<&UsbRegistry>) {
    let scanner = NetworkScanner::new(
        receipt_printer::network::DEFAULT_PORT,
        config.network_connect_timeout,
    );
    for printer in scanner.quick_scan().await {
        tracing::info!(ip = %printer.ip, port = printer.port, latency_ms = printer.latency_ms, "Network printer found");
    }

    if let Some(registry) = usb {
        match receipt_printer::usb::list_printers(registry.backend(), registry.vendors()).await {
            Ok(printers) => {
                for p in printers {
                    tracing::info!(
                        name = %p.name,
                        vendor_id = %format!("{:04x}", p.vendor_id),
                        product_id = %format!("{:04x}", p.product_id),
                        known_vendor = p.known_vendor,
                        "USB printer found"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "USB enumeration failed"),
        }
    }
}
