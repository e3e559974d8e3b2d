//! # print-agent
//!
//! Restaurant print agent: polls the job store for pending orders, renders
//! each one as an ESC/POS receipt and delivers it to every network or USB
//! printer the order routes to.
//!
//! ## Modules
//!
//! - [`models`]: jobs, printers, receipt layout
//! - [`renderer`]: job -> ESC/POS bytes
//! - [`store`]: job store trait, HTTP client, in-memory store
//! - [`executor`]: per-printer render and dispatch
//! - [`worker`]: the poll loop
//! - [`config`] / [`logger`]: environment and tracing setup

pub mod config;
pub mod executor;
pub mod logger;
pub mod models;
pub mod renderer;
pub mod store;
pub mod worker;

pub use config::AgentConfig;
pub use executor::{PrintExecutor, PrintExecutorError, PrintExecutorResult, UsbRegistry};
pub use models::{
    OrderItem, OrderType, PrintJob, PrintStatus, PrinterConfig, ReceiptLayout, StoreConfig,
    TransportDescriptor,
};
pub use renderer::{ReceiptRenderer, RenderError, RenderResult};
pub use store::{
    Heartbeat, HttpJobStore, JobStore, MemoryJobStore, PrintLogEntry, PrintLogStatus, StoreError,
    StoreResult,
};
pub use worker::{CycleReport, PrintStats, PrintStatsSnapshot, PrintWorker};
