//! # analyze-cfdi Library
//!
//! Concurrent batch engine for Mexican tax-invoice XML documents (CFDI 3.3
//! and 4.0): parse, classify against a taxpayer profile, deduplicate by
//! fiscal UUID, and reduce the survivors into one immutable aggregate with
//! KPIs, monthly series, counterparty rankings and data-quality counters.

pub mod aggregate;
pub mod classifier;
pub mod cli;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod export;
pub mod file_discovery;
pub mod model;
pub mod output;
pub mod parser;

pub use aggregate::{
    Aggregate, CounterpartyTotal, DataQuality, InvalidFile, Kpis, MonthlyBucket,
    PartialAggregate, ProcessingOutcome, TOP_COUNTERPARTIES,
};
pub use classifier::{ClassificationBucket, IgnoreReason, classify};
pub use cli::{Cli, Config, OutputFormat, VerbosityLevel};
pub use dedup::UuidRegistry;
pub use engine::{AnalysisEngine, CancelToken, EngineConfig, ProgressCallback, ProgressUpdate};
pub use error::{AnalyzeError, ParseError, ParseResult, Result};
pub use export::export_tables;
pub use file_discovery::FileDiscovery;
pub use model::{
    Concept, MonthKey, Party, SchemaVersion, TaxKind, TaxTotals, TaxpayerProfile, Voucher,
    VoucherType,
};
pub use output::Output;
pub use parser::parse_voucher;
