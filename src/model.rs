//! Typed representation of a parsed fiscal voucher (CFDI) and its line items.
//!
//! These are pure data types: the parser builds them, the classifier and
//! aggregator read them. All monetary amounts are `rust_decimal::Decimal`
//! so batch totals never accumulate binary floating-point drift.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzeError;

/// CFDI schema dialect, detected from the root namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// CFDI 3.3 (`http://www.sat.gob.mx/cfd/3`), processed but flagged legacy
    V33,
    /// CFDI 4.0 (`http://www.sat.gob.mx/cfd/4`)
    V40,
}

impl SchemaVersion {
    /// V33 documents are fully processed but flagged for downstream display
    pub fn is_legacy(&self) -> bool {
        matches!(self, SchemaVersion::V33)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V33 => "3.3",
            SchemaVersion::V40 => "4.0",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voucher kind from the `TipoDeComprobante` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherType {
    /// "I" — ingreso (invoice)
    Income,
    /// "E" — egreso (credit note)
    Expense,
    /// "P" — pago (payment complement), always ignored by classification
    Payment,
    /// Anything else (e.g. "N" nómina, "T" traslado)
    Other,
}

impl VoucherType {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "I" => VoucherType::Income,
            "E" => VoucherType::Expense,
            "P" => VoucherType::Payment,
            _ => VoucherType::Other,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            VoucherType::Income => "I",
            VoucherType::Expense => "E",
            VoucherType::Payment => "P",
            VoucherType::Other => "?",
        }
    }
}

/// Typed tax kind derived from SAT tax codes (001 = ISR, 002 = IVA, 003 = IEPS)
/// crossed with whether the row is a transfer (traslado) or withholding
/// (retención). Codes outside this set are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxKind {
    VatTransferred,
    IepsTransferred,
    IsrWithheld,
    VatWithheld,
    IepsWithheld,
}

impl TaxKind {
    /// Map a SAT transfer row (`cfdi:Traslado`) code to a typed kind.
    pub fn from_transfer_code(code: &str) -> Option<Self> {
        match code {
            "002" => Some(TaxKind::VatTransferred),
            "003" => Some(TaxKind::IepsTransferred),
            _ => None,
        }
    }

    /// Map a SAT withholding row (`cfdi:Retencion`) code to a typed kind.
    pub fn from_withholding_code(code: &str) -> Option<Self> {
        match code {
            "001" => Some(TaxKind::IsrWithheld),
            "002" => Some(TaxKind::VatWithheld),
            "003" => Some(TaxKind::IepsWithheld),
            _ => None,
        }
    }
}

/// A taxpayer identity as declared on the voucher (issuer or receiver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// RFC (Mexican tax id), uppercased
    pub tax_id: String,
    /// Legal name; required by the 4.0 dialect, optional in 3.3
    pub name: Option<String>,
    /// Postal code: `LugarExpedicion` for issuers,
    /// `DomicilioFiscalReceptor` for 4.0 receivers
    pub postal_code: Option<String>,
}

/// Voucher-level tax totals. An absent `Impuestos` block normalizes to zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTotals {
    pub vat_transferred: Decimal,
    pub isr_withheld: Decimal,
    pub vat_withheld: Decimal,
    pub ieps: Decimal,
}

impl TaxTotals {
    pub fn add(&mut self, other: &TaxTotals) {
        self.vat_transferred += other.vat_transferred;
        self.isr_withheld += other.isr_withheld;
        self.vat_withheld += other.vat_withheld;
        self.ieps += other.ieps;
    }
}

/// One line item within a voucher. Owned by its voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub description: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub amount: Decimal,
    pub discount: Decimal,
    /// Catch-all product/service key; only the 3.3 dialect carries it forward
    pub prod_serv_key: Option<String>,
    /// Per-line tax breakdown keyed by typed tax kind
    pub taxes: BTreeMap<TaxKind, Decimal>,
}

/// One parsed fiscal voucher.
///
/// Invariants (enforced by the parser, never re-checked downstream):
/// `uuid` is non-empty and uppercased, `total >= 0`, `concepts` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Fiscal-stamp UUID from the `TimbreFiscalDigital` complement; the
    /// batch-wide dedup key
    pub uuid: String,
    pub schema_version: SchemaVersion,
    pub voucher_type: VoucherType,
    pub series: Option<String>,
    pub folio: Option<String>,
    pub issue_date: NaiveDateTime,
    pub issuer: Party,
    pub receiver: Party,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_method: Option<String>,
    pub taxes: TaxTotals,
    pub concepts: Vec<Concept>,
}

impl Voucher {
    pub fn is_legacy(&self) -> bool {
        self.schema_version.is_legacy()
    }

    /// Issue date truncated to (year, month) for the monthly series.
    pub fn month_key(&self) -> MonthKey {
        MonthKey::from_datetime(&self.issue_date)
    }
}

/// Calendar (year, month) key; orders chronologically, displays as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// Shape-only RFC check: 3-4 letters, 6 date digits, 2-3 homoclave characters.
// No check-digit verification, same as upstream SAT tooling expects.
static RFC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z&Ñ]{3,4}[0-9]{6}[A-Z0-9]{2,3}$").expect("valid RFC pattern"));

/// The operator's own tax identity, supplied once per run and used by the
/// classifier to orient issuer-vs-receiver. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxpayerProfile {
    tax_id: String,
}

impl TaxpayerProfile {
    /// Normalize (trim + uppercase) and validate the RFC shape.
    pub fn new(rfc: &str) -> Result<Self, AnalyzeError> {
        let normalized = rfc.trim().to_uppercase();
        if !RFC_PATTERN.is_match(&normalized) {
            return Err(AnalyzeError::InvalidTaxId {
                value: rfc.to_string(),
            });
        }
        Ok(Self { tax_id: normalized })
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }
}
