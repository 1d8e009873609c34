//! Batch aggregation: worker-local partials, order-independent merge, and the
//! immutable per-run [`Aggregate`].
//!
//! `fold_one`/`record` update a worker-local partial; `merge` is commutative
//! and associative on every field (tables concatenate, maps sum); rankings
//! and table order are recomputed at `finalize` time so the result never
//! depends on worker scheduling.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassificationBucket, IgnoreReason};
use crate::model::{MonthKey, TaxTotals, Voucher};

/// How many counterparties each ranking keeps.
pub const TOP_COUNTERPARTIES: usize = 5;

/// Per-file pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// Parsed, admitted by the dedup registry, and classified
    Accepted {
        voucher: Voucher,
        bucket: ClassificationBucket,
    },
    /// Parsed fine but its uuid was already admitted this run
    Duplicate { uuid: String },
    /// Unreadable or structurally invalid document
    Invalid { path: PathBuf, detail: String },
}

impl ProcessingOutcome {
    /// Accepted 3.3 documents carry a legacy-dialect warning downstream.
    pub fn legacy_warning(&self) -> bool {
        matches!(self, ProcessingOutcome::Accepted { voucher, .. } if voucher.is_legacy())
    }
}

/// One invalid file with enough detail for drill-down.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvalidFile {
    pub path: PathBuf,
    pub detail: String,
}

/// Batch KPI scalars. All sums are exact decimal arithmetic; tax totals
/// accumulate from Income-bucket vouchers only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net: Decimal,
    pub vat_transferred: Decimal,
    pub isr_withheld: Decimal,
    pub vat_withheld: Decimal,
    pub ieps: Decimal,
    /// Classified vouchers (income + expense rows)
    pub voucher_count: usize,
}

/// One chronological row of the monthly series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: MonthKey,
    pub income: Decimal,
    pub expense: Decimal,
}

/// One ranked counterparty (client or supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyTotal {
    pub tax_id: String,
    pub name: Option<String>,
    pub total: Decimal,
}

/// Data-quality counters with drill-down references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub invalid: usize,
    pub duplicate: usize,
    pub legacy_version: usize,
    pub ignored_payment: usize,
    pub unclassified: usize,
    pub invalid_files: Vec<InvalidFile>,
    pub duplicate_uuids: Vec<String>,
    pub legacy_uuids: Vec<String>,
    pub ignored_payment_uuids: Vec<String>,
    pub unclassified_uuids: Vec<String>,
}

/// The immutable batch-level reduction handed to exporters and reports.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    /// Files discovered for the run
    pub total_files: usize,
    pub processed: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub duplicate: usize,
    pub legacy_version: usize,
    /// Set when the run was cancelled before the queue drained
    pub partial: bool,
    pub elapsed: Duration,
    pub kpis: Kpis,
    /// Accepted Income vouchers, sorted by (issue date, uuid)
    pub income_table: Vec<Voucher>,
    /// Accepted Expense vouchers, sorted by (issue date, uuid)
    pub expense_table: Vec<Voucher>,
    /// Chronological per-month totals
    pub monthly_series: Vec<MonthlyBucket>,
    /// Clients ranked by income total, ties broken by RFC ascending
    pub top_clients: Vec<CounterpartyTotal>,
    /// Suppliers ranked by expense total, ties broken by RFC ascending
    pub top_suppliers: Vec<CounterpartyTotal>,
    pub data_quality: DataQuality,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MonthlyTotals {
    income: Decimal,
    expense: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CounterpartyAcc {
    name: Option<String>,
    total: Decimal,
}

/// Worker-local accumulator. Exclusively owned by one worker until merge
/// time, so folding needs no locks.
#[derive(Debug, Clone, Default)]
pub struct PartialAggregate {
    processed: usize,
    accepted: usize,
    invalid: usize,
    duplicate: usize,
    legacy_version: usize,
    income: Vec<Voucher>,
    expense: Vec<Voucher>,
    total_income: Decimal,
    total_expense: Decimal,
    taxes: TaxTotals,
    monthly: BTreeMap<MonthKey, MonthlyTotals>,
    clients: BTreeMap<String, CounterpartyAcc>,
    suppliers: BTreeMap<String, CounterpartyAcc>,
    invalid_files: Vec<InvalidFile>,
    duplicate_uuids: Vec<String>,
    legacy_uuids: Vec<String>,
    ignored_payment_uuids: Vec<String>,
    unclassified_uuids: Vec<String>,
    track_unclassified: bool,
}

impl PartialAggregate {
    /// Partial that records receiver-mismatch uuids in data quality.
    pub fn new() -> Self {
        Self::with_unclassified_tracking(true)
    }

    /// `track` controls whether `Ignored(ReceiverMismatch)` vouchers leave a
    /// reference in the data-quality report; the accepted counter is exact
    /// either way.
    pub fn with_unclassified_tracking(track: bool) -> Self {
        Self {
            track_unclassified: track,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Record one per-file outcome.
    pub fn record(&mut self, outcome: ProcessingOutcome) {
        self.processed += 1;
        match outcome {
            ProcessingOutcome::Accepted { voucher, bucket } => self.fold_one(voucher, bucket),
            ProcessingOutcome::Duplicate { uuid } => {
                self.duplicate += 1;
                self.duplicate_uuids.push(uuid);
            }
            ProcessingOutcome::Invalid { path, detail } => {
                self.invalid += 1;
                self.invalid_files.push(InvalidFile { path, detail });
            }
        }
    }

    /// Fold one admitted voucher into this partial.
    fn fold_one(&mut self, voucher: Voucher, bucket: ClassificationBucket) {
        self.accepted += 1;
        if voucher.is_legacy() {
            // The warning is about the document dialect, not the bucket
            self.legacy_version += 1;
            self.legacy_uuids.push(voucher.uuid.clone());
        }

        match bucket {
            ClassificationBucket::Income => {
                self.total_income += voucher.total;
                self.taxes.add(&voucher.taxes);
                let month = self.monthly.entry(voucher.month_key()).or_default();
                month.income += voucher.total;
                // The profile holder is the receiver on every classified
                // voucher, so the counterparty is always the issuer
                let client = self
                    .clients
                    .entry(voucher.issuer.tax_id.clone())
                    .or_default();
                client.total += voucher.total;
                if client.name.is_none() {
                    client.name = voucher.issuer.name.clone();
                }
                self.income.push(voucher);
            }
            ClassificationBucket::Expense => {
                self.total_expense += voucher.total;
                let month = self.monthly.entry(voucher.month_key()).or_default();
                month.expense += voucher.total;
                let supplier = self
                    .suppliers
                    .entry(voucher.issuer.tax_id.clone())
                    .or_default();
                supplier.total += voucher.total;
                if supplier.name.is_none() {
                    supplier.name = voucher.issuer.name.clone();
                }
                self.expense.push(voucher);
            }
            ClassificationBucket::Ignored(IgnoreReason::PaymentType) => {
                self.ignored_payment_uuids.push(voucher.uuid);
            }
            ClassificationBucket::Ignored(IgnoreReason::ReceiverMismatch) => {
                if self.track_unclassified {
                    self.unclassified_uuids.push(voucher.uuid);
                }
            }
        }
    }

    /// Combine two partials. Commutative and associative in every field;
    /// ranking order is not maintained here, it is recomputed at finalize.
    pub fn merge(mut self, other: Self) -> Self {
        self.processed += other.processed;
        self.accepted += other.accepted;
        self.invalid += other.invalid;
        self.duplicate += other.duplicate;
        self.legacy_version += other.legacy_version;
        self.income.extend(other.income);
        self.expense.extend(other.expense);
        self.total_income += other.total_income;
        self.total_expense += other.total_expense;
        self.taxes.add(&other.taxes);

        for (month, totals) in other.monthly {
            let entry = self.monthly.entry(month).or_default();
            entry.income += totals.income;
            entry.expense += totals.expense;
        }
        for (tax_id, acc) in other.clients {
            let entry = self.clients.entry(tax_id).or_default();
            entry.total += acc.total;
            if entry.name.is_none() {
                entry.name = acc.name;
            }
        }
        for (tax_id, acc) in other.suppliers {
            let entry = self.suppliers.entry(tax_id).or_default();
            entry.total += acc.total;
            if entry.name.is_none() {
                entry.name = acc.name;
            }
        }

        self.invalid_files.extend(other.invalid_files);
        self.duplicate_uuids.extend(other.duplicate_uuids);
        self.legacy_uuids.extend(other.legacy_uuids);
        self.ignored_payment_uuids.extend(other.ignored_payment_uuids);
        self.unclassified_uuids.extend(other.unclassified_uuids);
        self.track_unclassified |= other.track_unclassified;
        self
    }

    /// Produce the immutable public aggregate: sort tables, recompute
    /// rankings from the full counterparty maps, freeze the monthly series.
    pub fn finalize(mut self, total_files: usize, partial: bool, elapsed: Duration) -> Aggregate {
        let sort_key = |v: &Voucher| (v.issue_date, v.uuid.clone());
        self.income.sort_by_key(sort_key);
        self.expense.sort_by_key(sort_key);

        self.invalid_files.sort();
        self.duplicate_uuids.sort();
        self.legacy_uuids.sort();
        self.ignored_payment_uuids.sort();
        self.unclassified_uuids.sort();

        let monthly_series = self
            .monthly
            .into_iter()
            .map(|(month, totals)| MonthlyBucket {
                month,
                income: totals.income,
                expense: totals.expense,
            })
            .collect();

        let kpis = Kpis {
            total_income: self.total_income,
            total_expense: self.total_expense,
            net: self.total_income - self.total_expense,
            vat_transferred: self.taxes.vat_transferred,
            isr_withheld: self.taxes.isr_withheld,
            vat_withheld: self.taxes.vat_withheld,
            ieps: self.taxes.ieps,
            voucher_count: self.income.len() + self.expense.len(),
        };

        let data_quality = DataQuality {
            invalid: self.invalid,
            duplicate: self.duplicate,
            legacy_version: self.legacy_version,
            ignored_payment: self.ignored_payment_uuids.len(),
            unclassified: self.unclassified_uuids.len(),
            invalid_files: self.invalid_files,
            duplicate_uuids: self.duplicate_uuids,
            legacy_uuids: self.legacy_uuids,
            ignored_payment_uuids: self.ignored_payment_uuids,
            unclassified_uuids: self.unclassified_uuids,
        };

        Aggregate {
            total_files,
            processed: self.processed,
            accepted: self.accepted,
            invalid: self.invalid,
            duplicate: self.duplicate,
            legacy_version: self.legacy_version,
            partial,
            elapsed,
            kpis,
            income_table: self.income,
            expense_table: self.expense,
            monthly_series,
            top_clients: rank(self.clients),
            top_suppliers: rank(self.suppliers),
            data_quality,
        }
    }
}

/// Sort by total descending, tie-break by RFC ascending, keep the top N.
/// Always recomputed from the full map, never maintained incrementally.
fn rank(map: BTreeMap<String, CounterpartyAcc>) -> Vec<CounterpartyTotal> {
    let mut ranked: Vec<CounterpartyTotal> = map
        .into_iter()
        .map(|(tax_id, acc)| CounterpartyTotal {
            tax_id,
            name: acc.name,
            total: acc.total,
        })
        .collect();
    ranked.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.tax_id.cmp(&b.tax_id)));
    ranked.truncate(TOP_COUNTERPARTIES);
    ranked
}

impl Aggregate {
    /// Counter identity that holds at every point of a run.
    pub fn counters_consistent(&self) -> bool {
        self.accepted + self.invalid + self.duplicate == self.processed
    }
}
