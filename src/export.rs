//! CSV table export: the tabular-export boundary consuming a finalized
//! [`Aggregate`].

use std::path::{Path, PathBuf};

use crate::aggregate::Aggregate;
use crate::error::{AnalyzeError, Result};
use crate::model::{TaxKind, Voucher};

/// Write `income.csv`, `expense.csv` and `concepts.csv` into `dir`
/// (created if missing). Returns the written paths.
pub fn export_tables(aggregate: &Aggregate, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| AnalyzeError::Export {
        path: dir.to_path_buf(),
        details: e.to_string(),
    })?;

    let income = dir.join("income.csv");
    write_voucher_table(&income, &aggregate.income_table)?;
    let expense = dir.join("expense.csv");
    write_voucher_table(&expense, &aggregate.expense_table)?;
    let concepts = dir.join("concepts.csv");
    write_concepts_table(
        &concepts,
        aggregate
            .income_table
            .iter()
            .chain(aggregate.expense_table.iter()),
    )?;

    Ok(vec![income, expense, concepts])
}

fn export_error(path: &Path) -> impl Fn(csv::Error) -> AnalyzeError + '_ {
    move |e| AnalyzeError::Export {
        path: path.to_path_buf(),
        details: e.to_string(),
    }
}

fn write_voucher_table(path: &Path, vouchers: &[Voucher]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(export_error(path))?;
    writer
        .write_record([
            "uuid",
            "version",
            "type",
            "series",
            "folio",
            "date",
            "issuer_rfc",
            "issuer_name",
            "receiver_rfc",
            "receiver_name",
            "currency",
            "subtotal",
            "discount",
            "total",
            "vat_transferred",
            "isr_withheld",
            "vat_withheld",
            "ieps",
            "payment_method",
            "concepts",
        ])
        .map_err(export_error(path))?;

    for voucher in vouchers {
        writer
            .write_record([
                voucher.uuid.clone(),
                voucher.schema_version.to_string(),
                voucher.voucher_type.as_code().to_string(),
                voucher.series.clone().unwrap_or_default(),
                voucher.folio.clone().unwrap_or_default(),
                voucher.issue_date.format("%Y-%m-%d").to_string(),
                voucher.issuer.tax_id.clone(),
                voucher.issuer.name.clone().unwrap_or_default(),
                voucher.receiver.tax_id.clone(),
                voucher.receiver.name.clone().unwrap_or_default(),
                voucher.currency.clone(),
                voucher.subtotal.to_string(),
                voucher.discount.to_string(),
                voucher.total.to_string(),
                voucher.taxes.vat_transferred.to_string(),
                voucher.taxes.isr_withheld.to_string(),
                voucher.taxes.vat_withheld.to_string(),
                voucher.taxes.ieps.to_string(),
                voucher.payment_method.clone().unwrap_or_default(),
                voucher.concepts.len().to_string(),
            ])
            .map_err(export_error(path))?;
    }

    writer.flush().map_err(|e| AnalyzeError::Export {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    Ok(())
}

/// Concepts sheet keyed by voucher uuid, one row per line item with the
/// per-line tax breakdown spread into columns.
fn write_concepts_table<'a>(
    path: &Path,
    vouchers: impl Iterator<Item = &'a Voucher>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(export_error(path))?;
    writer
        .write_record([
            "uuid",
            "description",
            "quantity",
            "unit_value",
            "amount",
            "discount",
            "prod_serv_key",
            "vat_transferred",
            "ieps_transferred",
            "isr_withheld",
            "vat_withheld",
            "ieps_withheld",
        ])
        .map_err(export_error(path))?;

    let tax = |concept: &crate::model::Concept, kind: TaxKind| {
        concept
            .taxes
            .get(&kind)
            .map(|v| v.to_string())
            .unwrap_or_default()
    };

    for voucher in vouchers {
        for concept in &voucher.concepts {
            writer
                .write_record([
                    voucher.uuid.clone(),
                    concept.description.clone(),
                    concept.quantity.to_string(),
                    concept.unit_value.to_string(),
                    concept.amount.to_string(),
                    concept.discount.to_string(),
                    concept.prod_serv_key.clone().unwrap_or_default(),
                    tax(concept, TaxKind::VatTransferred),
                    tax(concept, TaxKind::IepsTransferred),
                    tax(concept, TaxKind::IsrWithheld),
                    tax(concept, TaxKind::VatWithheld),
                    tax(concept, TaxKind::IepsWithheld),
                ])
                .map_err(export_error(path))?;
        }
    }

    writer.flush().map_err(|e| AnalyzeError::Export {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    Ok(())
}
