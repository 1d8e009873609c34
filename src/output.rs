//! Human-readable report rendering over the finalized aggregate.

use std::time::Duration;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};

use crate::aggregate::{Aggregate, CounterpartyTotal};
use crate::cli::VerbosityLevel;

/// Verbosity-gated report formatter. Colors only on ttys.
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, aggregate: &Aggregate) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                if aggregate.invalid > 0 || aggregate.duplicate > 0 {
                    output.push_str(&format!(
                        "Invalid: {} Duplicates: {}\n",
                        aggregate.invalid, aggregate.duplicate
                    ));
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose | VerbosityLevel::Debug => {
                output.push_str(&self.format_summary(aggregate));
                output.push_str(&self.format_kpis(aggregate));
                output.push_str(&self.format_quality(aggregate));

                if self.verbosity >= VerbosityLevel::Verbose {
                    output.push_str(&self.format_monthly(aggregate));
                    output.push_str(&self.format_counterparties(aggregate));
                    output.push_str(&self.format_invalid_details(aggregate));
                }

                if self.verbosity == VerbosityLevel::Debug {
                    output.push_str(&self.format_debug_info(aggregate));
                }
            }
        }

        output
    }

    /// One-line counter summary for `--format summary`.
    pub fn format_oneline(&self, aggregate: &Aggregate) -> String {
        format!(
            "processed={} accepted={} invalid={} duplicate={} legacy={} net={}{}",
            aggregate.processed,
            aggregate.accepted,
            aggregate.invalid,
            aggregate.duplicate,
            aggregate.legacy_version,
            aggregate.kpis.net,
            if aggregate.partial { " (partial)" } else { "" }
        )
    }

    fn format_summary(&self, aggregate: &Aggregate) -> String {
        let mut output = String::new();
        output.push_str("Batch Summary:\n");
        if aggregate.partial {
            output.push_str(&format!(
                "  {}\n",
                self.colorize("PARTIAL RUN (cancelled before completion)", "33")
            ));
        }
        output.push_str(&format!("  Files discovered: {}\n", aggregate.total_files));
        output.push_str(&format!("  Processed: {}\n", aggregate.processed));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Accepted:", "32"),
            aggregate.accepted
        ));
        if aggregate.invalid > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                aggregate.invalid
            ));
        }
        if aggregate.duplicate > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Duplicates:", "33"),
                aggregate.duplicate
            ));
        }
        if aggregate.legacy_version > 0 {
            output.push_str(&format!(
                "  {} {} (CFDI 3.3, consider migrating to 4.0)\n",
                self.colorize("Legacy:", "36"),
                aggregate.legacy_version
            ));
        }
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(aggregate.elapsed)
        ));
        output
    }

    fn format_kpis(&self, aggregate: &Aggregate) -> String {
        let kpis = &aggregate.kpis;
        let mut output = String::new();
        output.push_str("\nKPIs:\n");
        output.push_str(&format!("  Income:  {} ({} vouchers)\n", kpis.total_income, aggregate.income_table.len()));
        output.push_str(&format!("  Expense: {} ({} vouchers)\n", kpis.total_expense, aggregate.expense_table.len()));
        output.push_str(&format!("  Net:     {}\n", kpis.net));
        output.push_str(&format!("  VAT transferred: {}\n", kpis.vat_transferred));
        output.push_str(&format!("  ISR withheld:    {}\n", kpis.isr_withheld));
        if !kpis.vat_withheld.is_zero() {
            output.push_str(&format!("  VAT withheld:    {}\n", kpis.vat_withheld));
        }
        if !kpis.ieps.is_zero() {
            output.push_str(&format!("  IEPS:            {}\n", kpis.ieps));
        }
        output
    }

    fn format_quality(&self, aggregate: &Aggregate) -> String {
        let quality = &aggregate.data_quality;
        let mut output = String::new();
        output.push_str("\nData Quality:\n");
        output.push_str(&format!(
            "  invalid={} duplicates={} legacy={} ignored-payments={} unclassified={}\n",
            quality.invalid,
            quality.duplicate,
            quality.legacy_version,
            quality.ignored_payment,
            quality.unclassified
        ));
        output
    }

    fn format_monthly(&self, aggregate: &Aggregate) -> String {
        if aggregate.monthly_series.is_empty() {
            return String::new();
        }
        let rows = aggregate
            .monthly_series
            .iter()
            .map(|bucket| {
                vec![
                    bucket.month.to_string(),
                    bucket.income.to_string(),
                    bucket.expense.to_string(),
                ]
            })
            .collect();
        format!(
            "\nMonthly series:\n{}\n",
            pretty_table(&["Month", "Income", "Expense"], rows)
        )
    }

    fn format_counterparties(&self, aggregate: &Aggregate) -> String {
        let mut output = String::new();
        if !aggregate.top_clients.is_empty() {
            output.push_str(&format!(
                "\nTop clients:\n{}\n",
                counterparty_table(&aggregate.top_clients)
            ));
        }
        if !aggregate.top_suppliers.is_empty() {
            output.push_str(&format!(
                "\nTop suppliers:\n{}\n",
                counterparty_table(&aggregate.top_suppliers)
            ));
        }
        output
    }

    fn format_invalid_details(&self, aggregate: &Aggregate) -> String {
        if aggregate.data_quality.invalid_files.is_empty() {
            return String::new();
        }
        let mut output = String::new();
        output.push_str("\nInvalid files:\n");
        for invalid in &aggregate.data_quality.invalid_files {
            output.push_str(&format!(
                "  {}  {} - {}\n",
                self.colorize("✗", "31"),
                invalid.path.display(),
                invalid.detail
            ));
        }
        output
    }

    fn format_debug_info(&self, aggregate: &Aggregate) -> String {
        let mut output = String::new();
        output.push_str("\nDebug Information:\n");
        let secs = aggregate.elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            aggregate.processed as f64 / secs
        } else {
            0.0
        };
        output.push_str(&format!("  Throughput: {:.1} files/sec\n", throughput));
        output.push_str(&format!(
            "  Duplicate uuids: {:?}\n",
            aggregate.data_quality.duplicate_uuids
        ));
        output.push_str(&format!(
            "  Legacy uuids: {:?}\n",
            aggregate.data_quality.legacy_uuids
        ));
        output
    }
}

fn counterparty_table(ranked: &[CounterpartyTotal]) -> Table {
    let rows = ranked
        .iter()
        .map(|c| {
            vec![
                c.tax_id.clone(),
                c.name.clone().unwrap_or_default(),
                c.total.to_string(),
            ]
        })
        .collect();
    pretty_table(&["RFC", "Name", "Total"], rows)
}

fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(headers.iter().map(|h| Cell::new(*h)));
    for row in rows {
        table.add_row(row.into_iter().map(Cell::new));
    }
    table
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PartialAggregate;

    fn empty_aggregate() -> Aggregate {
        PartialAggregate::new().finalize(0, false, Duration::from_millis(100))
    }

    #[test]
    fn test_normal_report_has_sections() {
        let output = Output::new(VerbosityLevel::Normal);
        let formatted = output.format_results(&empty_aggregate());
        assert!(formatted.contains("Batch Summary:"));
        assert!(formatted.contains("KPIs:"));
        assert!(formatted.contains("Data Quality:"));
    }

    #[test]
    fn test_quiet_silent_when_clean() {
        let output = Output::new(VerbosityLevel::Quiet);
        assert!(output.format_results(&empty_aggregate()).is_empty());
    }

    #[test]
    fn test_partial_run_flagged() {
        let aggregate = PartialAggregate::new().finalize(5, true, Duration::ZERO);
        let output = Output::new(VerbosityLevel::Normal);
        assert!(output.format_results(&aggregate).contains("PARTIAL RUN"));
        assert!(output.format_oneline(&aggregate).contains("(partial)"));
    }

    #[test]
    fn test_oneline_counters() {
        let output = Output::new(VerbosityLevel::Normal);
        let line = output.format_oneline(&empty_aggregate());
        assert!(line.contains("processed=0"));
        assert!(line.contains("net=0"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(2)), "2.00s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30.0s");
    }
}
