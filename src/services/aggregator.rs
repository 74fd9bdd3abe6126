//! Aggregator service for company and period statistics

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::services::periods::{normalize_label, PeriodOrder};
use crate::types::{CompanyAggregate, InvoiceRecord, PeriodAggregate, UsageTotals};

/// Result of one aggregation pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation {
    pub totals: UsageTotals,
    /// Ordered by company name
    pub per_company: Vec<CompanyAggregate>,
    /// Ordered canonically by period label
    pub monthly: Vec<PeriodAggregate>,
}

/// Aggregator for computing usage statistics
pub struct Aggregator;

impl Aggregator {
    /// Full pass: totals, per-company and monthly rows.
    ///
    /// Output depends only on the input sequence; nothing is carried between
    /// calls.
    pub fn aggregate(records: &[InvoiceRecord], order: &PeriodOrder) -> Aggregation {
        Aggregation {
            totals: Self::total(records),
            per_company: Self::by_company(records, order),
            monthly: Self::monthly(records, order),
        }
    }

    /// Sum across all records
    pub fn total(records: &[InvoiceRecord]) -> UsageTotals {
        let mut totals = UsageTotals::default();
        for record in records {
            totals.add_record(record);
        }
        totals
    }

    /// Aggregate records by company name (sorted by name)
    pub fn by_company(records: &[InvoiceRecord], order: &PeriodOrder) -> Vec<CompanyAggregate> {
        let mut company_map: BTreeMap<&str, CompanyAggregate> = BTreeMap::new();

        for record in records {
            company_map
                .entry(record.company_name.as_str())
                .or_insert_with(|| CompanyAggregate::new(record.company_name.as_str()))
                .add_record(record);
        }

        company_map
            .into_values()
            .map(|mut company| {
                order.sort_by_label(&mut company.periods, |p| p.period_label.as_str());
                company
            })
            .collect()
    }

    /// Aggregate period entries by label, in canonical period order.
    ///
    /// Labels that differ only in case or separators ("Oct-26", "oct 26")
    /// share a row; the first spelling seen is kept. Records without a period
    /// history have no label and do not contribute here.
    pub fn monthly(records: &[InvoiceRecord], order: &PeriodOrder) -> Vec<PeriodAggregate> {
        let mut rows: Vec<PeriodAggregate> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for period in records.iter().flat_map(|r| r.period_history.iter()) {
            let label = period.period_label.trim();
            let key = normalize_label(label);
            let index = *index_by_key.entry(key).or_insert_with(|| {
                rows.push(PeriodAggregate::new(label));
                rows.len() - 1
            });
            rows[index].add(period);
        }

        order.sort_by_label(&mut rows, |row| row.period_label.as_str());
        rows
    }

    /// The `n` most recent records.
    ///
    /// Sorted by invoice date descending; undated records count as the epoch.
    /// Equal dates are broken by descending input index, so the later upload
    /// wins.
    pub fn latest(records: &[InvoiceRecord], n: usize) -> Vec<&InvoiceRecord> {
        Self::latest_indices(records)
            .into_iter()
            .take(n)
            .map(|index| &records[index])
            .collect()
    }

    /// Input indices in "latest first" order
    pub fn latest_indices(records: &[InvoiceRecord]) -> Vec<usize> {
        // NaiveDate::default() is the Unix epoch
        let undated = NaiveDate::default();
        let mut indices: Vec<usize> = (0..records.len()).collect();
        indices.sort_by(|&a, &b| {
            let date_a = records[a].invoice_date.unwrap_or(undated);
            let date_b = records[b].invoice_date.unwrap_or(undated);
            date_b.cmp(&date_a).then(b.cmp(&a))
        });
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::emissions::EMISSION_FACTOR_T_PER_KWH;
    use crate::types::PeriodUsage;

    fn make_record(company: &str, periods: &[(&str, f64)]) -> InvoiceRecord {
        let mut record = InvoiceRecord::new(company, format!("{}.json", company));
        record.period_history = periods
            .iter()
            .map(|(label, energy)| PeriodUsage::new(*label, *energy, 1.0, 2.0, 10.0, None))
            .collect();
        record
    }

    fn dated(filename: &str, date: Option<(i32, u32, u32)>) -> InvoiceRecord {
        let mut record = InvoiceRecord::new("Acme", filename);
        record.invoice_date = date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        record
    }

    // ========== aggregate() tests ==========

    #[test]
    fn test_aggregate_empty() {
        let result = Aggregator::aggregate(&[], &PeriodOrder::default());
        assert_eq!(result.totals, UsageTotals::default());
        assert!(result.per_company.is_empty());
        assert!(result.monthly.is_empty());
    }

    #[test]
    fn test_two_invoices_same_company() {
        let records = vec![
            make_record("Acme", &[("Jan-26", 1000.0)]),
            make_record("Acme", &[("Feb-26", 1000.0)]),
        ];

        let result = Aggregator::aggregate(&records, &PeriodOrder::default());

        assert_eq!(result.totals.energy, 2000.0);
        assert_eq!(result.per_company.len(), 1);
        assert_eq!(result.per_company[0].invoice_count, 2);
        for period in &result.per_company[0].periods {
            assert!((period.carbon_tonnes - 1000.0 * EMISSION_FACTOR_T_PER_KWH).abs() < 1e-12);
        }
    }

    #[test]
    fn test_two_invoices_different_companies() {
        let records = vec![
            make_record("Beta", &[("Jan-26", 1000.0)]),
            make_record("Acme", &[("Jan-26", 1000.0)]),
        ];

        let result = Aggregator::aggregate(&records, &PeriodOrder::default());

        assert_eq!(result.totals.energy, 2000.0);
        let names: Vec<&str> = result
            .per_company
            .iter()
            .map(|c| c.company_name.as_str())
            .collect();
        assert_eq!(names, vec!["Acme", "Beta"]);
        assert_eq!(result.monthly.len(), 1);
        assert_eq!(result.monthly[0].energy_kwh, 2000.0);
        assert_eq!(result.monthly[0].count, 2);
    }

    #[test]
    fn test_per_company_partitions_totals() {
        let records = vec![
            make_record("Acme", &[("Oct-26", 120.5), ("Nov-26", 80.0)]),
            make_record("Beta", &[("Oct-26", 999.0)]),
            make_record("Acme", &[("Dec-26", 1.25)]),
            make_record("Gamma", &[]),
        ];

        let result = Aggregator::aggregate(&records, &PeriodOrder::default());

        let energy: f64 = result.per_company.iter().map(|c| c.total_energy).sum();
        let carbon: f64 = result.per_company.iter().map(|c| c.total_carbon).sum();
        let count: u64 = result.per_company.iter().map(|c| c.invoice_count).sum();
        assert!((energy - result.totals.energy).abs() < 1e-9);
        assert!((carbon - result.totals.carbon).abs() < 1e-9);
        assert_eq!(count, result.totals.invoice_count);
    }

    #[test]
    fn test_invoice_level_totals_without_history() {
        let mut record = InvoiceRecord::new("Acme", "acme.json");
        record.total_energy_kwh = Some(500.0);
        record.total_water_m3 = Some(12.0);

        let result = Aggregator::aggregate(&[record], &PeriodOrder::default());

        assert_eq!(result.totals.energy, 500.0);
        assert_eq!(result.totals.water, 12.0);
        assert!(result.monthly.is_empty());
        assert!(result.totals.energy.is_finite() && result.totals.water_cost == 0.0);
    }

    // ========== monthly() tests ==========

    #[test]
    fn test_monthly_canonical_order_regardless_of_input() {
        let records = vec![
            make_record("Acme", &[("Mar-26", 6.0), ("Jan-26", 4.0), ("Nov-26", 2.0)]),
            make_record("Beta", &[("Feb-26", 5.0), ("Oct-26", 1.0), ("Dec-26", 3.0)]),
        ];

        let result = Aggregator::monthly(&records, &PeriodOrder::default());

        let labels: Vec<&str> = result.iter().map(|r| r.period_label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Oct-26", "Nov-26", "Dec-26", "Jan-26", "Feb-26", "Mar-26"]
        );
        let energy: Vec<f64> = result.iter().map(|r| r.energy_kwh).collect();
        assert_eq!(energy, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_monthly_merges_label_spellings() {
        let records = vec![
            make_record("Acme", &[("Oct-26", 1.0)]),
            make_record("Beta", &[(" oct 26", 2.0)]),
        ];

        let result = Aggregator::monthly(&records, &PeriodOrder::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].period_label, "Oct-26");
        assert_eq!(result[0].energy_kwh, 3.0);
    }

    #[test]
    fn test_company_periods_sorted_canonically() {
        let records = vec![
            make_record("Acme", &[("Feb-26", 1.0)]),
            make_record("Acme", &[("Oct-26", 1.0)]),
        ];

        let result = Aggregator::by_company(&records, &PeriodOrder::default());

        let labels: Vec<&str> = result[0]
            .periods
            .iter()
            .map(|p| p.period_label.as_str())
            .collect();
        assert_eq!(labels, vec!["Oct-26", "Feb-26"]);
    }

    // ========== latest() tests ==========

    #[test]
    fn test_latest_sorts_by_date_descending() {
        let records = vec![
            dated("a", Some((2026, 1, 1))),
            dated("b", Some((2026, 3, 1))),
            dated("c", Some((2026, 2, 1))),
        ];

        let result = Aggregator::latest(&records, 2);

        let names: Vec<&str> = result.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_latest_equal_dates_larger_index_first() {
        let records = vec![
            dated("first", Some((2026, 3, 15))),
            dated("second", Some((2026, 3, 15))),
        ];

        let result = Aggregator::latest(&records, 1);

        assert_eq!(result[0].filename, "second");
    }

    #[test]
    fn test_latest_undated_sorts_oldest() {
        let records = vec![
            dated("undated-1", None),
            dated("dated", Some((2001, 1, 1))),
            dated("undated-2", None),
        ];

        let result = Aggregator::latest(&records, 3);

        let names: Vec<&str> = result.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["dated", "undated-2", "undated-1"]);
    }

    #[test]
    fn test_latest_window_larger_than_input() {
        let records = vec![dated("only", None)];
        assert_eq!(Aggregator::latest(&records, 6).len(), 1);
        assert!(Aggregator::latest(&[], 6).is_empty());
    }
}
