//! Invoice, period and aggregate types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::services::emissions::{derive_carbon, resolve_carbon};

/// Placeholder company used when neither a name nor a filename is available
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// Where a period's carbon figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarbonSource {
    /// Computed from energy with the emission factor
    #[default]
    Derived,
    /// Supplied explicitly by the upstream extractor
    Reported,
}

/// One billing period's line items within an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodUsage {
    pub period_label: String,
    pub energy_kwh: f64,
    pub water_m3: f64,
    pub water_cost: f64,
    /// `None` when the period carries no charges of its own
    #[serde(default)]
    pub current_charges: Option<f64>,
    pub carbon_tonnes: f64,
    #[serde(default)]
    pub carbon_source: CarbonSource,
}

impl PeriodUsage {
    /// Build a period, deriving carbon unless the extractor reported it.
    pub fn new(
        period_label: impl Into<String>,
        energy_kwh: f64,
        water_m3: f64,
        water_cost: f64,
        current_charges: impl Into<Option<f64>>,
        reported_carbon: Option<f64>,
    ) -> Self {
        let carbon_source = if reported_carbon.is_some() {
            CarbonSource::Reported
        } else {
            CarbonSource::Derived
        };
        Self {
            period_label: period_label.into(),
            energy_kwh,
            water_m3,
            water_cost,
            current_charges: current_charges.into(),
            carbon_tonnes: resolve_carbon(energy_kwh, reported_carbon),
            carbon_source,
        }
    }
}

/// One billing document's normalized data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub company_name: String,
    pub filename: String,
    pub invoice_date: Option<NaiveDate>,
    pub tax_invoice_id: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub current_charges: f64,
    pub amount_due: f64,
    #[serde(default)]
    pub period_history: Vec<PeriodUsage>,
    /// Invoice-level aggregates, consulted only without a period history
    #[serde(default)]
    pub total_energy_kwh: Option<f64>,
    #[serde(default)]
    pub total_water_m3: Option<f64>,
    #[serde(default)]
    pub total_water_cost: Option<f64>,
    #[serde(default)]
    pub estimated_carbon_tonnes: Option<f64>,
}

impl InvoiceRecord {
    /// Minimal record with identity only (used by tests and the normalizer)
    pub fn new(company_name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            filename: filename.into(),
            invoice_date: None,
            tax_invoice_id: None,
            account_number: None,
            categories: Vec::new(),
            current_charges: 0.0,
            amount_due: 0.0,
            period_history: Vec::new(),
            total_energy_kwh: None,
            total_water_m3: None,
            total_water_cost: None,
            estimated_carbon_tonnes: None,
        }
    }

    pub fn has_history(&self) -> bool {
        !self.period_history.is_empty()
    }

    /// Energy in kWh; period sums are authoritative when a history exists
    pub fn energy_kwh(&self) -> f64 {
        if self.has_history() {
            self.period_history.iter().map(|p| p.energy_kwh).sum()
        } else {
            self.total_energy_kwh.unwrap_or(0.0)
        }
    }

    /// Carbon in tCO₂e; never mixes period sums with invoice-level figures
    pub fn carbon_tonnes(&self) -> f64 {
        if self.has_history() {
            self.period_history.iter().map(|p| p.carbon_tonnes).sum()
        } else {
            match self.estimated_carbon_tonnes {
                Some(reported) => reported,
                None => derive_carbon(self.energy_kwh()),
            }
        }
    }

    pub fn water_m3(&self) -> f64 {
        if self.has_history() {
            self.period_history.iter().map(|p| p.water_m3).sum()
        } else {
            self.total_water_m3.unwrap_or(0.0)
        }
    }

    pub fn water_cost(&self) -> f64 {
        if self.has_history() {
            self.period_history.iter().map(|p| p.water_cost).sum()
        } else {
            self.total_water_cost.unwrap_or(0.0)
        }
    }

    /// Charges from the periods that report them; the invoice-level figure
    /// when none does.
    pub fn charges(&self) -> f64 {
        let mut reported = self
            .period_history
            .iter()
            .filter_map(|p| p.current_charges)
            .peekable();
        if reported.peek().is_some() {
            reported.sum()
        } else {
            self.current_charges
        }
    }

    /// Stable identity: tax invoice id (else filename) plus invoice date.
    ///
    /// The id may fall back to an account number, so the date stays part of
    /// the key to keep successive bills of one account apart.
    pub fn dedup_key(&self) -> String {
        let date = self
            .invoice_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        match &self.tax_invoice_id {
            Some(id) => format!("tin:{}:{}", id, date),
            None => format!("file:{}:{}", self.filename, date),
        }
    }
}

/// Summed usage across a set of records
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub energy: f64,
    pub carbon: f64,
    pub water: f64,
    pub water_cost: f64,
    pub charges: f64,
    pub invoice_count: u64,
}

impl UsageTotals {
    pub fn add_record(&mut self, record: &InvoiceRecord) {
        self.energy += record.energy_kwh();
        self.carbon += record.carbon_tonnes();
        self.water += record.water_m3();
        self.water_cost += record.water_cost();
        self.charges += record.charges();
        self.invoice_count = self.invoice_count.saturating_add(1);
    }
}

/// Per-company aggregate, rebuilt on every aggregation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyAggregate {
    pub company_name: String,
    pub total_energy: f64,
    pub total_carbon: f64,
    pub total_water: f64,
    pub total_water_cost: f64,
    pub total_charges: f64,
    pub invoice_count: u64,
    /// Periods belonging to this company, in canonical period order
    pub periods: Vec<PeriodUsage>,
}

impl CompanyAggregate {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            total_energy: 0.0,
            total_carbon: 0.0,
            total_water: 0.0,
            total_water_cost: 0.0,
            total_charges: 0.0,
            invoice_count: 0,
            periods: Vec::new(),
        }
    }

    pub fn add_record(&mut self, record: &InvoiceRecord) {
        self.total_energy += record.energy_kwh();
        self.total_carbon += record.carbon_tonnes();
        self.total_water += record.water_m3();
        self.total_water_cost += record.water_cost();
        self.total_charges += record.charges();
        self.invoice_count = self.invoice_count.saturating_add(1);
        self.periods.extend(record.period_history.iter().cloned());
    }
}

/// One row of the monthly time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAggregate {
    pub period_label: String,
    pub energy_kwh: f64,
    pub carbon_tonnes: f64,
    pub water_m3: f64,
    pub water_cost: f64,
    pub current_charges: f64,
    pub count: u64,
}

impl PeriodAggregate {
    pub fn new(period_label: impl Into<String>) -> Self {
        Self {
            period_label: period_label.into(),
            energy_kwh: 0.0,
            carbon_tonnes: 0.0,
            water_m3: 0.0,
            water_cost: 0.0,
            current_charges: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, period: &PeriodUsage) {
        self.energy_kwh += period.energy_kwh;
        self.carbon_tonnes += period.carbon_tonnes;
        self.water_m3 += period.water_m3;
        self.water_cost += period.water_cost;
        self.current_charges += period.current_charges.unwrap_or(0.0);
        self.count = self.count.saturating_add(1);
    }
}

/// Normalized environmental metric payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EsgMetrics {
    pub carbon: Option<f64>,
    pub energy: Option<f64>,
    pub water: Option<f64>,
    pub waste: Option<f64>,
    pub fuel: Option<f64>,
    pub renewable_share: Option<f64>,
}

impl EsgMetrics {
    pub fn is_empty(&self) -> bool {
        self.carbon.is_none()
            && self.energy.is_none()
            && self.water.is_none()
            && self.waste.is_none()
            && self.fuel.is_none()
            && self.renewable_share.is_none()
    }
}

/// Persisted fallback state: a captured payload and its capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot<T> {
    pub captured_at: DateTime<Utc>,
    pub records: T,
}

impl<T> CacheSnapshot<T> {
    pub fn new(records: T) -> Self {
        Self {
            captured_at: Utc::now(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::emissions::EMISSION_FACTOR_T_PER_KWH;

    fn period(label: &str, energy: f64, reported: Option<f64>) -> PeriodUsage {
        PeriodUsage::new(label, energy, 10.0, 5.0, 100.0, reported)
    }

    #[test]
    fn test_period_derives_carbon() {
        let p = period("Jan-26", 1000.0, None);
        assert_eq!(p.carbon_source, CarbonSource::Derived);
        assert!((p.carbon_tonnes - 1000.0 * EMISSION_FACTOR_T_PER_KWH).abs() < 1e-12);
    }

    #[test]
    fn test_period_reported_carbon_wins() {
        let p = period("Jan-26", 1000.0, Some(7.5));
        assert_eq!(p.carbon_source, CarbonSource::Reported);
        assert_eq!(p.carbon_tonnes, 7.5);
    }

    #[test]
    fn test_history_is_authoritative_over_invoice_totals() {
        let mut record = InvoiceRecord::new("Acme", "acme.json");
        record.total_energy_kwh = Some(99_999.0);
        record.estimated_carbon_tonnes = Some(42.0);
        record.current_charges = 5000.0;
        record.period_history = vec![period("Jan-26", 100.0, None), period("Feb-26", 200.0, None)];

        assert_eq!(record.energy_kwh(), 300.0);
        assert!((record.carbon_tonnes() - 300.0 * EMISSION_FACTOR_T_PER_KWH).abs() < 1e-12);
        assert_eq!(record.water_m3(), 20.0);
        assert_eq!(record.charges(), 200.0);
    }

    #[test]
    fn test_invoice_charges_used_when_periods_report_none() {
        let mut record = InvoiceRecord::new("Acme", "acme.json");
        record.current_charges = 12_500.0;
        record.period_history = vec![PeriodUsage::new("Oct-26", 5000.0, 0.0, 0.0, None, None)];

        assert_eq!(record.charges(), 12_500.0);

        let mut company = CompanyAggregate::new("Acme");
        company.add_record(&record);
        assert_eq!(company.total_charges, 12_500.0);
    }

    #[test]
    fn test_invoice_totals_used_without_history() {
        let mut record = InvoiceRecord::new("Acme", "acme.json");
        record.total_energy_kwh = Some(2000.0);
        record.total_water_m3 = Some(30.0);
        record.current_charges = 750.0;

        assert_eq!(record.energy_kwh(), 2000.0);
        assert!((record.carbon_tonnes() - 2000.0 * EMISSION_FACTOR_T_PER_KWH).abs() < 1e-12);
        assert_eq!(record.water_m3(), 30.0);
        assert_eq!(record.water_cost(), 0.0);
        assert_eq!(record.charges(), 750.0);
    }

    #[test]
    fn test_estimated_carbon_used_without_history() {
        let mut record = InvoiceRecord::new("Acme", "acme.json");
        record.total_energy_kwh = Some(2000.0);
        record.estimated_carbon_tonnes = Some(3.0);
        assert_eq!(record.carbon_tonnes(), 3.0);
    }

    #[test]
    fn test_dedup_key_prefers_tax_invoice_id() {
        let mut record = InvoiceRecord::new("Acme", "a.json");
        record.tax_invoice_id = Some("TI-1".into());
        assert_eq!(record.dedup_key(), "tin:TI-1:");

        let mut undated = InvoiceRecord::new("Acme", "b.json");
        assert_eq!(undated.dedup_key(), "file:b.json:");
        undated.invoice_date = NaiveDate::from_ymd_opt(2026, 3, 15);
        assert_eq!(undated.dedup_key(), "file:b.json:2026-03-15");
    }

    #[test]
    fn test_metrics_is_empty() {
        assert!(EsgMetrics::default().is_empty());
        let metrics = EsgMetrics {
            waste: Some(1.0),
            ..Default::default()
        };
        assert!(!metrics.is_empty());
    }
}
