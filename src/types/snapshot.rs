//! Snapshot types handed to presentation and reporting layers

use serde::{Deserialize, Serialize};

use super::{CompanyAggregate, PeriodAggregate};

/// Which tier of the fallback chain produced the active data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalState {
    /// Live source answered with a valid, non-empty payload
    LiveOk,
    /// Live source failed; persisted cache served instead
    LiveFailedUseCache,
    /// Neither tier had data; empty default served
    NoData,
}

impl RetrievalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveOk => "live",
            Self::LiveFailedUseCache => "cache",
            Self::NoData => "no data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTotals {
    pub energy: f64,
    pub carbon: f64,
    pub water: f64,
    pub water_cost: f64,
    pub waste: f64,
    pub fuel: f64,
}

/// Immutable, fully aggregated result structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub totals: SnapshotTotals,
    pub monthly: Vec<PeriodAggregate>,
    pub per_company: Vec<CompanyAggregate>,
    pub invoice_count: u64,
}

impl Snapshot {
    /// Well-formed zero-record snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.invoice_count == 0
    }

    /// Chart-ready parallel vectors in canonical period order
    pub fn series(&self) -> ChartSeries {
        let mut series = ChartSeries::default();
        for row in &self.monthly {
            series.labels.push(row.period_label.clone());
            series.energy.push(row.energy_kwh);
            series.carbon.push(row.carbon_tonnes);
            series.water.push(row.water_m3);
            series.water_cost.push(row.water_cost);
        }
        series
    }
}

/// Parallel label/value vectors for chart collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub energy: Vec<f64>,
    pub carbon: Vec<f64>,
    pub water: Vec<f64>,
    pub water_cost: Vec<f64>,
}
