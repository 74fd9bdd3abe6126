//! Snapshot builder: aggregation output plus metric totals

use crate::services::aggregator::Aggregator;
use crate::services::periods::PeriodOrder;
use crate::types::{EsgMetrics, InvoiceRecord, Snapshot, SnapshotTotals};

/// Builds immutable [`Snapshot`]s from the active record set
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    order: PeriodOrder,
}

impl SnapshotBuilder {
    pub fn new(order: PeriodOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &PeriodOrder {
        &self.order
    }

    /// Energy, carbon and water come from the records; waste and fuel only
    /// exist in the metrics payload and are zero without one.
    pub fn build(&self, records: &[InvoiceRecord], metrics: Option<&EsgMetrics>) -> Snapshot {
        let aggregation = Aggregator::aggregate(records, &self.order);

        let totals = SnapshotTotals {
            energy: aggregation.totals.energy,
            carbon: aggregation.totals.carbon,
            water: aggregation.totals.water,
            water_cost: aggregation.totals.water_cost,
            waste: metrics.and_then(|m| m.waste).unwrap_or(0.0),
            fuel: metrics.and_then(|m| m.fuel).unwrap_or(0.0),
        };

        Snapshot {
            totals,
            monthly: aggregation.monthly,
            per_company: aggregation.per_company,
            invoice_count: aggregation.totals.invoice_count,
        }
    }
}
