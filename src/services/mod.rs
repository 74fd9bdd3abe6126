//! Services for normalization, aggregation, retrieval and refresh

pub mod aggregator;
pub mod cache;
pub mod dates;
pub mod emissions;
pub mod insights;
pub mod normalizer;
pub mod periods;
pub mod query;
pub mod refresh;
pub mod resolver;
pub mod retriever;
pub mod snapshot;

pub use aggregator::{Aggregation, Aggregator};
pub use cache::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SourceKey};
pub use normalizer::{normalize_invoice_payload, normalize_metrics, normalize_record};
pub use periods::PeriodOrder;
pub use query::{query, InvoiceQuery, QueryPage, SortOrder};
pub use refresh::{RefreshCoordinator, RefreshOutcome, SnapshotView};
pub use retriever::{FallbackRetriever, Retrieval};
pub use snapshot::SnapshotBuilder;
