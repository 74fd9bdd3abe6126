use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, EsgConfig};
use crate::services::cache::{FileSnapshotStore, SnapshotStore, SourceKey};
use crate::services::insights::{
    format_thousands, insight_request, invoice_insights, mini_report, InvoiceStats, MiniReport,
};
use crate::services::normalizer::{normalize_invoice_payload, normalize_metrics};
use crate::services::query::{query, InvoiceQuery, SortOrder, DEFAULT_PAGE_SIZE};
use crate::services::refresh::{RefreshCoordinator, RefreshOutcome, SnapshotView};
use crate::services::retriever::FallbackRetriever;
use crate::services::snapshot::SnapshotBuilder;
use crate::sources::{FileSource, HttpSource, LiveSource};
use crate::types::{EsgError, EsgMetrics, InvoiceRecord, RetrievalState, Snapshot};

/// Invoice-driven energy, water and carbon tracker
#[derive(Parser)]
#[command(name = "esgtrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.esgtrack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where live data comes from
#[derive(Args, Debug, Clone, Default)]
struct SourceArgs {
    /// API base URL (overrides config and ESGTRACK_API_URL)
    #[arg(long, conflicts_with = "input")]
    url: Option<String>,

    /// Directory or file of extracted invoice JSON
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate local invoice files into a snapshot
    Snapshot {
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve live data, falling back to the cache
    Fetch {
        #[command(flatten)]
        source: SourceArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Environmental insights over the most recent invoices
    Insights {
        #[command(flatten)]
        source: SourceArgs,
        /// Number of recent invoices to consider
        #[arg(long)]
        last: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoice count, energy and estimated CO₂
    Stats {
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search and page through invoices
    Query {
        #[arg(long)]
        input: PathBuf,
        /// Free-text search
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        sort: SortOrder,
    },

    /// Manage cached snapshots
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum CacheAction {
    /// Remove all cached snapshots
    Clear,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Snapshot { input, json } => {
                let records = load_records(&input)?;
                let metrics = load_metrics(&input);
                let snapshot =
                    SnapshotBuilder::new(config.period_order()).build(&records, metrics.as_ref());
                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    print!("{}", render_snapshot(&snapshot));
                }
                Ok(())
            }
            Commands::Fetch { source, json } => {
                let retriever = Arc::new(build_retriever(&config, &source)?);
                let coordinator =
                    RefreshCoordinator::new(retriever, SnapshotBuilder::new(config.period_order()));
                let outcome = coordinator.refresh().await?;
                if !matches!(outcome, RefreshOutcome::Applied(_)) {
                    anyhow::bail!("refresh did not complete: {:?}", outcome);
                }
                let view = coordinator.current();
                if json {
                    println!("{}", serde_json::to_string_pretty(&fetch_json(&view))?);
                } else {
                    print!("{}", render_view(&view));
                }
                Ok(())
            }
            Commands::Insights { source, last, json } => {
                let retriever = build_retriever(&config, &source)?;
                let token = CancellationToken::new();
                let last_n = last.unwrap_or(config.insights.last_n);
                let thresholds = config.thresholds();

                let invoices = retriever.retrieve_invoices(&token).await?;
                let metrics = retriever.retrieve_metrics(&token).await?;
                let records = invoices.data;
                let metrics = (metrics.state != RetrievalState::NoData).then_some(metrics.data);

                let baseline = invoice_insights(&records, last_n, &thresholds);
                let snapshot = SnapshotBuilder::new(config.period_order())
                    .build(&records, metrics.as_ref());
                let company = single_company(&records);
                let payload =
                    insight_request(company.as_deref(), &snapshot, metrics.as_ref(), &baseline);

                let result = retriever
                    .retrieve_insights(&payload, || baseline.clone(), &token)
                    .await?;
                let report = mini_report(metrics.as_ref(), &baseline);

                if json {
                    let out = serde_json::json!({
                        "metrics": baseline.metrics,
                        "insights": result.insights,
                        "live": result.live,
                        "timestamp": result.timestamp,
                        "report": report,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                } else {
                    let origin = if result.live { "live" } else { "local" };
                    println!("Insights ({}, last {} invoices):", origin, last_n);
                    for line in &result.insights {
                        println!("  - {}", line);
                    }
                    print!("{}", render_report(&report));
                }
                Ok(())
            }
            Commands::Stats { input, json } => {
                let records = load_records(&input)?;
                let stats = InvoiceStats::from_records(&records, None);
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    println!("Invoices:          {}", stats.count);
                    println!(
                        "Total energy:      {} kWh",
                        format_thousands(stats.total_energy_kwh, 0)
                    );
                    println!(
                        "Estimated CO₂:     {} tCO₂e",
                        format_thousands(stats.estimated_co2_tonnes, 1)
                    );
                    println!("Last updated:      {}", stats.last_updated.to_rfc3339());
                }
                Ok(())
            }
            Commands::Query {
                input,
                q,
                company,
                page,
                page_size,
                sort,
            } => {
                let records = load_records(&input)?;
                let request = InvoiceQuery {
                    q,
                    company,
                    page,
                    page_size,
                    sort,
                };
                let page = query(&records, &request)?;
                println!("{}", serde_json::to_string_pretty(&page)?);
                Ok(())
            }
            Commands::Cache {
                action: CacheAction::Clear,
            } => {
                let store = snapshot_store(&config)?;
                for key in [SourceKey::Invoices, SourceKey::Metrics] {
                    store.clear(key.as_str()).await?;
                }
                println!("Cleared cache in {}", store.cache_dir().display());
                Ok(())
            }
        }
    }
}

fn snapshot_store(config: &EsgConfig) -> anyhow::Result<FileSnapshotStore> {
    match &config.cache.dir {
        Some(dir) => Ok(FileSnapshotStore::with_cache_dir(dir.clone())),
        None => Ok(FileSnapshotStore::new()?),
    }
}

fn build_retriever(config: &EsgConfig, args: &SourceArgs) -> anyhow::Result<FallbackRetriever> {
    let source: Arc<dyn LiveSource> = match (&args.input, &args.url) {
        (Some(input), _) => Arc::new(FileSource::new(input)),
        (None, url) => {
            let mut source_config = config.source.clone();
            if let Some(url) = url {
                source_config.base_url = Some(url.clone());
            }
            Arc::new(
                HttpSource::from_config(&source_config)
                    .context("no live source: pass --input or --url, or set source.base_url")?,
            )
        }
    };
    Ok(FallbackRetriever::new(source, Arc::new(snapshot_store(config)?)))
}

/// Normalized records from local files; an empty directory yields none
fn load_records(input: &Path) -> anyhow::Result<Vec<InvoiceRecord>> {
    let payload = FileSource::new(input).load_invoices()?;
    match normalize_invoice_payload(&payload) {
        Ok(records) => Ok(records),
        Err(EsgError::Empty(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn load_metrics(input: &Path) -> Option<EsgMetrics> {
    FileSource::new(input)
        .load_metrics()
        .and_then(|value| normalize_metrics(&value))
        .ok()
}

/// The company name when every record belongs to the same one
fn single_company(records: &[InvoiceRecord]) -> Option<String> {
    let first = records.first()?;
    records
        .iter()
        .all(|r| r.company_name == first.company_name)
        .then(|| first.company_name.clone())
}

fn render_report(report: &MiniReport) -> String {
    let mut out = String::from("\nReport:\n");
    let _ = writeln!(out, "  Baseline:    {}", report.baseline);
    let _ = writeln!(out, "  Benchmark:   {}", report.benchmark);
    let _ = writeln!(out, "  Performance: {}", report.performance_vs_benchmark);
    out.push_str("  Recommendations:\n");
    for (i, line) in report.recommendations.iter().enumerate() {
        let _ = writeln!(out, "    {}. {}", i + 1, line);
    }
    out
}

fn fetch_json(view: &SnapshotView) -> serde_json::Value {
    serde_json::json!({
        "state": view.state.as_str(),
        "metrics_state": view.metrics_state.as_str(),
        "captured_at": view.captured_at,
        "cache_warning": view.cache_warning,
        "snapshot": view.snapshot,
    })
}

fn render_view(view: &SnapshotView) -> String {
    let mut out = String::new();
    let _ = write!(out, "Data: {}", view.state.as_str());
    if let Some(at) = view.captured_at {
        let _ = write!(out, " (captured {})", at.to_rfc3339());
    }
    out.push('\n');
    if let Some(warning) = &view.cache_warning {
        let _ = writeln!(out, "Cache warning: {:?}", warning);
    }
    out.push_str(&render_snapshot(&view.snapshot));
    out
}

fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    if snapshot.is_empty() {
        out.push_str("No invoice data\n");
        return out;
    }

    let t = &snapshot.totals;
    let _ = writeln!(out, "Invoices:    {}", snapshot.invoice_count);
    let _ = writeln!(out, "Energy:      {} kWh", format_thousands(t.energy, 0));
    let _ = writeln!(out, "Carbon:      {} tCO₂e", format_thousands(t.carbon, 2));
    let _ = writeln!(out, "Water:       {} m³", format_thousands(t.water, 0));
    let _ = writeln!(out, "Water cost:  R {}", format_thousands(t.water_cost, 2));
    if t.waste > 0.0 || t.fuel > 0.0 {
        let _ = writeln!(out, "Waste:       {}", format_thousands(t.waste, 1));
        let _ = writeln!(out, "Fuel:        {}", format_thousands(t.fuel, 1));
    }

    if !snapshot.monthly.is_empty() {
        out.push_str("\nBy period:\n");
        for period in &snapshot.monthly {
            let _ = writeln!(
                out,
                "  {:<10} {:>14} kWh {:>10} tCO₂e {:>10} m³",
                period.period_label,
                format_thousands(period.energy_kwh, 0),
                format_thousands(period.carbon_tonnes, 2),
                format_thousands(period.water_m3, 0),
            );
        }
    }

    if !snapshot.per_company.is_empty() {
        out.push_str("\nBy company:\n");
        for company in &snapshot.per_company {
            let _ = writeln!(
                out,
                "  {:<30} {:>14} kWh {:>10} tCO₂e",
                company.company_name,
                format_thousands(company.total_energy, 0),
                format_thousands(company.total_carbon, 2),
            );
        }
    }
    out
}
