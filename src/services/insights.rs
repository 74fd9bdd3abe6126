//! Invoice insights and stats
//!
//! Local, deterministic summaries over the most recent invoices. Used on its
//! own and as the fallback when the live insight source is unavailable.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::services::aggregator::Aggregator;
use crate::services::emissions::derive_carbon;
use crate::types::{EsgError, EsgMetrics, InvoiceRecord, Result, Snapshot};

/// Default size of the "last N invoices" window
pub const DEFAULT_LAST_N: usize = 6;

static BULLET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\-\*\d\.\)\s•]+").expect("valid regex"));

/// Advisory thresholds over the insight window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsightThresholds {
    pub high_energy_kwh: f64,
    pub high_water_m3: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            high_energy_kwh: 100_000.0,
            high_water_m3: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InsightMetrics {
    pub total_energy_kwh: f64,
    pub estimated_co2_tonnes: f64,
    pub total_water_m3: f64,
    pub total_water_cost: f64,
    pub total_charges: f64,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceInsights {
    pub metrics: InsightMetrics,
    pub insights: Vec<String>,
}

/// Summarize the `last_n` most recent invoices
pub fn invoice_insights(
    records: &[InvoiceRecord],
    last_n: usize,
    thresholds: &InsightThresholds,
) -> InvoiceInsights {
    let recent = Aggregator::latest(records, last_n);

    let mut metrics = InsightMetrics {
        invoice_count: recent.len(),
        ..Default::default()
    };
    for record in &recent {
        metrics.total_energy_kwh += record.energy_kwh();
        metrics.estimated_co2_tonnes += record.carbon_tonnes();
        metrics.total_water_m3 += record.water_m3();
        metrics.total_water_cost += record.water_cost();
        metrics.total_charges += record.charges();
    }

    let tariff = if metrics.total_energy_kwh > 0.0 {
        format!(
            "Average tariff: R {:.2}/kWh",
            metrics.total_charges / metrics.total_energy_kwh
        )
    } else {
        "No energy data".to_string()
    };

    let mut insights = vec![
        format!(
            "Total energy consumption from invoices: {} kWh",
            format_thousands(metrics.total_energy_kwh, 0)
        ),
        format!(
            "Estimated carbon emissions: {} tCO₂e",
            format_thousands(metrics.estimated_co2_tonnes, 1)
        ),
        format!(
            "Total water usage: {} m³",
            format_thousands(metrics.total_water_m3, 0)
        ),
        format!(
            "Total water cost: R {}",
            format_thousands(metrics.total_water_cost, 2)
        ),
        tariff,
    ];

    if metrics.total_energy_kwh > thresholds.high_energy_kwh {
        insights.push(
            "High energy consumption detected. Consider an energy efficiency audit.".to_string(),
        );
    }
    if metrics.total_water_m3 > thresholds.high_water_m3 {
        insights
            .push("Significant water usage. Water conservation measures recommended.".to_string());
    }

    InvoiceInsights { metrics, insights }
}

/// Split an insight text blob into distinct lines without bullets/numbering
pub fn clean_lines(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    text.lines()
        .map(|line| BULLET_PREFIX.replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.clone()))
        .collect()
}

/// `1234567.891` with 2 decimals → `"1,234,567.89"`
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Derived insights, live or locally computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub insights: Vec<String>,
    /// True only when the live source derived the insights itself
    pub live: bool,
    pub timestamp: Option<String>,
}

impl InsightResult {
    pub fn local(insights: InvoiceInsights) -> Self {
        Self {
            insights: insights.insights,
            live: false,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Validate a live insight response.
///
/// Accepts `{insights: [..] | "text", live?, timestamp?}` or a bare list.
pub fn parse_insight_response(value: &Value) -> Result<InsightResult> {
    let (raw, live, timestamp) = match value {
        Value::Object(map) => (
            map.get("insights")
                .ok_or_else(|| EsgError::Shape("insight response has no insights".into()))?,
            // Upstream reports `live: false` when it served canned text
            map.get("live").and_then(Value::as_bool).unwrap_or(true),
            map.get("timestamp").and_then(Value::as_str).map(String::from),
        ),
        Value::Array(_) => (value, true, None),
        _ => return Err(EsgError::Shape("insight response must be an object".into())),
    };

    let insights: Vec<String> = match raw {
        Value::Array(items) => {
            let text: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            clean_lines(&text.join("\n"))
        }
        Value::String(text) => clean_lines(text),
        _ => return Err(EsgError::Shape("insights must be a list or text".into())),
    };

    if insights.is_empty() {
        return Err(EsgError::Empty("insights".into()));
    }
    Ok(InsightResult {
        insights,
        live,
        timestamp,
    })
}

/// Request body for the live insight source
pub fn insight_request(
    company_name: Option<&str>,
    snapshot: &Snapshot,
    metrics: Option<&EsgMetrics>,
    baseline: &InvoiceInsights,
) -> Value {
    json!({
        "company_name": company_name,
        "summary": {
            "totals": snapshot.totals,
            "invoice_count": snapshot.invoice_count,
        },
        "metrics": metrics,
        "invoice_baseline": baseline.metrics,
    })
}

/// Renewable share (percent) below which the mini report flags a gap
pub const RENEWABLE_SHARE_THRESHOLD: f64 = 20.0;

const BENCHMARK_TEXT: &str = "Typical peer band (indicative): renewable share 20–35%, steady \
     reductions in energy and water intensity over a 3–5 year horizon.";

const PERFORMANCE_TEXT: &str = "Performance vs benchmark cannot be precisely assessed without \
     sector and revenue/production denominators, but invoice-based energy/water baselines can \
     be used to track trend and intensity once denominators are provided.";

const BASE_RECOMMENDATIONS: [&str; 4] = [
    "Confirm monthly baselines from invoices (energy kWh, water m³, charges) and lock the \
     reporting boundary (sites/meters).",
    "Implement demand management and efficiency actions at peak-consumption sites (load \
     shifting, HVAC optimisation, VSDs).",
    "Improve water efficiency through leak detection, metering, and reuse where feasible.",
    "Start a renewable pathway: on-site solar PV feasibility + green procurement options.",
];

/// Baseline, benchmark and recommendations computed without the live source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniReport {
    pub baseline: String,
    pub benchmark: String,
    pub performance_vs_benchmark: String,
    pub recommendations: Vec<String>,
}

pub fn mini_report(metrics: Option<&EsgMetrics>, baseline: &InvoiceInsights) -> MiniReport {
    let totals = &baseline.metrics;
    let baseline_text = if totals.invoice_count == 0 {
        "Baseline compiled from available ESG snapshot; no invoice baseline available.".to_string()
    } else {
        format!(
            "Baseline compiled from available ESG snapshot and {} invoices: {} kWh, {} m³ water, \
             R {} charges.",
            totals.invoice_count,
            format_thousands(totals.total_energy_kwh, 0),
            format_thousands(totals.total_water_m3, 0),
            format_thousands(totals.total_charges, 2),
        )
    };

    let mut performance = PERFORMANCE_TEXT.to_string();
    let mut recommendations: Vec<String> =
        BASE_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect();

    if let Some(share) = metrics
        .and_then(|m| m.renewable_share)
        .filter(|share| *share < RENEWABLE_SHARE_THRESHOLD)
    {
        performance = format!(
            "Renewable share appears below a 20% indicative peer threshold (current: {:.1}%).",
            share
        );
        recommendations.insert(
            0,
            "Prioritise increasing renewable share toward 20–25% through solar PV and/or \
             wheeling where available."
                .to_string(),
        );
    }

    MiniReport {
        baseline: baseline_text,
        benchmark: BENCHMARK_TEXT.to_string(),
        performance_vs_benchmark: performance,
        recommendations,
    }
}

/// Collection-level stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub count: usize,
    pub total_energy_kwh: f64,
    pub estimated_co2_tonnes: f64,
    pub last_updated: DateTime<Utc>,
}

impl InvoiceStats {
    /// `captured_at` is the snapshot time of the records; now when unknown
    pub fn from_records(records: &[InvoiceRecord], captured_at: Option<DateTime<Utc>>) -> Self {
        let total_energy_kwh: f64 = records.iter().map(InvoiceRecord::energy_kwh).sum();
        Self {
            count: records.len(),
            total_energy_kwh,
            estimated_co2_tonnes: derive_carbon(total_energy_kwh),
            last_updated: captured_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeriodUsage;
    use chrono::NaiveDate;

    fn record(day: u32, energy: f64, water: f64, charges: f64) -> InvoiceRecord {
        let mut record = InvoiceRecord::new("Acme", format!("{}.pdf", day));
        record.invoice_date = NaiveDate::from_ymd_opt(2026, 3, day);
        record.period_history = vec![PeriodUsage::new("Mar-26", energy, water, water * 10.0, charges, None)];
        record
    }

    // ========== invoice_insights ==========

    #[test]
    fn test_insights_over_last_n() {
        let records = vec![
            record(1, 999_999.0, 0.0, 0.0), // oldest, outside the window
            record(2, 1000.0, 10.0, 2500.0),
            record(3, 1000.0, 10.0, 2500.0),
        ];

        let result = invoice_insights(&records, 2, &InsightThresholds::default());

        assert_eq!(result.metrics.invoice_count, 2);
        assert_eq!(result.metrics.total_energy_kwh, 2000.0);
        assert!((result.metrics.estimated_co2_tonnes - 1.98).abs() < 1e-9);
        assert_eq!(
            result.insights,
            vec![
                "Total energy consumption from invoices: 2,000 kWh",
                "Estimated carbon emissions: 2.0 tCO₂e",
                "Total water usage: 20 m³",
                "Total water cost: R 200.00",
                "Average tariff: R 2.50/kWh",
            ]
        );
    }

    #[test]
    fn test_tariff_uses_invoice_charges_when_periods_have_none() {
        let mut record = InvoiceRecord::new("Acme", "acme.pdf");
        record.invoice_date = NaiveDate::from_ymd_opt(2026, 10, 31);
        record.current_charges = 12_500.0;
        record.period_history = vec![PeriodUsage::new("Oct-26", 5000.0, 0.0, 0.0, None, None)];

        let result = invoice_insights(&[record], DEFAULT_LAST_N, &InsightThresholds::default());

        assert_eq!(result.metrics.total_charges, 12_500.0);
        assert!(result
            .insights
            .contains(&"Average tariff: R 2.50/kWh".to_string()));
    }

    #[test]
    fn test_insights_threshold_advisories() {
        let records = vec![record(1, 150_000.0, 12_000.0, 0.0)];

        let result = invoice_insights(&records, DEFAULT_LAST_N, &InsightThresholds::default());

        assert!(result.insights.iter().any(|l| l.contains("energy efficiency audit")));
        assert!(result.insights.iter().any(|l| l.contains("Water conservation")));
    }

    #[test]
    fn test_insights_no_energy() {
        let result = invoice_insights(&[], DEFAULT_LAST_N, &InsightThresholds::default());
        assert_eq!(result.metrics.invoice_count, 0);
        assert!(result.insights.contains(&"No energy data".to_string()));
    }

    // ========== clean_lines ==========

    #[test]
    fn test_clean_lines_strips_bullets_and_dedups() {
        let text = "1. Reduce peak demand\n- Track water cost\n\n* Reduce peak demand\n2) Install PV";
        assert_eq!(
            clean_lines(text),
            vec!["Reduce peak demand", "Track water cost", "Install PV"]
        );
    }

    // ========== format_thousands ==========

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0, 0), "0");
        assert_eq!(format_thousands(999.0, 0), "999");
        assert_eq!(format_thousands(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_thousands(-1500.0, 1), "-1,500.0");
        assert_eq!(format_thousands(-0.01, 0), "0");
    }

    // ========== parse_insight_response ==========

    #[test]
    fn test_parse_live_insights() {
        let value = json!({
            "metrics": {},
            "insights": ["1. Shift load", "2. Shift load", "Track water"],
            "live": true,
            "timestamp": "2026-03-15T10:00:00Z"
        });

        let result = parse_insight_response(&value).unwrap();

        assert!(result.live);
        assert_eq!(result.insights, vec!["Shift load", "Track water"]);
        assert_eq!(result.timestamp.as_deref(), Some("2026-03-15T10:00:00Z"));
    }

    #[test]
    fn test_parse_upstream_fallback_not_live() {
        let value = json!({"insights": ["static fallback line"], "live": false});

        let result = parse_insight_response(&value).unwrap();

        assert!(!result.live);
        assert_eq!(result.insights, vec!["static fallback line"]);
    }

    #[test]
    fn test_parse_text_insights() {
        let result = parse_insight_response(&json!({"insights": "- a\n- b"})).unwrap();
        assert_eq!(result.insights, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_insight_errors() {
        assert!(matches!(
            parse_insight_response(&json!({"error": "x"})),
            Err(EsgError::Shape(_))
        ));
        assert!(matches!(
            parse_insight_response(&json!({"insights": []})),
            Err(EsgError::Empty(_))
        ));
        assert!(parse_insight_response(&json!(7)).is_err());
    }

    // ========== mini_report ==========

    #[test]
    fn test_mini_report_flags_low_renewable_share() {
        let baseline = invoice_insights(
            &[record(2, 1000.0, 10.0, 2500.0)],
            DEFAULT_LAST_N,
            &InsightThresholds::default(),
        );
        let metrics = EsgMetrics {
            renewable_share: Some(12.5),
            ..Default::default()
        };

        let report = mini_report(Some(&metrics), &baseline);

        assert_eq!(
            report.performance_vs_benchmark,
            "Renewable share appears below a 20% indicative peer threshold (current: 12.5%)."
        );
        assert_eq!(report.recommendations.len(), 5);
        assert!(report.recommendations[0].starts_with("Prioritise increasing renewable share"));
        assert!(report.baseline.contains("1 invoices: 1,000 kWh"));
    }

    #[test]
    fn test_mini_report_without_low_share() {
        let baseline = invoice_insights(&[], DEFAULT_LAST_N, &InsightThresholds::default());
        let healthy = EsgMetrics {
            renewable_share: Some(28.0),
            ..Default::default()
        };

        for metrics in [None, Some(&healthy)] {
            let report = mini_report(metrics, &baseline);
            assert_eq!(report.performance_vs_benchmark, PERFORMANCE_TEXT);
            assert_eq!(report.recommendations.len(), 4);
            assert!(report.baseline.contains("no invoice baseline"));
        }
    }

    // ========== InvoiceStats ==========

    #[test]
    fn test_stats_from_records() {
        let captured = DateTime::parse_from_rfc3339("2026-03-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let records = vec![record(1, 1000.0, 0.0, 0.0), record(2, 3000.0, 0.0, 0.0)];

        let stats = InvoiceStats::from_records(&records, Some(captured));

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_energy_kwh, 4000.0);
        assert!((stats.estimated_co2_tonnes - 3.96).abs() < 1e-9);
        assert_eq!(stats.last_updated, captured);
    }
}
