//! Invoice and metric payload normalization
//!
//! Turns loosely shaped extractor output into [`InvoiceRecord`]s and
//! [`EsgMetrics`]. Field-level problems (bad dates, non-numeric or negative
//! quantities) are recovered here: the field becomes `None`/zero and the
//! record is kept.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::services::dates::parse_date;
use crate::services::resolver::{
    period_history, resolve, resolve_str, resolve_str_list, resolve_top_level, Field,
};
use crate::types::{EsgError, EsgMetrics, InvoiceRecord, PeriodUsage, Result, UNKNOWN_COMPANY};

static FILE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(pdf|json|txt|csv)$").expect("valid regex"));

/// Keys under which an invoice payload may wrap its array
const INVOICE_ENVELOPE_KEYS: &[&str] = &["invoices", "items", "data"];

/// Derive a display name from an upload filename.
///
/// # Examples
/// ```
/// use esgtrack::services::normalizer::derive_company_from_filename;
///
/// assert_eq!(
///     derive_company_from_filename("dube_trade-port.pdf").as_deref(),
///     Some("Dube Trade Port")
/// );
/// assert_eq!(derive_company_from_filename("20260315.pdf"), None);
/// ```
pub fn derive_company_from_filename(filename: &str) -> Option<String> {
    let stem = FILE_EXTENSION.replace(filename.trim(), "");
    let words: Vec<String> = stem
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    // A bare document number is not a name
    if !words.iter().any(|w| w.chars().any(char::is_alphabetic)) {
        return None;
    }
    Some(words.join(" "))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Non-negative quantity at the top level of a period entry.
///
/// Negative values are a field-level parse failure and resolve to zero.
fn non_negative(entry: &Value, field: Field) -> f64 {
    match resolve_top_level(entry, field) {
        Some(value) if value < 0.0 => {
            tracing::debug!(?field, value, "negative quantity treated as zero");
            0.0
        }
        Some(value) => value,
        None => 0.0,
    }
}

fn normalize_period(entry: &Value, index: usize) -> Option<PeriodUsage> {
    if !entry.is_object() {
        tracing::debug!(index, "skipping non-object period entry");
        return None;
    }

    let label =
        resolve_str(entry, Field::PeriodLabel).unwrap_or_else(|| format!("Period {}", index + 1));
    let reported_carbon = resolve_top_level(entry, Field::CarbonTonnes).filter(|c| *c >= 0.0);

    Some(PeriodUsage::new(
        label,
        non_negative(entry, Field::EnergyKwh),
        non_negative(entry, Field::WaterM3),
        non_negative(entry, Field::WaterCost),
        resolve_top_level(entry, Field::CurrentCharges),
        reported_carbon,
    ))
}

/// Normalize one raw invoice object. Never fails: missing identity falls
/// back to a filename-derived name, then to [`UNKNOWN_COMPANY`].
pub fn normalize_record(raw: &Value) -> InvoiceRecord {
    let filename = resolve_str(raw, Field::Filename).unwrap_or_default();
    let company_name = resolve_str(raw, Field::CompanyName)
        .or_else(|| derive_company_from_filename(&filename))
        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string());

    let mut record = InvoiceRecord::new(company_name, filename);

    if let Some(raw_date) = resolve_str(raw, Field::InvoiceDate) {
        record.invoice_date = parse_date(&raw_date);
        if record.invoice_date.is_none() {
            tracing::debug!(date = %raw_date, file = %record.filename, "unparseable invoice date");
        }
    }

    record.tax_invoice_id = resolve_str(raw, Field::TaxInvoiceId);
    record.account_number = resolve_str(raw, Field::AccountNumber);
    record.categories = resolve_str_list(raw, Field::Categories);
    record.current_charges = resolve_top_level(raw, Field::CurrentCharges).unwrap_or(0.0);
    record.amount_due = resolve_top_level(raw, Field::AmountDue).unwrap_or(0.0);

    record.period_history = period_history(raw)
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| normalize_period(entry, i))
                .collect()
        })
        .unwrap_or_default();

    // Invoice-level aggregates only matter without a usable history
    if !record.has_history() {
        record.total_energy_kwh = resolve_top_level(raw, Field::EnergyKwh);
        record.total_water_m3 = resolve_top_level(raw, Field::WaterM3);
        record.total_water_cost = resolve_top_level(raw, Field::WaterCost);
        record.estimated_carbon_tonnes = resolve_top_level(raw, Field::CarbonTonnes);
    }

    record
}

/// Unwrap an invoice payload into its element array.
///
/// Accepts a bare array or an object wrapping one under a known key.
fn invoice_array(payload: &Value) -> Result<&Vec<Value>> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(map) => INVOICE_ENVELOPE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .ok_or_else(|| EsgError::Shape("invoice payload has no invoice array".into())),
        other => Err(EsgError::Shape(format!(
            "invoice payload must be an array or object, got {}",
            json_kind(other)
        ))),
    }
}

/// Validate and normalize a whole invoice payload.
///
/// `Shape` when the payload or any element is not an object, `Empty` when
/// the array has no elements.
pub fn normalize_invoice_payload(payload: &Value) -> Result<Vec<InvoiceRecord>> {
    let items = invoice_array(payload)?;
    if items.is_empty() {
        return Err(EsgError::Empty("invoices".into()));
    }

    if let Some((index, bad)) = items.iter().enumerate().find(|(_, v)| !v.is_object()) {
        return Err(EsgError::Shape(format!(
            "invoice {} is {}, expected object",
            index,
            json_kind(bad)
        )));
    }

    Ok(items.iter().map(normalize_record).collect())
}

fn metrics_object(payload: &Value) -> Option<&Map<String, Value>> {
    let root = payload.as_object()?;
    let nested = root
        .get("metrics")
        .or_else(|| root.get("mockData").and_then(|m| m.get("metrics")))
        .and_then(Value::as_object);
    Some(nested.unwrap_or(root))
}

/// Normalize an environmental metrics payload.
///
/// Metrics may sit at the top level, under `metrics`, or under
/// `mockData.metrics`.
pub fn normalize_metrics(payload: &Value) -> Result<EsgMetrics> {
    let object = metrics_object(payload).ok_or_else(|| {
        EsgError::Shape(format!(
            "metrics payload must be an object, got {}",
            json_kind(payload)
        ))
    })?;
    let value = Value::Object(object.clone());

    let metrics = EsgMetrics {
        carbon: resolve(&value, Field::MetricCarbon),
        energy: resolve(&value, Field::MetricEnergy),
        water: resolve(&value, Field::MetricWater),
        waste: resolve(&value, Field::MetricWaste),
        fuel: resolve(&value, Field::MetricFuel),
        renewable_share: resolve(&value, Field::MetricRenewableShare),
    };

    if metrics.is_empty() {
        return Err(EsgError::Empty("metrics".into()));
    }
    Ok(metrics)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
