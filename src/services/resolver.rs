//! Synonym-key resolution for loosely shaped extractor output
//!
//! Upstream extraction emits the same quantity under camelCase, snake_case and
//! abbreviated keys, sometimes only inside the nested period history. Every
//! lookup goes through one table so call sites only choose a [`Field`].

use serde_json::Value;

use crate::types::{EsgError, Result};

/// Bumped whenever a synonym list changes meaning (not when keys are appended).
pub const SYNONYM_TABLE_VERSION: u32 = 1;

/// Canonical field names understood by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    CompanyName,
    Filename,
    InvoiceDate,
    TaxInvoiceId,
    AccountNumber,
    Categories,
    CurrentCharges,
    AmountDue,
    PeriodHistory,
    PeriodLabel,
    EnergyKwh,
    WaterM3,
    WaterCost,
    CarbonTonnes,
    // Metric payload fields
    MetricCarbon,
    MetricEnergy,
    MetricWater,
    MetricWaste,
    MetricFuel,
    MetricRenewableShare,
}

impl Field {
    /// Accepted source keys, in priority order
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::CompanyName => &[
                "company_name",
                "companyName",
                "company",
                "customer_name",
                "customerName",
                "account_name",
            ],
            Field::Filename => &["filename", "file_name", "fileName"],
            Field::InvoiceDate => &["invoice_date", "invoiceDate", "bill_date", "date"],
            Field::TaxInvoiceId => &[
                "tax_invoice_number",
                "tax_invoice_no",
                "taxInvoiceNumber",
                "invoice_number",
                "invoiceNumber",
                "account_number",
            ],
            Field::AccountNumber => &["account_number", "accountNumber", "account_no"],
            Field::Categories => &["categories", "category"],
            Field::CurrentCharges => &[
                "total_current_charges",
                "current_charges",
                "currentCharges",
                "totalCurrentCharges",
            ],
            Field::AmountDue => &[
                "total_amount_due",
                "amount_due",
                "amountDue",
                "totalAmountDue",
            ],
            Field::PeriodHistory => &[
                "sixMonthHistory",
                "six_month_history",
                "periodHistory",
                "period_history",
                "history",
            ],
            Field::PeriodLabel => &["month_label", "monthLabel", "period_label", "period", "month"],
            Field::EnergyKwh => &[
                "energyKWh",
                "energyKwh",
                "energy_kwh",
                "sixMonthEnergyKwh",
                "six_month_energy_kwh",
                "total_energy_kwh",
                "totalEnergyKwh",
                "total_energy",
            ],
            Field::WaterM3 => &[
                "water_m3",
                "waterM3",
                "water_usage",
                "waterUsage",
                "total_water_m3",
                "total_water",
                "totalWater",
                "water_volume",
            ],
            Field::WaterCost => &[
                "water_cost",
                "waterCost",
                "water_charges",
                "waterCharges",
                "total_water_cost",
                "totalWaterCost",
            ],
            Field::CarbonTonnes => &[
                "carbonTco2e",
                "carbon_tco2e",
                "co2Tonnes",
                "co2_tonnes",
                "carbon_tonnes",
                "estimated_carbon_tonnes",
                "estimatedCarbonTonnes",
            ],
            Field::MetricCarbon => &[
                "carbonEmissions",
                "carbon_emissions",
                "carbon_emissions_tons",
                "carbon",
            ],
            Field::MetricEnergy => &[
                "energyConsumption",
                "energy_consumption",
                "energy_consumption_mwh",
                "energy",
            ],
            Field::MetricWater => &["waterUsage", "water_usage", "water_use_m3", "water"],
            Field::MetricWaste => &[
                "wasteGenerated",
                "waste_generated",
                "waste_generated_tons",
                "waste",
            ],
            Field::MetricFuel => &[
                "fuelConsumption",
                "fuel_consumption",
                "fuel_litres",
                "fuel",
            ],
            Field::MetricRenewableShare => &[
                "renewableEnergy",
                "renewable_energy",
                "renewableEnergyShare",
                "renewable_energy_share",
                "renewable_share",
            ],
        }
    }
}

/// Coerce a JSON value into a finite number.
///
/// Accepts numbers and numeric strings with thousands separators ("1,234.5").
pub fn coerce_number(value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EsgError::Parse(format!("unrepresentable number {}", n)))?,
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            // Shares arrive as "18%"
            cleaned
                .strip_suffix('%')
                .unwrap_or(&cleaned)
                .parse::<f64>()
                .map_err(|_| EsgError::Parse(format!("not a number: {:?}", s)))?
        }
        other => return Err(EsgError::Parse(format!("not a number: {}", other))),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(EsgError::Parse(format!("non-finite number: {}", number)))
    }
}

/// First numeric-coercible synonym at the top level of `record`
pub fn resolve_top_level(record: &Value, field: Field) -> Option<f64> {
    let object = record.as_object()?;
    field
        .synonyms()
        .iter()
        .filter_map(|key| object.get(*key))
        .filter(|value| !value.is_null())
        .find_map(|value| coerce_number(value).ok())
}

/// Resolve a numeric field: top-level match short-circuits, otherwise the
/// same search is summed across the nested period history (if any).
pub fn resolve(record: &Value, field: Field) -> Option<f64> {
    if let Some(value) = resolve_top_level(record, field) {
        return Some(value);
    }

    let history = period_history(record)?;
    let mut found = false;
    let mut sum = 0.0;
    for entry in history {
        if let Some(value) = resolve_top_level(entry, field) {
            found = true;
            sum += value;
        }
    }
    found.then_some(sum)
}

/// First non-empty string synonym; numeric identifiers are stringified
pub fn resolve_str(record: &Value, field: Field) -> Option<String> {
    let object = record.as_object()?;
    field
        .synonyms()
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| match value {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// String list synonym; a single string becomes a one-element list
pub fn resolve_str_list(record: &Value, field: Field) -> Vec<String> {
    let Some(object) = record.as_object() else {
        return Vec::new();
    };
    for key in field.synonyms() {
        match object.get(*key) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return vec![s.trim().to_string()];
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Nested period entries, if the record carries a history collection
pub fn period_history(record: &Value) -> Option<&Vec<Value>> {
    let object = record.as_object()?;
    Field::PeriodHistory
        .synonyms()
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| value.as_array())
}
