//! Carbon derivation from energy
//!
//! Owns the single emission factor. Period-level and record-level carbon both
//! go through [`derive_carbon`]; nothing else in the crate multiplies energy
//! by a factor.

/// Grid emission factor in tonnes CO₂e per kWh (0.99 kg/kWh).
pub const EMISSION_FACTOR_T_PER_KWH: f64 = 0.00099;

/// Carbon in tCO₂e for the given energy in kWh.
///
/// # Examples
/// ```
/// use esgtrack::services::emissions::derive_carbon;
///
/// assert!((derive_carbon(1000.0) - 0.99).abs() < 1e-12);
/// ```
pub fn derive_carbon(energy_kwh: f64) -> f64 {
    energy_kwh * EMISSION_FACTOR_T_PER_KWH
}

/// Explicit, trusted carbon wins over the derived value; they are never summed.
pub fn resolve_carbon(energy_kwh: f64, reported: Option<f64>) -> f64 {
    reported.unwrap_or_else(|| derive_carbon(energy_kwh))
}
