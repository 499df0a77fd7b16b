//! Int-or-percent resolution against a base quantity.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::GenerateError;

/// Rounding applied when a percentage does not divide the base evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Resolve `value` against `base`. Integers pass through; `"N%"` becomes
/// `N/100 * base` rounded per `rounding`. Any other string is rejected.
pub fn resolve_int_or_percent(
    field: &'static str,
    value: &IntOrString,
    base: i32,
    rounding: Rounding,
) -> Result<i32, GenerateError> {
    let raw = match value {
        IntOrString::Int(n) => return Ok(*n),
        IntOrString::String(s) => s,
    };
    let invalid = || GenerateError::InvalidIntOrPercent { field, value: raw.clone() };
    let pct: i64 = raw
        .strip_suffix('%')
        .ok_or_else(invalid)?
        .trim()
        .parse()
        .map_err(|_| invalid())?;
    let scaled = pct as f64 * base as f64 / 100.0;
    let resolved = match rounding {
        Rounding::Down => scaled.floor(),
        Rounding::Up => scaled.ceil(),
    };
    Ok(resolved as i32)
}
