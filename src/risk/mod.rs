pub mod exit;
pub mod simulation;
pub mod stress;
pub mod triggers;

/// Coarse qualitative risk grade used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Clamp into [0, 1], mapping NaN to 0 so a bad reading cannot poison a
/// weighted score.
#[inline]
pub(crate) fn unit_interval(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}
