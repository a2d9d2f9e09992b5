/// Domain-specific error types for the hedging engine.
/// Numeric degradation never lands here. The engine must:
/// - Fall back to intrinsic value or prior parameters on bad numerics
/// - Surface configuration and unknown-enum errors to the caller
#[derive(Debug, thiserror::Error)]
pub enum HedgeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl HedgeError {
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        HedgeError::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}

impl From<serde_json::Error> for HedgeError {
    fn from(e: serde_json::Error) -> Self {
        HedgeError::Parse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for HedgeError {
    fn from(e: std::num::ParseFloatError) -> Self {
        HedgeError::Parse(e.to_string())
    }
}

impl From<std::num::ParseIntError> for HedgeError {
    fn from(e: std::num::ParseIntError) -> Self {
        HedgeError::Parse(e.to_string())
    }
}

pub type HedgeResult<T> = Result<T, HedgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_variant_message() {
        let e = HedgeError::unknown("exit trigger", "moon_phase");
        assert_eq!(e.to_string(), "unknown exit trigger: \"moon_phase\"");
    }

    #[test]
    fn test_parse_float_converts() {
        let r: HedgeResult<f64> = "abc".parse::<f64>().map_err(HedgeError::from);
        assert!(matches!(r, Err(HedgeError::Parse(_))));
    }
}
