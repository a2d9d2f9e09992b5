pub mod comparison;
pub mod ranking;
pub mod recommend;
pub mod strategy;

pub use comparison::{ComparisonConfig, ComparisonResult, HedgeComparisonEngine, StrategyAnalysis};
pub use strategy::HedgingStrategy;
