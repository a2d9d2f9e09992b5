pub mod market_data;

pub use market_data::{resolve_conditions, ConditionOverrides, MarketDataSource, MarketDefaults, OptionChainSource, StaticMarketData};
