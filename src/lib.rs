pub mod analysis;
pub mod errors;
pub mod feeds;
pub mod models;
pub mod risk;
pub mod state;
