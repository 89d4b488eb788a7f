pub mod backtest;
pub mod models;
pub mod store;

pub use backtest::StrategyStatistics;
pub use models::{ScreenRun, StoredResult};
pub use store::{RunSnapshot, ScreenStore};
