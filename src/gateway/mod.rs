pub mod client;
pub mod messages;

pub use client::GatewayClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QuoteSnapshot, ScanItem, ScanParams};

/// The external market scanner. The executor only talks to this trait, so a
/// fake can stand in for the brokerage gateway in tests.
#[async_trait]
pub trait ScanCapability: Send + Sync {
    /// Whether an authenticated session is currently established.
    fn is_connected(&self) -> bool;

    /// Run a scanner query. Items come back in scanner rank order.
    async fn scan(&self, params: &ScanParams) -> Result<Vec<ScanItem>>;

    /// Market-data snapshots for the given contracts. Contracts without data
    /// may be missing from the returned list.
    async fn snapshot(&self, contract_ids: &[i64]) -> Result<Vec<QuoteSnapshot>>;
}
