//! Block provider trait definition

use async_trait::async_trait;
use super::BlockResponse;

/// Trait for implementing a status bar block
#[async_trait]
pub trait BlockProvider: Send + Sync {
    /// Run one poll cycle and render the result for the bar
    async fn poll(&self) -> Result<BlockResponse, anyhow::Error>;

    /// Get the block name for display
    fn name(&self) -> &'static str;

    /// Get the block description
    fn description(&self) -> &'static str {
        ""
    }

    /// How long a response stays valid
    fn cache_seconds(&self) -> i64;
}
