// warden-core/src/ports/warehouse.rs
//
// Interface boundary to the downstream warehouse loader. The gate only
// hands over approved, staged files; whether that lands in Doris, a lake
// or a test double is not its business. An unreachable warehouse is a
// transient infrastructure condition, not a data-quality failure.

use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum WarehouseOutcome {
    Loaded { rows: u64 },
    /// Infrastructure unreachable; the verdict is downgraded, not failed.
    Unreachable { detail: String },
}

#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    async fn load(&self, table: &str, staged_file: &Path) -> WarehouseOutcome;
}
