use serde::Deserialize;

/// Aggregate counters kept by the service.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct InventoryStats {
    pub total_items: i64,
    pub matched_scans: i64,
    pub shortages: i64,
    pub overages: i64,
    pub wrong_locations: i64,
}
