//! Bulk ingestion of raw records into the staging tables.

mod copier;
mod location;
mod mapping;

pub use copier::{
    AccessCredentials, BulkCopy, CopyReport, CopyRequest, JsonFileCopier, StagingTarget,
};
pub use location::StorageLocation;
pub use mapping::{JsonPath, RecordMapping, AUTO_MAPPING};

use crate::error::WarehouseResult;
use tracing::info;

/// Runs every copy in order, stopping at the first failure.
///
/// Copies that completed before a failure stay committed.
pub fn stage_all<C: BulkCopy + ?Sized>(
    copier: &C,
    requests: &[CopyRequest],
) -> WarehouseResult<Vec<(StagingTarget, CopyReport)>> {
    let mut reports = Vec::with_capacity(requests.len());
    for request in requests {
        info!("Staging {} from {}", request.target, request.location);
        let report = copier.copy(request)?;
        reports.push((request.target, report));
    }
    Ok(reports)
}
