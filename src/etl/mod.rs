//! Transform-and-load engine: staging tables to star schema.

mod coordinator;
mod dimension_loader;
mod fact_loader;

pub use coordinator::{LoadCoordinator, LoadReport, LoadState, LoadStep, StepFailure};
pub use dimension_loader::{Dimension, DimensionCounts, DimensionLoader};
pub use fact_loader::{FactLoadSummary, FactLoader};
