//! Sequencing of the transform-and-load run.

use super::dimension_loader::{Dimension, DimensionCounts, DimensionLoader};
use super::fact_loader::{FactLoadSummary, FactLoader};
use crate::error::WarehouseError;
use crate::warehouse::SqliteWarehouse;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// One step of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    Dimension(Dimension),
    Songplays,
}

impl LoadStep {
    pub const ORDER: [LoadStep; 5] = [
        LoadStep::Dimension(Dimension::Artists),
        LoadStep::Dimension(Dimension::Songs),
        LoadStep::Dimension(Dimension::Users),
        LoadStep::Dimension(Dimension::Time),
        LoadStep::Songplays,
    ];
}

impl fmt::Display for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStep::Dimension(dimension) => write!(f, "{}", dimension),
            LoadStep::Songplays => f.write_str("songplays"),
        }
    }
}

/// The step that stopped a run and why.
#[derive(Debug, Clone, Error)]
#[error("Load step {step} failed: {error}")]
pub struct StepFailure {
    pub step: LoadStep,
    #[source]
    pub error: Arc<WarehouseError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    NotStarted,
    DimensionsLoading,
    DimensionsLoaded,
    FactsLoading,
    Complete,
    Failed(StepFailure),
}

impl LoadState {
    fn name(&self) -> &'static str {
        match self {
            LoadState::NotStarted => "NotStarted",
            LoadState::DimensionsLoading => "DimensionsLoading",
            LoadState::DimensionsLoaded => "DimensionsLoaded",
            LoadState::FactsLoading => "FactsLoading",
            LoadState::Complete => "Complete",
            LoadState::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Complete | LoadState::Failed(_))
    }
}

impl PartialEq for StepFailure {
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step && Arc::ptr_eq(&self.error, &other.error)
    }
}

/// Rows inserted by a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub dimensions: DimensionCounts,
    pub songplays: FactLoadSummary,
}

/// Runs the dimension loads and then the fact load against one warehouse.
///
/// Each step commits on its own. A failure stops the run and leaves the
/// committed steps in place; running again picks up where it stopped since
/// every step only inserts missing keys.
pub struct LoadCoordinator {
    dimensions: DimensionLoader,
    facts: FactLoader,
    state: LoadState,
}

impl LoadCoordinator {
    pub fn new(warehouse: SqliteWarehouse) -> Self {
        Self {
            dimensions: DimensionLoader::new(warehouse.clone()),
            facts: FactLoader::new(warehouse),
            state: LoadState::NotStarted,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Runs every step in [`LoadStep::ORDER`].
    ///
    /// A coordinator runs once; calling this again after a terminal state
    /// starts over from `NotStarted`.
    pub fn run(&mut self) -> Result<LoadReport, StepFailure> {
        self.transition(LoadState::NotStarted);
        let mut report = LoadReport::default();

        self.transition(LoadState::DimensionsLoading);
        let loaded = self.dimensions.load_in_order();
        report.dimensions =
            loaded.map_err(|(dimension, e)| self.fail(LoadStep::Dimension(dimension), e))?;
        self.transition(LoadState::DimensionsLoaded);

        self.transition(LoadState::FactsLoading);
        report.songplays = self
            .facts
            .load()
            .map_err(|e| self.fail(LoadStep::Songplays, e))?;
        self.transition(LoadState::Complete);

        info!(
            "Load complete: {} dimension rows, {} songplays ({} unresolved)",
            report.dimensions.total(),
            report.songplays.inserted,
            report.songplays.unresolved
        );
        Ok(report)
    }

    fn transition(&mut self, next: LoadState) {
        debug!("Load state {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn fail(&mut self, step: LoadStep, error: WarehouseError) -> StepFailure {
        error!("Load step {} failed: {}", step, error);
        let failure = StepFailure {
            step,
            error: Arc::new(error),
        };
        self.transition(LoadState::Failed(failure.clone()));
        failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::schema::{PLAYBACK_PAGE, SONGPLAYS_TABLE, TIME_TABLE};

    fn stage_play(warehouse: &SqliteWarehouse, ts: i64, user_id: i64) {
        warehouse
            .lock()
            .execute(
                "INSERT INTO staging_events (page, ts, user_id, session_id, level)
                 VALUES (?1, ?2, ?3, 1, 'free')",
                rusqlite::params![PLAYBACK_PAGE, ts, user_id],
            )
            .unwrap();
    }

    #[test]
    fn completes_and_reports_inserted_rows() {
        let warehouse = SqliteWarehouse::open_in_memory().unwrap();
        warehouse.provision().unwrap();
        stage_play(&warehouse, 1541106673000, 10);

        let mut coordinator = LoadCoordinator::new(warehouse);
        assert_eq!(coordinator.state(), &LoadState::NotStarted);

        let report = coordinator.run().unwrap();
        assert_eq!(coordinator.state(), &LoadState::Complete);
        assert!(coordinator.state().is_terminal());
        assert_eq!(report.dimensions.users, 1);
        assert_eq!(report.dimensions.time, 1);
        assert_eq!(report.songplays.inserted, 1);
        assert_eq!(report.songplays.unresolved, 1);
    }

    #[test]
    fn failure_stops_run_and_keeps_committed_dimensions() {
        let warehouse = SqliteWarehouse::open_in_memory().unwrap();
        warehouse.provision().unwrap();
        stage_play(&warehouse, 1541106673000, 10);
        SONGPLAYS_TABLE.drop(&warehouse.lock()).unwrap();

        let mut coordinator = LoadCoordinator::new(warehouse.clone());
        let failure = coordinator.run().unwrap_err();

        assert_eq!(failure.step, LoadStep::Songplays);
        assert!(matches!(*failure.error, WarehouseError::Schema { .. }));
        match coordinator.state() {
            LoadState::Failed(state_failure) => assert_eq!(state_failure, &failure),
            other => panic!("unexpected state: {other:?}"),
        }
        assert!(warehouse.get_user(10).unwrap().is_some());
    }

    #[test]
    fn dimension_failure_names_the_failing_dimension() {
        let warehouse = SqliteWarehouse::open_in_memory().unwrap();
        warehouse.provision().unwrap();
        stage_play(&warehouse, 1541106673000, 10);
        TIME_TABLE.drop(&warehouse.lock()).unwrap();

        let failure = LoadCoordinator::new(warehouse.clone()).run().unwrap_err();

        assert_eq!(failure.step, LoadStep::Dimension(Dimension::Time));
        assert!(warehouse.get_user(10).unwrap().is_some());
    }

    #[test]
    fn unprovisioned_warehouse_fails_on_first_step() {
        let warehouse = SqliteWarehouse::open_in_memory().unwrap();
        let mut coordinator = LoadCoordinator::new(warehouse);

        let failure = coordinator.run().unwrap_err();
        assert_eq!(failure.step, LoadStep::ORDER[0]);
        assert!(failure.to_string().contains("artists"));
    }
}
