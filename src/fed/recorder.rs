//! The telemetry recorder federate.
//!
//! A degenerate pipeline: no solver, just per-step accumulation. On every
//! granted time the recorder decodes the single subscribed array of
//! `[equipment_id, p, q]` rows and appends the P and Q values to two
//! growing matrices. Column ordering is fixed by the equipment ids of the
//! very first received message; later messages are assumed, not verified,
//! to use the same ordering and length. At end of simulation the matrices
//! flush to tabular files.

use std::path::Path;
use std::time::Instant;

use log::info;

use crate::bus::Bus;
use crate::config::FederateConfig;
use crate::fed::PipelineError;
use crate::fed::federate::{Federate, Subscription};
use crate::fed::timeloop::{Horizon, SyncClock};
use crate::io::export::write_table;
use crate::wire::measurement::measurement_rows_from_json;

/// The accumulated P and Q matrices, one row per granted step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordedTables {
    /// Equipment ids in first-seen order; the column space of both tables.
    pub columns: Vec<String>,
    pub p_rows: Vec<Vec<f64>>,
    pub q_rows: Vec<Vec<f64>>,
}

impl RecordedTables {
    /// Appends one decoded message. The first message fixes the columns.
    fn append(&mut self, payload: &str) -> Result<(), PipelineError> {
        let rows = measurement_rows_from_json(payload)?;
        if self.columns.is_empty() {
            self.columns = rows.iter().map(|r| r.equipment_id().to_string()).collect();
        }
        self.p_rows.push(rows.iter().map(|r| r.p()).collect());
        self.q_rows.push(rows.iter().map(|r| r.q()).collect());
        Ok(())
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.p_rows.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.p_rows.is_empty()
    }

    /// Writes both tables as `<name>_p.csv` and `<name>_q.csv` under
    /// `directory`: header row of equipment ids, one data row per step.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either file cannot be written.
    pub fn write_to(&self, directory: &Path, name: &str) -> Result<(), std::io::Error> {
        write_table(
            &directory.join(format!("{name}_p.csv")),
            &self.columns,
            &self.p_rows,
        )?;
        write_table(
            &directory.join(format!("{name}_q.csv")),
            &self.columns,
            &self.q_rows,
        )?;
        Ok(())
    }
}

/// The recorder federate.
pub struct RecorderFederate<B: Bus> {
    fed: Federate<B>,
    sub: Subscription,
}

impl<B: Bus> RecorderFederate<B> {
    /// Creates the recorder and registers its single subscription.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] on an invalid configuration or a
    /// registration failure.
    pub fn new(bus: B, config: &FederateConfig) -> Result<Self, PipelineError> {
        let mut fed = Federate::create(bus, &config.federate.name, config.federate.time_delta);
        let sub = fed.register_subscription(config.topics.resolve("subscription")?, "")?;
        Ok(Self { fed, sub })
    }

    /// Runs until the bus signals end of simulation and returns the
    /// accumulated tables. The in-memory matrices are lost if a step
    /// fails mid-accumulation.
    ///
    /// # Errors
    ///
    /// The first pipeline error propagates; there is no local recovery.
    pub fn run(self) -> Result<RecordedTables, PipelineError> {
        let Self { mut fed, sub } = self;
        let mut tables = RecordedTables::default();

        fed.enter_executing()?;
        SyncClock::new(Horizon::Unbounded).run(&mut fed, |fed, granted| {
            let started = Instant::now();
            let payload = fed.require_latest(&sub)?;
            tables.append(&payload)?;
            info!(
                "\"{}\": step {granted} recorded in {:?}",
                fed.name(),
                started.elapsed()
            );
            Ok::<(), PipelineError>(())
        })?;

        info!(
            "recorder: {} steps over {} equipment",
            tables.len(),
            tables.columns.len()
        );
        Ok(tables)
    }

    /// Runs the recorder and flushes the tables under `directory` using
    /// the federate's name as the file prefix.
    ///
    /// # Errors
    ///
    /// The first pipeline or I/O error propagates.
    pub fn run_to_files(self, directory: &Path) -> Result<RecordedTables, PipelineError> {
        let name = self.fed.name().to_string();
        let tables = self.run()?;
        tables.write_to(directory, &name)?;
        Ok(tables)
    }
}
