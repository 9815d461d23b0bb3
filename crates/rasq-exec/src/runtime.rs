//! Runtime: build the operator tree for a `PhysicalProgram`, pull the root to
//! exhaustion and emit a `RunManifest`.
//!
//! Every payload the root emits is evaluated exactly once and handed to the
//! consumer. The first error aborts the run.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, trace};

use rasq_core::config::EngineConfig;
use rasq_core::manifest::RunManifest;
use rasq_io::catalog::Catalog;
use rasq_operators::backend::BackendProvider;
use rasq_operators::traits::Pull;
use rasq_planner::dsl::yaml::QueryDocument;
use rasq_planner::error::PlanError;
use rasq_planner::physical::PhysicalProgram;

use crate::consumer::Consumer;
use crate::metrics::{collect_stats, emit_stats, run_span, OperatorStats};
use crate::replay::hash_program;
use crate::tree::OperatorTree;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("plan: {0}")]
    Plan(#[from] PlanError),
    #[error("operator exec: {0}")]
    Operator(#[from] rasq_core::Error),
    #[error("consumer: {0}")]
    Consumer(String),
    #[error("hashing error: {0}")]
    Hash(String),
}

impl ExecError {
    pub fn is_config(&self) -> bool {
        match self {
            ExecError::Plan(e) => e.is_config(),
            ExecError::Operator(e) => e.is_config(),
            _ => false,
        }
    }
}

/// Engine owns the configuration and the counters of its last run.
pub struct Engine {
    cfg: EngineConfig,
    last_stats: Vec<OperatorStats>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            last_stats: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Per-operator counters of the most recent run (preorder).
    pub fn operator_stats(&self) -> &[OperatorStats] {
        &self.last_stats
    }

    /// Execute a prepared `PhysicalProgram` and return a manifest.
    pub fn run(
        &mut self,
        program: &PhysicalProgram,
        backends: &dyn BackendProvider,
        consumer: &mut dyn Consumer,
    ) -> Result<RunManifest, ExecError> {
        let plan_hash = hash_program(program)?;
        let span = run_span(&plan_hash);
        let _enter = span.enter();

        let mut manifest = RunManifest::new(plan_hash, now_millis());
        let mut tree = OperatorTree::build(program, backends, &self.cfg)?;
        tree.initialize()?;

        let mut tiles = 0u64;
        loop {
            let d = match tree.root_mut().next_descriptor()? {
                Pull::Tile(d) => d,
                Pull::End => break,
            };
            let info = *d.info();
            trace!(t1 = info.temporal.t1, tile = info.tile_index, "consume tile");
            let raster = d.evaluate()?;
            consumer.consume(&info, raster)?;
            tiles += 1;
        }

        self.last_stats = collect_stats(tree.root());
        emit_stats(&self.last_stats);

        manifest = manifest.finish(now_millis(), tiles, consumer.finish());
        info!(tiles, millis = manifest.finished_ms.saturating_sub(manifest.started_ms), "run finished");
        Ok(manifest)
    }

    /// Apply the document's config section, build its catalog, plan and run.
    pub fn run_document(
        &mut self,
        doc: &QueryDocument,
        consumer: &mut dyn Consumer,
    ) -> Result<RunManifest, ExecError> {
        if let Some(overrides) = &doc.config {
            overrides.apply(&mut self.cfg);
        }
        let catalog = Catalog::from_specs(&doc.datasets, &self.cfg)?;
        let program = rasq_planner::plan_document(doc)?;
        debug!(datasets = doc.datasets.len(), "running query document");
        self.run(&program, &catalog, consumer)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
