//! Physical program -> owned operator tree.

use tracing::debug;

use rasq_core::config::EngineConfig;
use rasq_core::error::Result;
use rasq_core::query::QueryRectangle;
use rasq_operators::backend::BackendProvider;
use rasq_operators::registry::{instantiate, BuildContext};
use rasq_operators::traits::{BoxedOperator, Operator};
use rasq_planner::physical::{PhysicalNode, PhysicalProgram};

/// The instantiated operator graph; the root is what consumers pull.
pub struct OperatorTree {
    root: BoxedOperator,
    initialized: bool,
}

impl OperatorTree {
    /// Instantiate every node bottom-up. Each node gets the program's query
    /// rectangle in its own negotiated order.
    pub fn build(
        program: &PhysicalProgram,
        backends: &dyn BackendProvider,
        config: &EngineConfig,
    ) -> Result<Self> {
        let ctx = BuildContext { backends, config };
        let root = build_node(&program.root, &program.query, &ctx)?;
        debug!(operators = program.nodes().len(), "operator tree built");
        Ok(Self {
            root,
            initialized: false,
        })
    }

    /// Initialize the whole tree (the root initializes its children).
    pub fn initialize(&mut self) -> Result<()> {
        self.root.initialize()?;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn root(&self) -> &dyn Operator {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> &mut dyn Operator {
        self.root.as_mut()
    }

    pub fn into_root(self) -> BoxedOperator {
        self.root
    }
}

fn build_node(node: &PhysicalNode, base: &QueryRectangle, ctx: &BuildContext<'_>) -> Result<BoxedOperator> {
    let inputs = node
        .inputs
        .iter()
        .map(|n| build_node(n, base, ctx))
        .collect::<Result<Vec<_>>>()?;
    instantiate(node.kind, &node.params, base.with_order(node.order), inputs, ctx)
}
