#![forbid(unsafe_code)]
//! rasq-planner: YAML query documents -> validated logical tree -> negotiated
//! orders -> physical program + coarse WorkEstimate.
//!
//! Design:
//! - The operator vocabulary is `rasq_core::dag::OperatorKind`; this crate
//!   only checks names, arity and param shape. Each operator parses its own
//!   params when exec instantiates it.
//! - Traversal order is decided here, top-down from the consumer, inserting
//!   `order_changer` nodes where a kind cannot run in the order its parent
//!   needs.
//! - Physical nodes carry preorder `OpId`s so explain output and plan hashes
//!   are stable.

pub mod cost;
pub mod dsl;
pub mod error;
pub mod logical;
pub mod lower;
pub mod physical;
pub mod rules;

pub use cost::{estimate_work, WorkEstimate, WorkHint};
pub use dsl::yaml::{parse_query_document, NodeSpec, QueryConfig, QueryDocument, QuerySpec};
pub use error::{PlanError, Result};
pub use logical::LogicalNode;
pub use lower::lower_to_physical;
pub use physical::{PhysicalNode, PhysicalProgram};
pub use rules::{negotiate, preferred_order, OrderedNode};

/// Parse, validate, negotiate and lower a query document.
pub fn plan_document(doc: &QueryDocument) -> Result<PhysicalProgram> {
    let root = LogicalNode::from_spec(&doc.root)?;
    let order = doc.query.order.unwrap_or_else(|| preferred_order(&root));
    let query = doc.query.rectangle(order)?;
    let datasets = root.datasets();
    if let Some(missing) = datasets
        .iter()
        .find(|d| !doc.datasets.is_empty() && !doc.datasets.contains_key(d.as_str()))
    {
        return Err(PlanError::Invalid(format!(
            "source reads dataset '{missing}' which the document does not declare"
        )));
    }
    let ordered = negotiate(root, order);
    let program = lower_to_physical(query, ordered);
    tracing::debug!(nodes = program.nodes().len(), order = %order, "planned query");
    Ok(program)
}

/// `plan_document` over YAML text.
pub fn plan_yaml(yaml_src: &str) -> Result<(QueryDocument, PhysicalProgram)> {
    let doc = parse_query_document(yaml_src)?;
    let program = plan_document(&doc)?;
    Ok((doc, program))
}
