//! Physical program: the negotiated tree with stable operator ids.
//!
//! The exec crate instantiates one operator per node through the operator
//! registry, giving each node a query rectangle in its own order.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use rasq_core::dag::OperatorKind;
use rasq_core::id::OpId;
use rasq_core::query::QueryRectangle;
use rasq_core::tile::Order;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalNode {
    pub id: OpId,
    pub kind: OperatorKind,
    pub order: Order,
    pub params: serde_json::Value,
    pub inputs: Vec<PhysicalNode>,
    pub inserted: bool,
}

impl PhysicalNode {
    /// Preorder walk.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a PhysicalNode>) {
        out.push(self);
        for input in &self.inputs {
            input.walk(out);
        }
    }

    pub fn find(&self, id: OpId) -> Option<&PhysicalNode> {
        if self.id == id {
            return Some(self);
        }
        self.inputs.iter().find_map(|n| n.find(id))
    }
}

/// Root query rectangle (in the root's order) plus the operator tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalProgram {
    pub query: QueryRectangle,
    pub root: PhysicalNode,
}

impl PhysicalProgram {
    pub fn new(query: QueryRectangle, root: PhysicalNode) -> Self {
        Self { query, root }
    }

    pub fn nodes(&self) -> Vec<&PhysicalNode> {
        let mut out = Vec::new();
        self.root.walk(&mut out);
        out
    }

    /// Indented tree, one node per line.
    pub fn explain(&self) -> String {
        fn line(n: &PhysicalNode, depth: usize, out: &mut String) {
            let params = if n.params.is_null() {
                String::new()
            } else {
                format!(" {}", n.params)
            };
            let mark = if n.inserted { " (inserted)" } else { "" };
            let _ = writeln!(
                out,
                "{:indent$}{} {} [{}]{}{}",
                "",
                n.id,
                n.kind,
                n.order,
                mark,
                params,
                indent = depth * 2
            );
            for input in &n.inputs {
                line(input, depth + 1, out);
            }
        }
        let mut out = String::new();
        line(&self.root, 0, &mut out);
        out
    }
}
