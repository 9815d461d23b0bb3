//! Lowering: negotiated tree -> physical program with preorder `OpId`s.

use rasq_core::id::OpId;
use rasq_core::query::QueryRectangle;

use crate::physical::{PhysicalNode, PhysicalProgram};
use crate::rules::OrderedNode;

pub fn lower_to_physical(query: QueryRectangle, root: OrderedNode) -> PhysicalProgram {
    let mut next = 0u64;
    let root = lower_node(root, &mut next);
    PhysicalProgram::new(query.with_order(root.order), root)
}

fn lower_node(node: OrderedNode, next: &mut u64) -> PhysicalNode {
    let id = OpId::new(*next);
    *next += 1;
    let inputs = node
        .inputs
        .into_iter()
        .map(|n| lower_node(n, next))
        .collect();
    PhysicalNode {
        id,
        kind: node.kind,
        order: node.order,
        params: node.params,
        inputs,
        inserted: node.inserted,
    }
}
