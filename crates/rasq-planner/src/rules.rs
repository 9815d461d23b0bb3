//! Order negotiation.
//!
//! Each node runs in the order its parent needs. A node whose kind cannot
//! run in that order is wrapped in an `order_changer` and runs in the
//! opposite order. Children of an `order_changer` always run opposite to it;
//! every other operator needs its inputs in its own order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use rasq_core::dag::OperatorKind;
use rasq_core::tile::Order;

use crate::logical::LogicalNode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedNode {
    pub kind: OperatorKind,
    pub order: Order,
    pub params: serde_json::Value,
    pub inputs: Vec<OrderedNode>,
    /// Inserted by negotiation rather than written in the query.
    #[serde(default)]
    pub inserted: bool,
}

impl OrderedNode {
    pub fn converters(&self) -> usize {
        let own = usize::from(self.kind == OperatorKind::OrderChanger);
        own + self.inputs.iter().map(OrderedNode::converters).sum::<usize>()
    }
}

/// Order the root runs in when the query does not ask for one.
pub fn preferred_order(root: &LogicalNode) -> Order {
    root.kind
        .native_orders()
        .first()
        .copied()
        .unwrap_or(Order::TimeMajor)
}

/// Assign an order to every node, inserting converters where needed.
pub fn negotiate(node: LogicalNode, required: Order) -> OrderedNode {
    if !node.kind.supports_order(required) {
        debug!(operator = %node.kind, %required, "inserting order changer");
        let inner = negotiate(node, required.opposite());
        return OrderedNode {
            kind: OperatorKind::OrderChanger,
            order: required,
            params: serde_json::Value::Null,
            inputs: vec![inner],
            inserted: true,
        };
    }
    let child_order = if node.kind == OperatorKind::OrderChanger {
        required.opposite()
    } else {
        required
    };
    let inputs = node
        .inputs
        .into_iter()
        .map(|input| negotiate(input, child_order))
        .collect();
    OrderedNode {
        kind: node.kind,
        order: required,
        params: node.params,
        inputs,
        inserted: false,
    }
}
