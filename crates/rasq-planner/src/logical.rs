//! Logical operator tree: names resolved to `OperatorKind`, arity checked.

use serde::{Deserialize, Serialize};

use rasq_core::dag::OperatorKind;
use rasq_core::error::Error;

use crate::dsl::yaml::NodeSpec;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalNode {
    pub kind: OperatorKind,
    pub params: serde_json::Value,
    pub inputs: Vec<LogicalNode>,
}

impl LogicalNode {
    pub fn leaf(kind: OperatorKind, params: serde_json::Value) -> Self {
        Self {
            kind,
            params,
            inputs: Vec::new(),
        }
    }

    pub fn unary(kind: OperatorKind, params: serde_json::Value, input: LogicalNode) -> Self {
        Self {
            kind,
            params,
            inputs: vec![input],
        }
    }

    pub fn from_spec(spec: &NodeSpec) -> Result<Self> {
        let kind = OperatorKind::from_name(&spec.operator)?;
        if spec.inputs.len() != kind.inputs() {
            return Err(Error::Config(format!(
                "{kind} takes {} input(s), got {}",
                kind.inputs(),
                spec.inputs.len()
            ))
            .into());
        }
        if !(spec.params.is_null() || spec.params.is_object()) {
            return Err(Error::Config(format!("params of {kind} must be a mapping")).into());
        }
        let inputs = spec
            .inputs
            .iter()
            .map(LogicalNode::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind,
            params: spec.params.clone(),
            inputs,
        })
    }

    /// Dataset names referenced by source leaves, in preorder.
    pub fn datasets(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(&mut |n| {
            if n.kind == OperatorKind::Source {
                if let Some(name) = n.params.get("dataset").and_then(|v| v.as_str()) {
                    out.push(name.to_string());
                }
            }
        });
        out
    }

    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.visit(&mut |_| n += 1);
        n
    }

    fn visit<F: FnMut(&LogicalNode)>(&self, f: &mut F) {
        f(self);
        for input in &self.inputs {
            input.visit(f);
        }
    }
}
