//! Deterministic replay & provenance helpers.
//!
//! The plan hash is computed from the serialized `PhysicalProgram` (query
//! rectangle, negotiated orders, params). With identical datasets the engine
//! emits identical tile sequences, so the outputs digest is stable too.

use rasq_core::hash::{hash_serde, Hash256};
use rasq_operators::backend::BackendProvider;
use rasq_planner::physical::PhysicalProgram;

use crate::consumer::Digest;
use crate::runtime::{Engine, ExecError};

pub fn hash_program(program: &PhysicalProgram) -> Result<Hash256, ExecError> {
    hash_serde(program).map_err(|e| ExecError::Hash(e.to_string()))
}

/// Run `program` `passes` times and return the outputs digest, failing if
/// any two passes disagree.
pub fn verify_replay(
    engine: &mut Engine,
    program: &PhysicalProgram,
    backends: &dyn BackendProvider,
    passes: usize,
) -> Result<Hash256, ExecError> {
    let mut first: Option<Hash256> = None;
    for pass in 0..passes.max(1) {
        let mut digest = Digest::new();
        let manifest = engine.run(program, backends, &mut digest)?;
        let out = manifest
            .outputs_digest
            .ok_or_else(|| ExecError::Hash("digest consumer produced no hash".into()))?;
        match first {
            None => first = Some(out),
            Some(h) if h != out => {
                return Err(ExecError::Hash(format!(
                    "replay pass {pass} digest {} differs from {}",
                    out.to_hex(),
                    h.to_hex()
                )))
            }
            Some(_) => {}
        }
    }
    first.ok_or_else(|| ExecError::Hash("no replay pass ran".into()))
}
