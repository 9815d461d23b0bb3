//! Tile descriptors: metadata plus a deferred pixel computation.
//!
//! A `Payload` captures by value whatever its computation needs (upstream
//! descriptors, a backend read request, a shared slot). Evaluating consumes
//! the descriptor; only `Payload::Shared` evaluates its work at most once.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rasq_core::error::{Error, Result};
use rasq_core::raster::RasterBuffer;
use rasq_core::tile::{Order, TileDescriptorInfo};

use crate::aggregate::FoldJob;
use crate::backend::{Backend, TileRequest};
use crate::cache::SharedTile;
use crate::convolution::KernelJob;
use crate::cumulative::RunningSum;
use crate::join::overlap::OverlapJob;

pub enum Payload {
    /// Manufactured tile with every cell set to nodata.
    Nodata,
    Buffer(RasterBuffer),
    Read {
        backend: Arc<dyn Backend>,
        request: TileRequest,
    },
    Fold(FoldJob),
    /// Position `position` of a per-tile running accumulator.
    Running {
        slot: Rc<RefCell<RunningSum>>,
        position: usize,
    },
    Kernel(KernelJob),
    Overlap(OverlapJob),
    Shared(SharedTile),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Nodata => "nodata",
            Payload::Buffer(_) => "buffer",
            Payload::Read { .. } => "read",
            Payload::Fold(_) => "fold",
            Payload::Running { .. } => "running",
            Payload::Kernel(_) => "kernel",
            Payload::Overlap(_) => "overlap",
            Payload::Shared(_) => "shared",
        }
    }

    pub fn evaluate(self, info: &TileDescriptorInfo) -> Result<RasterBuffer> {
        let raster = match self {
            Payload::Nodata => {
                RasterBuffer::filled(info.pixel_type, info.tile_resolution, info.nodata)
            }
            Payload::Buffer(raster) => raster,
            Payload::Read { backend, request } => backend.fill(&request)?,
            Payload::Fold(job) => job.evaluate(info)?,
            Payload::Running { slot, position } => RunningSum::evaluate(&slot, position, info)?,
            Payload::Kernel(job) => job.evaluate(info)?,
            Payload::Overlap(job) => job.evaluate(info)?,
            Payload::Shared(tile) => tile.evaluate()?,
        };
        if raster.resolution() != info.tile_resolution {
            return Err(Error::Consistency(format!(
                "payload produced {}x{} cells for a {}x{} tile",
                raster.resolution().x,
                raster.resolution().y,
                info.tile_resolution.x,
                info.tile_resolution.y
            )));
        }
        Ok(raster)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug)]
pub struct TileDescriptor {
    info: TileDescriptorInfo,
    payload: Payload,
}

impl TileDescriptor {
    pub fn new(info: TileDescriptorInfo, payload: Payload) -> Self {
        Self { info, payload }
    }

    /// A tile known to hold only nodata; evaluating it never reads a backend.
    pub fn nodata(mut info: TileDescriptorInfo) -> Self {
        info.only_nodata = true;
        Self {
            info,
            payload: Payload::Nodata,
        }
    }

    pub fn info(&self) -> &TileDescriptorInfo {
        &self.info
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_parts(self) -> (TileDescriptorInfo, Payload) {
        (self.info, self.payload)
    }

    /// Replace the metadata, keeping the payload.
    pub fn map_info<F>(self, f: F) -> Self
    where
        F: FnOnce(TileDescriptorInfo) -> TileDescriptorInfo,
    {
        Self {
            info: f(self.info),
            payload: self.payload,
        }
    }

    pub fn with_order(self, order: Order) -> Self {
        self.map_info(|mut info| {
            info.order = order;
            info
        })
    }

    pub fn evaluate(self) -> Result<RasterBuffer> {
        self.payload.evaluate(&self.info)
    }
}
