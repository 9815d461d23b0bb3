//! Terminal consumers: what happens to each evaluated tile.

use serde::{Deserialize, Serialize};

use rasq_core::hash::{Hash256, TileDigest};
use rasq_core::raster::{is_nodata, RasterBuffer};
use rasq_core::tile::TileDescriptorInfo;

use crate::runtime::ExecError;

pub trait Consumer {
    fn consume(&mut self, info: &TileDescriptorInfo, raster: RasterBuffer) -> Result<(), ExecError>;

    /// Digest of everything consumed, when the consumer computes one.
    fn finish(&mut self) -> Option<Hash256> {
        None
    }
}

/// Keeps every tile in memory.
#[derive(Debug, Default)]
pub struct Collect {
    pub tiles: Vec<(TileDescriptorInfo, RasterBuffer)>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(t1, t2, tile_index)` of every tile, in arrival order.
    pub fn positions(&self) -> Vec<(i64, i64, usize)> {
        self.tiles
            .iter()
            .map(|(i, _)| (i.temporal.t1, i.temporal.t2, i.tile_index))
            .collect()
    }
}

impl Consumer for Collect {
    fn consume(&mut self, info: &TileDescriptorInfo, raster: RasterBuffer) -> Result<(), ExecError> {
        self.tiles.push((*info, raster));
        Ok(())
    }
}

/// blake3 over position, pixel type and cells of every tile.
#[derive(Default)]
pub struct Digest {
    digest: TileDigest,
}

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> u64 {
        self.digest.tiles()
    }
}

impl Consumer for Digest {
    fn consume(&mut self, info: &TileDescriptorInfo, raster: RasterBuffer) -> Result<(), ExecError> {
        self.digest.update(info, &raster);
        Ok(())
    }

    fn finish(&mut self) -> Option<Hash256> {
        Some(self.digest.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSummary {
    pub t1: i64,
    pub t2: i64,
    pub tile_index: usize,
    /// Cells that are not nodata.
    pub valid: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl TileSummary {
    pub fn of(info: &TileDescriptorInfo, raster: &RasterBuffer) -> Self {
        let mut valid = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in raster.to_f64_vec() {
            if is_nodata(v, info.nodata) || v.is_nan() {
                continue;
            }
            valid += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let (min, max, mean) = if valid == 0 {
            (None, None, None)
        } else {
            (Some(min), Some(max), Some(sum / valid as f64))
        };
        Self {
            t1: info.temporal.t1,
            t2: info.temporal.t2,
            tile_index: info.tile_index,
            valid,
            min,
            max,
            mean,
        }
    }
}

/// Per-tile statistics; the CLI prints these as JSON lines.
#[derive(Debug, Default)]
pub struct Summary {
    pub tiles: Vec<TileSummary>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json_lines(&self) -> Result<String, ExecError> {
        let mut out = String::new();
        for t in &self.tiles {
            let line = serde_json::to_string(t).map_err(|e| ExecError::Consumer(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Consumer for Summary {
    fn consume(&mut self, info: &TileDescriptorInfo, raster: RasterBuffer) -> Result<(), ExecError> {
        self.tiles.push(TileSummary::of(info, &raster));
        Ok(())
    }
}
