//! 3x3 spatial kernel over a tile and its eight neighbors.
//!
//! Output cell = `4*center - (NE + NW + SE + SW)`. Reads past the tile edge
//! resolve to the neighboring tile; a neighbor outside the tile grid, or a
//! nodata neighbor cell, reads as 0. Nodata centers stay nodata.

use serde::Deserialize;
use tracing::debug;

use rasq_core::dag::OperatorKind;
use rasq_core::error::{Error, Result};
use rasq_core::query::QueryRectangle;
use rasq_core::raster::{is_nodata, PixelType, RasterBuffer};
use rasq_core::tile::TileDescriptorInfo;

use crate::descriptor::{Payload, TileDescriptor};
use crate::traits::{BoxedOperator, Lifecycle, OpState, Operator, Pull};

/// Neighbor offsets in tile units, row-major around the center.
const DIRECTIONS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

fn direction_slot(dx: i64, dy: i64) -> Option<usize> {
    DIRECTIONS.iter().position(|&d| d == (dx, dy))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvolutionParams {
    #[serde(default)]
    pub pixel_type: Option<PixelType>,
}

struct Evaluated {
    raster: RasterBuffer,
    nodata: f64,
}

pub struct KernelJob {
    center: Box<TileDescriptor>,
    neighbors: Box<[Option<TileDescriptor>; 8]>,
}

impl KernelJob {
    pub fn evaluate(self, info: &TileDescriptorInfo) -> Result<RasterBuffer> {
        let KernelJob {
            center,
            neighbors: pending,
        } = self;
        let center = *center;
        let res = center.info().tile_resolution;
        let center_nodata = center.info().nodata;
        let center = center.evaluate()?;
        let mut neighbors: [Option<Evaluated>; 8] = Default::default();
        for (slot, d) in neighbors.iter_mut().zip(*pending) {
            if let Some(d) = d {
                let nodata = d.info().nodata;
                let raster = d.evaluate()?;
                if raster.resolution() != res {
                    return Err(Error::Consistency(
                        "convolution neighbor differs in tile resolution".into(),
                    ));
                }
                *slot = Some(Evaluated { raster, nodata });
            }
        }

        let (w, h) = (res.x as i64, res.y as i64);
        let read = |x: i64, y: i64| -> f64 {
            let tx = if x < 0 { -1 } else if x >= w { 1 } else { 0 };
            let ty = if y < 0 { -1 } else if y >= h { 1 } else { 0 };
            let (lx, ly) = ((x - tx * w) as usize, (y - ty * h) as usize);
            let (raster, nodata) = if (tx, ty) == (0, 0) {
                (&center, center_nodata)
            } else {
                match direction_slot(tx, ty).and_then(|i| neighbors[i].as_ref()) {
                    Some(n) => (&n.raster, n.nodata),
                    None => return 0.0,
                }
            };
            let v = raster.get(lx, ly);
            if is_nodata(v, nodata) {
                0.0
            } else {
                v
            }
        };

        let mut out = RasterBuffer::filled(info.pixel_type, res, info.nodata);
        for y in 0..h {
            for x in 0..w {
                let c = center.get(x as usize, y as usize);
                if is_nodata(c, center_nodata) {
                    continue;
                }
                let diagonals =
                    read(x + 1, y - 1) + read(x - 1, y - 1) + read(x + 1, y + 1) + read(x - 1, y + 1);
                out.set(x as usize, y as usize, 4.0 * c - diagonals);
            }
        }
        Ok(out)
    }
}

pub struct ConvolutionOp {
    query: QueryRectangle,
    params: ConvolutionParams,
    input: BoxedOperator,
    life: Lifecycle,
}

impl ConvolutionOp {
    pub fn new(query: QueryRectangle, params: ConvolutionParams, input: BoxedOperator) -> Self {
        Self {
            query,
            params,
            input,
            life: Lifecycle::new(OperatorKind::Convolution.name()),
        }
    }

    fn wrap(&mut self, center: TileDescriptor) -> Result<TileDescriptor> {
        let tile = center.info().tile_index;
        let grid = center.info().tile_counts;
        let mut neighbors: [Option<TileDescriptor>; 8] = Default::default();
        for (slot, &(dx, dy)) in neighbors.iter_mut().zip(DIRECTIONS.iter()) {
            if let Some(n) = grid.neighbor(tile, dx, dy) {
                *slot = self.input.get_descriptor(n)?;
            }
        }
        let mut info = *center.info();
        info.order = self.query.order;
        if let Some(pt) = self.params.pixel_type {
            info.pixel_type = pt;
        }
        Ok(TileDescriptor::new(
            info,
            Payload::Kernel(KernelJob {
                center: Box::new(center),
                neighbors: Box::new(neighbors),
            }),
        ))
    }
}

impl Operator for ConvolutionOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Convolution
    }

    fn query(&self) -> &QueryRectangle {
        &self.query
    }

    fn state(&self) -> OpState {
        self.life.state()
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn initialize(&mut self) -> Result<()> {
        self.life.initialize()?;
        self.input.initialize()?;
        debug!(order = %self.query.order, "convolution initialized");
        Ok(())
    }

    fn next_descriptor(&mut self) -> Result<Pull> {
        self.life.check("next_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(Pull::End);
        }
        match self.input.next_descriptor()? {
            Pull::Tile(d) => {
                self.life.iterating();
                Ok(Pull::Tile(self.wrap(d)?))
            }
            Pull::End => {
                self.life.exhaust();
                Ok(Pull::End)
            }
        }
    }

    fn get_descriptor(&mut self, tile_index: usize) -> Result<Option<TileDescriptor>> {
        self.life.check("get_descriptor")?;
        if self.life.is_exhausted() {
            return Ok(None);
        }
        match self.input.get_descriptor(tile_index)? {
            Some(d) => self.wrap(d).map(Some),
            None => Ok(None),
        }
    }

    fn skip_current_raster(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_raster")?;
        self.input.skip_current_raster(count)
    }

    fn skip_current_tile(&mut self, count: usize) -> Result<()> {
        self.life.check("skip_current_tile")?;
        self.input.skip_current_tile(count)
    }

    fn rebuild(&self, query: &QueryRectangle) -> Result<BoxedOperator> {
        let input = self
            .input
            .rebuild(&query.with_order(self.input.query().order))?;
        Ok(Box::new(Self::new(*query, self.params.clone(), input)))
    }
}
