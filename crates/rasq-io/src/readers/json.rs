//! Directory-of-JSON raster datasets.
//!
//! Layout:
//!
//! ```text
//! <dir>/dataset.json   {"grid": {...}, "rasters": [{"t1": .., "t2": .., "file": "r0.json"}, ..]}
//! <dir>/r0.json        [v00, v10, .., null, ..]   row-major, null = nodata
//! ```
//!
//! Raster files are decoded on first use and kept in a [`HandleCache`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use rasq_core::error::{Error, Result};
use rasq_core::raster::{is_nodata, RasterBuffer};
use rasq_core::time::{deserialize_timestamp, TemporalExtent, Timestamp};
use rasq_operators::backend::{Backend, DatasetMetadata, TileRequest};

use crate::grid::DatasetGrid;
use crate::handle_cache::{HandleCache, HandleCacheStats};

pub const DATASET_FILE: &str = "dataset.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RasterEntry {
    #[serde(deserialize_with = "deserialize_timestamp")]
    t1: Timestamp,
    #[serde(deserialize_with = "deserialize_timestamp")]
    t2: Timestamp,
    file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetFile {
    grid: DatasetGrid,
    rasters: Vec<RasterEntry>,
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Backend(format!("{}: {e}", path.display()))
}

pub struct JsonRasterBackend {
    name: String,
    dir: PathBuf,
    grid: DatasetGrid,
    metadata: DatasetMetadata,
    rasters: Vec<RasterEntry>,
    handles: HandleCache<RasterBuffer>,
}

impl JsonRasterBackend {
    pub fn open(name: impl Into<String>, dir: impl AsRef<Path>, cache_capacity: usize) -> Result<Self> {
        let name = name.into();
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(DATASET_FILE);
        let file = File::open(&path).map_err(|e| io_error(&path, e))?;
        let desc: DatasetFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| io_error(&path, e))?;
        desc.grid.validate()?;

        let mut prev_end = Timestamp::MIN;
        for r in &desc.rasters {
            if r.t1 >= r.t2 || r.t1 < prev_end {
                return Err(Error::Config(format!(
                    "dataset '{name}': raster [{}, {}) is empty or out of order",
                    r.t1, r.t2
                )));
            }
            prev_end = r.t2;
        }
        let temporal = match (desc.rasters.first(), desc.rasters.last()) {
            (Some(first), Some(last)) => TemporalExtent::new(first.t1, last.t2)?,
            _ => TemporalExtent::new(0, 0)?,
        };
        debug!(dataset = %name, dir = %dir.display(), rasters = desc.rasters.len(), "opened json dataset");
        Ok(Self {
            metadata: desc.grid.metadata(temporal),
            name,
            dir,
            grid: desc.grid,
            rasters: desc.rasters,
            handles: HandleCache::new(cache_capacity),
        })
    }

    pub fn handle_stats(&self) -> HandleCacheStats {
        self.handles.stats()
    }

    fn position(&self, t: Timestamp) -> Result<usize> {
        self.rasters
            .binary_search_by_key(&t, |r| r.t1)
            .map_err(|_| Error::Backend(format!("dataset '{}' has no raster starting at {t}", self.name)))
    }

    fn decode(&self, file: &str) -> Result<RasterBuffer> {
        let path = self.dir.join(file);
        let f = File::open(&path).map_err(|e| io_error(&path, e))?;
        let values: Vec<Option<f64>> =
            serde_json::from_reader(BufReader::new(f)).map_err(|e| io_error(&path, e))?;
        if values.len() != self.grid.resolution.len() {
            return Err(io_error(
                &path,
                format!("{} values for a {}-cell grid", values.len(), self.grid.resolution.len()),
            ));
        }
        let mut raster = RasterBuffer::new(self.grid.pixel_type, self.grid.resolution);
        for (i, v) in values.into_iter().enumerate() {
            raster.set_index(i, v.unwrap_or(self.grid.nodata));
        }
        Ok(raster)
    }
}

impl Backend for JsonRasterBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    fn advance(&self, t: Timestamp) -> Result<Timestamp> {
        let i = self.position(t)?;
        Ok(self
            .rasters
            .get(i + 1)
            .map(|r| r.t1)
            .unwrap_or(self.metadata.temporal.t2))
    }

    fn validity_end(&self, t: Timestamp) -> Result<Timestamp> {
        let i = self.position(t)?;
        Ok(self.rasters[i].t2)
    }

    fn fill(&self, request: &TileRequest) -> Result<RasterBuffer> {
        let entry = &self.rasters[self.position(request.time)?];
        let raster = self
            .handles
            .get_or_open(&entry.file, request.order, || self.decode(&entry.file))?;
        request.render(|x, y| Ok(self.grid.index(x, y).map(|i| raster.get_index(i))))
    }
}

/// Write a dataset directory readable by [`JsonRasterBackend::open`].
pub fn write_dataset(dir: &Path, grid: &DatasetGrid, rasters: &[(TemporalExtent, RasterBuffer)]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let mut entries = Vec::with_capacity(rasters.len());
    for (i, (temporal, raster)) in rasters.iter().enumerate() {
        if raster.resolution() != grid.resolution {
            return Err(Error::Config(format!("raster {i} does not match the dataset grid")));
        }
        let file = format!("r{i}.json");
        let values: Vec<Option<f64>> = raster
            .to_f64_vec()
            .into_iter()
            .map(|v| (!is_nodata(v, grid.nodata)).then_some(v))
            .collect();
        write_json(&dir.join(&file), &values)?;
        entries.push(RasterEntry {
            t1: temporal.t1,
            t2: temporal.t2,
            file,
        });
    }
    write_json(
        &dir.join(DATASET_FILE),
        &DatasetFile {
            grid: grid.clone(),
            rasters: entries,
        },
    )
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).map_err(|e| io_error(path, e))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer(&mut w, value).map_err(|e| io_error(path, e))?;
    w.flush().map_err(|e| io_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasq_core::geometry::{Coord, PixelPos, Resolution, Scale};
    use rasq_core::raster::PixelType;
    use rasq_core::tile::Order;

    fn grid() -> DatasetGrid {
        DatasetGrid {
            origin: Coord::new(0.0, 0.0),
            scale: Scale::new(1.0, 1.0),
            resolution: Resolution::new(2, 1),
            pixel_type: PixelType::I16,
            nodata: -9999.0,
        }
    }

    fn request(time: Timestamp, order: Order) -> TileRequest {
        TileRequest {
            time,
            offset: PixelPos::new(0, 0),
            fill: Resolution::new(2, 1),
            tile_resolution: Resolution::new(2, 1),
            pixel_type: PixelType::I16,
            nodata: -9999.0,
            order,
        }
    }

    #[test]
    fn written_datasets_read_back_through_the_handle_cache() {
        let dir = tempfile::tempdir().unwrap();
        let rasters = vec![
            (
                TemporalExtent::new(0, 10).unwrap(),
                RasterBuffer::from_vec(Resolution::new(2, 1), vec![1i16, -9999]).unwrap(),
            ),
            (
                TemporalExtent::new(10, 30).unwrap(),
                RasterBuffer::from_vec(Resolution::new(2, 1), vec![5i16, 6]).unwrap(),
            ),
        ];
        write_dataset(dir.path(), &grid(), &rasters).unwrap();

        let b = JsonRasterBackend::open("j", dir.path(), 4).unwrap();
        assert_eq!(b.metadata().temporal, TemporalExtent::new(0, 30).unwrap());
        assert_eq!(b.advance(0).unwrap(), 10);
        assert_eq!(b.validity_end(10).unwrap(), 30);

        let r = b.fill(&request(0, Order::TileMajor)).unwrap();
        assert_eq!(r.to_f64_vec(), vec![1.0, -9999.0]);
        b.fill(&request(10, Order::TileMajor)).unwrap();
        b.fill(&request(0, Order::TileMajor)).unwrap();
        let s = b.handle_stats();
        assert_eq!((s.hits, s.misses), (1, 2));
    }

    #[test]
    fn missing_directory_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonRasterBackend::open("j", dir.path().join("nope"), 1).err().unwrap();
        assert!(matches!(err, Error::Backend(_)));
    }
}
