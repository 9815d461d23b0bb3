//! Stable hashing helpers for plans, manifests, and tile outputs.

use blake3::Hasher;
use serde::Serialize;

use crate::raster::RasterBuffer;
use crate::tile::TileDescriptorInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    let out = h.finalize();
    Hash256(out.into())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v)?;
    Ok(hash_bytes(&bytes))
}

/// Running digest over a sequence of tiles: position, pixel type and cells.
pub struct TileDigest {
    hasher: Hasher,
    tiles: u64,
}

impl Default for TileDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl TileDigest {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
            tiles: 0,
        }
    }

    pub fn update(&mut self, info: &TileDescriptorInfo, raster: &RasterBuffer) {
        self.hasher.update(&info.temporal.t1.to_le_bytes());
        self.hasher.update(&info.temporal.t2.to_le_bytes());
        self.hasher.update(&(info.tile_index as u64).to_le_bytes());
        self.hasher.update(raster.pixel_type().name().as_bytes());
        self.hasher.update(&raster.to_le_bytes());
        self.tiles += 1;
    }

    pub fn tiles(&self) -> u64 {
        self.tiles
    }

    pub fn finish(&self) -> Hash256 {
        Hash256(self.hasher.finalize().into())
    }
}
