//! Pixel types and raster buffers.
//!
//! A `RasterBuffer` is a 2D grid of one pixel type. Storage sits behind an
//! `Arc`, so clones are cheap views that share cells; writing through a view
//! copies the cells first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    pub fn name(self) -> &'static str {
        match self {
            PixelType::U8 => "u8",
            PixelType::I8 => "i8",
            PixelType::U16 => "u16",
            PixelType::I16 => "i16",
            PixelType::U32 => "u32",
            PixelType::I32 => "i32",
            PixelType::F32 => "f32",
            PixelType::F64 => "f64",
        }
    }

    pub fn size_bytes(self) -> usize {
        match self {
            PixelType::U8 | PixelType::I8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }

    /// Smallest representable value.
    pub fn min(self) -> f64 {
        match self {
            PixelType::U8 => u8::MIN as f64,
            PixelType::I8 => i8::MIN as f64,
            PixelType::U16 => u16::MIN as f64,
            PixelType::I16 => i16::MIN as f64,
            PixelType::U32 => u32::MIN as f64,
            PixelType::I32 => i32::MIN as f64,
            PixelType::F32 => f32::MIN as f64,
            PixelType::F64 => f64::MIN,
        }
    }

    /// Largest representable value.
    pub fn max(self) -> f64 {
        match self {
            PixelType::U8 => u8::MAX as f64,
            PixelType::I8 => i8::MAX as f64,
            PixelType::U16 => u16::MAX as f64,
            PixelType::I16 => i16::MAX as f64,
            PixelType::U32 => u32::MAX as f64,
            PixelType::I32 => i32::MAX as f64,
            PixelType::F32 => f32::MAX as f64,
            PixelType::F64 => f64::MAX,
        }
    }

    /// Saturate `v` into this type's range. Integer types round to the
    /// nearest value; NaN survives only in float types.
    pub fn clamp(self, v: f64) -> f64 {
        if self.is_float() {
            if v.is_nan() {
                return v;
            }
            return v.clamp(self.min(), self.max());
        }
        if v.is_nan() {
            return 0.0;
        }
        v.round().clamp(self.min(), self.max())
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// True when `v` is the nodata value. A NaN nodata matches any NaN.
pub fn is_nodata(v: f64, nodata: f64) -> bool {
    if nodata.is_nan() {
        v.is_nan()
    } else {
        v == nodata
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Native cell types a `RasterBuffer` can hold.
pub trait Pixel: Copy + PartialOrd + Default + sealed::Sealed + 'static {
    const TYPE: PixelType;

    fn to_f64(self) -> f64;

    /// Saturating conversion (see `PixelType::clamp`).
    fn from_f64(v: f64) -> Self;

    fn slice(data: &PixelData) -> Option<&[Self]>;
    fn slice_mut(data: &mut PixelData) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> PixelData;
}

/// Type-tagged cell storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! pixel_impl {
    ($t:ty, $variant:ident) => {
        impl sealed::Sealed for $t {}

        impl Pixel for $t {
            const TYPE: PixelType = PixelType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                PixelType::$variant.clamp(v) as $t
            }

            fn slice(data: &PixelData) -> Option<&[Self]> {
                match data {
                    PixelData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut PixelData) -> Option<&mut [Self]> {
                match data {
                    PixelData::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> PixelData {
                PixelData::$variant(values)
            }
        }
    };
}

pixel_impl!(u8, U8);
pixel_impl!(i8, I8);
pixel_impl!(u16, U16);
pixel_impl!(i16, I16);
pixel_impl!(u32, U32);
pixel_impl!(i32, I32);
pixel_impl!(f32, F32);
pixel_impl!(f64, F64);

/// Dispatch `$body` over the typed vector inside a `PixelData`.
macro_rules! with_cells {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            PixelData::U8($v) => $body,
            PixelData::I8($v) => $body,
            PixelData::U16($v) => $body,
            PixelData::I16($v) => $body,
            PixelData::U32($v) => $body,
            PixelData::I32($v) => $body,
            PixelData::F32($v) => $body,
            PixelData::F64($v) => $body,
        }
    };
}

impl PixelData {
    pub fn zeroed(pixel_type: PixelType, len: usize) -> Self {
        match pixel_type {
            PixelType::U8 => PixelData::U8(vec![0; len]),
            PixelType::I8 => PixelData::I8(vec![0; len]),
            PixelType::U16 => PixelData::U16(vec![0; len]),
            PixelType::I16 => PixelData::I16(vec![0; len]),
            PixelType::U32 => PixelData::U32(vec![0; len]),
            PixelType::I32 => PixelData::I32(vec![0; len]),
            PixelType::F32 => PixelData::F32(vec![0.0; len]),
            PixelType::F64 => PixelData::F64(vec![0.0; len]),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelData::U8(_) => PixelType::U8,
            PixelData::I8(_) => PixelType::I8,
            PixelData::U16(_) => PixelType::U16,
            PixelData::I16(_) => PixelType::I16,
            PixelData::U32(_) => PixelType::U32,
            PixelData::I32(_) => PixelType::I32,
            PixelData::F32(_) => PixelType::F32,
            PixelData::F64(_) => PixelType::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_cells!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, i: usize) -> f64 {
        with_cells!(self, v => v[i].to_f64())
    }

    fn set(&mut self, i: usize, value: f64) {
        with_cells!(self, v => v[i] = Pixel::from_f64(value))
    }

    fn fill(&mut self, value: f64) {
        with_cells!(self, v => {
            let cell = Pixel::from_f64(value);
            v.iter_mut().for_each(|c| *c = cell)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    resolution: Resolution,
    data: Arc<PixelData>,
}

impl RasterBuffer {
    /// Zero-initialized buffer.
    pub fn new(pixel_type: PixelType, resolution: Resolution) -> Self {
        Self {
            resolution,
            data: Arc::new(PixelData::zeroed(pixel_type, resolution.len())),
        }
    }

    /// Buffer with every cell set to `value` (saturated).
    pub fn filled(pixel_type: PixelType, resolution: Resolution, value: f64) -> Self {
        let mut data = PixelData::zeroed(pixel_type, resolution.len());
        data.fill(value);
        Self {
            resolution,
            data: Arc::new(data),
        }
    }

    pub fn from_vec<T: Pixel>(resolution: Resolution, values: Vec<T>) -> Result<Self> {
        if values.len() != resolution.len() {
            return Err(Error::Consistency(format!(
                "{} cells do not fill a {}x{} raster",
                values.len(),
                resolution.x,
                resolution.y
            )));
        }
        Ok(Self {
            resolution,
            data: Arc::new(T::wrap(values)),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cell value at `(x, y)` widened to `f64`.
    ///
    /// # Panics
    /// When `(x, y)` lies outside the buffer.
    pub fn get(&self, x: usize, y: usize) -> f64 {
        assert!(x < self.resolution.x && y < self.resolution.y);
        self.data.get(y * self.resolution.x + x)
    }

    /// Row-major cell access.
    pub fn get_index(&self, i: usize) -> f64 {
        self.data.get(i)
    }

    /// Write a saturated value into `(x, y)`.
    ///
    /// # Panics
    /// When `(x, y)` lies outside the buffer.
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        assert!(x < self.resolution.x && y < self.resolution.y);
        let i = y * self.resolution.x + x;
        Arc::make_mut(&mut self.data).set(i, value);
    }

    pub fn set_index(&mut self, i: usize, value: f64) {
        Arc::make_mut(&mut self.data).set(i, value);
    }

    pub fn fill(&mut self, value: f64) {
        Arc::make_mut(&mut self.data).fill(value);
    }

    /// Typed read access; `None` when `T` is not the buffer's pixel type.
    pub fn typed<T: Pixel>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Typed write access; detaches from any view first.
    pub fn typed_mut<T: Pixel>(&mut self) -> Option<&mut [T]> {
        if self.pixel_type() != T::TYPE {
            return None;
        }
        T::slice_mut(Arc::make_mut(&mut self.data))
    }

    /// True when both buffers are views over the same cells.
    pub fn shares_storage(&self, other: &RasterBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy into another pixel type, saturating each cell.
    pub fn convert(&self, pixel_type: PixelType) -> RasterBuffer {
        if pixel_type == self.pixel_type() {
            return self.clone();
        }
        let mut data = PixelData::zeroed(pixel_type, self.len());
        for i in 0..self.len() {
            data.set(i, self.data.get(i));
        }
        RasterBuffer {
            resolution: self.resolution,
            data: Arc::new(data),
        }
    }

    /// All cells widened to `f64`, row-major.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.data.get(i)).collect()
    }

    /// Little-endian cell bytes, row-major.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.pixel_type().size_bytes());
        with_cells!(self.data.as_ref(), v => {
            for c in v.iter() {
                out.extend_from_slice(&c.to_le_bytes());
            }
        });
        out
    }

    /// True when every cell equals `nodata`.
    pub fn all_nodata(&self, nodata: f64) -> bool {
        (0..self.len()).all(|i| is_nodata(self.data.get(i), nodata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_saturates_to_the_pixel_range() {
        let mut r = RasterBuffer::new(PixelType::U8, Resolution::new(2, 1));
        r.set(0, 0, -5.0);
        r.set(1, 0, 300.0);
        assert_eq!(r.to_f64_vec(), vec![0.0, 255.0]);

        let mut s = RasterBuffer::new(PixelType::I16, Resolution::new(1, 1));
        s.set(0, 0, 2.6);
        assert_eq!(s.get(0, 0), 3.0);
    }

    #[test]
    fn views_share_until_written() {
        let a = RasterBuffer::filled(PixelType::F32, Resolution::new(2, 2), 1.5);
        let mut b = a.clone();
        assert!(a.shares_storage(&b));
        b.set(0, 0, 9.0);
        assert!(!a.shares_storage(&b));
        assert_eq!(a.get(0, 0), 1.5);
        assert_eq!(b.get(0, 0), 9.0);
    }

    #[test]
    fn typed_access_checks_the_pixel_type() {
        let mut r = RasterBuffer::from_vec(Resolution::new(3, 1), vec![1i32, 2, 3]).unwrap();
        assert!(r.typed::<f32>().is_none());
        r.typed_mut::<i32>().unwrap()[2] = 7;
        assert_eq!(r.typed::<i32>().unwrap(), &[1, 2, 7]);
        assert!(RasterBuffer::from_vec(Resolution::new(2, 2), vec![1u8]).is_err());
    }

    #[test]
    fn nan_nodata_matches_nan_cells() {
        assert!(is_nodata(f64::NAN, f64::NAN));
        assert!(!is_nodata(0.0, f64::NAN));
        assert!(is_nodata(-1.0, -1.0));
        let r = RasterBuffer::filled(PixelType::F64, Resolution::new(2, 2), f64::NAN);
        assert!(r.all_nodata(f64::NAN));
    }

    #[test]
    fn convert_saturates() {
        let r = RasterBuffer::from_vec(Resolution::new(2, 1), vec![-3.0f64, 1e6]).unwrap();
        let c = r.convert(PixelType::U16);
        assert_eq!(c.to_f64_vec(), vec![0.0, 65535.0]);
        assert_eq!(c.to_le_bytes(), vec![0, 0, 255, 255]);
    }
}
