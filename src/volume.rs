use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::Axis;
use ndarray::Slice;
use rayon::prelude::*;
use thiserror::Error;

/// Number of spatial axes of a [`Volume`].
pub const DIMENSIONS: usize = 3;

/// Direction cosines, column `k` is the physical direction of volume axis `k`.
pub type Direction = [[f64; DIMENSIONS]; DIMENSIONS];

pub const IDENTITY_DIRECTION: Direction = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
    #[error("spacing must be strictly positive, got {0:?}")]
    InvalidSpacing([f64; DIMENSIONS]),

    #[error("region {0:?} is not contained in the volume")]
    RegionOutOfBounds(Region),
}

/// Axis-aligned sub-box of a volume, in volume axis order (x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub index: [usize; DIMENSIONS],
    pub size: [usize; DIMENSIONS],
}

impl Region {
    pub fn new(index: [usize; DIMENSIONS], size: [usize; DIMENSIONS]) -> Self {
        Self { index, size }
    }

    /// Start of the region along `axis`.
    pub fn index(&self, axis: usize) -> usize {
        self.index[axis]
    }

    /// Voxel count of the region along `axis`.
    pub fn size(&self, axis: usize) -> usize {
        self.size[axis]
    }

    /// One past the last voxel along `axis`.
    pub fn end(&self, axis: usize) -> usize {
        self.index[axis] + self.size[axis]
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    /// Copy of this region restricted to `[start, start + size)` along `axis`.
    pub fn restricted(&self, axis: usize, start: usize, size: usize) -> Self {
        let mut region = *self;
        region.index[axis] = start;
        region.size[axis] = size;
        region
    }
}

/// A 3D scalar volume with its physical geometry.
///
/// Voxels are stored as `(depth, height, width)`, i.e. the array axis of
/// volume axis `k` is `2 - k`. Spacing, origin and direction are indexed by
/// volume axis: 0 = x (columns), 1 = y (rows), 2 = z (slices).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    spacing: [f64; DIMENSIONS],
    origin: [f64; DIMENSIONS],
    direction: Direction,
}

/// Array axis holding volume axis `axis`.
#[inline]
pub fn array_axis(axis: usize) -> Axis {
    Axis(DIMENSIONS - 1 - axis)
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: [f64; DIMENSIONS]) -> Result<Self, VolumeError> {
        if spacing.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(VolumeError::InvalidSpacing(spacing));
        }
        Ok(Self {
            data,
            spacing,
            origin: [0.0; DIMENSIONS],
            direction: IDENTITY_DIRECTION,
        })
    }

    pub fn with_origin(mut self, origin: [f64; DIMENSIONS]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Voxel count along volume axis `axis`.
    pub fn size(&self, axis: usize) -> usize {
        self.data.len_of(array_axis(axis))
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn spacing(&self) -> [f64; DIMENSIONS] {
        self.spacing
    }

    pub fn origin(&self) -> [f64; DIMENSIONS] {
        self.origin
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Voxel value at volume index `(x, y, z)`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get((z, y, x)).copied()
    }

    /// The largest possible region, covering every voxel.
    pub fn region(&self) -> Region {
        Region::new(
            [0; DIMENSIONS],
            [self.size(0), self.size(1), self.size(2)],
        )
    }

    pub fn contains(&self, region: &Region) -> bool {
        (0..DIMENSIONS).all(|axis| region.end(axis) <= self.size(axis))
    }

    /// Borrow the voxels of `region` without copying.
    pub fn extract(&self, region: &Region) -> Result<ArrayView3<'_, f32>, VolumeError> {
        if !self.contains(region) {
            return Err(VolumeError::RegionOutOfBounds(*region));
        }
        let mut view = self.data.view();
        for axis in 0..DIMENSIONS {
            view.slice_axis_inplace(
                array_axis(axis),
                Slice::from(region.index(axis)..region.end(axis)),
            );
        }
        Ok(view)
    }

    /// Plane `index` perpendicular to volume axis `axis`.
    pub fn plane(&self, axis: usize, index: usize) -> Option<ArrayView2<'_, f32>> {
        if axis >= DIMENSIONS || !self.is_valid_index(index, axis) {
            return None;
        }
        Some(self.data.index_axis(array_axis(axis), index))
    }

    /// 8-bit grey preview of a plane, intensities windowed to the plane's range.
    pub fn plane_image(
        &self,
        axis: usize,
        index: usize,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let plane = self.plane(axis, index)?;
        Self::slice_to_image(&plane)
    }

    #[inline]
    fn normalize_to_u8(value: f32, low: f32, range: f32) -> u8 {
        if range <= 0.0 {
            return 0;
        }
        (((value - low) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn slice_to_image(slice: &ArrayView2<'_, f32>) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let (low, high) = slice
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = high - low;
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, low, range))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, axis: usize) -> bool {
        index < self.size(axis)
    }
}
