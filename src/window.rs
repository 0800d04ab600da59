//! Window scheduling along the projection axis.

use crate::projection::{ProjectionError, check_axis};
use crate::volume::Region;

/// Ordered, finite sequence of slabs covering a region along one axis.
///
/// Window `k` starts at voxel `floor(k * increment / spacing)`. Every window
/// is `thickness_voxels` thick except possibly the last one, which is clamped
/// to the region boundary.
#[derive(Debug, Clone)]
pub struct WindowScheduler {
    region: Region,
    axis: usize,
    spacing: f64,
    increment: f64,
    thickness_voxels: usize,
    step: usize,
}

// Ratios this close to an integer are rounding noise, e.g. 3 * 0.7 / 0.7.
const SNAP_TOLERANCE: f64 = 1e-9;

/// `floor(ratio)`, treating values within a relative tolerance of an integer
/// as that integer.
fn voxel_floor(ratio: f64) -> usize {
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= SNAP_TOLERANCE * nearest.abs().max(1.0) {
        nearest as usize
    } else {
        ratio.floor() as usize
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ProjectionError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ProjectionError::invalid_parameter(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

impl WindowScheduler {
    /// Schedule windows of physical `thickness` every `increment` along `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidParameter`] if the axis is out of
    /// range, if `spacing`, `thickness` or `increment` are not positive, or if
    /// the thickness is thinner than one voxel.
    pub fn new(
        region: Region,
        axis: usize,
        spacing: f64,
        thickness: f64,
        increment: f64,
    ) -> Result<Self, ProjectionError> {
        check_axis(axis)?;
        check_positive("spacing", spacing)?;
        check_positive("thickness", thickness)?;
        check_positive("increment", increment)?;

        let max_voxels = region.size(axis);
        let thickness_voxels = max_voxels.min(voxel_floor(thickness / spacing));
        if thickness_voxels == 0 && max_voxels > 0 {
            return Err(ProjectionError::invalid_parameter(format!(
                "thickness {thickness} is below the voxel spacing {spacing}"
            )));
        }

        Ok(Self {
            region,
            axis,
            spacing,
            increment,
            thickness_voxels,
            step: 0,
        })
    }

    /// Slab thickness in voxels before clamping at the boundary.
    pub fn thickness_voxels(&self) -> usize {
        self.thickness_voxels
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    fn start_voxel(&self) -> usize {
        voxel_floor(self.step as f64 * self.increment / self.spacing)
    }
}

impl Iterator for WindowScheduler {
    type Item = Region;

    fn next(&mut self) -> Option<Self::Item> {
        let max_voxels = self.region.size(self.axis);
        let start = self.start_voxel();
        if start >= max_voxels {
            return None;
        }
        let size = self.thickness_voxels.min(max_voxels - start);
        self.step += 1;
        Some(
            self.region
                .restricted(self.axis, self.region.index(self.axis) + start, size),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.region.size(self.axis).saturating_sub(self.start_voxel());
        // A step advances at most ceil(increment / spacing) voxels.
        let per_step = (self.increment / self.spacing).ceil().max(1.0) as usize;
        (remaining.div_ceil(per_step), None)
    }
}
