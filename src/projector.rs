//! Collapses one window of a volume into a plane.

use ndarray::Array2;
use tracing::debug;

use crate::projection::{ProjectionError, check_axis};
use crate::reduction::ReductionOperator;
use crate::volume::{DIMENSIONS, Direction, Region, Volume, array_axis};

/// A projected window with the projection axis squeezed out.
///
/// Columns follow the lower remaining volume axis, rows the higher one.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub data: Array2<f32>,
    /// Spacing of the (column, row) axes.
    pub spacing: [f64; 2],
    /// Direction of the window the plane was projected from.
    pub direction: Direction,
}

impl Plane {
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Volume axes left over once `axis` is projected, in increasing order.
pub fn transverse_axes(axis: usize) -> [usize; 2] {
    let mut remaining = (0..DIMENSIONS).filter(|&a| a != axis);
    let low = remaining.next().unwrap_or(0);
    let high = remaining.next().unwrap_or(1);
    [low, high]
}

pub struct SlabProjector<'a> {
    volume: &'a Volume,
    axis: usize,
    operator: ReductionOperator,
}

impl<'a> SlabProjector<'a> {
    pub fn new(
        volume: &'a Volume,
        axis: usize,
        operator: ReductionOperator,
    ) -> Result<Self, ProjectionError> {
        check_axis(axis)?;
        operator.validate()?;
        Ok(Self {
            volume,
            axis,
            operator,
        })
    }

    /// Reduce every lane of `window` along the projection axis.
    pub fn project(&self, window: &Region) -> Result<Plane, ProjectionError> {
        let slab = self.volume.extract(window)?;
        let axis = array_axis(self.axis);
        if slab.len_of(axis) == 0 {
            return Err(ProjectionError::EmptyProfile);
        }
        debug!(
            start = window.index(self.axis),
            size = window.size(self.axis),
            "Projecting window"
        );

        let mut failure = None;
        let data = slab.map_axis(axis, |lane| {
            self.operator.apply(lane).unwrap_or_else(|err| {
                failure.get_or_insert(err);
                f32::NAN
            })
        });
        if let Some(err) = failure {
            return Err(err);
        }

        let spacing = self.volume.spacing();
        let [low, high] = transverse_axes(self.axis);
        Ok(Plane {
            data,
            spacing: [spacing[low], spacing[high]],
            direction: self.volume.direction(),
        })
    }
}
