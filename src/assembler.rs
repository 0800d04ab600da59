//! Joins projected planes into the output volume.

use ndarray::Array3;

use crate::projection::ProjectionError;
use crate::projector::Plane;
use crate::volume::{DIMENSIONS, Direction, IDENTITY_DIRECTION, Volume};

/// Output volume axis along which planes are stacked.
pub const STACK_AXIS: usize = 2;

/// Accumulates planes in emission order.
///
/// The output keeps the source origin, takes the direction of the last
/// pushed plane and gets `increment` as its spacing along [`STACK_AXIS`].
#[derive(Debug)]
pub struct StackAssembler {
    origin: [f64; DIMENSIONS],
    increment: f64,
    voxels: Vec<f32>,
    plane_dim: Option<(usize, usize)>,
    plane_spacing: [f64; 2],
    direction: Direction,
    planes: usize,
}

impl StackAssembler {
    pub fn new(origin: [f64; DIMENSIONS], increment: f64) -> Self {
        Self {
            origin,
            increment,
            voxels: Vec::new(),
            plane_dim: None,
            plane_spacing: [1.0, 1.0],
            direction: IDENTITY_DIRECTION,
            planes: 0,
        }
    }

    /// Number of planes pushed so far.
    pub fn len(&self) -> usize {
        self.planes
    }

    pub fn is_empty(&self) -> bool {
        self.planes == 0
    }

    pub fn push(&mut self, plane: Plane) -> Result<(), ProjectionError> {
        let dim = plane.dim();
        match self.plane_dim {
            Some(expected) if expected != dim => {
                return Err(ProjectionError::PlaneShape {
                    expected,
                    actual: dim,
                });
            }
            Some(_) => {}
            None => {
                self.plane_dim = Some(dim);
                self.voxels.reserve(dim.0 * dim.1);
            }
        }
        self.voxels.extend(plane.data.iter().copied());
        self.plane_spacing = plane.spacing;
        self.direction = plane.direction;
        self.planes += 1;
        Ok(())
    }

    /// Hand the finished volume over to the caller.
    pub fn finish(self) -> Result<Volume, ProjectionError> {
        let (rows, cols) = self.plane_dim.ok_or(ProjectionError::NoWindows)?;
        let data = Array3::from_shape_vec((self.planes, rows, cols), self.voxels)?;
        let mut spacing = [self.plane_spacing[0], self.plane_spacing[1], 1.0];
        spacing[STACK_AXIS] = self.increment;
        let volume = Volume::new(data, spacing)?
            .with_origin(self.origin)
            .with_direction(self.direction);
        Ok(volume)
    }
}
