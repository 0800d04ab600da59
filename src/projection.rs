use ndarray::ShapeError;
use thiserror::Error;
use tracing::info;

use crate::assembler::StackAssembler;
use crate::command::ProjectionCommand;
use crate::projector::SlabProjector;
use crate::volume::{DIMENSIONS, Volume, VolumeError};
use crate::window::WindowScheduler;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Window produced an empty intensity profile")]
    EmptyProfile,

    #[error("Volume is empty along the projection axis")]
    NoWindows,

    #[error("Plane shape {actual:?} does not match {expected:?}")]
    PlaneShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
}

impl ProjectionError {
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        Self::InvalidParameter(details.into())
    }
}

/// Reject axis indices outside the volume.
pub(crate) fn check_axis(axis: usize) -> Result<(), ProjectionError> {
    if axis < DIMENSIONS {
        Ok(())
    } else {
        Err(ProjectionError::invalid_parameter(format!(
            "axis {axis} is outside a {DIMENSIONS}-dimensional volume"
        )))
    }
}

/// Project `volume` slab by slab as described by `command`.
///
/// Windows of `command.thickness` are taken every `command.increment` along
/// `command.axis`, each is collapsed with `command.operator` and the resulting
/// planes are stacked into a new volume.
///
/// # Errors
///
/// All parameters are checked before the first window is projected; an
/// invalid request yields [`ProjectionError::InvalidParameter`] and no output.
pub fn project(volume: &Volume, command: &ProjectionCommand) -> Result<Volume, ProjectionError> {
    let axis = command.axis;
    // Checks the axis before it is used to index the spacing.
    let projector = SlabProjector::new(volume, axis, command.operator)?;
    let windows = WindowScheduler::new(
        volume.region(),
        axis,
        volume.spacing()[axis],
        command.thickness,
        command.increment,
    )?;

    info!(
        operator = %command.operator,
        axis,
        thickness = command.thickness,
        increment = command.increment,
        thickness_voxels = windows.thickness_voxels(),
        "Starting slab projection"
    );

    let mut assembler = StackAssembler::new(volume.origin(), command.increment);
    for window in windows {
        assembler.push(projector.project(&window)?)?;
    }

    let result = assembler.finish()?;
    info!(planes = result.size(2), "Slab projection complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduction::ReductionOperator;
    use ndarray::Array3;

    const PROFILE: [f32; 6] = [1.0, 5.0, 3.0, 9.0, 2.0, 7.0];

    fn profile_volume(spacing_z: f64) -> Volume {
        let data = Array3::from_shape_fn((6, 2, 3), |(z, y, x)| PROFILE[z] + (y * 3 + x) as f32);
        Volume::new(data, [0.5, 0.7, spacing_z])
            .unwrap()
            .with_origin([-10.0, 4.0, 12.5])
    }

    fn command(operator: ReductionOperator, thickness: f64, increment: f64) -> ProjectionCommand {
        ProjectionCommand::new(operator, 2, thickness, increment)
    }

    fn profile_at(volume: &Volume, x: usize, y: usize) -> Vec<f32> {
        (0..volume.size(2))
            .map(|z| volume.get(x, y, z).unwrap())
            .collect()
    }

    #[test]
    fn test_maximum_scenario() {
        let volume = profile_volume(1.0);
        let result = project(&volume, &command(ReductionOperator::Maximum, 2.0, 2.0)).unwrap();
        assert_eq!(profile_at(&result, 0, 0), vec![5.0, 9.0, 7.0]);
        assert_eq!(profile_at(&result, 2, 1), vec![10.0, 14.0, 12.0]);
    }

    #[test]
    fn test_average_scenario() {
        let volume = profile_volume(1.0);
        let result = project(&volume, &command(ReductionOperator::Average, 2.0, 2.0)).unwrap();
        let profile = profile_at(&result, 0, 0);
        for (actual, expected) in profile.iter().zip([3.0, 6.0, 4.5]) {
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_maximum_identity_at_one_voxel() {
        let volume = profile_volume(1.5);
        let result = project(&volume, &command(ReductionOperator::Maximum, 1.5, 1.5)).unwrap();
        assert_eq!(result.data(), volume.data());
        assert_eq!(result.spacing(), volume.spacing());
    }

    #[test]
    fn test_maximum_identity_at_fractional_spacings() {
        for spacing in [0.7, 0.6, 0.3, 0.1] {
            let data = Array3::from_shape_fn((400, 1, 2), |(z, _, x)| (z * 2 + x) as f32);
            let volume = Volume::new(data, [1.0, 1.0, spacing]).unwrap();
            let cmd = ProjectionCommand::new(ReductionOperator::Maximum, 2, spacing, spacing);
            let result = project(&volume, &cmd).unwrap();
            assert_eq!(result.data(), volume.data(), "spacing {spacing}");
            assert_eq!(result.spacing()[2], spacing);
        }
    }

    #[test]
    fn test_average_of_constant_volume() {
        let data = Array3::from_elem((7, 3, 2), 123.25_f32);
        let volume = Volume::new(data, [1.0, 1.0, 0.8]).unwrap();
        for (axis, thickness, increment) in [(2, 2.4, 1.6), (2, 5.0, 0.8), (0, 1.0, 3.0), (1, 2.0, 1.0)] {
            let cmd = ProjectionCommand::new(ReductionOperator::Average, axis, thickness, increment);
            let result = project(&volume, &cmd).unwrap();
            assert!(result.data().iter().all(|&v| (v - 123.25).abs() < 1e-4));
        }
    }

    #[test]
    fn test_soft_maximum_between_average_and_maximum() {
        let volume = profile_volume(1.0);
        let max = project(&volume, &command(ReductionOperator::Maximum, 3.0, 3.0)).unwrap();
        let avg = project(&volume, &command(ReductionOperator::Average, 3.0, 3.0)).unwrap();
        let soft = project(&volume, &command(ReductionOperator::soft_maximum(0.5), 3.0, 3.0)).unwrap();
        for ((s, a), m) in soft.data().iter().zip(avg.data()).zip(max.data()) {
            assert!(*s >= a - 1e-4 && *s <= m + 1e-4);
        }
    }

    #[test]
    fn test_stack_spacing_is_increment() {
        let volume = profile_volume(0.6);
        let result = project(&volume, &command(ReductionOperator::Maximum, 1.2, 1.7)).unwrap();
        assert_eq!(result.spacing(), [0.5, 0.7, 1.7]);
        assert_eq!(result.origin(), [-10.0, 4.0, 12.5]);
    }

    #[test]
    fn test_projection_along_y() {
        let volume = profile_volume(1.0);
        let cmd = ProjectionCommand::new(ReductionOperator::Maximum, 1, 0.7, 0.7);
        let result = project(&volume, &cmd).unwrap();
        // x stays, z becomes the second axis, the two y windows are stacked
        assert_eq!(result.size(0), 3);
        assert_eq!(result.size(1), 6);
        assert_eq!(result.size(2), 2);
        assert_eq!(result.spacing(), [0.5, 1.0, 0.7]);
        assert_eq!(result.get(1, 3, 1), Some(PROFILE[3] + 4.0));
    }

    #[test]
    fn test_direction_is_carried() {
        let direction = [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let volume = profile_volume(1.0).with_direction(direction);
        let result = project(&volume, &command(ReductionOperator::Maximum, 2.0, 2.0)).unwrap();
        assert_eq!(result.direction(), direction);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let volume = profile_volume(1.0);
        let cases = [
            command(ReductionOperator::Maximum, 0.0, 1.0),
            command(ReductionOperator::Maximum, 1.0, 0.0),
            command(ReductionOperator::Maximum, 1.0, -1.0),
            command(ReductionOperator::Maximum, 0.5, 1.0),
            command(ReductionOperator::soft_maximum(-0.1), 1.0, 1.0),
            ProjectionCommand::new(ReductionOperator::Average, 3, 1.0, 1.0),
        ];
        for cmd in cases {
            assert!(
                matches!(project(&volume, &cmd), Err(ProjectionError::InvalidParameter(_))),
                "{cmd} should be rejected"
            );
        }
    }

    #[test]
    fn test_axis_checked_by_every_stage() {
        let volume = profile_volume(1.0);
        assert!(check_axis(2).is_ok());
        assert!(matches!(check_axis(3), Err(ProjectionError::InvalidParameter(_))));
        assert!(SlabProjector::new(&volume, 3, ReductionOperator::Maximum).is_err());
        assert!(WindowScheduler::new(volume.region(), 7, 1.0, 1.0, 1.0).is_err());
        let cmd = ProjectionCommand::new(ReductionOperator::Maximum, usize::MAX, 1.0, 1.0);
        assert!(matches!(project(&volume, &cmd), Err(ProjectionError::InvalidParameter(_))));
    }

    #[test]
    fn test_empty_volume() {
        let volume = Volume::new(Array3::zeros((0, 2, 2)), [1.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            project(&volume, &command(ReductionOperator::Maximum, 1.0, 1.0)),
            Err(ProjectionError::NoWindows)
        ));
    }
}
