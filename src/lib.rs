//! # DICOM slab projection library
//!
//! This crate derives reformatted volumes from a DICOM series by sliding a
//! slab along one axis of the volume and collapsing every slab to a single
//! plane. Three reduction operators are available:
//!  - Maximum (maximum intensity projection, "MIP")
//!  - SoftMaximum (exponentially weighted mean, "soft-MIP")
//!  - Average
//!
//! The projection itself is a pipeline of three independent stages working
//! on an in-memory [`Volume`]:
//!  - [`WindowScheduler`] yields the slab regions in increasing order
//!  - [`SlabProjector`] reduces one slab to a [`Plane`]
//!  - [`StackAssembler`] joins the planes and derives the output geometry
//!
//! [`project`] composes them. Loading and writing DICOM series is handled by
//! [`VolumeLoader`] and [`VolumeWriter`]; the projected series copies its
//! metadata from the first slice of the input.
//!
//! # Examples
//!
//! ## Maximum intensity projection of 10mm slabs every 5mm
//!
//! ```no_run
//! # use dicom_slab::{project, ProjectionCommand, SortBy, VolumeLoader};
//! let series = VolumeLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded files from directory");
//! let command: ProjectionCommand = "mip:2:10:5".parse().expect("valid command");
//! let mip = project(&series.volume, &command).expect("should have projected the volume");
//! assert_eq!(mip.spacing()[2], 5.0);
//! ```
//!
//! ## Projecting an in-memory volume
//!
//! ```
//! # use dicom_slab::{project, ProjectionCommand, ReductionOperator, Volume};
//! # use ndarray::Array3;
//! let data = Array3::from_shape_fn((6, 1, 1), |(z, _, _)| [1.0, 5.0, 3.0, 9.0, 2.0, 7.0][z]);
//! let volume = Volume::new(data, [1.0, 1.0, 1.0]).unwrap();
//! let command = ProjectionCommand::new(ReductionOperator::Maximum, 2, 2.0, 2.0);
//! let mip = project(&volume, &command).unwrap();
//! assert_eq!(mip.data().iter().copied().collect::<Vec<f32>>(), vec![5.0, 9.0, 7.0]);
//! ```

pub mod assembler;
pub mod command;
pub mod enums;
pub mod projection;
pub mod projector;
pub mod reduction;
pub mod volume;
pub mod volume_loader;
pub mod volume_writer;
pub mod window;

pub use assembler::StackAssembler;
pub use command::{CommandParseError, ProjectionCommand};
pub use enums::SortBy;
pub use projection::{ProjectionError, project};
pub use projector::{Plane, SlabProjector};
pub use reduction::ReductionOperator;
pub use volume::{Region, Volume, VolumeError};
pub use volume_loader::{LoadedSeries, VolumeLoader, VolumeLoaderError};
pub use volume_writer::{FileNamePattern, MetadataOverrides, VolumeWriter, VolumeWriterError};
pub use window::WindowScheduler;
