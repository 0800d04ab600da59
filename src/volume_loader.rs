use crate::{
    enums::SortBy,
    volume::{DIMENSIONS, Direction, IDENTITY_DIRECTION, Volume, VolumeError},
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type DicomObject = FileDicomObject<InMemDicomObject>;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Invalid volume: {0}")]
    Volume(#[from] VolumeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// A loaded volume together with the objects it was built from, in slice order.
///
/// The first object serves as metadata template when writing derived series.
pub struct LoadedSeries {
    pub volume: Volume,
    pub objects: Vec<DicomObject>,
}

impl LoadedSeries {
    pub fn template(&self) -> Option<&DicomObject> {
        self.objects.first()
    }
}

struct DecodedSlice {
    source: usize,
    order: Option<f64>,
    position: Option<[f64; 3]>,
    image: Array2<f32>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[DicomObject],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        Self::assemble(dicom_objects, sort_by).map(|(volume, _)| volume)
    }

    /// Load a volume and keep the contributing objects in slice order.
    pub fn load_series(
        dicom_objects: Vec<DicomObject>,
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let (volume, order) = Self::assemble(&dicom_objects, sort_by)?;
        let mut slots: Vec<Option<DicomObject>> = dicom_objects.into_iter().map(Some).collect();
        let objects = order
            .into_iter()
            .filter_map(|source| slots[source].take())
            .collect();
        Ok(LoadedSeries { volume, objects })
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_series(objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    ///
    /// Directories without any `.dcm` file are read file by file, skipping
    /// files that are not DICOM.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let mut files: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        let dcm: Vec<_> = files
            .iter()
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .cloned()
            .collect();

        if !dcm.is_empty() {
            return Self::load_from_file_paths(&dcm, sort_by);
        }

        let objects: Vec<_> = files
            .iter()
            .filter_map(|path| match open_file(path) {
                Ok(object) => Some(object),
                Err(err) => {
                    debug!(path = %path.display(), %err, "Skipping non-DICOM file");
                    None
                }
            })
            .collect();

        if objects.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_series(objects, sort_by)
    }

    fn assemble(
        dicom_objects: &[DicomObject],
        sort_by: SortBy,
    ) -> Result<(Volume, Vec<usize>), VolumeLoaderError> {
        let direction = dicom_objects
            .iter()
            .find_map(Self::get_direction)
            .unwrap_or(IDENTITY_DIRECTION);
        let normal = [direction[0][2], direction[1][2], direction[2][2]];

        let mut slices: Vec<_> = dicom_objects
            .par_iter()
            .enumerate()
            .filter_map(|(source, dicom_object)| {
                Self::extract_slice(source, dicom_object, &sort_by, normal)
            })
            .collect();

        if slices.len() < dicom_objects.len() {
            warn!(
                skipped = dicom_objects.len() - slices.len(),
                "Some DICOM objects carry no usable image"
            );
        }
        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, &sort_by);
        Self::validate_dimensions(&slices)?;

        let volume_array = Self::build_volume_array(&slices);
        let (column_spacing, row_spacing) =
            Self::get_pixel_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        let slice_spacing = Self::get_slice_spacing(&slices, normal, dicom_objects);
        let origin = slices[0].position.unwrap_or([0.0; DIMENSIONS]);

        let volume = Volume::new(volume_array, [column_spacing, row_spacing, slice_spacing])?
            .with_origin(origin)
            .with_direction(direction);

        info!(
            slices = slices.len(),
            dim = ?volume.dim(),
            spacing = ?volume.spacing(),
            "Loaded DICOM volume"
        );

        let order = slices.iter().map(|slice| slice.source).collect();
        Ok((volume, order))
    }

    fn extract_slice(
        source: usize,
        dicom_object: &DicomObject,
        sort_by: &SortBy,
        normal: [f64; 3],
    ) -> Option<DecodedSlice> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position, normal)?;
        let image = Self::decode_image(dicom_object)?;
        Some(DecodedSlice {
            source,
            order,
            position,
            image,
        })
    }

    fn get_sort_order(
        dicom_object: &DicomObject,
        sort_by: &SortBy,
        position: Option<[f64; 3]>,
        normal: [f64; 3],
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => Some(Some(dot(position?, normal))),
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float64()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// First frame, first sample, raw stored values.
    fn decode_image(dicom_object: &DicomObject) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [DecodedSlice], sort_by: &SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    fn validate_dimensions(slices: &[DecodedSlice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[DecodedSlice]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    fn get_multi_f64(dicom_object: &DicomObject, tag: Tag) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }

    fn get_f64(dicom_object: &DicomObject, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_position(dicom_object: &DicomObject) -> Option<[f64; 3]> {
        match Self::get_multi_f64(dicom_object, tags::IMAGE_POSITION_PATIENT)?.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    fn get_direction(dicom_object: &DicomObject) -> Option<Direction> {
        let cosines = Self::get_multi_f64(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)?;
        let [rx, ry, rz, cx, cy, cz]: [f64; 6] = cosines.get(..6)?.try_into().ok()?;
        let row = [rx, ry, rz];
        let column = [cx, cy, cz];
        let normal = cross(row, column);
        Some(std::array::from_fn(|i| [row[i], column[i], normal[i]]))
    }

    /// (column spacing, row spacing), i.e. spacing along x and y.
    fn get_pixel_spacing(dicom_objects: &[DicomObject]) -> Option<(f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            match Self::get_multi_f64(dicom_object, tags::PIXEL_SPACING)?.as_slice() {
                [row_spacing, column_spacing, ..] => Some((*column_spacing, *row_spacing)),
                _ => None,
            }
        })
    }

    fn get_slice_spacing(
        slices: &[DecodedSlice],
        normal: [f64; 3],
        dicom_objects: &[DicomObject],
    ) -> f64 {
        if let [first, second, ..] = slices {
            if let (Some(a), Some(b)) = (first.position, second.position) {
                let distance = (dot(b, normal) - dot(a, normal)).abs();
                if distance > f64::EPSILON {
                    return distance;
                }
            }
        }
        [tags::SPACING_BETWEEN_SLICES, tags::SLICE_THICKNESS]
            .into_iter()
            .find_map(|tag| {
                dicom_objects
                    .iter()
                    .find_map(|dicom_object| Self::get_f64(dicom_object, tag))
                    .filter(|spacing| *spacing > 0.0)
            })
            .unwrap_or(1.0)
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
