//! Writes a volume as a DICOM series, one file per plane along z.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use thiserror::Error;
use tracing::{debug, info};

use crate::volume::{DIMENSIONS, Volume, array_axis};
use crate::volume_loader::DicomObject;

/// Image Type given to every derived series unless overridden.
pub const DERIVED_IMAGE_TYPE: &str = "DERIVED\\SECONDARY\\AXIAL";

#[derive(Debug, Error)]
pub enum VolumeWriterError {
    #[error("Invalid file name pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid metadata override: {0}")]
    InvalidOverride(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::WriteError),
}

/// File name with one printf-style integer placeholder, e.g. `IM%06d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamePattern {
    prefix: String,
    width: usize,
    suffix: String,
}

impl FileNamePattern {
    pub fn format(&self, index: usize) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.width
        )
    }
}

impl Default for FileNamePattern {
    fn default() -> Self {
        Self {
            prefix: "IM".to_string(),
            width: 6,
            suffix: String::new(),
        }
    }
}

impl FromStr for FileNamePattern {
    type Err = VolumeWriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VolumeWriterError::InvalidPattern(s.to_string());
        let start = s.find('%').ok_or_else(invalid)?;
        let (prefix, rest) = s.split_at(start);
        let end = rest.find('d').ok_or_else(invalid)?;
        let digits = &rest[1..end];
        let width = if digits.is_empty() {
            0
        } else if digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse().map_err(|_| invalid())?
        } else {
            return Err(invalid());
        };
        let suffix = &rest[end + 1..];
        if suffix.contains('%') {
            return Err(invalid());
        }
        Ok(Self {
            prefix: prefix.to_string(),
            width,
            suffix: suffix.to_string(),
        })
    }
}

impl fmt::Display for FileNamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width == 0 {
            write!(f, "{}%d{}", self.prefix, self.suffix)
        } else {
            write!(f, "{}%0{}d{}", self.prefix, self.width, self.suffix)
        }
    }
}

/// Parse a tag written as `gggg|eeee`, e.g. `0008|0008`.
pub fn parse_tag(text: &str) -> Result<Tag, VolumeWriterError> {
    let invalid = || VolumeWriterError::InvalidTag(text.to_string());
    let (group, element) = text.trim().split_once('|').ok_or_else(invalid)?;
    let group = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
    let element = u16::from_str_radix(element, 16).map_err(|_| invalid())?;
    Ok(Tag(group, element))
}

/// Attribute values replacing the template's in every written file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataOverrides {
    entries: Vec<(Tag, String)>,
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides that mark the series as derived.
    pub fn derived() -> Self {
        let mut overrides = Self::new();
        overrides.set(tags::IMAGE_TYPE, DERIVED_IMAGE_TYPE);
        overrides
    }

    /// Set `tag` to `value`, replacing an earlier override of the same tag.
    pub fn set(&mut self, tag: Tag, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((tag, value)),
        }
    }

    /// Parse and apply an override written as `gggg|eeee=value`.
    pub fn set_from_str(&mut self, text: &str) -> Result<(), VolumeWriterError> {
        let (tag, value) = text
            .split_once('=')
            .ok_or_else(|| VolumeWriterError::InvalidOverride(text.to_string()))?;
        self.set(parse_tag(tag)?, value);
        Ok(())
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &str)> {
        self.entries.iter().map(|(t, v)| (*t, v.as_str()))
    }

    fn apply(&self, object: &mut DicomObject) {
        for (tag, value) in self.iter() {
            let vr = object.element(tag).map(|e| e.vr()).unwrap_or(VR::LO);
            object.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        }
    }
}

pub struct VolumeWriter;

impl VolumeWriter {
    /// Index following the files a write of `volume` from `start_index` uses.
    ///
    /// The range is reserved even when the write fails partway, so a later
    /// series never reuses a name a partial write may have produced.
    pub fn end_index(volume: &Volume, start_index: usize) -> usize {
        start_index + volume.size(2)
    }

    /// Write every plane of `volume` along z into `directory`.
    ///
    /// Files are named by `pattern`, numbered from `start_index`. Each file is
    /// a copy of `template` with geometry, pixel data and identifiers of its
    /// plane, followed by `overrides`.
    ///
    /// Returns the index following the last written file.
    pub fn write_series(
        volume: &Volume,
        directory: impl AsRef<Path>,
        pattern: &FileNamePattern,
        template: &DicomObject,
        overrides: &MetadataOverrides,
        start_index: usize,
    ) -> Result<usize, VolumeWriterError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let signed = template
            .element(tags::PIXEL_REPRESENTATION)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            == Some(1);
        let template_uid = template
            .element(tags::SOP_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|uid| uid.trim_end_matches('\0').to_string())
            .unwrap_or_default();

        let planes = volume.size(2);
        for k in 0..planes {
            let index = start_index + k;
            let mut object = template.clone();
            Self::set_geometry(&mut object, volume, k);
            Self::set_pixel_data(&mut object, volume, k, signed);
            Self::set_identity(&mut object, &template_uid, index);
            overrides.apply(&mut object);

            let path: PathBuf = directory.join(pattern.format(index));
            object.write_to_file(&path)?;
            debug!(path = %path.display(), plane = k, "Wrote DICOM slice");
        }

        info!(
            files = planes,
            directory = %directory.display(),
            "Wrote DICOM series"
        );
        Ok(Self::end_index(volume, start_index))
    }

    fn set_geometry(object: &mut DicomObject, volume: &Volume, k: usize) {
        let spacing = volume.spacing();
        let origin = volume.origin();
        let direction = volume.direction();
        let position: [f64; DIMENSIONS] =
            std::array::from_fn(|i| origin[i] + k as f64 * spacing[2] * direction[i][2]);
        let orientation: Vec<f64> = (0..2)
            .flat_map(|axis| (0..DIMENSIONS).map(move |i| direction[i][axis]))
            .collect();

        put_u16(object, tags::ROWS, volume.size(1));
        put_u16(object, tags::COLUMNS, volume.size(0));
        put_decimals(object, tags::PIXEL_SPACING, &[spacing[1], spacing[0]]);
        put_decimals(object, tags::SLICE_THICKNESS, &[spacing[2]]);
        put_decimals(object, tags::SPACING_BETWEEN_SLICES, &[spacing[2]]);
        put_decimals(object, tags::IMAGE_POSITION_PATIENT, &position);
        put_decimals(object, tags::IMAGE_ORIENTATION_PATIENT, &orientation);
        put_decimals(object, tags::SLICE_LOCATION, &[position[2]]);
    }

    fn set_pixel_data(object: &mut DicomObject, volume: &Volume, k: usize, signed: bool) {
        let plane = volume.data().index_axis(array_axis(2), k);
        let value = if signed {
            PrimitiveValue::I16(
                plane
                    .iter()
                    .map(|&v| v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
                    .collect::<Vec<_>>()
                    .into(),
            )
        } else {
            PrimitiveValue::U16(
                plane
                    .iter()
                    .map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16)
                    .collect::<Vec<_>>()
                    .into(),
            )
        };

        object.remove_element(tags::NUMBER_OF_FRAMES);
        put_u16(object, tags::SAMPLES_PER_PIXEL, 1);
        put_u16(object, tags::BITS_ALLOCATED, 16);
        put_u16(object, tags::BITS_STORED, 16);
        put_u16(object, tags::HIGH_BIT, 15);
        put_u16(object, tags::PIXEL_REPRESENTATION, usize::from(signed));
        if object.element(tags::PHOTOMETRIC_INTERPRETATION).is_err() {
            object.put(DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("MONOCHROME2"),
            ));
        }
        object.put(DataElement::new(tags::PIXEL_DATA, VR::OW, value));
    }

    fn set_identity(object: &mut DicomObject, template_uid: &str, index: usize) {
        let uid = derived_uid(template_uid, index);
        object.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid.as_str()),
        ));
        object.put(DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from((index + 1).to_string()),
        ));
        object.update_meta(|meta| {
            meta.media_storage_sop_instance_uid = uid;
            meta.transfer_syntax = uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string();
        });
    }
}

/// Deterministic UID under the `2.25` root for file `index` of a derived series.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a, fixed so derived UIDs match across builds.
fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u64 {
    bytes.into_iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

fn derived_uid(template_uid: &str, index: usize) -> String {
    let seed = template_uid
        .bytes()
        .chain(std::iter::once(0))
        .chain("dicom-slab".bytes());
    format!("2.25.{}{:06}", fnv1a(seed), index)
}

fn put_u16(object: &mut DicomObject, tag: Tag, value: usize) {
    let value = u16::try_from(value).unwrap_or(u16::MAX);
    object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_decimals(object: &mut DicomObject, tag: Tag, values: &[f64]) {
    let text = values
        .iter()
        .map(|&v| format_decimal(v))
        .collect::<Vec<_>>()
        .join("\\");
    object.put(DataElement::new(tag, VR::DS, PrimitiveValue::from(text)));
}

// Decimal strings hold at most 16 characters.
fn format_decimal(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-" | "-0" => "0".to_string(),
        text => text.to_string(),
    }
}
