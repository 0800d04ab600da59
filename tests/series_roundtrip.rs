//! Writes a projected series to disk and reads it back.

use std::fs;
use std::path::PathBuf;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject, open_file};
use dicom_dictionary_std::{tags, uids};
use dicom_slab::volume_loader::DicomObject;
use dicom_slab::{
    FileNamePattern, MetadataOverrides, ProjectionCommand, ReductionOperator, SortBy, Volume,
    VolumeLoader, VolumeWriter, project,
};
use ndarray::Array3;

const TEMPLATE_UID: &str = "1.2.826.0.1.3680043.2.1125.1";

fn template() -> DicomObject {
    InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::CT_IMAGE_STORAGE)),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(TEMPLATE_UID)),
        DataElement::new(tags::IMAGE_TYPE, VR::CS, PrimitiveValue::from("ORIGINAL\\PRIMARY\\AXIAL")),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::I16(vec![0_i16].into())),
    ])
    .with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(TEMPLATE_UID),
    )
    .unwrap()
}

fn source_volume() -> Volume {
    let data = Array3::from_shape_fn((8, 3, 2), |(z, y, x)| {
        (z as f32 * 10.0) - 40.0 + (y * 2 + x) as f32
    });
    Volume::new(data, [0.5, 0.75, 1.0])
        .unwrap()
        .with_origin([-10.0, -20.0, 30.0])
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dicom-slab-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn projected_series_reads_back() {
    let dir = scratch_dir("roundtrip");
    let command = ProjectionCommand::new(ReductionOperator::Maximum, 2, 2.0, 2.0);
    let projected = project(&source_volume(), &command).unwrap();
    assert_eq!(projected.size(2), 4);

    let next = VolumeWriter::write_series(
        &projected,
        &dir,
        &FileNamePattern::default(),
        &template(),
        &MetadataOverrides::derived(),
        5,
    )
    .unwrap();
    assert_eq!(next, 9);
    for index in 5..9 {
        assert!(dir.join(format!("IM{index:06}")).is_file());
    }

    let first = open_file(dir.join("IM000005")).unwrap();
    let image_type = first.element(tags::IMAGE_TYPE).unwrap().to_str().unwrap();
    assert_eq!(image_type, "DERIVED\\SECONDARY\\AXIAL");
    let instance = first.element(tags::INSTANCE_NUMBER).unwrap().to_int::<i32>().unwrap();
    assert_eq!(instance, 6);
    let uid = first.element(tags::SOP_INSTANCE_UID).unwrap().to_str().unwrap();
    assert_ne!(uid.trim_end_matches('\0'), TEMPLATE_UID);

    let series = VolumeLoader::load_from_directory(&dir, SortBy::ImagePositionPatient).unwrap();
    assert_eq!(series.objects.len(), 4);
    let reloaded = &series.volume;
    assert_eq!(reloaded.dim(), projected.dim());
    assert_eq!(reloaded.data(), projected.data());
    for (actual, expected) in reloaded.spacing().iter().zip([0.5, 0.75, 2.0]) {
        assert!((actual - expected).abs() < 1e-6);
    }
    for (actual, expected) in reloaded.origin().iter().zip([-10.0, -20.0, 30.0]) {
        assert!((actual - expected).abs() < 1e-6);
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn batch_numbering_continues_across_commands() {
    let dir = scratch_dir("batch");
    let volume = source_volume();
    let template = template();
    let overrides = MetadataOverrides::derived();
    let pattern: FileNamePattern = "slab_%d.dcm".parse().unwrap();

    let mut next = 0;
    for text in ["mip:2:4:4", "softmip:0.1:2:2:1", "mip:2:0:1"] {
        let Ok(command) = text.parse::<ProjectionCommand>() else {
            continue;
        };
        let Ok(result) = project(&volume, &command) else {
            continue;
        };
        next = VolumeWriter::write_series(&result, &dir, &pattern, &template, &overrides, next)
            .unwrap();
    }

    // 2 slabs from the first command, 8 from the second, none from the third
    assert_eq!(next, 10);
    assert!(dir.join("slab_9.dcm").is_file());
    assert!(!dir.join("slab_10.dcm").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_write_reserves_its_indices() {
    let dir = scratch_dir("blocked");
    fs::write(&dir, b"not a directory").unwrap();
    let volume = source_volume();
    let command: ProjectionCommand = "mip:2:2:2".parse().unwrap();
    let result = project(&volume, &command).unwrap();
    let pattern = FileNamePattern::default();

    let written = VolumeWriter::write_series(
        &result,
        &dir,
        &pattern,
        &template(),
        &MetadataOverrides::derived(),
        5,
    );
    assert!(written.is_err());
    assert_eq!(VolumeWriter::end_index(&result, 5), 9);

    let _ = fs::remove_file(&dir);
}
