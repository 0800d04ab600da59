use clap::ValueEnum;

/// Order in which loaded slices are stacked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    /// Position along the slice normal.
    #[default]
    #[value(name = "image-position")]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
