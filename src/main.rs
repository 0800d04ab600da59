use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dicom_slab::{
    FileNamePattern, MetadataOverrides, ProjectionCommand, SortBy, Volume, VolumeLoader,
    VolumeWriter, project,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Sliding-slab projections of a DICOM series
///
/// Every COMMAND has the form `(mip|softmip:strength):axis:thickness:increment`,
/// thickness and increment in millimetres. All results are written to
/// OUT_DIR with one running file index.
#[derive(Parser)]
#[command(name = "dicom-slab")]
#[command(version)]
struct Cli {
    /// Directory holding the input series
    #[arg(name = "IN_DIR")]
    input: PathBuf,

    /// Directory receiving the projected series
    #[arg(name = "OUT_DIR")]
    output: PathBuf,

    /// Projection commands, processed in order
    #[arg(name = "COMMAND")]
    commands: Vec<String>,

    /// How input slices are ordered
    #[arg(long, value_enum, default_value_t = SortBy::ImagePositionPatient)]
    sort_by: SortBy,

    /// Output file name pattern with one integer placeholder
    #[arg(long, default_value = "IM%06d")]
    pattern: String,

    /// Index of the first written file
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Metadata override `gggg|eeee=value`, may be repeated
    #[arg(long = "set", value_name = "TAG=VALUE")]
    overrides: Vec<String>,

    /// Write an 8-bit PNG of the middle plane of the last projection
    #[arg(long, value_name = "PNG")]
    preview: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let pattern: FileNamePattern = cli
        .pattern
        .parse()
        .with_context(|| format!("invalid --pattern {}", cli.pattern))?;
    let mut overrides = MetadataOverrides::derived();
    for text in &cli.overrides {
        overrides
            .set_from_str(text)
            .with_context(|| format!("invalid --set {text}"))?;
    }

    let series = VolumeLoader::load_from_directory(&cli.input, cli.sort_by)
        .with_context(|| format!("failed to load series from {}", cli.input.display()))?;
    let template = series
        .template()
        .context("loaded series has no template slice")?;

    let mut next_index = cli.start_index;
    let mut succeeded = 0;
    let mut last: Option<Volume> = None;

    for text in &cli.commands {
        let projected = text
            .parse::<ProjectionCommand>()
            .map_err(anyhow::Error::from)
            .and_then(|command| Ok(project(&series.volume, &command)?));
        let result = match projected {
            Ok(result) => result,
            Err(err) => {
                error!(command = %text, "Projection failed: {err:#}");
                continue;
            }
        };

        let start = next_index;
        next_index = VolumeWriter::end_index(&result, start);
        match VolumeWriter::write_series(
            &result,
            &cli.output,
            &pattern,
            template,
            &overrides,
            start,
        ) {
            Ok(end) => {
                info!(command = %text, files = end - start, "Projection written");
                succeeded += 1;
                last = Some(result);
            }
            Err(err) => error!(
                command = %text,
                skipped = next_index - start,
                "Writing projection failed: {err:#}"
            ),
        }
    }

    if let (Some(path), Some(volume)) = (&cli.preview, &last) {
        let image = volume
            .plane_image(2, volume.size(2) / 2)
            .context("projected volume has no plane to preview")?;
        image
            .save(path)
            .with_context(|| format!("failed to write preview {}", path.display()))?;
    }

    if !cli.commands.is_empty() && succeeded == 0 {
        bail!("none of the {} projection commands succeeded", cli.commands.len());
    }
    Ok(())
}
