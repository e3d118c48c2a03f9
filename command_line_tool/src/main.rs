use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rephoto::alignment_export::{AlignedPair, AlignmentSink};
use rephoto::config::RegistrationConfig;
use rephoto::control_point::ControlPoint;
use rephoto::panel::PanelId;
use rephoto::photo_codec::{decode, encode, LoadRequest, SaveFormat, SaveRequest};
use rephoto::{RegistrationError, RegistrationOrchestrator};
use std::fs;
use std::path::{Path, PathBuf};

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(name = "rephoto")]
#[command(author, version, about = "Align repeat photographs from four landmark correspondences.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Warp one photo onto the other using four control points per photo.
    Align(AlignArgs),

    /// Decode any supported image (one page of a TIFF) and re-encode it.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct AlignArgs {
    /// Historic photo filename
    #[arg(long)]
    historic: PathBuf,

    /// Modern photo filename
    #[arg(long)]
    modern: PathBuf,

    /// Historic control points as "x,y;x,y;x,y;x,y" in image pixels
    #[arg(long)]
    historic_points: String,

    /// Modern control points, same order as the historic ones
    #[arg(long)]
    modern_points: String,

    /// Which photo stays fixed; the other one is warped onto it
    #[arg(long, value_enum, default_value_t = Side::Historic)]
    reference: Side,

    /// Output filename for the warped photo
    #[arg(long)]
    out: PathBuf,

    /// Output format; guessed from the --out extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90)]
    quality: u8,

    /// Page to read from a multi-page TIFF historic photo
    #[arg(long, default_value_t = 0)]
    historic_page: usize,

    /// Page to read from a multi-page TIFF modern photo
    #[arg(long, default_value_t = 0)]
    modern_page: usize,

    /// Resize the photo being warped to the reference width before aligning
    #[arg(long)]
    match_width: bool,

    /// Registration settings (JSON); missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optionally write the capture metadata of the aligned pair as JSON
    #[arg(long)]
    metadata: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input image filename
    input: PathBuf,

    /// Output filename
    #[arg(long)]
    out: PathBuf,

    /// Page to read from a multi-page TIFF
    #[arg(long, default_value_t = 0)]
    page: usize,

    /// Output format; guessed from the --out extension when omitted
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90)]
    quality: u8,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
enum Side {
    Historic,
    Modern,
}

impl From<Side> for PanelId {
    fn from(side: Side) -> PanelId {
        match side {
            Side::Historic => PanelId::Historic,
            Side::Modern => PanelId::Modern,
        }
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
enum FormatArg {
    Png,
    Jpeg,
    Tiff,
}

impl From<FormatArg> for SaveFormat {
    fn from(format: FormatArg) -> SaveFormat {
        match format {
            FormatArg::Png => SaveFormat::Png,
            FormatArg::Jpeg => SaveFormat::Jpeg,
            FormatArg::Tiff => SaveFormat::Tiff,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Align(args) => run_align(&args),
        Commands::Convert(args) => run_convert(&args),
    }
}

fn run_align(args: &AlignArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => read_config(path)?,
        None => RegistrationConfig::default(),
    };
    let mut session = RegistrationOrchestrator::new(config)?;

    let inputs = [
        (PanelId::Historic, &args.historic, args.historic_page, &args.historic_points),
        (PanelId::Modern, &args.modern, args.modern_page, &args.modern_points),
    ];
    for (id, path, page, points) in inputs {
        let request = read_request(path)?.with_page(page);
        let metadata = session
            .load(id, request)
            .with_context(|| format!("Could not load the {id} photo"))?;
        tracing::info!("{id}: {} ({} page(s))", metadata.filename, metadata.page_count);

        let panel = session.panel_mut(id);
        for point in parse_points(points).with_context(|| format!("Bad {id} control points"))? {
            panel.add_control_point(point)?;
        }
        let outside = panel.points_outside_image();
        if !outside.is_empty() {
            tracing::warn!("{id}: control points {outside:?} lie outside the image");
        }
    }

    let reference = PanelId::from(args.reference);
    let target = reference.partner();
    if args.match_width {
        let width = session.panel(reference).dimensions().image.w;
        if session.panel(target).dimensions().image.w != width {
            tracing::info!("{target}: resizing to width {width}, control points follow");
            session.panel_mut(target).resize_to_width(width)?;
        }
    }
    let alignment = match session.align(reference, target) {
        Ok(alignment) => alignment,
        Err(err @ RegistrationError::DimensionMismatch { .. }) => {
            bail!("{err}; pass --match-width to resize the {target} photo first")
        }
        Err(err) => return Err(err).context("Alignment failed"),
    };

    println!("Homography ({target} <- {reference}):");
    for row in alignment.homography.to_matrix() {
        println!("  {:>14.6} {:>14.6} {:>14.6}", row[0], row[1], row[2]);
    }

    let format = pick_format(args.format, &args.out)?;
    let mut sink = FileSink {
        image_path: args.out.clone(),
        metadata_path: args.metadata.clone(),
        request: SaveRequest {
            format,
            quality: args.quality,
        },
    };
    session.export(&mut sink)?;

    println!("Done.");
    Ok(())
}

/// Writes the warped photo and, optionally, the capture metadata.
struct FileSink {
    image_path: PathBuf,
    metadata_path: Option<PathBuf>,
    request: SaveRequest,
}

impl AlignmentSink for FileSink {
    fn receive(&mut self, pair: AlignedPair) -> rephoto::Result<()> {
        let bytes = encode(&pair.target, &self.request)?;
        println!("Writing image {}", self.image_path.display());
        fs::write(&self.image_path, bytes)
            .map_err(|e| RegistrationError::Export(format!("{}: {e}", self.image_path.display())))?;

        if let Some(path) = &self.metadata_path {
            let json = serde_json::to_string_pretty(&pair.metadata)
                .map_err(|e| RegistrationError::Export(e.to_string()))?;
            fs::write(path, json)
                .map_err(|e| RegistrationError::Export(format!("{}: {e}", path.display())))?;
            println!("Capture metadata written to {}", path.display());
        }
        Ok(())
    }
}

fn run_convert(args: &ConvertArgs) -> anyhow::Result<()> {
    let request = read_request(&args.input)?.with_page(args.page);
    let decoded = decode(request)?;
    tracing::info!(
        "{}: {}x{}, page {} of {}",
        decoded.metadata.filename,
        decoded.photo.width,
        decoded.photo.height,
        decoded.metadata.page + 1,
        decoded.metadata.page_count
    );

    let format = pick_format(args.format, &args.out)?;
    let bytes = encode(
        &decoded.photo,
        &SaveRequest {
            format,
            quality: args.quality,
        },
    )?;
    fs::write(&args.out, bytes).with_context(|| format!("Could not write {}", args.out.display()))?;
    println!("Wrote {}", args.out.display());
    Ok(())
}

fn read_request(path: &Path) -> anyhow::Result<LoadRequest> {
    println!("Reading image file: {}", path.display());
    let bytes = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    Ok(LoadRequest::from_bytes(bytes, path.display().to_string()))
}

fn read_config(path: &Path) -> anyhow::Result<RegistrationConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let config: RegistrationConfig =
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

fn pick_format(format: Option<FormatArg>, out: &Path) -> anyhow::Result<SaveFormat> {
    if let Some(format) = format {
        return Ok(format.into());
    }
    let extension = out.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match SaveFormat::from_extension(extension) {
        Some(format) => Ok(format),
        None => bail!(
            "Cannot tell the output format from {}; pass --format",
            out.display()
        ),
    }
}

/// Parses `"x,y;x,y;..."` into control points.
fn parse_points(text: &str) -> anyhow::Result<Vec<ControlPoint>> {
    text.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("expected \"x,y\", got \"{pair}\""))?;
            let x = x.trim().parse().with_context(|| format!("bad x in \"{pair}\""))?;
            let y = y.trim().parse().with_context(|| format!("bad y in \"{pair}\""))?;
            Ok(ControlPoint::new(x, y))
        })
        .collect()
}
