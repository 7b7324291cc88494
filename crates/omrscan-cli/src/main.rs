//! omrscan CLI: command-line interface for answer-sheet scanning.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use omrscan::marker::{decode_payload, MarkerFormat};
use omrscan::render::{cells_for, render_sheet};
use omrscan::{RenderOptions, ScanConfig, ScanTrace, Scanner, SheetLayout};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "omrscan")]
#[command(about = "Read answers and codes from photographed OMR answer sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one photo and write the result as JSON.
    Scan(CliScanArgs),

    /// Scan many photos in parallel, one JSON result per image.
    Batch(CliBatchArgs),

    /// Print the active sheet layout, or dump it as JSON.
    LayoutInfo {
        #[command(flatten)]
        setup: CliSetupArgs,

        /// Write the layout JSON to this path.
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Render a printable sheet PNG.
    Render(CliRenderArgs),

    /// Decode the payload marker of an already rectified, upright sheet image.
    DecodeMarker {
        /// Path to the canonical sheet image.
        #[arg(long)]
        image: PathBuf,

        #[command(flatten)]
        setup: CliSetupArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct CliSetupArgs {
    /// Sheet layout JSON (`omrscan.sheet.v1`). Defaults to the built-in A5 layout.
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Scan configuration JSON. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl CliSetupArgs {
    fn load_layout(&self) -> CliResult<SheetLayout> {
        match &self.layout {
            Some(path) => Ok(SheetLayout::from_json_file(path)?),
            None => Ok(SheetLayout::default()),
        }
    }

    fn load_config(&self) -> CliResult<ScanConfig> {
        match &self.config {
            Some(path) => Ok(ScanConfig::from_json_file(path)?),
            None => Ok(ScanConfig::default()),
        }
    }

    fn scanner(&self) -> CliResult<Scanner> {
        Ok(Scanner::with_config(self.load_layout()?, self.load_config()?))
    }
}

#[derive(Debug, Clone, Args)]
struct CliScanArgs {
    /// Path to the input photo.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the result JSON. Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory for intermediate images and a trace JSON.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    #[command(flatten)]
    setup: CliSetupArgs,
}

#[derive(Debug, Clone, Args)]
struct CliBatchArgs {
    /// Input photos.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Output directory; each result is written as `<image stem>.json`.
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    setup: CliSetupArgs,
}

#[derive(Debug, Clone, Args)]
struct CliRenderArgs {
    /// Marker payload (document id).
    #[arg(long)]
    payload: String,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Filled answer, `QUESTION=LABEL` (repeatable).
    #[arg(long = "answer", value_parser = parse_key_value)]
    answers: Vec<(String, String)>,

    /// Filled calibration code, `CODE=DIGITS` (repeatable).
    #[arg(long = "code", value_parser = parse_key_value)]
    codes: Vec<(String, String)>,

    /// White margin around the canonical sheet in pixels.
    #[arg(long, default_value_t = RenderOptions::DEFAULT_MARGIN_PX)]
    margin: u32,

    /// Symbology printed in the marker region.
    #[arg(long, value_enum, default_value = "grid")]
    marker_format: MarkerFormatArg,

    /// Sheet layout JSON. Defaults to the built-in A5 layout.
    #[arg(long)]
    layout: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MarkerFormatArg {
    Grid,
    Qr,
}

impl MarkerFormatArg {
    fn to_core(self) -> MarkerFormat {
        match self {
            Self::Grid => MarkerFormat::Grid,
            Self::Qr => MarkerFormat::Qr,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => run_scan(&args),
        Commands::Batch(args) => run_batch(&args),
        Commands::LayoutInfo { setup, dump } => run_layout_info(&setup, dump.as_deref()),
        Commands::Render(args) => run_render(&args),
        Commands::DecodeMarker { image, setup } => run_decode_marker(&image, &setup),
    }
}

fn open_rgb(path: &Path) -> CliResult<image::RgbImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(img.to_rgb8())
}

// ── scan ───────────────────────────────────────────────────────────────

fn run_scan(args: &CliScanArgs) -> CliResult<()> {
    let scanner = args.setup.scanner()?;
    tracing::info!("Loading image: {}", args.image.display());
    let img = open_rgb(&args.image)?;
    tracing::info!("Image size: {}x{}", img.width(), img.height());

    let result = match &args.debug_dir {
        Some(dir) => {
            let (result, trace) = scanner.scan_with_trace(&img);
            write_trace(dir, &trace)?;
            result
        }
        None => scanner.scan(&img),
    };

    if let Some(err) = result.errors.first() {
        tracing::warn!("Scan failed at {}: {}", err.stage, err.message);
    }

    let json = serde_json::to_string_pretty(&result)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Result written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn write_trace(dir: &Path, trace: &ScanTrace) -> CliResult<()> {
    std::fs::create_dir_all(dir)?;
    if let Some(enhanced) = &trace.enhanced {
        enhanced.as_gray().save(dir.join("enhanced.png"))?;
    }
    if let Some(sheet) = &trace.canonical {
        sheet.image().save(dir.join("canonical.png"))?;
    }
    if let Some(sheet) = &trace.oriented {
        sheet.image().save(dir.join("oriented.png"))?;
    }
    let summary = serde_json::json!({
        "fiducials": trace.fiducials,
        "homography": trace.homography,
        "readings": trace.readings,
    });
    std::fs::write(
        dir.join("trace.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;
    tracing::info!("Debug output written to {}", dir.display());
    Ok(())
}

// ── batch ──────────────────────────────────────────────────────────────

fn run_batch(args: &CliBatchArgs) -> CliResult<()> {
    let scanner = args.setup.scanner()?;
    let images = args
        .images
        .iter()
        .map(PathBuf::as_path)
        .map(open_rgb)
        .collect::<CliResult<Vec<_>>>()?;
    tracing::info!("Scanning {} images", images.len());

    let results = scanner.scan_batch(&images);

    std::fs::create_dir_all(&args.out_dir)?;
    let mut n_ok = 0usize;
    for (path, result) in args.images.iter().zip(&results) {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let out = args.out_dir.join(format!("{stem}.json"));
        std::fs::write(&out, serde_json::to_string_pretty(result)?)?;
        if result.is_success() {
            n_ok += 1;
        }
    }
    tracing::info!(
        "{}/{} scans succeeded; results in {}",
        n_ok,
        results.len(),
        args.out_dir.display()
    );
    Ok(())
}

// ── layout-info ────────────────────────────────────────────────────────

fn run_layout_info(setup: &CliSetupArgs, dump: Option<&Path>) -> CliResult<()> {
    let layout = setup.load_layout()?;
    if let Some(path) = dump {
        std::fs::write(path, layout.to_json_string()?)?;
        tracing::info!("Layout written to {}", path.display());
        return Ok(());
    }

    let size = layout.canonical_size;
    let region = layout.marker_region;
    println!("omrscan sheet layout");
    println!("  name:           {}", layout.name);
    println!("  canonical size: {}x{} px", size.width, size.height);
    println!("  fiducial size:  {} px", layout.fiducial_size_px);
    println!(
        "  marker region:  x={} y={} {}x{} px (module {} px)",
        region.x, region.y, region.width, region.height, layout.marker_module_px
    );
    println!("  questions:      {}", layout.answer_groups().count());
    for (code, columns) in layout.code_columns() {
        println!("  code {:<10} {} digit column(s)", code, columns.len());
    }
    println!("  cells:          {}", layout.n_cells());
    Ok(())
}

// ── render ─────────────────────────────────────────────────────────────

fn run_render(args: &CliRenderArgs) -> CliResult<()> {
    let layout = match &args.layout {
        Some(path) => SheetLayout::from_json_file(path)?,
        None => SheetLayout::default(),
    };
    let answers: BTreeMap<String, String> = args.answers.iter().cloned().collect();
    let codes: BTreeMap<String, String> = args.codes.iter().cloned().collect();
    let cells = cells_for(&layout, &answers, &codes)?;
    let options = RenderOptions {
        margin_px: args.margin,
        marker_format: args.marker_format.to_core(),
        ..RenderOptions::default()
    };
    let img = render_sheet(&layout, &args.payload, &cells, &options)?;
    img.save(&args.out)?;
    tracing::info!(
        "Sheet {}x{} with {} filled cell(s) written to {}",
        img.width(),
        img.height(),
        cells.len(),
        args.out.display()
    );
    Ok(())
}

// ── decode-marker ──────────────────────────────────────────────────────

fn run_decode_marker(image: &Path, setup: &CliSetupArgs) -> CliResult<()> {
    let layout = setup.load_layout()?;
    let orientation = setup.load_config()?.orientation;
    let img = image::open(image)?.to_luma8();
    let size = layout.canonical_size;
    if img.dimensions() != (size.width, size.height) {
        tracing::warn!(
            "Image is {}x{}, layout expects {}x{}",
            img.width(),
            img.height(),
            size.width,
            size.height
        );
    }

    let r = layout.marker_region;
    let w = r.width.min(img.width().saturating_sub(r.x));
    let h = r.height.min(img.height().saturating_sub(r.y));
    let region = image::imageops::crop_imm(&img, r.x, r.y, w, h).to_image();
    let mut decoded = None;
    for &format in &orientation.formats {
        let (payload, diag) = decode_payload(&region, format, &orientation.decode);
        let done = payload.is_some();
        decoded = Some((format, payload, diag));
        if done {
            break;
        }
    }
    let Some((format, payload, diag)) = decoded else {
        return Err("no marker formats configured".into());
    };

    match payload {
        Some(p) => println!("payload:   {p}"),
        None => println!("payload:   <none>"),
    }
    println!("format:    {format}");
    println!("threshold: {:.1}", diag.threshold);
    println!("contrast:  {:.1}", diag.contrast);
    if let Some([x, y, bw, bh]) = diag.bbox {
        println!("bbox:      x={x} y={y} {bw}x{bh}");
    }
    println!("border errors: {}", diag.border_errors);
    println!("sync errors:   {}", diag.sync_errors);
    if let Some(reason) = diag.reject_reason {
        println!("rejected:  {reason}");
    }
    Ok(())
}
