use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ecg_lib::{
    config::AnalysisConfig,
    detectors::DetectionMethod,
    io::{load_file, FormatHint, LoadOptions},
    metrics::StandardHrv,
    pipeline::Orchestrator,
    plot::{Figure, PlotBackend, PlotKind, Series},
    store::SignalStore,
};
use env_logger::Env;
use log::{debug, info};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde_json::json;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

const ALLOWED_EXTENSIONS: [&str; 5] = ["ecg", "bin", "dat", "csv", "txt"];
const MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;
const PANEL_SIZE: (u32, u32) = (1000, 360);

#[derive(Parser)]
#[command(
    name = "ecg",
    version,
    about = "ECG ingestion, R-peak detection, HRV and arrhythmia screening"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// TOML file with analysis defaults; flags given on the command line win
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Recording to analyse (.ecg, .bin, .dat, .csv or .txt)
    #[arg(long)]
    input: PathBuf,
    /// Decoder to use: auto picks tabular for .csv/.txt and binary otherwise
    #[arg(long)]
    format: Option<FormatHint>,
    /// Sampling rate in Hz
    #[arg(long)]
    fs: Option<u32>,
    /// Interleaved lead count (binary only)
    #[arg(long)]
    leads: Option<usize>,
    /// Microvolts per ADC step (binary only)
    #[arg(long)]
    uv_per_lsb: Option<f64>,
}

impl InputArgs {
    fn load_options(&self, cfg: &AnalysisConfig) -> LoadOptions {
        let mut options = cfg.load_options();
        if let Some(format) = self.format {
            options.format = format;
        }
        if let Some(fs) = self.fs {
            options.sampling_rate_hz = fs;
        }
        if let Some(leads) = self.leads {
            options.lead_count = leads;
        }
        if let Some(scale) = self.uv_per_lsb {
            options.uv_per_lsb = scale;
        }
        options
    }
}

#[derive(Args)]
struct DetectArgs {
    /// Lead to process
    #[arg(long, allow_negative_numbers = true)]
    lead: Option<i64>,
    /// Detection method: default (neurokit), pantompkins, hamilton or localmax
    #[arg(long)]
    method: Option<DetectionMethod>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AnalysisType {
    /// Summary report, optionally with every plot
    Full,
    Hrv,
    Arrhythmia,
    Summary,
}

#[derive(Subcommand)]
enum Commands {
    /// Print sample count, duration, sampling rate and lead count
    Info {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Detect R-peaks and print the cleaned lead, heart rate and beat positions
    Process {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Load, process and report in one shot
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long = "type", value_enum, default_value = "full")]
        analysis: AnalysisType,
        /// Embed overview, processed and HRV plots as data URIs (full analysis only)
        #[arg(long)]
        with_plots: bool,
    },
    /// Render a figure to PNG
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long)]
        kind: PlotKind,
        /// Leading seconds to show for overview and processed plots; omit for the whole recording
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long, required_unless_present = "data_uri", conflicts_with = "data_uri")]
        out: Option<PathBuf>,
        /// Print a base64 data:image/png URI instead of writing a file
        #[arg(long)]
        data_uri: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let cfg = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let orchestrator = Orchestrator::default();

    match cli.command {
        Commands::Info { input } => cmd_info(&input, &cfg)?,
        Commands::Process { input, detect } => cmd_process(&orchestrator, &input, &detect, &cfg)?,
        Commands::Analyze {
            input,
            detect,
            analysis,
            with_plots,
        } => cmd_analyze(&orchestrator, &input, &detect, &cfg, analysis, with_plots)?,
        Commands::Plot {
            input,
            detect,
            kind,
            duration,
            out,
            data_uri,
        } => cmd_plot(
            &orchestrator,
            &input,
            &detect,
            &cfg,
            kind,
            duration,
            out.as_deref(),
            data_uri,
        )?,
    }
    Ok(())
}

/// Reject files the analyser does not accept before reading them.
fn ensure_allowed(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        bail!(
            "unsupported file type for {}: expected one of {}",
            path.display(),
            ALLOWED_EXTENSIONS.join(", ")
        );
    }
    let size = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    if size > MAX_INPUT_BYTES {
        bail!(
            "{} is {size} bytes; the limit is {MAX_INPUT_BYTES} bytes",
            path.display()
        );
    }
    Ok(())
}

fn open_session(input: &InputArgs, cfg: &AnalysisConfig) -> Result<SignalStore> {
    ensure_allowed(&input.input)?;
    let (matrix, context) = load_file(&input.input, &input.load_options(cfg))?;
    let mut store = SignalStore::new();
    store.load(matrix, context)?;
    Ok(store)
}

fn process_lead(
    orchestrator: &Orchestrator,
    store: &mut SignalStore,
    detect: &DetectArgs,
    cfg: &AnalysisConfig,
) -> Result<usize> {
    let lead = store.resolve_lead(detect.lead.unwrap_or(cfg.lead_index))?;
    let method = detect.method.unwrap_or(cfg.method);
    orchestrator
        .process(store, lead, method)
        .with_context(|| format!("processing lead {lead} with the {method} detector"))?;
    Ok(lead)
}

fn cmd_info(input: &InputArgs, cfg: &AnalysisConfig) -> Result<()> {
    let store = open_session(input, cfg)?;
    let report = store.report(&StandardHrv::default())?;
    println!("{}", serde_json::to_string(&report.file_info)?);
    Ok(())
}

fn cmd_process(
    orchestrator: &Orchestrator,
    input: &InputArgs,
    detect: &DetectArgs,
    cfg: &AnalysisConfig,
) -> Result<()> {
    let mut store = open_session(input, cfg)?;
    process_lead(orchestrator, &mut store, detect, cfg)?;
    if let Some(bundle) = store.processed() {
        println!("{}", serde_json::to_string(bundle)?);
    }
    Ok(())
}

fn cmd_analyze(
    orchestrator: &Orchestrator,
    input: &InputArgs,
    detect: &DetectArgs,
    cfg: &AnalysisConfig,
    analysis: AnalysisType,
    with_plots: bool,
) -> Result<()> {
    let mut store = open_session(input, cfg)?;
    let lead = process_lead(orchestrator, &mut store, detect, cfg)?;
    let report = store.report(&StandardHrv::default())?;
    let value = match analysis {
        AnalysisType::Summary => serde_json::to_value(&report)?,
        AnalysisType::Hrv => json!({ "hrv_analysis": report.hrv_analysis }),
        AnalysisType::Arrhythmia => json!({ "arrhythmia_detection": report.arrhythmia_detection }),
        AnalysisType::Full if with_plots => {
            let mut plots = BTreeMap::new();
            for kind in PlotKind::ALL {
                let figures = kind.figures(
                    &store,
                    lead,
                    Some(cfg.plot.duration_s),
                    cfg.plot.max_points,
                    &StandardHrv::default(),
                )?;
                plots.insert(kind.as_str(), render_data_uri(&figures)?);
            }
            json!({ "summary": report, "plots": plots })
        }
        AnalysisType::Full => json!({ "summary": report }),
    };
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_plot(
    orchestrator: &Orchestrator,
    input: &InputArgs,
    detect: &DetectArgs,
    cfg: &AnalysisConfig,
    kind: PlotKind,
    duration: Option<f64>,
    out: Option<&Path>,
    data_uri: bool,
) -> Result<()> {
    let mut store = open_session(input, cfg)?;
    let lead = match kind {
        PlotKind::Overview => store.resolve_lead(detect.lead.unwrap_or(cfg.lead_index))?,
        PlotKind::Processed | PlotKind::Hrv => process_lead(orchestrator, &mut store, detect, cfg)?,
    };
    let figures = plot_figures(&store, kind, lead, duration, cfg)?;
    match out {
        Some(path) if !data_uri => {
            PngBackend::new(path).draw(&figures)?;
            info!("wrote {kind} plot to {}", path.display());
        }
        _ => println!("{}", render_data_uri(&figures)?),
    }
    Ok(())
}

/// Unlike `analyze --with-plots`, a plot with no `--duration` covers the whole recording.
fn plot_figures(
    store: &SignalStore,
    kind: PlotKind,
    lead: usize,
    duration: Option<f64>,
    cfg: &AnalysisConfig,
) -> Result<Vec<Figure>> {
    Ok(kind.figures(store, lead, duration, cfg.plot.max_points, &StandardHrv::default())?)
}

fn render_data_uri(figures: &[Figure]) -> Result<String> {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .context("creating temporary image")?;
    PngBackend::new(file.path()).draw(figures)?;
    let bytes = fs::read(file.path()).context("reading rendered image")?;
    debug!("rendered {} figure(s) into {} bytes", figures.len(), bytes.len());
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

/// Stacks figures vertically into one PNG.
struct PngBackend {
    path: PathBuf,
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, figures: &[Figure]) -> Result<()> {
        let rows = figures.len().max(1);
        let size = (PANEL_SIZE.0, PANEL_SIZE.1 * rows as u32);
        let root = BitMapBackend::new(&self.path, size).into_drawing_area();
        root.fill(&WHITE)?;
        for (panel, fig) in root.split_evenly((rows, 1)).iter().zip(figures) {
            draw_panel(panel, fig)?;
        }
        root.present()
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

fn draw_panel(area: &DrawingArea<BitMapBackend<'_>, Shift>, fig: &Figure) -> Result<()> {
    if !fig.notes.is_empty() {
        return draw_notes(area, fig);
    }
    let title = fig.title.clone().unwrap_or_else(|| "Plot".into());
    let Some((x_min, x_max, y_min, y_max)) = fig.bounds() else {
        area.titled(&title, ("sans-serif", 24))?;
        return Ok(());
    };
    let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };
    let pad = ((y_max - y_min) * 0.05).max(1e-3);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))?;
    {
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
    }

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                let width = line.style.width.round().max(1.0) as u32;
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    RGBColor(r, g, b).stroke_width(width),
                ))?;
            }
            Series::Scatter(scatter) => {
                let (r, g, b) = scatter.color.rgb();
                let style = RGBColor(r, g, b).filled();
                chart.draw_series(
                    scatter
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), scatter.radius, style)),
                )?;
            }
        }
    }
    Ok(())
}

/// Text-only panel: optional caption, then one line per note.
fn draw_notes(area: &DrawingArea<BitMapBackend<'_>, Shift>, fig: &Figure) -> Result<()> {
    let area = match &fig.title {
        Some(title) => area.titled(title, ("sans-serif", 20))?,
        None => area.clone(),
    };
    let style = ("sans-serif", 18).into_font().color(&BLACK);
    for (i, note) in fig.notes.iter().enumerate() {
        area.draw(&Text::new(note.as_str(), (40, 20 + 26 * i as i32), style.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_lib::config::PlotConfig;

    #[test]
    fn extension_check_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("rec.CSV");
        fs::write(&good, "1\n2\n").expect("write");
        assert!(ensure_allowed(&good).is_ok());

        let bad = dir.path().join("rec.edf");
        fs::write(&bad, "1\n2\n").expect("write");
        let err = ensure_allowed(&bad).unwrap_err().to_string();
        assert!(err.contains("unsupported file type"), "{err}");
    }

    #[test]
    fn plot_without_duration_shows_whole_recording() {
        let data: Vec<f64> = (0..5000).map(|i| (i as f64 * 0.01).sin()).collect();
        let (matrix, context) = ecg_lib::io::load_matrix(data, 100).expect("matrix");
        let mut store = SignalStore::new();
        store.load(matrix, context).expect("load");
        let cfg = AnalysisConfig {
            plot: PlotConfig {
                duration_s: 30.0,
                max_points: 10_000,
            },
            ..AnalysisConfig::default()
        };

        let whole = plot_figures(&store, PlotKind::Overview, 0, None, &cfg).expect("figures");
        assert_eq!(whole[0].series[0].points().len(), 5000);
        let leading =
            plot_figures(&store, PlotKind::Overview, 0, Some(2.0), &cfg).expect("figures");
        assert_eq!(leading[0].series[0].points().len(), 200);
    }

    #[test]
    fn flags_override_config() {
        let cfg = AnalysisConfig {
            sampling_rate_hz: 500,
            lead_count: 2,
            ..AnalysisConfig::default()
        };
        let args = InputArgs {
            input: PathBuf::from("x.ecg"),
            format: Some(FormatHint::Binary),
            fs: None,
            leads: Some(8),
            uv_per_lsb: None,
        };
        let options = args.load_options(&cfg);
        assert_eq!(options.sampling_rate_hz, 500);
        assert_eq!(options.lead_count, 8);
        assert_eq!(options.format, FormatHint::Binary);
        assert_eq!(options.uv_per_lsb, 1.0);
    }
}
