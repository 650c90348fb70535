use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use plotters::prelude::*;
use pulsewatch_lib::{
    config::{load_config, MonitorConfig},
    io::{
        csv::{rows_for_tick, EventLogWorker, EventLogWriter},
        feed::spawn_line_reader,
        text::{parse_sample_series, read_sample_series, DecodedSeries},
    },
    metrics::{hrv::HrvSummary, sqi::QualityState},
    monitor::{BpmReading, MetricsSnapshot, Monitor, MonitorCounters},
    plot::{poincare_figure, waveform_figure, Figure, PlotBackend, Series},
    signal::{MonitorClock, RawSample},
};
use pulsewatch_sim::{read_scenario, render_samples, simulate, write_samples, ScenarioSpec};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

#[derive(Parser)]
#[command(
    name = "pulsewatch",
    version,
    about = "Live ECG metrics: heart rate, HRV, premature beats and lead-off status"
)]
struct Cli {
    /// Logging verbosity when RUST_LOG is unset (e.g., debug, info, warn)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// TOML monitor configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured sampling rate (Hz)
    #[arg(long)]
    sample_rate_hz: Option<f64>,
    /// Enable the mains notch at this frequency (Hz)
    #[arg(long)]
    notch_hz: Option<f64>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<MonitorConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(fs) = self.sample_rate_hz {
            cfg.sample_rate_hz = fs;
        }
        if let Some(notch) = self.notch_hz {
            cfg.filter.notch_hz = Some(notch);
        }
        cfg.validate().context("invalid monitor configuration")?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a live sample stream from stdin or --input, one JSON status line per interval
    Monitor {
        #[command(flatten)]
        config: ConfigArgs,
        /// Live source such as a FIFO or serial device (default stdin);
        /// recorded files go through `replay`
        #[arg(long)]
        input: Option<PathBuf>,
        /// Processing tick period in milliseconds
        #[arg(long, default_value_t = 30)]
        tick_ms: u64,
        /// Append one CSV row per tick and per beat/alert
        #[arg(long)]
        log_csv: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        status_every_s: f64,
    },
    /// Replay a recorded sample file deterministically at the configured rate
    Replay {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Samples per processing tick
        #[arg(long, default_value_t = 6)]
        tick_samples: usize,
        #[arg(long)]
        log_csv: Option<PathBuf>,
        /// Render the final filtered window to a PNG
        #[arg(long)]
        waveform_png: Option<PathBuf>,
        /// Render the Poincaré scatter to a PNG
        #[arg(long)]
        poincare_png: Option<PathBuf>,
    },
    /// Generate a synthetic ECG recording, one sample per line
    Simulate {
        /// TOML scenario; flags below override it
        #[arg(long)]
        scenario: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        duration_s: Option<f64>,
        #[arg(long)]
        bpm: Option<f64>,
        /// Comma-separated beat indices that arrive early
        #[arg(long, value_delimiter = ',')]
        premature: Vec<usize>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write beat and premature-beat times as JSON
        #[arg(long)]
        truth: Option<PathBuf>,
    },
    /// Validate a configuration and print it with defaults filled in
    CheckConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Monitor {
            config,
            input,
            tick_ms,
            log_csv,
            status_every_s,
        } => cmd_monitor(
            &config.resolve()?,
            input.as_deref(),
            tick_ms,
            log_csv.as_deref(),
            status_every_s,
        )?,
        Commands::Replay {
            config,
            input,
            tick_samples,
            log_csv,
            waveform_png,
            poincare_png,
        } => cmd_replay(
            &config.resolve()?,
            input.as_deref(),
            tick_samples,
            log_csv.as_deref(),
            waveform_png.as_deref(),
            poincare_png.as_deref(),
        )?,
        Commands::Simulate {
            scenario,
            seed,
            duration_s,
            bpm,
            premature,
            out,
            truth,
        } => {
            let mut spec = match scenario {
                Some(path) => read_scenario(&path)?,
                None => ScenarioSpec::default(),
            };
            if seed.is_some() {
                spec.seed = seed;
            }
            if let Some(duration_s) = duration_s {
                spec.duration_s = duration_s;
            }
            if let Some(bpm) = bpm {
                spec.heart_rate_bpm = bpm;
            }
            if !premature.is_empty() {
                spec.premature_beats = premature;
            }
            cmd_simulate(&spec, out.as_deref(), truth.as_deref())?
        }
        Commands::CheckConfig { config } => {
            let cfg = config.resolve()?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }
    Ok(())
}

/// Compact per-interval status; the waveform itself is left out.
#[derive(Serialize)]
struct StatusLine {
    t: f64,
    quality: QualityState,
    bpm: BpmReading,
    sdnn_ms: Option<f64>,
    premature: bool,
    alert_weight: f64,
    warming_up: bool,
    counters: MonitorCounters,
}

impl From<&MetricsSnapshot> for StatusLine {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            t: snapshot.t,
            quality: snapshot.quality,
            bpm: snapshot.bpm,
            sdnn_ms: snapshot.sdnn_ms,
            premature: snapshot.premature(),
            alert_weight: snapshot.alert_weight,
            warming_up: snapshot.warming_up,
            counters: snapshot.counters.clone(),
        }
    }
}

#[derive(Serialize)]
struct ReplaySummary {
    samples: usize,
    dropped_lines: usize,
    duration_s: f64,
    status: StatusLine,
    hrv: Option<HrvSummary>,
    rows_logged: Option<u64>,
}

fn open_input(input: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn cmd_monitor(
    cfg: &MonitorConfig,
    input: Option<&Path>,
    tick_ms: u64,
    log_csv: Option<&Path>,
    status_every_s: f64,
) -> Result<()> {
    if let Some(path) = input {
        // samples are stamped on arrival, so a file would collapse into one instant
        let meta = fs::metadata(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        if meta.is_file() {
            bail!(
                "{} is a regular file; use `pulsewatch replay` for recorded data",
                path.display()
            );
        }
    }
    let mut monitor = Monitor::new(cfg.clone())?;
    let clock = MonitorClock::start();
    let (mut feed, reader) = spawn_line_reader(open_input(input)?, clock);
    let mut logger = match log_csv {
        Some(path) => Some(EventLogWorker::spawn(EventLogWriter::create(path)?, 4096)),
        None => None,
    };
    let period = Duration::from_millis(tick_ms.max(1));
    info!("monitoring at {} Hz, tick every {:?}", cfg.sample_rate_hz, period);

    let mut next_status = 0.0;
    loop {
        let started = Instant::now();
        monitor.extend(feed.drain());
        let now = clock.now();
        let events = monitor.tick(now);
        if let Some(logger) = logger.as_mut() {
            for row in rows_for_tick(&events) {
                logger.submit(row);
            }
        }
        if now >= next_status {
            println!("{}", serde_json::to_string(&StatusLine::from(monitor.snapshot()))?);
            next_status = now + status_every_s;
        }
        if feed.is_closed() {
            break;
        }
        std::thread::sleep(period.saturating_sub(started.elapsed()));
    }

    let stats = reader
        .join()
        .map_err(|_| anyhow!("transport reader thread panicked"))?;
    info!(
        "transport closed: {} samples decoded, {} lines dropped",
        stats.decoded, stats.dropped
    );
    if let Some(logger) = logger {
        let dropped = logger.dropped();
        let written = logger.finish()?;
        if dropped > 0 {
            warn!("event log dropped {dropped} rows");
        }
        info!("event log: {written} rows written");
    }
    println!("{}", serde_json::to_string(&StatusLine::from(monitor.snapshot()))?);
    Ok(())
}

fn read_series(input: Option<&Path>) -> Result<DecodedSeries> {
    match input {
        Some(path) => read_sample_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            parse_sample_series(&buf)
        }
    }
}

fn cmd_replay(
    cfg: &MonitorConfig,
    input: Option<&Path>,
    tick_samples: usize,
    log_csv: Option<&Path>,
    waveform_png: Option<&Path>,
    poincare_png: Option<&Path>,
) -> Result<()> {
    if tick_samples == 0 {
        bail!("--tick-samples must be at least 1");
    }
    let series = read_series(input)?;
    if series.dropped > 0 {
        warn!("skipped {} malformed line(s)", series.dropped);
    }
    let fs = cfg.sample_rate_hz;
    let mut monitor = Monitor::new(cfg.clone())?;
    let mut writer = log_csv.map(EventLogWriter::create).transpose()?;

    for (chunk_idx, chunk) in series.values.chunks(tick_samples).enumerate() {
        let base = chunk_idx * tick_samples;
        monitor.extend(
            chunk
                .iter()
                .enumerate()
                .map(|(i, &v)| RawSample::new(v, (base + i) as f64 / fs)),
        );
        let now = (base + chunk.len() - 1) as f64 / fs;
        let events = monitor.tick(now);
        if let Some(writer) = writer.as_mut() {
            for row in rows_for_tick(&events) {
                writer.write_row(&row)?;
            }
        }
    }

    let rows_logged = match writer {
        Some(mut writer) => {
            writer.flush()?;
            Some(writer.rows_written())
        }
        None => None,
    };
    let snapshot = monitor.snapshot();
    if let Some(path) = waveform_png {
        PngBackend::new(path).draw(&waveform_figure(snapshot, fs, 1500))?;
    }
    if let Some(path) = poincare_png {
        PngBackend::new(path).draw(&poincare_figure(&snapshot.poincare))?;
    }

    let summary = ReplaySummary {
        samples: series.values.len(),
        dropped_lines: series.dropped,
        duration_s: series.values.len() as f64 / fs,
        status: StatusLine::from(snapshot),
        hrv: snapshot.hrv,
        rows_logged,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

#[derive(Serialize)]
struct Truth<'a> {
    sample_rate_hz: f64,
    beat_times: &'a [f64],
    premature_times: &'a [f64],
}

fn cmd_simulate(spec: &ScenarioSpec, out: Option<&Path>, truth: Option<&Path>) -> Result<()> {
    let rec = simulate(spec)?;
    match out {
        Some(path) => write_samples(path, &rec.values)?,
        None => print!("{}", render_samples(&rec.values)),
    }
    if let Some(path) = truth {
        let truth = Truth {
            sample_rate_hz: rec.sample_rate_hz,
            beat_times: &rec.beat_times,
            premature_times: &rec.premature_times,
        };
        fs::write(path, serde_json::to_string_pretty(&truth)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    info!(
        "simulated {:.1}s: {} beats, {} premature",
        rec.duration_s(),
        rec.beat_times.len(),
        rec.premature_times.len()
    );
    Ok(())
}

/// PNG renderer for [`Figure`]s.
struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: (800, 480),
        }
    }
}

fn widen(range: [f64; 2]) -> std::ops::Range<f64> {
    if range[1] > range[0] {
        range[0]..range[1]
    } else {
        (range[0] - 1.0)..(range[1] + 1.0)
    }
}

fn rgb(color: pulsewatch_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let (x, y) = fig.bounds().unwrap_or(([0.0, 1.0], [0.0, 1.0]));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(widen(x), widen(y))?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    chart.draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        rgb(line.style.color).stroke_width(line.style.width.round().max(1.0) as u32),
                    ))?;
                }
                Series::Scatter(scatter) => {
                    let style = rgb(scatter.color).filled();
                    chart.draw_series(
                        scatter
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), scatter.radius, style)),
                    )?;
                }
            }
        }
        root.present()
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
