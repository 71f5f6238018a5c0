use anyhow::{Context, Result, bail};
use clap::Parser;
use crowdsense::config::PipelineConfig;
use crowdsense::pipeline::{Detection, FrameInput};
use crowdsense::stream_hub::{StreamAlert, StreamHandle, StreamHub, TerminalBell, spawn_alarm_worker};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replays a JSON-lines detection log through the alerting engine and prints every
/// alert as a JSON line.
#[derive(Parser, Debug)]
#[command(name = "replay_tester", about = "Replay recorded detections through crowdsense")]
struct Args {
    /// One frame per line: {"t": 12.4, "hour": 22, "camera": "lobby", "detections": [...]}
    input: PathBuf,
    /// TOML config; defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Camera name for lines that don't carry one.
    #[arg(long, default_value = "replay")]
    camera: String,
    /// Ring the terminal bell on high-severity alerts.
    #[arg(long)]
    bell: bool,
    /// Minimum seconds between two bells.
    #[arg(long, default_value_t = 5)]
    bell_interval_seconds: u64,
    /// Print each stream's final HUD to stderr.
    #[arg(long)]
    summary: bool,
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    t: f64,
    #[serde(default)]
    hour: Option<u8>,
    #[serde(default)]
    camera: Option<String>,
    #[serde(default)]
    detections: Vec<Detection>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    // --- 1. Setup ---
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let reader = BufReader::new(
        File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?,
    );

    let mut hub = StreamHub::new(256);
    let bell = args.bell.then(|| {
        spawn_alarm_worker(
            hub.subscribe(),
            TerminalBell,
            Duration::from_secs(args.bell_interval_seconds),
        )
    });

    // --- 2. Replay Loop ---
    let mut streams: BTreeMap<String, StreamHandle> = BTreeMap::new();
    let mut out = BufWriter::new(std::io::stdout().lock());
    let mut frames = 0u64;
    let mut alerts = 0u64;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FrameRecord = serde_json::from_str(&line)
            .with_context(|| format!("parsing line {line_no}"))?;

        let camera = record.camera.unwrap_or_else(|| args.camera.clone());
        let stream = match streams.get(&camera) {
            Some(stream) => stream.clone(),
            None => {
                let stream = hub
                    .open(camera.clone(), config.clone(), args.fps)
                    .context("opening stream")?;
                streams.insert(camera.clone(), stream.clone());
                stream
            }
        };

        let input = FrameInput {
            detections: record.detections,
            now: record.t,
            local_hour: record.hour,
        };
        let report = stream.submit(input).await?;
        frames += 1;
        if report.dropped > 0 {
            warn!(line = line_no, dropped = report.dropped, "malformed detections skipped");
        }

        // --- 3. Output ---
        for event in report.alerts {
            let tagged = StreamAlert {
                camera: camera.clone(),
                event,
            };
            serde_json::to_writer(&mut out, &tagged)?;
            out.write_all(b"\n")?;
            alerts += 1;
        }
    }
    out.flush()?;
    drop(out);

    if frames == 0 {
        bail!("{} contained no frames", args.input.display());
    }

    if args.summary {
        for (camera, stream) in &streams {
            eprintln!("[{camera}]");
            for line in stream.render().hud_lines() {
                eprintln!("  {line}");
            }
        }
    }

    // --- 4. Teardown ---
    hub.shutdown_all().await;
    drop(hub);
    if let Some(worker) = bell {
        worker.await.context("alarm worker")?;
    }
    info!(frames, alerts, streams = streams.len(), "replay finished");
    Ok(())
}
