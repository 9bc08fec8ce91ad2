// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The control-plane coordinator (§4.9): a minimal CLI that makes the core
//! runnable without the full external HTTP control plane. `scan` runs the
//! scanner in the foreground; `focus`/`unfocus` spawn and tear down the
//! auto-tune demodulator as a separate process, which owns the SDR stream
//! exclusively while it is alive (§5); `demod` is that process's own entry
//! point, reached only by re-exec'ing this binary.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vrx_app::config::{ConfigFile, DemodConfigFile, ScannerConfigFile};
use vrx_app::init_logging;
use vrx_core::DynResult;
use vrx_dsp::autotune::{AutoTuneConfig, AutoTuneController};
use vrx_dsp::publisher::{BroadcastFramePublisher, FramePublisher};
use vrx_dsp::sample_source::SampleSource;
use vrx_scanner::{EventPublisher, InMemoryCandidateStore, Scanner, ScannerConfig};

const GRACEFUL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(3);
const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - narrowband FPV receiver control plane");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the channel scanner in the foreground until Ctrl-C.
    Scan {
        #[arg(long = "config", short = 'C', value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Spawn the auto-tune demodulator on one channel as a child process.
    ///
    /// `width`/`height`/`fps` fall back to the `[demod]` config section
    /// (reference hardware defaults, ultimately) when not given explicitly.
    Focus {
        #[arg(long = "freq-hz")]
        freq_hz: u64,
        #[arg(long)]
        width: Option<usize>,
        #[arg(long)]
        height: Option<usize>,
        #[arg(long)]
        fps: Option<u32>,
        #[arg(long)]
        pal: bool,
        #[arg(long = "config", short = 'C', value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Terminate a previously focused demodulator, gracefully then forcibly.
    Unfocus,
    /// Hidden worker entry point: the auto-tune controller's own process.
    #[command(hide = true)]
    Demod {
        #[arg(long = "freq-hz")]
        freq_hz: u64,
        #[arg(long)]
        width: Option<usize>,
        #[arg(long)]
        height: Option<usize>,
        #[arg(long)]
        fps: Option<u32>,
        #[arg(long)]
        pal: bool,
    },
}

fn focus_pidfile() -> PathBuf {
    env::temp_dir().join("vrx-focus.pid")
}

async fn run_scan(config_path: Option<PathBuf>) -> DynResult<()> {
    let scanner_cfg = match config_path {
        Some(ref path) => ScannerConfigFile::load_from_file(path)?,
        None => ScannerConfigFile::load_from_default_paths()?.0,
    };

    let config = ScannerConfig {
        channels_hz: scanner_cfg.channels_hz_or_default(),
        sample_rate_hz: scanner_cfg.sample_rate_or_default(),
        dwell_ms: scanner_cfg.dwell_ms_or_default(),
        channel_bw_hz: scanner_cfg.channel_bw_hz_or_default(),
        min_snr_db: scanner_cfg.min_snr_db_or_default(),
        alert_hits: scanner_cfg.alert_hits_or_default(),
        alert_window: scanner_cfg.alert_window_or_default(),
        ema_alpha: 0.1,
    };

    info!(
        "scan: {} channels, dwell={}ms, sr={:.1}MHz",
        config.channels_hz.len(),
        config.dwell_ms,
        config.sample_rate_hz / 1e6
    );

    let hot = config.channels_hz.first().copied();
    let source = SampleSource::select(false, "", 0.0, config.sample_rate_hz, 28, 16, true, hot);
    let store = InMemoryCandidateStore::new();
    let mut scanner = Scanner::new(config, source, store);

    let (stop_tx, stop_rx) = watch::channel(false);
    let publisher = LoggingEventPublisher;

    tokio::select! {
        _ = scanner.run(stop_rx, now_rfc3339, &publisher) => {}
        _ = signal::ctrl_c() => {
            info!("scan: Ctrl-C received, stopping");
            let _ = stop_tx.send(true);
        }
    }
    Ok(())
}

struct LoggingEventPublisher;

impl EventPublisher for LoggingEventPublisher {
    fn publish_snapshot(&self, snapshot: &vrx_scanner::CandidateSnapshot) {
        for c in &snapshot.items {
            info!(
                "candidate {}: snr={:.1}dB power={:.1}dB status={:?} hits={}",
                c.freq_hz, c.ema_snr_db, c.ema_power_db, c.status, c.hits
            );
        }
    }
}

fn now_rfc3339() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("unix:{secs}")
}

async fn run_demod(
    freq_hz: u64,
    width: Option<usize>,
    height: Option<usize>,
    fps: Option<u32>,
    pal: bool,
    config_path: Option<PathBuf>,
) -> DynResult<()> {
    let demod_cfg = match config_path {
        Some(ref path) => DemodConfigFile::load_from_file(path)?,
        None => DemodConfigFile::load_from_default_paths()?.0,
    };

    let width = width.unwrap_or_else(|| demod_cfg.width_or_default());
    let height = height.unwrap_or_else(|| demod_cfg.height_or_default());
    let fps = fps.unwrap_or_else(|| demod_cfg.fps_or_default());

    let config = AutoTuneConfig {
        sample_rate_hz: 8_000_000.0,
        search_radius_hz: demod_cfg.search_radius_hz_or_default(),
        width,
        height,
        prefer_ntsc: if pal { Some(false) } else { None },
        target_rms: demod_cfg.target_rms_or_default(),
    };

    let source = SampleSource::select(
        cfg!(feature = "soapysdr"),
        "",
        freq_hz as f64,
        config.sample_rate_hz,
        demod_cfg.lna_gain_or_default(),
        demod_cfg.vga_gain_or_default(),
        demod_cfg.amp_enabled_or_default(),
        Some(freq_hz),
    );

    let mut controller = AutoTuneController::new(source, freq_hz, config);
    controller.coarse_lock(freq_hz);

    let publisher = BroadcastFramePublisher::new();
    let frame_period = Duration::from_millis(1000 / fps.max(1) as u64);

    info!("demod: focused on {freq_hz} Hz, emitting {width}x{height} @ {fps}fps");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(frame_period) => {
                let frame = controller.tick();
                publisher.publish("vrx/frame", &frame);
            }
            _ = signal::ctrl_c() => {
                info!("demod: Ctrl-C received, releasing sample source");
                break;
            }
        }
    }
    Ok(())
}

fn run_focus(
    freq_hz: u64,
    width: Option<usize>,
    height: Option<usize>,
    fps: Option<u32>,
    pal: bool,
    config_path: Option<PathBuf>,
) -> DynResult<()> {
    let pidfile = focus_pidfile();
    if let Ok(existing) = fs::read_to_string(&pidfile) {
        if let Ok(pid) = existing.trim().parse::<i32>() {
            if process_alive(pid) {
                return Err(format!("already focused (pid {pid}); run `unfocus` first").into());
            }
        }
    }

    // Defensive release: best-effort, covers an orphaned prior acquisition.
    let mut throwaway = SampleSource::new(Box::new(vrx_dsp::sample_source::SyntheticIqSource::new(8_000_000.0, None, 0)));
    throwaway.clear();

    let current_exe = env::current_exe()?;
    let mut cmd = Command::new(current_exe);
    cmd.arg("demod").arg("--freq-hz").arg(freq_hz.to_string());
    if let Some(w) = width {
        cmd.arg("--width").arg(w.to_string());
    }
    if let Some(h) = height {
        cmd.arg("--height").arg(h.to_string());
    }
    if let Some(f) = fps {
        cmd.arg("--fps").arg(f.to_string());
    }
    if pal {
        cmd.arg("--pal");
    }
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    cmd.stdin(Stdio::null());

    let child = cmd.spawn().map_err(|e| format!("failed to spawn demod worker: {e}"))?;
    fs::write(&pidfile, child.id().to_string())?;
    info!("focus: spawned demod worker (pid {}) on {freq_hz} Hz", child.id());
    Ok(())
}

fn run_unfocus() -> DynResult<()> {
    let pidfile = focus_pidfile();
    let Ok(content) = fs::read_to_string(&pidfile) else {
        info!("unfocus: nothing focused");
        return Ok(());
    };
    let pid: i32 = content.trim().parse().map_err(|_| "corrupt pidfile")?;

    if !process_alive(pid) {
        let _ = fs::remove_file(&pidfile);
        info!("unfocus: process already exited");
        return Ok(());
    }

    send_signal(pid, Signal::Term);
    let deadline = std::time::Instant::now() + GRACEFUL_SHUTDOWN_DEADLINE;
    while std::time::Instant::now() < deadline {
        if !process_alive(pid) {
            let _ = fs::remove_file(&pidfile);
            info!("unfocus: demod worker (pid {pid}) exited gracefully");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    warn!("unfocus: pid {pid} did not exit within {:?}, killing", GRACEFUL_SHUTDOWN_DEADLINE);
    send_signal(pid, Signal::Kill);
    let _ = fs::remove_file(&pidfile);
    Ok(())
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: i32, sig: Signal) {
    let raw = match sig {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    unsafe {
        libc::kill(pid, raw);
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _sig: Signal) {
    warn!("process signaling is not implemented on this platform");
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    init_logging(env::var("VRX_LOG").ok().as_deref());
    info!("vrx {} (built {})", env!("CARGO_PKG_VERSION"), env!("VRX_BUILD_DATE"));

    match cli.command {
        Cmd::Scan { config } => run_scan(config).await,
        Cmd::Focus { freq_hz, width, height, fps, pal, config } => {
            run_focus(freq_hz, width, height, fps, pal, config)
        }
        Cmd::Unfocus => run_unfocus(),
        Cmd::Demod { freq_hz, width, height, fps, pal } => {
            run_demod(freq_hz, width, height, fps, pal, None).await.map_err(|e| {
                error!("demod worker exiting: {e}");
                e
            })
        }
    }
}
