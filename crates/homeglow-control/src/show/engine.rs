//! Show engine: worker lifecycle, throttled lamp dispatch, status.
//!
//! One background worker owns the audio -> light pipeline at ~30 Hz. The
//! supervisor (whatever layer calls `start`/`stop`/`set_*`) shares nothing
//! with the worker except the locked engine state and an atomic running
//! flag; locks are never held across a network send or a sleep.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use homeglow_core::audio::source::{PipeSource, WindowRead};
use homeglow_core::SpectrumAnalyzer;

use crate::error::{ControlError, Result};
use crate::lan::LampControl;
use crate::show::modes::{self, LampTarget, ModeState, ShowMode};
use crate::show::{
    LOOP_PERIOD, MIN_CMD_INTERVAL, STOP_JOIN_TIMEOUT, WARM_WHITE, WARM_WHITE_BRIGHTNESS,
};

/// User-tunable show parameters, updated under the engine lock.
#[derive(Debug, Clone, Copy)]
struct ShowConfig {
    mode: ShowMode,
    latency_ms: i32,
    intensity: u8,
}

/// Snapshot returned by [`ShowEngine::status`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// A worker is alive and the mode is not `off`.
    pub active: bool,
    /// Current mode.
    pub mode: ShowMode,
    /// Configured latency offset.
    pub latency_ms: i32,
    /// Show intensity 1..=10.
    pub intensity: u8,
    /// How many device ids resolved to LAN addresses.
    pub lights_connected: usize,
    /// Whether the audio pipe exists right now.
    pub pipe_exists: bool,
}

/// Resolved lamp addresses and per-lamp throttle timestamps. Unresolved
/// ids keep their slot so complementary-pair positions stay stable.
struct LampBank {
    ips: Vec<Option<Ipv4Addr>>,
    last_cmd_at: Vec<Option<Instant>>,
}

struct EngineShared {
    running: AtomicBool,
    config: Mutex<ShowConfig>,
    lamps: Mutex<LampBank>,
}

impl EngineShared {
    fn lock_config(&self) -> MutexGuard<'_, ShowConfig> {
        // A poisoned lock only means a thread panicked mid-update; the
        // plain-old-data inside is still coherent.
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_lamps(&self) -> MutexGuard<'_, LampBank> {
        self.lamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Messages from the worker back to the supervisor.
enum WorkerEvent {
    /// The loop is up and iterating.
    Ready,
    /// The loop exited and the lamps were reset.
    CleanExit,
}

struct Worker {
    handle: JoinHandle<()>,
    events: mpsc::Receiver<WorkerEvent>,
}

/// Drives lamps reactively from PCM analysis, or from a timer pattern when
/// no audio is flowing.
pub struct ShowEngine {
    transport: Arc<dyn LampControl>,
    pipe_path: PathBuf,
    shared: Arc<EngineShared>,
    worker: Option<Worker>,
}

impl ShowEngine {
    /// Create an idle engine reading PCM from `pipe_path`.
    pub fn new(transport: Arc<dyn LampControl>, pipe_path: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            pipe_path: pipe_path.into(),
            shared: Arc::new(EngineShared {
                running: AtomicBool::new(false),
                config: Mutex::new(ShowConfig {
                    mode: ShowMode::Off,
                    latency_ms: 0,
                    intensity: 7,
                }),
                lamps: Mutex::new(LampBank {
                    ips: Vec::new(),
                    last_cmd_at: Vec::new(),
                }),
            }),
            worker: None,
        }
    }

    /// Start the show, or reconfigure a running one.
    ///
    /// Resolves every device id through the transport; fails with
    /// [`ControlError::NoLamps`] when none resolve, leaving the engine
    /// idle. Returns once the worker is observably running.
    pub fn start(
        &mut self,
        mode: ShowMode,
        device_ids: &[String],
        latency_ms: i32,
        intensity: u8,
    ) -> Result<()> {
        if mode == ShowMode::Off {
            return Err(ControlError::BadMode("off".to_string()));
        }
        validate_latency(latency_ms)?;
        if device_ids.is_empty() {
            return Err(ControlError::NoLamps(0));
        }
        let intensity = intensity.clamp(1, 10);

        let ips: Vec<Option<Ipv4Addr>> = device_ids
            .iter()
            .map(|id| match self.transport.resolve_ip(id) {
                Some(ip) => {
                    info!("show: resolved {id} -> {ip}");
                    Some(ip)
                }
                None => {
                    warn!("show: could not resolve address for {id}");
                    None
                }
            })
            .collect();

        if ips.iter().all(Option::is_none) {
            return Err(ControlError::NoLamps(device_ids.len()));
        }

        // A previous stop or mode=off may still be winding the worker
        // down; let it finish so at most one worker ever exists and the
        // old one resets the old lamp set, not the new one.
        if !self.shared.running.load(Ordering::SeqCst) {
            self.join_worker();
        }
        self.reap_finished_worker();

        for ip in ips.iter().flatten() {
            if let Err(e) = self.transport.turn(*ip, true) {
                debug!("power-on for {ip} dropped: {e}");
            }
        }

        {
            let mut config = self.shared.lock_config();
            config.mode = mode;
            config.latency_ms = latency_ms;
            config.intensity = intensity;
        }
        {
            let mut lamps = self.shared.lock_lamps();
            lamps.last_cmd_at = vec![None; ips.len()];
            lamps.ips = ips;
        }

        self.shared.running.store(true, Ordering::SeqCst);

        if self.worker.is_none() {
            let (tx, rx) = mpsc::channel();
            let shared = Arc::clone(&self.shared);
            let transport = Arc::clone(&self.transport);
            let pipe_path = self.pipe_path.clone();
            let handle = thread::Builder::new()
                .name("homeglow-show".to_string())
                .spawn(move || run_worker(shared, transport, pipe_path, tx))?;

            let worker = Worker { handle, events: rx };
            match worker.events.recv_timeout(Duration::from_secs(1)) {
                Ok(WorkerEvent::Ready) => {}
                other => warn!(
                    "show worker did not confirm startup ({})",
                    match other {
                        Ok(_) => "exited immediately",
                        Err(RecvTimeoutError::Timeout) => "timeout",
                        Err(RecvTimeoutError::Disconnected) => "died",
                    }
                ),
            }
            self.worker = Some(worker);
        }

        info!(
            "show started: mode={mode}, lights={}",
            self.shared.lock_lamps().ips.iter().flatten().count()
        );
        Ok(())
    }

    /// Stop the show and reset lamps to warm white.
    ///
    /// Joins the worker with a 2 s deadline. The worker performs the reset
    /// on its way out; if it died without doing so, the reset is emitted
    /// here instead. Reset failures are ignored.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.join_worker();
        self.shared.lock_config().mode = ShowMode::Off;
        info!("show stopped");
    }

    /// Wait (bounded) for the worker to exit. Expects `running` to already
    /// be false so the worker actually winds down.
    fn join_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("show worker did not stop within {STOP_JOIN_TIMEOUT:?}, abandoning it");
                break;
            }
            match worker.events.recv_timeout(deadline - now) {
                Ok(WorkerEvent::CleanExit) => {
                    let _ = worker.handle.join();
                    break;
                }
                Ok(WorkerEvent::Ready) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("show worker died without resetting lamps");
                    let _ = worker.handle.join();
                    reset_lamps(self.transport.as_ref(), &self.shared);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("show worker did not stop within {STOP_JOIN_TIMEOUT:?}, abandoning it");
                    break;
                }
            }
        }
    }

    /// Change the active mode without restarting.
    ///
    /// `off` behaves like [`stop`](Self::stop) except the worker is not
    /// joined synchronously.
    pub fn set_mode(&self, mode: ShowMode) -> Result<()> {
        if mode == ShowMode::Off {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.lock_config().mode = ShowMode::Off;
            info!("show mode set to off, worker winding down");
            return Ok(());
        }
        let mut config = self.shared.lock_config();
        if config.mode != mode {
            info!("show mode changed to {mode}");
        }
        config.mode = mode;
        Ok(())
    }

    /// Adjust the latency offset in milliseconds (range -500..=500).
    ///
    /// Negative offsets are stored and reported but treated as zero by the
    /// worker; pre-empting commands would need a lookahead buffer that does
    /// not exist.
    pub fn set_latency(&self, ms: i32) -> Result<()> {
        validate_latency(ms)?;
        self.shared.lock_config().latency_ms = ms;
        Ok(())
    }

    /// Set show intensity; values outside 1..=10 are clamped.
    pub fn set_intensity(&self, level: u8) {
        self.shared.lock_config().intensity = level.clamp(1, 10);
    }

    /// Apply a partial configuration update. Everything is validated before
    /// anything is applied.
    pub fn set_config(
        &self,
        mode: Option<ShowMode>,
        latency_ms: Option<i32>,
        intensity: Option<u8>,
    ) -> Result<()> {
        if let Some(ms) = latency_ms {
            validate_latency(ms)?;
        }
        if let Some(mode) = mode {
            self.set_mode(mode)?;
        }
        if let Some(ms) = latency_ms {
            self.shared.lock_config().latency_ms = ms;
        }
        if let Some(level) = intensity {
            self.set_intensity(level);
        }
        Ok(())
    }

    /// Snapshot of the engine state.
    pub fn status(&self) -> EngineStatus {
        let config = *self.shared.lock_config();
        let lights_connected = self.shared.lock_lamps().ips.iter().flatten().count();
        let worker_alive = self
            .worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished());

        EngineStatus {
            active: worker_alive
                && config.mode != ShowMode::Off
                && self.shared.running.load(Ordering::SeqCst),
            mode: config.mode,
            latency_ms: config.latency_ms,
            intensity: config.intensity,
            lights_connected,
            pipe_exists: self.pipe_path.exists(),
        }
    }

    /// Path of the audio pipe this engine reads.
    pub fn pipe_path(&self) -> &Path {
        &self.pipe_path
    }

    /// Drop a worker that has already exited (panic included) so the next
    /// `start` spawns a fresh one.
    fn reap_finished_worker(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.handle.is_finished());
        if !finished {
            return;
        }
        if let Some(worker) = self.worker.take() {
            self.shared.running.store(false, Ordering::SeqCst);
            if worker.handle.join().is_err() {
                warn!("previous show worker had panicked");
            }
        }
    }
}

impl Drop for ShowEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn validate_latency(ms: i32) -> Result<()> {
    if (-500..=500).contains(&ms) {
        Ok(())
    } else {
        Err(ControlError::ConfigOutOfRange {
            name: "latency_ms",
            value: ms as i64,
            lo: -500,
            hi: 500,
        })
    }
}

/// The worker loop: ~30 Hz, audio when available, pattern otherwise.
fn run_worker(
    shared: Arc<EngineShared>,
    transport: Arc<dyn LampControl>,
    pipe_path: PathBuf,
    events: mpsc::Sender<WorkerEvent>,
) {
    let _ = events.send(WorkerEvent::Ready);
    info!("show worker started");

    let mut analyzer = SpectrumAnalyzer::new();
    let mut state = ModeState::default();
    let mut source: Option<PipeSource> = None;
    let started = Instant::now();
    let mut prev_mode = shared.lock_config().mode;

    loop {
        let iteration_start = Instant::now();

        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        let config = *shared.lock_config();
        if config.mode == ShowMode::Off {
            break;
        }
        if config.mode != prev_mode {
            // Clean transition: restart the phase accumulators and the
            // bass baseline.
            state = ModeState::default();
            analyzer.reset();
            prev_mode = config.mode;
            debug!("worker picked up mode change to {}", config.mode);
        }

        let mut source_closed = false;
        let targets: Option<[LampTarget; 2]> = if !pipe_path.exists() {
            source = None;
            Some(modes::pattern_targets(
                config.mode,
                &mut state,
                started.elapsed().as_secs_f32(),
                config.intensity,
            ))
        } else {
            if source.is_none() {
                match PipeSource::open(&pipe_path) {
                    Ok(s) => {
                        info!("audio source connected: {}", pipe_path.display());
                        source = Some(s);
                    }
                    Err(e) => {
                        // Masked into pattern-only, never surfaced.
                        let masked = ControlError::AudioUnavailable(e.to_string());
                        debug!("{masked}; staying pattern-only");
                    }
                }
            }
            match source.as_mut() {
                None => Some(modes::pattern_targets(
                    config.mode,
                    &mut state,
                    started.elapsed().as_secs_f32(),
                    config.intensity,
                )),
                Some(src) => match src.read_window() {
                    WindowRead::Window(window) => {
                        let mono = window.to_mono();
                        let frame = analyzer.analyze(&mono);
                        if config.latency_ms > 0 {
                            thread::sleep(Duration::from_millis(config.latency_ms as u64));
                        }
                        Some(modes::audio_targets(
                            config.mode,
                            &mut state,
                            &frame,
                            config.intensity,
                        ))
                    }
                    WindowRead::Silent => Some(modes::pattern_targets(
                        config.mode,
                        &mut state,
                        started.elapsed().as_secs_f32(),
                        config.intensity,
                    )),
                    WindowRead::Closed => {
                        source_closed = true;
                        None
                    }
                },
            }
        };

        if source_closed {
            info!("audio source closed, stopping show");
            break;
        }

        if let Some(targets) = targets {
            for (idx, target) in targets.iter().enumerate() {
                emit(&shared, transport.as_ref(), idx, target);
            }
        }

        let elapsed = iteration_start.elapsed();
        if elapsed < LOOP_PERIOD {
            thread::sleep(LOOP_PERIOD - elapsed);
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    reset_lamps(transport.as_ref(), &shared);
    info!("show worker exited");
    let _ = events.send(WorkerEvent::CleanExit);
}

/// Send one color/brightness pair to a lamp position, subject to the
/// per-lamp 50 ms throttle. The lock is released before anything touches
/// the network.
fn emit(shared: &EngineShared, transport: &dyn LampControl, idx: usize, target: &LampTarget) {
    let ip = {
        let mut lamps = shared.lock_lamps();
        if idx >= lamps.ips.len() {
            return;
        }
        let Some(ip) = lamps.ips[idx] else {
            return;
        };
        let now = Instant::now();
        if let Some(last) = lamps.last_cmd_at[idx] {
            if now.duration_since(last) < MIN_CMD_INTERVAL {
                return;
            }
        }
        lamps.last_cmd_at[idx] = Some(now);
        ip
    };

    let (r, g, b) = target.rgb;
    if let Err(e) = transport.set_color(ip, r, g, b) {
        debug!("lamp {idx} color send dropped: {e}");
    }
    if let Err(e) = transport.set_brightness(ip, target.brightness.clamp(1, 100)) {
        debug!("lamp {idx} brightness send dropped: {e}");
    }
}

/// Emit the warm-white reset to every resolved lamp, bypassing the
/// throttle. Failures are ignored.
fn reset_lamps(transport: &dyn LampControl, shared: &EngineShared) {
    let ips: Vec<Ipv4Addr> = shared.lock_lamps().ips.iter().flatten().copied().collect();
    for ip in ips {
        let (r, g, b) = WARM_WHITE;
        if let Err(e) = transport.set_color(ip, r, g, b) {
            debug!("reset color for {ip} dropped: {e}");
        }
        if let Err(e) = transport.set_brightness(ip, WARM_WHITE_BRIGHTNESS) {
            debug!("reset brightness for {ip} dropped: {e}");
        }
    }
}
