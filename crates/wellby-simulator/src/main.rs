//! Desktop simulator for the wellby PPG wearable.
//!
//! Runs the hardware-independent core against a synthetic PPG front end, an
//! in-memory BLE peer, a draining battery and a manual clock, then walks one
//! full session:
//!
//! 1. sensor bring-up (the first attempt fails, retried with backoff)
//! 2. proximity (wear) check
//! 3. peer connects, writes the start command
//! 4. 60 s of streaming, with a disconnect span and one malformed write
//! 5. window timeout, on-device HRV analysis, HRV record published
//!
//! Set `RUST_LOG=debug` to see per-frame detail.

use core::f32::consts::PI;

use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use env_logger::Env;
use log::{error, info, warn};

use wellby_core::app_state::{AppError, CommandQueue, CommandSender, DeviceContext};
use wellby_core::clock::{Clock, ManualClock};
use wellby_core::config::DeviceConfig;
use wellby_core::power::{BatteryMonitor, PowerSource, adc_to_voltage};
use wellby_core::processing::analyze;
use wellby_core::recording::{RecordingSession, TickOutcome, decode_frame};
use wellby_core::sensors::{SampleSource, SensorError};
use wellby_core::transport::{Characteristic, RecordingCommand, Transport, decode_hrv_record};

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Sensor init attempts before startup is abandoned.
const INIT_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF_MS: u32 = 250;

/// Peer drops out between these points of the window (ms since start).
const DISCONNECT_AT_MS: u64 = 20_000;
const RECONNECT_AT_MS: u64 = 25_000;
/// A malformed control write arrives here.
const BAD_WRITE_AT_MS: u64 = 30_000;

/// BLE supervision timeout reason code.
const REASON_SUPERVISION_TIMEOUT: u8 = 0x08;

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// Synthetic green-channel PPG.
///
/// 72 bpm with respiratory sinus arrhythmia (±5 bpm at 0.25 Hz), a dicrotic
/// harmonic and slow baseline wander.
struct SyntheticPpg {
    sample_period_s: f32,
    t: f32,
    phase: f32,
    powered: bool,
    init_failures: u32,
}

impl SyntheticPpg {
    fn new(sample_rate_hz: u16, init_failures: u32) -> Self {
        Self {
            sample_period_s: 1.0 / sample_rate_hz.max(1) as f32,
            t: 0.0,
            phase: 0.0,
            powered: false,
            init_failures,
        }
    }

    fn next_value(&mut self) -> u32 {
        let heart_hz = 1.2 + 0.08 * (2.0 * PI * 0.25 * self.t).sin();
        self.phase = (self.phase + 2.0 * PI * heart_hz * self.sample_period_s) % (2.0 * PI);
        self.t += self.sample_period_s;

        let pulse = self.phase.sin() + 0.35 * (2.0 * self.phase + 0.9).sin();
        let baseline = 300.0 * (2.0 * PI * 0.05 * self.t).sin();
        (52_000.0 + 900.0 * pulse + baseline) as u32
    }
}

impl SampleSource for SyntheticPpg {
    async fn init(&mut self) -> Result<(), SensorError> {
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(SensorError::Unavailable {
                sensor: "synthetic PPG",
                details: "no response on the bus",
            });
        }
        self.powered = false;
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<u32, SensorError> {
        if !self.powered {
            return Err(SensorError::ReadFailed {
                sensor: "synthetic PPG",
                operation: "read sample",
                details: "sensor is shut down",
            });
        }
        Ok(self.next_value())
    }

    async fn power_on(&mut self) -> Result<(), SensorError> {
        self.powered = true;
        Ok(())
    }

    async fn power_off(&mut self) -> Result<(), SensorError> {
        self.powered = false;
        Ok(())
    }
}

/// Battery ADC that sags a little on every reading.
struct DrainingBattery {
    adc: u16,
    sag_per_read: u16,
}

impl PowerSource for DrainingBattery {
    fn read_voltage(&mut self) -> f32 {
        let voltage = adc_to_voltage(self.adc);
        self.adc = self.adc.saturating_sub(self.sag_per_read);
        voltage
    }
}

/// The phone: keeps everything it is sent.
#[derive(Default)]
struct PeerLink {
    frames: Vec<Vec<u8>>,
    battery: Vec<u8>,
    hrv_records: Vec<Vec<u8>>,
}

impl Transport for PeerLink {
    fn notify(&mut self, characteristic: Characteristic, payload: &[u8]) -> bool {
        match characteristic {
            Characteristic::RawPpg => self.frames.push(payload.to_vec()),
            Characteristic::BatteryStatus => self.battery.extend_from_slice(payload),
            Characteristic::HrvMetrics => self.hrv_records.push(payload.to_vec()),
            Characteristic::RecordingControl => return false,
        }
        true
    }
}

/// Delays move the simulated clock instead of sleeping.
struct SimDelay<'c> {
    clock: &'c ManualClock,
}

impl DelayNs for SimDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(Duration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance(Duration::from_millis(ms as u64));
    }
}

type Device<'a> = DeviceContext<'a, SyntheticPpg, &'a ManualClock, PeerLink, DrainingBattery>;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Sensor bring-up with exponential backoff.
async fn bring_up(device: &mut Device<'_>, delay: &mut SimDelay<'_>) -> Result<(), AppError> {
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 1;
    loop {
        match device.init_sensor().await {
            Ok(()) => {
                info!("Sensor ready after {attempt} attempt(s)");
                return Ok(());
            }
            Err(last) if attempt >= INIT_ATTEMPTS => {
                return Err(AppError::SensorInit {
                    attempts: attempt,
                    last,
                });
            }
            Err(_) => {
                warn!("Retrying sensor init in {backoff_ms} ms");
                delay.delay_ms(backoff_ms).await;
                backoff_ms *= 2;
                attempt += 1;
            }
        }
    }
}

/// Feed the window until it times out, injecting peer events on the way.
async fn stream_window(
    device: &mut Device<'_>,
    commands: &CommandSender<'_>,
    clock: &ManualClock,
    tick: Duration,
) {
    let started_at = clock.now();
    loop {
        let elapsed_ms = clock.now().saturating_duration_since(started_at).as_millis();
        match elapsed_ms {
            DISCONNECT_AT_MS => device.on_disconnect(REASON_SUPERVISION_TIMEOUT),
            RECONNECT_AT_MS => device.on_connect(),
            BAD_WRITE_AT_MS => {
                if let Err(e) = commands.submit(&[0x05]) {
                    warn!("Peer control write rejected: {e}");
                }
            }
            _ => {}
        }

        match device.poll().await {
            TickOutcome::TimedOut => break,
            TickOutcome::Idle => {
                warn!("Recording stopped before the window elapsed");
                break;
            }
            _ => {}
        }
        clock.advance(tick);
    }
}

async fn run(config: DeviceConfig) -> Result<(), AppError> {
    let clock = ManualClock::default();
    let queue = CommandQueue::new();
    let commands = CommandSender::new(&queue);
    let mut delay = SimDelay { clock: &clock };

    let sample_rate_hz = config.sensor.effective_sample_rate_hz();
    let sensor = SyntheticPpg::new(sample_rate_hz, 1);
    let session = RecordingSession::new(sensor, &clock, &config.recording);
    let battery = BatteryMonitor::new(DrainingBattery {
        adc: 1_560,
        sag_per_read: 80,
    });
    let mut device: Device<'_> = DeviceContext::new(session, PeerLink::default(), battery, &queue);

    bring_up(&mut device, &mut delay).await?;

    match device.session_mut().check_proximity(&mut delay, &config.sensor).await {
        Ok(report) if report.worn => info!("Device is worn (average {:.0})", report.average),
        Ok(report) => warn!("Device not worn (average {:.0}), recording anyway", report.average),
        Err(e) => warn!("Proximity check failed: {e}"),
    }

    device.on_connect();
    match commands.submit(&[RecordingCommand::START]) {
        Ok(command) => info!("Peer wrote {command:?}"),
        Err(e) => error!("Start write rejected: {e}"),
    }

    let tick = Duration::from_millis(1_000 / sample_rate_hz.max(1) as u64);
    stream_window(&mut device, &commands, &clock, tick).await;

    let session = device.session();
    info!(
        "Window closed: {} frames delivered, {} dropped, {} samples buffered (full: {})",
        session.frames_delivered(),
        session.frames_dropped(),
        session.recording().len(),
        session.is_data_collected()
    );

    let report = analyze(session.recording(), &config.analysis);
    info!(
        "Analysis: {} valleys, {} segments kept / {} rejected, {} peaks, {} RR intervals",
        report.valleys.len(),
        report.segments_kept,
        report.segments_rejected,
        report.peaks.len(),
        report.rr_intervals.len()
    );
    if let Some(spread) = report.rr_consistency_ms {
        info!("Beat regularity: RR spread {spread:.1} ms");
    }
    match report.metrics {
        Some(metrics) => {
            device.publish_metrics(&metrics);
        }
        None => warn!("Not enough beats for HRV"),
    }

    summarize_peer(device.transport());
    Ok(())
}

/// What the phone ended up with.
fn summarize_peer(peer: &PeerLink) {
    let mut samples = 0usize;
    for frame in &peer.frames {
        match decode_frame(frame) {
            Ok(decoded) => samples += decoded.len(),
            Err(e) => error!("Peer received a corrupt frame: {e}"),
        }
    }
    info!("Peer received {} frames ({samples} samples)", peer.frames.len());

    let battery: String = peer.battery.iter().map(|&b| b as char).collect();
    info!("Peer battery notifications: {battery}");

    for record in &peer.hrv_records {
        match decode_hrv_record(record) {
            Ok(metrics) => info!(
                "Peer HRV record: HR {:.1} bpm, SDNN {:.1} ms, RMSSD {:?} ms",
                metrics.heart_rate_bpm, metrics.sdnn_ms, metrics.rmssd_ms
            ),
            Err(e) => error!("Peer could not decode HRV record: {e:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = DeviceConfig::default();
    info!("Starting wellby simulator");
    info!("Advertising as \"{}\"", config.advertising.device_name());

    if let Err(e) = block_on(run(config)) {
        error!("Startup aborted: {e}");
        std::process::exit(1);
    }

    info!("Simulator exiting");
}
