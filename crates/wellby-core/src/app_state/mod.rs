//! Device-wide state and event entry points
//!
//! [`DeviceContext`] owns the recording session, the transport, the battery
//! monitor and the connection flag. Radio callbacks and the main loop reach
//! the core only through its methods and through a [`CommandSender`] on the
//! shared [`CommandQueue`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::power::{BatteryMonitor, BatteryStatus, PowerSource};
use crate::processing::HrvMetrics;
use crate::recording::{RecordingSession, TickOutcome};
use crate::sensors::{SampleSource, SensorError};
use crate::transport::{
    Characteristic, CommandError, RecordingCommand, Transport, encode_hrv_record,
};

pub const COMMAND_QUEUE_DEPTH: usize = 4;

pub type CommandQueue = Channel<CriticalSectionRawMutex, RecordingCommand, COMMAND_QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    Idle,
    Recording,
    Error,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("sensor unavailable after {attempts} attempts: {last}")]
    SensorInit { attempts: u32, last: SensorError },
}

/// Producer side of the command queue, handed to the radio's write callback.
#[derive(Clone)]
pub struct CommandSender<'a> {
    sender: Sender<'a, CriticalSectionRawMutex, RecordingCommand, COMMAND_QUEUE_DEPTH>,
}

impl<'a> CommandSender<'a> {
    pub fn new(queue: &'a CommandQueue) -> Self {
        Self {
            sender: queue.sender(),
        }
    }

    /// Parse a raw control write and queue it for the next poll.
    pub fn submit(&self, payload: &[u8]) -> Result<RecordingCommand, CommandError> {
        let command = RecordingCommand::try_from(payload)?;
        self.sender.try_send(command).map_err(|_| {
            warn!("Command queue full, dropping {command:?}");
            CommandError::QueueFull
        })?;
        Ok(command)
    }
}

/// Only lets notifications through while a peer is connected.
struct ConnectionGate<'t, T> {
    transport: &'t mut T,
    connected: bool,
}

impl<T: Transport> Transport for ConnectionGate<'_, T> {
    fn notify(&mut self, characteristic: Characteristic, payload: &[u8]) -> bool {
        self.connected && self.transport.notify(characteristic, payload)
    }
}

pub struct DeviceContext<'a, S, C, T, P> {
    session: RecordingSession<S, C>,
    transport: T,
    battery: BatteryMonitor<P>,
    commands: Receiver<'a, CriticalSectionRawMutex, RecordingCommand, COMMAND_QUEUE_DEPTH>,
    connected: bool,
    run_state: AppRunState,
}

impl<'a, S, C, T, P> DeviceContext<'a, S, C, T, P>
where
    S: SampleSource,
    C: Clock,
    T: Transport,
    P: PowerSource,
{
    pub fn new(
        session: RecordingSession<S, C>,
        transport: T,
        battery: BatteryMonitor<P>,
        queue: &'a CommandQueue,
    ) -> Self {
        Self {
            session,
            transport,
            battery,
            commands: queue.receiver(),
            connected: false,
            run_state: AppRunState::Uninitialized,
        }
    }

    /// One initialization attempt; retry policy belongs to the caller.
    pub async fn init_sensor(&mut self) -> Result<(), SensorError> {
        match self.session.sensor_mut().init().await {
            Ok(()) => {
                self.run_state = AppRunState::Idle;
                Ok(())
            }
            Err(e) => {
                error!("Sensor init failed: {e}");
                self.run_state = AppRunState::Error;
                Err(e)
            }
        }
    }

    pub fn on_connect(&mut self) {
        self.connected = true;
        info!("Peer connected");
        let status = self.battery.refresh();
        self.notify_battery(status);
    }

    pub fn on_disconnect(&mut self, reason: u8) {
        self.connected = false;
        info!("Peer disconnected, reason {reason:#04x}");
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Apply every queued command. Returns how many were applied.
    pub async fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_receive() {
            info!("Applying {command:?}");
            match command {
                RecordingCommand::Start => {
                    if let Err(e) = self.session.start().await {
                        error!("Start command failed: {e}");
                    }
                }
                RecordingCommand::Stop => self.session.stop().await,
            }
            applied += 1;
        }
        applied
    }

    /// Queued commands first, then one session tick.
    pub async fn poll(&mut self) -> TickOutcome {
        self.apply_commands().await;

        let mut gate = ConnectionGate {
            transport: &mut self.transport,
            connected: self.connected,
        };
        let outcome = self.session.tick(&mut gate).await;

        if self.run_state != AppRunState::Error && self.run_state != AppRunState::Uninitialized {
            self.run_state = if self.session.is_active() {
                AppRunState::Recording
            } else {
                AppRunState::Idle
            };
        }
        outcome
    }

    /// Send the HRV record. `false` if it was not delivered.
    pub fn publish_metrics(&mut self, metrics: &HrvMetrics) -> bool {
        let record = match encode_hrv_record(metrics) {
            Ok(record) => record,
            Err(e) => {
                error!("HRV record encoding failed: {e:?}");
                return false;
            }
        };
        let delivered = self.gate().notify(Characteristic::HrvMetrics, &record);
        if !delivered {
            warn!("HRV record not delivered, no peer connected");
        }
        delivered
    }

    pub fn notify_battery(&mut self, status: BatteryStatus) -> bool {
        self.gate()
            .notify(Characteristic::BatteryStatus, &[status.as_byte()])
    }

    fn gate(&mut self) -> ConnectionGate<'_, T> {
        ConnectionGate {
            transport: &mut self.transport,
            connected: self.connected,
        }
    }

    pub fn run_state(&self) -> AppRunState {
        self.run_state
    }

    pub fn session(&self) -> &RecordingSession<S, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RecordingSession<S, C> {
        &mut self.session
    }

    pub fn battery_mut(&mut self) -> &mut BatteryMonitor<P> {
        &mut self.battery
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
