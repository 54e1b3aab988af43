//! The simulated device: channels, command set and connection loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use sd_controls::{ChannelState, PidGains};
use sd_core::{ChannelId, Real, SdError};
use tracing::{debug, error, info};

use crate::command::CommandTable;
use crate::config::DeviceConfig;
use crate::connection::{ConnectionManager, LineHandler};
use crate::dispatch::Dispatcher;
use crate::error::{DeviceError, DeviceResult};
use crate::verbosity::{FixedVerbosity, VerbosityControl, level_from_debug};
use crate::worker::ChannelWorker;

/// A running multi-channel control device.
///
/// Channels start ticking as soon as the device is built. [`power_on`]
/// starts serving clients; [`kill`] stops everything. Dropping the last
/// handle kills the device too: the connection thread only holds a weak
/// reference.
///
/// [`power_on`]: Device::power_on
/// [`kill`]: Device::kill
pub struct Device {
    model: String,
    version: String,
    channels: Vec<ChannelWorker>,
    dispatcher: Dispatcher,
    config: DeviceConfig,
    verbosity: Box<dyn VerbosityControl>,
    alive: Arc<AtomicBool>,
    killed: AtomicBool,
    comm_thread: Mutex<Option<JoinHandle<()>>>,
    local_addr: OnceLock<SocketAddr>,
}

impl Device {
    /// Build a device whose log level cannot be changed at runtime.
    pub fn new(config: DeviceConfig) -> DeviceResult<Arc<Self>> {
        Self::with_verbosity(config, Box::new(FixedVerbosity))
    }

    /// Build a device and start every channel's tick loop.
    pub fn with_verbosity(
        config: DeviceConfig,
        verbosity: Box<dyn VerbosityControl>,
    ) -> DeviceResult<Arc<Self>> {
        config.validate()?;
        let poll = config.poll()?;

        let mut channels = Vec::with_capacity(config.nchannels);
        for index in 0..config.nchannels {
            let index = u32::try_from(index).map_err(|_| DeviceError::Config {
                what: "nchannels is too large",
            })?;
            let state = ChannelState::new(ChannelId::from_index(index), &config.channel)?;
            channels.push(ChannelWorker::spawn(state, poll)?);
        }
        info!(
            model = %config.model,
            channels = channels.len(),
            mode = ?config.channel.mode,
            "device created"
        );

        Ok(Arc::new(Self {
            model: config.model.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            channels,
            dispatcher: Dispatcher::new(CommandTable::standard()),
            config,
            verbosity,
            alive: Arc::new(AtomicBool::new(true)),
            killed: AtomicBool::new(false),
            comm_thread: Mutex::new(None),
            local_addr: OnceLock::new(),
        }))
    }

    /// Bind the listener and start the connection loop on its own thread.
    ///
    /// Returns the bound address (useful when the configured port is 0).
    pub fn power_on(self: &Arc<Self>) -> DeviceResult<SocketAddr> {
        if !self.is_alive() {
            return Err(DeviceError::State {
                what: "device has been killed",
            });
        }
        let mut slot = lock(&self.comm_thread);
        if slot.is_some() {
            return Err(DeviceError::State {
                what: "device is already powered on",
            });
        }

        let manager = ConnectionManager::bind(&self.config.connection)?;
        let addr = manager.local_addr()?;
        let link = DeviceLink(Arc::downgrade(self));
        let alive = Arc::clone(&self.alive);
        let handle = thread::Builder::new()
            .name("sd-comm".to_string())
            .spawn(move || {
                info!("Starting simple device...");
                manager.serve(&link, &alive);
            })?;
        *slot = Some(handle);
        let _ = self.local_addr.set(addr);
        Ok(addr)
    }

    /// Stop every channel, then the connection loop.
    ///
    /// Blocks until every channel thread has exited. Only the first call does
    /// anything.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down device...");
        for channel in &self.channels {
            channel.kill();
        }
        self.alive.store(false, Ordering::Release);
        info!("Done.");
    }

    /// Block until the connection loop has exited.
    pub fn wait(&self) {
        let handle = lock(&self.comm_thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("connection thread panicked");
            }
        }
    }

    /// Address the listener is bound to, once powered on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// `false` once the device has been killed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Execute one command line as a client would send it.
    pub fn execute(&self, line: &str) -> Option<String> {
        self.dispatcher.execute(self, line)
    }

    /// Execute one tokenized command and report why it produced no output.
    pub fn dispatch(&self, tokens: &[&str]) -> DeviceResult<Option<String>> {
        self.dispatcher.dispatch(self, tokens)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `"<model> | <version>"`.
    pub fn identity(&self) -> String {
        format!("{} | {}", self.model, self.version)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Validate a protocol channel token against this device.
    pub fn parse_channel(&self, token: &str) -> DeviceResult<ChannelId> {
        Ok(ChannelId::parse(token, self.channels.len())?)
    }

    pub fn channel(&self, id: ChannelId) -> DeviceResult<&ChannelWorker> {
        self.channels.get(id.index()).ok_or_else(|| {
            DeviceError::Core(SdError::IndexOob {
                what: "channel number",
                index: id.number() as usize,
                len: self.channels.len(),
            })
        })
    }

    /// Sum of `sin(readback)` over all channels plus uniform noise.
    pub fn scalar_reading(&self) -> Real {
        let signal: Real = self
            .channels
            .iter()
            .map(|ch| ch.with_state(|s| s.readback()).sin())
            .sum();
        signal + rand::random::<Real>() * self.config.scalar_noise_level
    }

    pub fn readback(&self, id: ChannelId) -> DeviceResult<Real> {
        Ok(self.channel(id)?.with_state(|s| s.readback()))
    }

    /// Returns the setpoint actually stored after clamping.
    pub fn set_setpoint(&self, id: ChannelId, target: Real) -> DeviceResult<Real> {
        let stored = self.channel(id)?.with_state(|s| s.set_setpoint(target))?;
        debug!(channel = %id, setpoint = stored, "setpoint updated");
        Ok(stored)
    }

    /// Rate applied on the channel's latest tick.
    pub fn live_ramp_rate(&self, id: ChannelId) -> DeviceResult<Real> {
        Ok(self.channel(id)?.with_state(|s| s.live_ramp_rate()))
    }

    pub fn target_ramp_rate(&self, id: ChannelId) -> DeviceResult<Real> {
        Ok(self.channel(id)?.with_state(|s| s.ramp_rate()))
    }

    /// Returns the ramp rate actually stored after clamping.
    pub fn set_ramp_rate(&self, id: ChannelId, rate: Real) -> DeviceResult<Real> {
        let stored = self.channel(id)?.with_state(|s| s.set_ramp_rate(rate))?;
        debug!(channel = %id, ramp_rate = stored, "ramp rate updated");
        Ok(stored)
    }

    pub fn is_at_rest(&self, id: ChannelId) -> DeviceResult<bool> {
        Ok(self.channel(id)?.with_state(|s| s.is_at_rest()))
    }

    /// Freeze a ramping channel at its readback. Returns the at-rest flag.
    pub fn stop(&self, id: ChannelId) -> DeviceResult<bool> {
        let (stopped, at_rest) = self
            .channel(id)?
            .with_state(|s| (s.stop(), s.is_at_rest()));
        if stopped {
            debug!(channel = %id, "Stopping channel");
        }
        Ok(at_rest)
    }

    pub fn gains(&self, id: ChannelId) -> DeviceResult<PidGains> {
        Ok(self.channel(id)?.with_state(|s| s.gains()))
    }

    pub fn set_gains(&self, id: ChannelId, gains: PidGains) -> DeviceResult<PidGains> {
        Ok(self.channel(id)?.with_state(|s| s.set_gains(gains))?)
    }

    /// Apply a `DEBUG` level (0-5).
    pub fn set_log_level(&self, level: u32) -> DeviceResult<()> {
        let filter = level_from_debug(level).ok_or(DeviceError::InvalidLogLevel { level })?;
        self.verbosity.set_level(filter)?;
        info!(%filter, "Updated log level");
        Ok(())
    }
}

/// The connection loop's view of the device; does not keep it alive.
struct DeviceLink(Weak<Device>);

impl LineHandler for DeviceLink {
    fn handle_line(&self, line: &str) -> Option<String> {
        self.0.upgrade()?.execute(line)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.kill();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
