//! LED controller reached over udp (USR-WIFI232 in pwm mode)
//! 设计
//! - one listener thread consumes every reply and keeps the duty cache
//! - one polling thread refreshes the cache every `poll_interval`
//! - the caller's thread sends requests through `RequestCycle`
//! - `stop` (or drop) closes the shutdown channel and joins both threads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crossbeam::channel::{self, Sender};
use crate::common::error::DriverError;
use crate::common::logger::{Reporter, Severity};
use crate::common::setting::{self, Settings};
use crate::driver::traits::Transport;
use crate::{error, info};
use super::device_state::DeviceState;
use super::dummy_transport::DummyTransport;
use super::entity::*;
use super::prelude::*;
use super::request_cycle::RequestCycle;
use super::udp_transport::UdpTransport;
use super::{listener_thread, polling_thread};

const LOG_TAG: &str = "led_udp_device.rs | led udp device";

// numbers devices created without a name
static DEVICE_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct LedUdpDevice {
    cycle: Arc<RequestCycle>,
    reporter: Reporter,
    default_frequency: Frequency,
    // dropping it tells both threads to exit
    shutdown_tx: Option<Sender<()>>,
    listener_handle: Option<JoinHandle<()>>,
    poller_handle: Option<JoinHandle<()>>,
}

impl LedUdpDevice {
    /// connect to the controller at `ip:port`
    /// pins, timing and frequency come from the process settings
    pub fn new(ip: &str, port: u16, name: Option<&str>, verbosity: u8) -> Result<Self, DriverError> {
        let settings = Settings::get();
        let mut options = DeviceOptions::from_settings(settings);
        options.verbosity = verbosity;

        let identity = make_identity(ip, port, name.unwrap_or(""), &settings.device)?;
        let transport = open_transport(settings, &identity, &options)?;
        Self::with_transport(identity, options, transport)
    }

    /// build the device entirely from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, DriverError> {
        let options = DeviceOptions::from_settings(settings);
        let device = &settings.device;
        let identity = make_identity(&device.ip, device.port, &device.name, device)?;
        let transport = open_transport(settings, &identity, &options)?;
        Self::with_transport(identity, options, transport)
    }

    /// start the listener and polling threads on an existing transport
    pub fn with_transport(
        identity: DeviceIdentity,
        options: DeviceOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DriverError> {
        let reporter = Reporter::new(&identity.name, options.verbosity);
        let thread_name = identity.name.replace(' ', "-");
        let state = Arc::new(DeviceState::new(identity));
        let cycle = Arc::new(RequestCycle::new(
            transport.clone(),
            state.clone(),
            reporter.clone(),
            options.busy_wait,
            options.busy_policy,
        ));

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let mut device = LedUdpDevice {
            cycle: cycle.clone(),
            reporter: reporter.clone(),
            default_frequency: options.default_frequency,
            shutdown_tx: Some(shutdown_tx),
            listener_handle: None,
            poller_handle: None,
        };

        // on error the partially started device is dropped, which stops it
        let listener_rx = shutdown_rx.clone();
        let listener_state = state.clone();
        device.listener_handle = Some(
            thread::Builder::new()
                .name(format!("{}-listener", thread_name))
                .spawn(move || listener_thread::run_loop(transport, listener_state, reporter, listener_rx))
                .map_err(|e| DriverError::communication(format!("cannot start listener thread: {}", e)))?,
        );

        let interval = options.poll_interval;
        device.poller_handle = Some(
            thread::Builder::new()
                .name(format!("{}-poller", thread_name))
                .spawn(move || polling_thread::run_loop(cycle, interval, shutdown_rx))
                .map_err(|e| DriverError::communication(format!("cannot start polling thread: {}", e)))?,
        );

        let identity = state.identity();
        device.reporter.announce(format!(
            " + NEW {}: {} @ {} has been created",
            DEVICE_CATEGORY,
            identity.name,
            identity.address()
        ));
        Ok(device)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.cycle.state().identity()
    }

    pub fn name(&self) -> &str {
        &self.identity().name
    }

    pub fn default_frequency(&self) -> Frequency {
        self.default_frequency
    }

    /// cached duties, as last set or reported
    pub fn current_rgb(&self) -> RgbBo {
        self.cycle.state().rgb()
    }

    pub fn set_pin_pwm(&self, pin: &str, duty: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.cycle.set_channel(pin, duty, frequency.unwrap_or(self.default_frequency))
    }

    pub fn set_channel(&self, channel: Channel, duty: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        let pin = self.identity().pins.pin(channel).to_string();
        self.set_pin_pwm(&pin, duty, frequency)
    }

    pub fn set_red(&self, duty: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.set_channel(Channel::Red, duty, frequency)
    }

    pub fn set_green(&self, duty: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.set_channel(Channel::Green, duty, frequency)
    }

    pub fn set_blue(&self, duty: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.set_channel(Channel::Blue, duty, frequency)
    }

    /// set all three channels, red first
    /// not atomic: a failure can leave the controller with a mix of old and new values
    pub fn set_rgb(&self, red: DutyValue, green: DutyValue, blue: DutyValue, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.cycle
            .set_all(RgbBo::new(red, green, blue), frequency.unwrap_or(self.default_frequency))
    }

    pub fn set_black(&self, frequency: Option<Frequency>) -> Result<(), DriverError> {
        self.set_rgb(0, 0, 0, frequency)
    }

    /// ask the controller for one pin, the reply lands in the cache
    pub fn get_channel_pwm(&self, pin: &str) -> Result<(), DriverError> {
        self.cycle.get_channel(pin)
    }

    /// read every channel back and report the ones that changed behind our back
    pub fn get_current_rgb(&self) -> Result<Vec<ChannelMismatch>, DriverError> {
        self.cycle.refresh_all()
    }

    /// stop both threads and wait for them
    pub fn stop(&mut self) {
        if self.shutdown_tx.is_none() {
            return;
        }
        self.cycle.stop();
        self.shutdown_tx.take();

        for handle in [self.listener_handle.take(), self.poller_handle.take()].into_iter().flatten() {
            let thread_name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(LOG_TAG, "{} thread panicked", thread_name);
            }
        }
        info!(LOG_TAG, "device {} stopped", self.name());
        self.reporter.report(Severity::Notable, "device stopped");
    }
}

impl Drop for LedUdpDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

fn make_identity(ip: &str, port: u16, name: &str, device: &setting::Device) -> Result<DeviceIdentity, DriverError> {
    if ip.is_empty() {
        return Err(DriverError::invalid("device ip must not be empty"));
    }
    let name = if name.is_empty() {
        format!("{} {}", DEVICE_CATEGORY, DEVICE_COUNTER.fetch_add(1, Ordering::SeqCst))
    } else {
        name.to_string()
    };
    Ok(DeviceIdentity {
        ip: ip.to_string(),
        port,
        name,
        pins: PinMap::new(&device.red_pin, &device.green_pin, &device.blue_pin)?,
    })
}

fn open_transport(
    settings: &Settings,
    identity: &DeviceIdentity,
    options: &DeviceOptions,
) -> Result<Arc<dyn Transport>, DriverError> {
    if settings.is_dummy() {
        info!(LOG_TAG, "dummy mode, {} is emulated in process", identity.address());
        return Ok(Arc::new(DummyTransport::emulating(options.receive_timeout)));
    }
    Ok(Arc::new(UdpTransport::connect(&identity.address(), options.receive_timeout)?))
}
