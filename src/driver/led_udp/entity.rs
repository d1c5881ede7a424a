use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use serde::Serialize;
use crate::common::error::DriverError;
use crate::common::setting::{BusyPolicy, Settings};
use super::prelude::*;
use super::protocol;

/// one of the three colour lines of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// bulk operations always walk the channels in this order
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Red => "RED",
            Channel::Green => "GREEN",
            Channel::Blue => "BLUE",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match self {
            Channel::Red => "Red",
            Channel::Green => "Green",
            Channel::Blue => "Blue",
        };
        write!(f, "{}", s)
    }
}

/// channel to controller pin mapping, the three pins are distinct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    red: String,
    green: String,
    blue: String,
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            red: DEFAULT_RED_PIN.to_string(),
            green: DEFAULT_GREEN_PIN.to_string(),
            blue: DEFAULT_BLUE_PIN.to_string(),
        }
    }
}

impl PinMap {
    pub fn new(red: &str, green: &str, blue: &str) -> Result<Self, DriverError> {
        for pin in [red, green, blue] {
            protocol::validate_pin(pin)?;
        }
        if red == green || red == blue || green == blue {
            return Err(DriverError::invalid(format!(
                "pins must be distinct, red: {}, green: {}, blue: {}",
                red, green, blue
            )));
        }
        Ok(PinMap {
            red: red.to_string(),
            green: green.to_string(),
            blue: blue.to_string(),
        })
    }

    pub fn pin(&self, channel: Channel) -> &str {
        match channel {
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }

    /// which channel a pin drives, None for pins outside the mapping
    pub fn channel_of(&self, pin: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| self.pin(*c) == pin)
    }
}

/// static identity of one controller, never changes after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub ip: String,
    pub port: u16,
    pub name: String,
    pub pins: PinMap,
}

impl DeviceIdentity {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// cached duty of every channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RgbBo {
    pub red: DutyValue,
    pub green: DutyValue,
    pub blue: DutyValue,
}

impl RgbBo {
    pub fn new(red: DutyValue, green: DutyValue, blue: DutyValue) -> Self {
        RgbBo { red, green, blue }
    }

    pub fn get(&self, channel: Channel) -> DutyValue {
        match channel {
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }

    pub fn set(&mut self, channel: Channel, duty: DutyValue) {
        match channel {
            Channel::Red => self.red = duty,
            Channel::Green => self.green = duty,
            Channel::Blue => self.blue = duty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Set { frequency: Frequency, duty: DutyValue },
}

/// descriptor of the single in-flight request, used to tell which pin a
/// reply is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub pin: String,
    pub command: String,
}

impl PendingRequest {
    pub fn get(pin: &str) -> Result<Self, DriverError> {
        Ok(PendingRequest {
            kind: RequestKind::Get,
            pin: pin.to_string(),
            command: protocol::build_get_command(pin)?,
        })
    }

    pub fn set(pin: &str, frequency: Frequency, duty: DutyValue) -> Result<Self, DriverError> {
        Ok(PendingRequest {
            kind: RequestKind::Set { frequency, duty },
            pin: pin.to_string(),
            command: protocol::build_set_command(pin, frequency, duty)?,
        })
    }
}

/// a parsed controller reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage {
    pub frequency: Frequency,
    pub duty: DutyValue,
}

/// a channel whose value changed between two refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelMismatch {
    pub channel: Channel,
    pub previous: DutyValue,
    pub current: DutyValue,
}

impl Display for ChannelMismatch {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.previous, self.current)
    }
}

/// runtime knobs of one device
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub verbosity: u8,
    pub default_frequency: Frequency,
    pub poll_interval: Duration,
    pub busy_wait: Duration,
    pub busy_policy: BusyPolicy,
    pub receive_timeout: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions::from_settings(&Settings::default())
    }
}

impl DeviceOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        DeviceOptions {
            verbosity: settings.env.verbosity,
            default_frequency: settings.pwm.default_frequency,
            poll_interval: settings.timing.poll_interval(),
            busy_wait: settings.timing.busy_wait(),
            busy_policy: settings.timing.busy_policy,
            receive_timeout: settings.timing.receive_timeout(),
        }
    }
}
