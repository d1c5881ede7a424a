//! setting config file
//! settings are read from `config_<ENV>.toml` and can be overridden by
//! environment variables, e.g. `LEDUDP__DEVICE__IP=192.168.1.20`

use std::env;
use std::time::Duration;
use lazy_static::lazy_static;
use serde::Deserialize;
use super::error::DriverError;

const ENV_PREFIX: &str = "LEDUDP";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Env {
    pub env: String,
    // level of the module logs, empty means info
    pub log_level: String,
    // device diagnostics, 0 = silent, 1 = critical/init, 2 = errors, 3 = notable operations, 4 = everything
    pub verbosity: u8,
    // "real" talks udp, "dummy" emulates the controller in process
    pub mode: String,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            env: String::from("dev"),
            log_level: String::new(),
            verbosity: 0,
            mode: String::from("real"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Device {
    pub ip: String,
    pub port: u16,
    // empty name means "LED UDP <n>"
    pub name: String,
    pub red_pin: String,
    pub green_pin: String,
    pub blue_pin: String,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            ip: String::from("10.10.100.254"),
            port: 8899,
            name: String::new(),
            red_pin: String::from("3"),
            green_pin: String::from("2"),
            blue_pin: String::from("1"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pwm {
    pub default_frequency: u32,
}

impl Default for Pwm {
    fn default() -> Self {
        Pwm { default_frequency: 30000 }
    }
}

/// what `get_channel` does when the previous request never got its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    // drop the stale token and send anyway
    Proceed,
    // give up with a RequestTimeout error
    Fail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub poll_interval_secs: u64,
    pub busy_wait_iterations: u32,
    pub busy_wait_step_millis: u64,
    pub receive_timeout_millis: u64,
    pub busy_policy: BusyPolicy,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            poll_interval_secs: 10,
            busy_wait_iterations: 20,
            busy_wait_step_millis: 10,
            receive_timeout_millis: 100,
            busy_policy: BusyPolicy::Proceed,
        }
    }
}

impl Timing {
    /// upper bound on waiting for a free request slot
    pub fn busy_wait(&self) -> Duration {
        Duration::from_millis(self.busy_wait_step_millis.saturating_mul(self.busy_wait_iterations as u64))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_millis)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: Env,
    pub device: Device,
    pub pwm: Pwm,
    pub timing: Timing,
}

impl Settings {
    /// load `config_<ENV>.toml` (optional) and environment overrides
    pub fn load() -> Result<Self, DriverError> {
        let env_name = match env::var("ENV") {
            Ok(e) => e,
            Err(_) => {
                log::warn!("no ENV set, use default: 'dev'");
                String::from("dev")
            }
        };

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config_{}", env_name)).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;
        Ok(settings)
    }

    /// parse settings from a toml document, missing keys take defaults
    pub fn from_toml_str(s: &str) -> Result<Self, DriverError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), DriverError> {
        if self.env.verbosity > 4 {
            return Err(DriverError::config(format!("verbosity must be 0..=4, got {}", self.env.verbosity)));
        }
        if self.pwm.default_frequency == 0 {
            return Err(DriverError::config("default_frequency must be positive"));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(DriverError::config("poll_interval_secs must be positive"));
        }
        if self.timing.busy_wait_step_millis.checked_mul(self.timing.busy_wait_iterations as u64).is_none() {
            return Err(DriverError::config("busy wait bound overflows"));
        }
        if self.timing.receive_timeout_millis == 0 {
            return Err(DriverError::config("receive_timeout_millis must be positive"));
        }
        Ok(())
    }

    pub fn is_dummy(&self) -> bool {
        self.env.mode == "dummy"
    }

    pub fn get<'a>() -> &'a Self {
        lazy_static! {
            static ref CACHE: Settings = Settings::load().unwrap_or_else(|e| {
                log::warn!("{}, use default settings", e);
                Settings::default()
            });
        }
        &CACHE
    }
}
