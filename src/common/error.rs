use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    // unknown error
    UnknownError = 1000,
    // settings could not be loaded or are invalid
    ConfigError = 1001,
    // bad pin, frequency or device identity
    InvalidArgument = 1002,
    // datagram could not be sent or received
    CommunicationFailed = 1003,
    // controller reply is not "<frequency> <duty>"
    MalformedResponse = 1004,
    // previous request never got its reply
    RequestTimeout = 1005,
    // device was stopped, background threads are gone
    DeviceStopped = 1006,
}

/// driver error, carries a code and a human readable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: ErrorCode,
    pub msg: String,
}

impl DriverError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        DriverError { code, msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, msg)
    }

    pub fn communication(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CommunicationFailed, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedResponse, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RequestTimeout, msg)
    }

    pub fn stopped(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceStopped, msg)
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "driver error code: {}, msg: {}", self.code as u16, self.msg)
    }
}

impl Error for DriverError {}

impl From<config::ConfigError> for DriverError {
    fn from(e: config::ConfigError) -> Self {
        DriverError::config(format!("cannot load settings: {}", e))
    }
}

impl From<toml::de::Error> for DriverError {
    fn from(e: toml::de::Error) -> Self {
        DriverError::config(format!("settings format invalid: {}", e))
    }
}
