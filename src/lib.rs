//! client side driver for network attached pwm LED controllers
//! - commands go out as text datagrams
//! - a listener thread tracks what the controller reports
//! - a polling thread keeps the cached colour fresh

pub mod common;
pub mod driver;

pub use common::error::{DriverError, ErrorCode};
pub use driver::led_udp::entity::{Channel, ChannelMismatch, RgbBo};
pub use driver::led_udp::LedUdpDevice;
