//! driver for LED controllers speaking the USR-WIFI232 pwm protocol over udp

pub mod prelude;
pub mod entity;
pub mod protocol;
pub mod device_state;
pub mod udp_transport;
pub mod dummy_transport;
pub mod listener_thread;
pub mod polling_thread;
pub mod request_cycle;
pub mod led_udp_device;

pub use led_udp_device::LedUdpDevice;
