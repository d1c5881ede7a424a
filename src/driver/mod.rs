pub mod traits;
pub mod led_udp;
