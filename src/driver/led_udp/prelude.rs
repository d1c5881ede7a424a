// pwm duty cycle, 0..=100 on the stock firmware
pub type DutyValue = u32;
// pwm frequency in Hz
pub type Frequency = u32;

pub const DEFAULT_FREQUENCY: Frequency = 30000;
pub const DEFAULT_RED_PIN: &str = "3";
pub const DEFAULT_GREEN_PIN: &str = "2";
pub const DEFAULT_BLUE_PIN: &str = "1";

pub const DEVICE_CATEGORY: &str = "LED UDP";

// the controller never answers with more than this
pub const RECV_BUFFER_LEN: usize = 40;
