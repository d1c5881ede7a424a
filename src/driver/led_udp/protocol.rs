//! USR-WIFI232 pwm text protocol, one message per datagram
//!
//! requests:
//!   `PWM <pin> GET`
//!   `PWM <pin> <frequency> <duty>`
//! response:
//!   `<frequency> <duty>`
//!
//! the response carries no pin, callers correlate it with the last request

use crate::common::error::DriverError;
use super::entity::InboundMessage;
use super::prelude::*;

/// pins end up inside a space separated command, so they cannot be empty or
/// contain whitespace
pub fn validate_pin(pin: &str) -> Result<(), DriverError> {
    if pin.is_empty() || pin.chars().any(char::is_whitespace) {
        return Err(DriverError::invalid(format!("invalid pin identifier: '{}'", pin)));
    }
    Ok(())
}

pub fn build_get_command(pin: &str) -> Result<String, DriverError> {
    validate_pin(pin)?;
    Ok(format!("PWM {} GET", pin))
}

pub fn build_set_command(pin: &str, frequency: Frequency, duty: DutyValue) -> Result<String, DriverError> {
    validate_pin(pin)?;
    if frequency == 0 {
        return Err(DriverError::invalid("pwm frequency must be positive"));
    }
    Ok(format!("PWM {} {} {}", pin, frequency, duty))
}

/// parse a controller reply
/// trailing line endings and padding are tolerated, anything else must be
/// exactly two integers separated by one space
pub fn parse_response(data: &[u8]) -> Result<InboundMessage, DriverError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| DriverError::malformed(format!("response is not utf-8: {}", e)))?;
    let text = text.trim_end_matches(|c: char| c == '\r' || c == '\n' || c == '\0');

    let fields: Vec<&str> = text.split(' ').collect();
    if fields.len() != 2 {
        return Err(DriverError::malformed(format!(
            "expected '<frequency> <duty>', got {} fields: '{}'",
            fields.len(),
            text
        )));
    }

    let frequency = fields[0]
        .parse::<Frequency>()
        .map_err(|e| DriverError::malformed(format!("bad frequency '{}': {}", fields[0], e)))?;
    let duty = fields[1]
        .parse::<DutyValue>()
        .map_err(|e| DriverError::malformed(format!("bad duty '{}': {}", fields[1], e)))?;

    Ok(InboundMessage { frequency, duty })
}

/// render a reply the way the controller does, used by the dummy controller
pub fn build_response(frequency: Frequency, duty: DutyValue) -> String {
    format!("{} {}", frequency, duty)
}

/// parsed form of an outgoing command, used by the dummy controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { pin: String },
    Set { pin: String, frequency: Frequency, duty: DutyValue },
}

pub fn parse_command(data: &[u8]) -> Result<Command, DriverError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| DriverError::malformed(format!("command is not utf-8: {}", e)))?;
    let fields: Vec<&str> = text.split(' ').collect();
    match fields.as_slice() {
        ["PWM", pin, "GET"] => Ok(Command::Get { pin: pin.to_string() }),
        ["PWM", pin, frequency, duty] => {
            let frequency = frequency
                .parse::<Frequency>()
                .map_err(|e| DriverError::malformed(format!("bad frequency '{}': {}", frequency, e)))?;
            let duty = duty
                .parse::<DutyValue>()
                .map_err(|e| DriverError::malformed(format!("bad duty '{}': {}", duty, e)))?;
            Ok(Command::Set { pin: pin.to_string(), frequency, duty })
        }
        _ => Err(DriverError::malformed(format!("unknown command: '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorCode;

    #[test]
    fn test_build_commands() {
        assert_eq!(build_get_command("1").unwrap(), "PWM 1 GET");
        assert_eq!(build_set_command("3", 30000, 40).unwrap(), "PWM 3 30000 40");
        assert!(build_set_command("3", 0, 40).is_err());
        assert!(build_get_command("").is_err());
    }

    #[test]
    fn test_parse_response() {
        let msg = parse_response(b"30000 40").unwrap();
        assert_eq!(msg, InboundMessage { frequency: 30000, duty: 40 });

        let msg = parse_response(b"30000 0\r\n").unwrap();
        assert_eq!(msg.duty, 0);
    }

    #[test]
    fn test_parse_malformed_response() {
        let cases: [&[u8]; 7] = [b"notanumber 5", b"30000", b"30000 40 2", b"30000  40", b"", b"30000 -4", b"\xff\xfe 1"];
        for bad in cases {
            let err = parse_response(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::MalformedResponse, "input {:?}", bad);
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(b"PWM 2 GET").unwrap(), Command::Get { pin: "2".to_string() });
        assert_eq!(
            parse_command(b"PWM 1 30000 75").unwrap(),
            Command::Set { pin: "1".to_string(), frequency: 30000, duty: 75 }
        );
        assert!(parse_command(b"HELLO").is_err());
    }
}
