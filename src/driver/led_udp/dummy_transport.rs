//! in process stand-in for the controller
//! - `scripted`: datagrams are injected by hand, sent commands can be read back
//! - `emulating`: answers every command the way the firmware does
//!
//! used by `mode = "dummy"` and by the tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crate::common::error::DriverError;
use crate::driver::traits::Transport;
use crate::{info, trace};
use super::prelude::*;
use super::protocol::{self, Command};

const LOG_TAG: &str = "dummy_transport.rs | dummy controller";

#[derive(Debug, Default)]
struct DummyController {
    // pin -> (frequency, duty)
    pins: HashMap<String, (Frequency, DutyValue)>,
}

impl DummyController {
    fn answer(&mut self, data: &[u8]) -> Option<String> {
        match protocol::parse_command(data) {
            Ok(Command::Get { pin }) => {
                let (frequency, duty) = self.pins.get(&pin).copied().unwrap_or((DEFAULT_FREQUENCY, 0));
                Some(protocol::build_response(frequency, duty))
            }
            Ok(Command::Set { pin, frequency, duty }) => {
                self.pins.insert(pin, (frequency, duty));
                Some(protocol::build_response(frequency, duty))
            }
            Err(e) => {
                info!(LOG_TAG, "dummy controller ignores datagram: {}", e);
                None
            }
        }
    }
}

pub struct DummyTransport {
    sent_tx: Sender<String>,
    sent_rx: Receiver<String>,
    inbound_tx: Sender<Vec<u8>>,
    inbound_rx: Receiver<Vec<u8>>,
    idle: Duration,
    controller: Option<Mutex<DummyController>>,
    fail_sends: AtomicBool,
    // receives left to fail
    fail_receives: AtomicUsize,
}

impl DummyTransport {
    fn build(idle: Duration, controller: Option<DummyController>) -> Self {
        let (sent_tx, sent_rx) = channel::unbounded();
        let (inbound_tx, inbound_rx) = channel::unbounded();
        DummyTransport {
            sent_tx,
            sent_rx,
            inbound_tx,
            inbound_rx,
            idle,
            controller: controller.map(Mutex::new),
            fail_sends: AtomicBool::new(false),
            fail_receives: AtomicUsize::new(0),
        }
    }

    /// nothing answers, replies come from `inject`
    pub fn scripted(idle: Duration) -> Self {
        Self::build(idle, None)
    }

    /// every command is answered like the real controller would
    pub fn emulating(idle: Duration) -> Self {
        Self::build(idle, Some(DummyController::default()))
    }

    /// preload the emulated controller, as if someone else had set the pin
    pub fn preset(&self, pin: &str, frequency: Frequency, duty: DutyValue) {
        if let Some(controller) = &self.controller {
            controller
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pins
                .insert(pin.to_string(), (frequency, duty));
        }
    }

    /// queue a datagram for the listener
    pub fn inject(&self, data: &str) {
        let _ = self.inbound_tx.send(data.as_bytes().to_vec());
    }

    /// commands sent so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.sent_rx.try_iter().collect()
    }

    /// make every following `send` fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// make the next `count` receives fail, queued datagrams stay queued
    pub fn fail_next_receives(&self, count: usize) {
        self.fail_receives.store(count, Ordering::SeqCst);
    }
}

impl Transport for DummyTransport {
    fn send(&self, data: &[u8]) -> Result<(), DriverError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DriverError::communication("dummy transport refuses to send"));
        }
        let command = String::from_utf8_lossy(data).to_string();
        trace!(LOG_TAG, "send: {}", command);
        let _ = self.sent_tx.send(command);

        if let Some(controller) = &self.controller {
            let reply = controller.lock().unwrap_or_else(PoisonError::into_inner).answer(data);
            if let Some(reply) = reply {
                let _ = self.inbound_tx.send(reply.into_bytes());
            }
        }
        Ok(())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>, DriverError> {
        let failing = self
            .fail_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DriverError::communication("dummy transport refuses to receive"));
        }
        match self.inbound_rx.recv_timeout(self.idle) {
            Ok(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(Some(n))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::communication("dummy inbound channel closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receive_str(transport: &DummyTransport) -> Option<String> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        transport
            .receive(&mut buf)
            .unwrap()
            .map(|n| String::from_utf8_lossy(&buf[..n]).to_string())
    }

    #[test]
    fn test_scripted() {
        let transport = DummyTransport::scripted(Duration::from_millis(10));
        transport.send(b"PWM 3 GET").unwrap();
        assert_eq!(transport.sent(), vec!["PWM 3 GET".to_string()]);
        assert_eq!(receive_str(&transport), None);

        transport.inject("30000 12");
        assert_eq!(receive_str(&transport), Some("30000 12".to_string()));
    }

    #[test]
    fn test_emulating() {
        let transport = DummyTransport::emulating(Duration::from_millis(10));
        transport.preset("2", 30000, 25);

        transport.send(b"PWM 2 GET").unwrap();
        assert_eq!(receive_str(&transport), Some("30000 25".to_string()));

        transport.send(b"PWM 1 1000 60").unwrap();
        assert_eq!(receive_str(&transport), Some("1000 60".to_string()));
        transport.send(b"PWM 1 GET").unwrap();
        assert_eq!(receive_str(&transport), Some("1000 60".to_string()));
    }

    #[test]
    fn test_fail_sends() {
        let transport = DummyTransport::emulating(Duration::from_millis(10));
        transport.set_fail_sends(true);
        assert!(transport.send(b"PWM 2 GET").is_err());
        assert!(transport.sent().is_empty());
        assert_eq!(receive_str(&transport), None);
    }

    #[test]
    fn test_fail_receives() {
        let transport = DummyTransport::scripted(Duration::from_millis(10));
        transport.inject("30000 12");
        transport.fail_next_receives(2);

        let mut buf = [0u8; RECV_BUFFER_LEN];
        assert!(transport.receive(&mut buf).is_err());
        assert!(transport.receive(&mut buf).is_err());
        assert_eq!(receive_str(&transport), Some("30000 12".to_string()));
    }
}
