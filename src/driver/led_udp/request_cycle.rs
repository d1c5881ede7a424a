//! synchronous request side of the driver
//!
//! the controller's replies carry no pin, so only one request may be in
//! flight. every operation runs under `request_lock`: wait for the token,
//! record it, send. the reply itself is picked up by the listener thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use crate::common::error::{DriverError, ErrorCode};
use crate::common::logger::{Reporter, Severity};
use crate::common::setting::BusyPolicy;
use crate::driver::traits::Transport;
use crate::debug;
use super::device_state::DeviceState;
use super::entity::*;
use super::prelude::*;

const LOG_TAG: &str = "request_cycle.rs | request cycle";

pub struct RequestCycle {
    transport: Arc<dyn Transport>,
    state: Arc<DeviceState>,
    reporter: Reporter,
    busy_wait: Duration,
    busy_policy: BusyPolicy,
    request_lock: Mutex<()>,
    stopped: AtomicBool,
}

impl RequestCycle {
    pub fn new(
        transport: Arc<dyn Transport>,
        state: Arc<DeviceState>,
        reporter: Reporter,
        busy_wait: Duration,
        busy_policy: BusyPolicy,
    ) -> Self {
        RequestCycle {
            transport,
            state,
            reporter,
            busy_wait,
            busy_policy,
            request_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    /// refuse every further request, the listener is going away
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<MutexGuard<'_, ()>, DriverError> {
        let guard = self.request_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_stopped() {
            return Err(DriverError::stopped(format!(
                "device {} has been stopped",
                self.state.identity().name
            )));
        }
        Ok(guard)
    }

    /// ask the controller for the duty of `pin`
    /// returns once the request is sent, the reply updates the cache later
    pub fn get_channel(&self, pin: &str) -> Result<(), DriverError> {
        let _guard = self.begin()?;
        let request = PendingRequest::get(pin)?;
        self.claim(&request, self.busy_policy)?;
        self.send(&request)
    }

    /// set the duty of `pin` and update the cache right away
    /// the cache reflects the caller's intent even if the datagram is lost.
    /// a set is never refused: if the previous reply does not show up within
    /// the bound the slot is reset and the set goes out anyway
    pub fn set_channel(&self, pin: &str, duty: DutyValue, frequency: Frequency) -> Result<(), DriverError> {
        let _guard = self.begin()?;
        let request = PendingRequest::set(pin, frequency, duty)?;
        self.claim(&request, BusyPolicy::Proceed)?;

        if let Some(channel) = self.state.identity().pins.channel_of(pin) {
            self.state.set_duty(channel, duty);
        }
        self.reporter.report(Severity::Verbose, &request.command);
        self.send(&request)
    }

    /// set the three channels red, green, blue
    /// every channel is attempted, the first error is returned
    pub fn set_all(&self, rgb: RgbBo, frequency: Frequency) -> Result<(), DriverError> {
        let mut first_err = None;
        for channel in Channel::ALL {
            let pin = self.state.identity().pins.pin(channel).to_string();
            if let Err(e) = self.set_channel(&pin, rgb.get(channel), frequency) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// read all three channels back and report the ones that changed
    pub fn refresh_all(&self) -> Result<Vec<ChannelMismatch>, DriverError> {
        let previous = self.state.rgb();

        for channel in Channel::ALL {
            let pin = self.state.identity().pins.pin(channel).to_string();
            self.get_channel(&pin)?;
        }
        // let the last reply land before comparing
        if !self.state.wait_until_free(self.busy_wait) {
            self.reporter.report(Severity::Error, "no reply to the last refresh request");
        }

        let current = self.state.rgb();
        let mismatches: Vec<ChannelMismatch> = Channel::ALL
            .into_iter()
            .filter(|c| previous.get(*c) != current.get(*c))
            .map(|c| ChannelMismatch {
                channel: c,
                previous: previous.get(c),
                current: current.get(c),
            })
            .collect();

        for m in mismatches.iter() {
            self.reporter.report(
                Severity::Notable,
                format!("LED {} color mismatch: {}", m.channel.name(), m),
            );
        }
        Ok(mismatches)
    }

    /// wait for the request slot and record `request` in it
    fn claim(&self, request: &PendingRequest, policy: BusyPolicy) -> Result<(), DriverError> {
        if !self.state.wait_until_free(self.busy_wait) {
            match policy {
                BusyPolicy::Proceed => {
                    let stale = self.state.clear_pending().map(|r| r.command).unwrap_or_default();
                    self.reporter.report(
                        Severity::Error,
                        format!("no reply to '{}' within {:?}, sending '{}' anyway", stale, self.busy_wait, request.command),
                    );
                }
                BusyPolicy::Fail => {
                    // the lost reply costs this request only, the next one finds the slot free
                    let stale = self.state.pending();
                    if let Some(stale) = &stale {
                        self.state.clear_pending_if(stale);
                    }
                    return Err(DriverError::timeout(format!(
                        "no reply to '{}' within {:?}, '{}' not sent",
                        stale.map(|r| r.command).unwrap_or_default(),
                        self.busy_wait,
                        request.command
                    )));
                }
            }
        }

        // the listener only ever clears the token and every writer holds request_lock
        if !self.state.try_claim(request.clone()) {
            return Err(DriverError::new(
                ErrorCode::UnknownError,
                format!("request slot taken while sending '{}'", request.command),
            ));
        }
        debug!(LOG_TAG, "pending request: {}", request.command);
        Ok(())
    }

    fn send(&self, request: &PendingRequest) -> Result<(), DriverError> {
        if let Err(e) = self.transport.send(request.command.as_bytes()) {
            // nobody will answer a request that never left
            self.state.clear_pending_if(request);
            self.reporter.report(Severity::Error, format!("'{}' not sent: {}", request.command, e.msg));
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::{self, JoinHandle};
    use std::time::Instant;
    use crossbeam::channel::{self, Sender};
    use crate::common::logger::init_logger;
    use crate::driver::led_udp::dummy_transport::DummyTransport;
    use crate::driver::led_udp::listener_thread;

    const BUSY_WAIT: Duration = Duration::from_millis(200);

    struct Harness {
        transport: Arc<DummyTransport>,
        cycle: Arc<RequestCycle>,
        shutdown_tx: Option<Sender<()>>,
        listener: Option<JoinHandle<()>>,
    }

    impl Harness {
        fn new(transport: DummyTransport, policy: BusyPolicy, listen: bool) -> Self {
            let _ = init_logger();
            let transport = Arc::new(transport);
            let state = Arc::new(DeviceState::new(DeviceIdentity {
                ip: "127.0.0.1".to_string(),
                port: 8899,
                name: "cycle test".to_string(),
                pins: PinMap::default(),
            }));
            let reporter = Reporter::new("cycle test", 4);
            let cycle = Arc::new(RequestCycle::new(transport.clone(), state.clone(), reporter.clone(), BUSY_WAIT, policy));

            let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
            let listener = if listen {
                let transport: Arc<dyn Transport> = transport.clone();
                Some(thread::spawn(move || listener_thread::run_loop(transport, state, reporter, shutdown_rx)))
            } else {
                None
            };

            Harness { transport, cycle, shutdown_tx: Some(shutdown_tx), listener }
        }

        fn state(&self) -> &Arc<DeviceState> {
            self.cycle.state()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.shutdown_tx.take();
            if let Some(handle) = self.listener.take() {
                let _ = handle.join();
            }
        }
    }

    #[test]
    fn test_get_channel_records_token() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.cycle.get_channel("3").unwrap();
        assert_eq!(h.transport.sent(), vec!["PWM 3 GET".to_string()]);
        assert_eq!(h.state().pending().unwrap().command, "PWM 3 GET");
    }

    #[test]
    fn test_set_channel_updates_cache_once() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.cycle.set_channel("2", 40, 30000).unwrap();
        assert_eq!(h.state().rgb(), RgbBo::new(0, 40, 0));
        assert_eq!(h.transport.sent(), vec!["PWM 2 30000 40".to_string()]);
        assert_eq!(h.state().pending().unwrap().pin, "2");
    }

    #[test]
    fn test_set_channel_updates_cache_when_send_fails() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.transport.set_fail_sends(true);

        let err = h.cycle.set_channel("1", 70, 30000).unwrap_err();
        assert_eq!(err.code, ErrorCode::CommunicationFailed);
        assert_eq!(h.state().rgb(), RgbBo::new(0, 0, 70));
        assert!(!h.state().is_pending());
    }

    #[test]
    fn test_set_channel_unknown_pin_leaves_cache() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.cycle.set_channel("6", 70, 30000).unwrap();
        assert_eq!(h.state().rgb(), RgbBo::default());
        assert_eq!(h.transport.sent(), vec!["PWM 6 30000 70".to_string()]);
    }

    #[test]
    fn test_invalid_arguments() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        assert_eq!(h.cycle.set_channel("1", 70, 0).unwrap_err().code, ErrorCode::InvalidArgument);
        assert_eq!(h.cycle.get_channel("1 2").unwrap_err().code, ErrorCode::InvalidArgument);
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn test_set_all_order() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.cycle.set_all(RgbBo::new(10, 20, 30), 1000).unwrap();
        assert_eq!(
            h.transport.sent(),
            vec!["PWM 3 1000 10".to_string(), "PWM 2 1000 20".to_string(), "PWM 1 1000 30".to_string()]
        );
        assert_eq!(h.state().rgb(), RgbBo::new(10, 20, 30));
    }

    #[test]
    fn test_set_then_reply_round_trip() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, true);
        h.cycle.set_channel("3", 40, 30000).unwrap();
        h.transport.inject("30000 40");
        assert!(h.state().wait_until_free(Duration::from_secs(5)));
        assert_eq!(h.state().duty(Channel::Red), 40);
    }

    #[test]
    fn test_get_channel_proceeds_after_timeout() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.state().try_claim(PendingRequest::get("3").unwrap());

        let start = Instant::now();
        h.cycle.get_channel("2").unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= BUSY_WAIT);
        assert!(elapsed < BUSY_WAIT + Duration::from_millis(300));
        assert_eq!(h.state().pending().unwrap().pin, "2");
        assert_eq!(h.transport.sent(), vec!["PWM 2 GET".to_string()]);
    }

    #[test]
    fn test_get_channel_fails_after_timeout() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Fail, false);
        h.state().try_claim(PendingRequest::get("3").unwrap());

        let start = Instant::now();
        let err = h.cycle.get_channel("2").unwrap_err();
        assert!(start.elapsed() < BUSY_WAIT + Duration::from_millis(300));
        assert_eq!(err.code, ErrorCode::RequestTimeout);
        assert!(!h.state().is_pending());
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn test_lost_reply_fails_only_once() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Fail, false);
        h.cycle.get_channel("3").unwrap();

        // the reply to 'PWM 3 GET' never arrives
        assert_eq!(h.cycle.get_channel("2").unwrap_err().code, ErrorCode::RequestTimeout);
        h.cycle.get_channel("2").unwrap();
        assert_eq!(h.state().pending().unwrap().command, "PWM 2 GET");
        assert_eq!(h.transport.sent(), vec!["PWM 3 GET".to_string(), "PWM 2 GET".to_string()]);
    }

    #[test]
    fn test_refresh_recovers_after_lost_reply() {
        let transport = DummyTransport::emulating(Duration::from_millis(5));
        transport.preset("3", 30000, 7);
        let h = Harness::new(transport, BusyPolicy::Fail, true);
        // a request the controller never answered
        h.state().try_claim(PendingRequest::get("1").unwrap());

        assert_eq!(h.cycle.refresh_all().unwrap_err().code, ErrorCode::RequestTimeout);
        let mismatches = h.cycle.refresh_all().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].channel, Channel::Red);
        assert_eq!(h.state().duty(Channel::Red), 7);
    }

    #[test]
    fn test_set_channel_never_refused() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Fail, false);
        h.state().try_claim(PendingRequest::get("3").unwrap());

        let start = Instant::now();
        h.cycle.set_channel("1", 15, 30000).unwrap();
        assert!(start.elapsed() < BUSY_WAIT + Duration::from_millis(300));
        assert_eq!(h.state().pending().unwrap().command, "PWM 1 30000 15");
        assert_eq!(h.state().duty(Channel::Blue), 15);
    }

    #[test]
    fn test_set_waits_for_previous_reply() {
        let h = Harness::new(DummyTransport::emulating(Duration::from_millis(5)), BusyPolicy::Proceed, true);
        h.cycle.set_all(RgbBo::new(1, 2, 3), 30000).unwrap();
        assert!(h.state().wait_until_free(Duration::from_secs(5)));
        // every reply went to the pin it answers
        assert_eq!(h.state().rgb(), RgbBo::new(1, 2, 3));
    }

    #[test]
    fn test_refresh_reports_single_mismatch() {
        let transport = DummyTransport::emulating(Duration::from_millis(5));
        transport.preset("3", 30000, 10);
        transport.preset("2", 30000, 25);
        transport.preset("1", 30000, 30);
        let h = Harness::new(transport, BusyPolicy::Proceed, true);
        h.state().set_duty(Channel::Red, 10);
        h.state().set_duty(Channel::Green, 20);
        h.state().set_duty(Channel::Blue, 30);

        let mismatches = h.cycle.refresh_all().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].channel, Channel::Green);
        assert_eq!(mismatches[0].to_string(), "20 -> 25");
        assert_eq!(h.state().rgb(), RgbBo::new(10, 25, 30));
        assert_eq!(
            h.transport.sent(),
            vec!["PWM 3 GET".to_string(), "PWM 2 GET".to_string(), "PWM 1 GET".to_string()]
        );
    }

    #[test]
    fn test_concurrent_callers_keep_attribution() {
        let transport = DummyTransport::emulating(Duration::from_millis(5));
        transport.preset("3", 30000, 11);
        transport.preset("2", 30000, 22);
        transport.preset("1", 30000, 33);
        let h = Harness::new(transport, BusyPolicy::Fail, true);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cycle = h.cycle.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        cycle.refresh_all().unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert!(h.state().wait_until_free(Duration::from_secs(5)));
        assert_eq!(h.state().rgb(), RgbBo::new(11, 22, 33));
    }

    #[test]
    fn test_stopped_cycle_refuses_requests() {
        let h = Harness::new(DummyTransport::scripted(Duration::from_millis(5)), BusyPolicy::Proceed, false);
        h.cycle.stop();
        assert_eq!(h.cycle.get_channel("3").unwrap_err().code, ErrorCode::DeviceStopped);
        assert_eq!(h.cycle.set_channel("3", 1, 30000).unwrap_err().code, ErrorCode::DeviceStopped);
        assert!(h.transport.sent().is_empty());
    }
}
