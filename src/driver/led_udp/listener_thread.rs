//! udp listener worker
//! - blocks on the transport, one datagram per iteration
//! - attributes every reply to the pin of the pending request token and
//!   releases the token
//! - a bad datagram or a transport error never ends the loop, only the
//!   shutdown signal does

use std::sync::Arc;
use crossbeam::channel::{Receiver, TryRecvError};
use crate::common::error::DriverError;
use crate::common::logger::{Reporter, Severity};
use crate::driver::traits::Transport;
use crate::info;
use super::device_state::{DeviceState, Dispatch};
use super::prelude::*;
use super::protocol;

const LOG_TAG: &str = "listener_thread.rs | udp listener";

pub fn run_loop(
    transport: Arc<dyn Transport>,
    state: Arc<DeviceState>,
    reporter: Reporter,
    // closed when the device stops
    shutdown_rx: Receiver<()>,
) {
    info!(LOG_TAG, "listener started for {}", state.identity().address());
    let mut buf = [0u8; RECV_BUFFER_LEN];

    loop {
        match shutdown_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => {
                info!(LOG_TAG, "stop signal received, exiting");
                break;
            }
        }

        let n = match transport.receive(&mut buf) {
            Ok(Some(n)) => n,
            Ok(None) => continue,
            Err(e) => {
                reporter.report(Severity::Error, format!("receive failed, keep listening: {}", e.msg));
                continue;
            }
        };

        if let Err(e) = handle_datagram(&state, &reporter, &buf[..n]) {
            // pending token stays, the caller waiting on it falls back to its timeout
            reporter.report(Severity::Verbose, format!("datagram dropped: {}", e.msg));
        }
    }
}

/// parse one datagram and dispatch it against the pending request
pub fn handle_datagram(state: &DeviceState, reporter: &Reporter, data: &[u8]) -> Result<Dispatch, DriverError> {
    reporter.report(Severity::Verbose, format!("Response: {}", String::from_utf8_lossy(data)));
    let message = protocol::parse_response(data)?;

    let dispatch = state.complete_pending(&message);
    match &dispatch {
        Dispatch::Updated { channel, duty, .. } => {
            reporter.report(Severity::Verbose, format!("Current {} {}", channel, duty));
        }
        Dispatch::UnknownPin(request) => {
            reporter.report(Severity::Notable, format!("Requested pin not recognized: {}", request.command));
        }
        Dispatch::NoPending => {
            reporter.report(
                Severity::Error,
                format!("unsolicited response ignored: {} {}", message.frequency, message.duty),
            );
        }
    }
    Ok(dispatch)
}
