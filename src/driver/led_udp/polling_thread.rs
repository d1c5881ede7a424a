use std::sync::Arc;
use std::time::Duration;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use crate::common::error::ErrorCode;
use crate::{error, info, trace};
use super::request_cycle::RequestCycle;

const LOG_TAG: &str = "polling_thread.rs | status polling";

/// status polling worker
/// refresh the cached duties every `interval`, so changes made by someone
/// else show up without the caller asking
pub fn run_loop(
    cycle: Arc<RequestCycle>,
    interval: Duration,
    // closed when the device stops
    shutdown_rx: Receiver<()>,
) {
    info!(LOG_TAG, "status polling started, interval: {:?}", interval);
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => {
                info!(LOG_TAG, "stop signal received, exiting");
                break;
            }
        }

        match cycle.refresh_all() {
            Ok(mismatches) => {
                trace!(LOG_TAG, "LED updated automatically, {} mismatch(es)", mismatches.len());
            }
            Err(e) if e.code == ErrorCode::DeviceStopped => {
                info!(LOG_TAG, "device stopped, exiting");
                break;
            }
            Err(e) => {
                error!(LOG_TAG, "automatic update failed: {}", e);
            }
        }
    }
}
