//! shared state of one controller
//! - cached duty of every channel
//! - the pending request token, at most one at a time
//!
//! the listener, the poller and the caller threads only ever touch it
//! through these methods. waiting for a free token parks on a condvar that
//! is signalled whenever the token is cleared

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use super::entity::*;
use super::prelude::*;

#[derive(Debug, Default)]
struct Inner {
    duty: RgbBo,
    pending: Option<PendingRequest>,
}

/// what happened to a reply handed to `complete_pending`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    // the reply was attributed to a channel
    Updated { channel: Channel, previous: DutyValue, duty: DutyValue },
    // the token names a pin outside the mapping, nothing updated
    UnknownPin(PendingRequest),
    // nothing was in flight
    NoPending,
}

#[derive(Debug)]
pub struct DeviceState {
    identity: DeviceIdentity,
    inner: Mutex<Inner>,
    token_freed: Condvar,
}

impl DeviceState {
    pub fn new(identity: DeviceIdentity) -> Self {
        DeviceState {
            identity,
            inner: Mutex::new(Inner::default()),
            token_freed: Condvar::new(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    // nothing in Inner can be left half written, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn duty(&self, channel: Channel) -> DutyValue {
        self.lock().duty.get(channel)
    }

    pub fn rgb(&self) -> RgbBo {
        self.lock().duty
    }

    pub fn set_duty(&self, channel: Channel, duty: DutyValue) {
        self.lock().duty.set(channel, duty);
    }

    pub fn pending(&self) -> Option<PendingRequest> {
        self.lock().pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// record `request` only if nothing is in flight
    pub fn try_claim(&self, request: PendingRequest) -> bool {
        let mut inner = self.lock();
        if inner.pending.is_some() {
            return false;
        }
        inner.pending = Some(request);
        true
    }

    pub fn clear_pending(&self) -> Option<PendingRequest> {
        let cleared = self.lock().pending.take();
        self.token_freed.notify_all();
        cleared
    }

    /// clear the token only while it still is `request`
    pub fn clear_pending_if(&self, request: &PendingRequest) -> bool {
        let mut inner = self.lock();
        if inner.pending.as_ref() != Some(request) {
            return false;
        }
        inner.pending = None;
        drop(inner);
        self.token_freed.notify_all();
        true
    }

    /// block until no request is in flight or `timeout` elapses
    /// returns false on timeout
    pub fn wait_until_free(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .token_freed
            .wait_timeout_while(guard, timeout, |inner| inner.pending.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pending.is_none()
    }

    /// attribute a reply to the pin of the pending token and release the token
    /// token lookup, duty update and release happen under one lock so a new
    /// request cannot slip in between
    pub fn complete_pending(&self, message: &InboundMessage) -> Dispatch {
        let mut inner = self.lock();
        let request = match inner.pending.take() {
            Some(r) => r,
            None => return Dispatch::NoPending,
        };

        let dispatch = match self.identity.pins.channel_of(&request.pin) {
            Some(channel) => {
                let previous = inner.duty.get(channel);
                inner.duty.set(channel, message.duty);
                Dispatch::Updated { channel, previous, duty: message.duty }
            }
            None => Dispatch::UnknownPin(request),
        };
        drop(inner);
        self.token_freed.notify_all();
        dispatch
    }
}
