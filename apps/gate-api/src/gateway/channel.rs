//! A single delivery channel and its lifecycle.
//!
//! `Connecting → Live → Closing → Closed`. Only `Live` channels receive
//! events. `Closed` is final; a reconnecting client gets a new channel.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gatehouse_common::id::{prefix, prefixed_ulid};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::events::GuestArrival;
use super::transport::{ChannelSink, PushError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Connecting = 0,
    Live = 1,
    Closing = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelState::Connecting,
            1 => ChannelState::Live,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

pub struct Channel {
    id: String,
    resident_id: i64,
    state: AtomicU8,
    last_seen: Mutex<Instant>,
    closing: Notify,
    sink: Arc<dyn ChannelSink>,
}

impl Channel {
    /// A new channel with a fresh `ch_` id, in `Connecting`.
    pub fn open(resident_id: i64, sink: Arc<dyn ChannelSink>) -> Self {
        Self::with_id(prefixed_ulid(prefix::CHANNEL), resident_id, sink)
    }

    pub fn with_id(id: String, resident_id: i64, sink: Arc<dyn ChannelSink>) -> Self {
        Self {
            id,
            resident_id,
            state: AtomicU8::new(ChannelState::Connecting as u8),
            last_seen: Mutex::new(Instant::now()),
            closing: Notify::new(),
            sink,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resident_id(&self) -> i64 {
        self.resident_id
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.state() == ChannelState::Live
    }

    /// `Connecting → Live`. Returns false if the channel already left
    /// `Connecting`.
    pub(crate) fn mark_live(&self) -> bool {
        self.transition(ChannelState::Connecting, ChannelState::Live)
    }

    /// Move to `Closing` from `Connecting` or `Live`. Returns false if the
    /// channel was already closing or closed.
    pub fn begin_close(&self) -> bool {
        let moved = self.transition(ChannelState::Live, ChannelState::Closing)
            || self.transition(ChannelState::Connecting, ChannelState::Closing);
        if moved {
            self.closing.notify_one();
        }
        moved
    }

    pub(crate) fn mark_closed(&self) {
        if self.state.swap(ChannelState::Closed as u8, Ordering::AcqRel)
            < ChannelState::Closing as u8
        {
            self.closing.notify_one();
        }
    }

    /// Resolves once the channel has stopped being live.
    pub async fn closed(&self) {
        loop {
            let notified = self.closing.notified();
            if matches!(self.state(), ChannelState::Closing | ChannelState::Closed) {
                return;
            }
            notified.await;
        }
    }

    /// Record client activity.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    pub async fn push(&self, event: Arc<GuestArrival>, timeout: Duration) -> Result<(), PushError> {
        if !self.is_live() {
            return Err(PushError::Closed);
        }
        self.sink.push(event, timeout).await
    }

    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("resident_id", &self.resident_id)
            .field("state", &self.state())
            .finish()
    }
}
