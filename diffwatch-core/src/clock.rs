//! Cooperative event source for the scheduler, deliberately decoupled from
//! it per spec.md §9 ("inject a timer-like capability so tests can drive
//! virtual time"). Mirrors the teacher's `tokio::time::interval`-driven loops
//! in `scanner::background`, generalised to emit two independently-ticking
//! event kinds instead of one.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    PollWakeup(DateTime<Utc>),
    ChaseWakeup(DateTime<Utc>),
}

impl ClockEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClockEvent::PollWakeup(ts) | ClockEvent::ChaseWakeup(ts) => *ts,
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = ClockEvent> + Send>>;

/// A source of `PollWakeup`/`ChaseWakeup` events.
pub trait Clock: Send + Sync {
    fn start(&self, cancel: CancellationToken) -> EventStream;
}

/// Real-time clock: one immediate `PollWakeup` on start, then
/// `PollWakeup` every `wakeup_interval` and `ChaseWakeup` every
/// `chase_interval`, terminating when `cancel` fires.
pub struct SystemClock {
    wakeup_interval: Duration,
    chase_interval: Duration,
}

impl SystemClock {
    pub fn new(wakeup_interval: Duration, chase_interval: Duration) -> Self {
        Self {
            wakeup_interval,
            chase_interval,
        }
    }
}

impl Clock for SystemClock {
    fn start(&self, cancel: CancellationToken) -> EventStream {
        let wakeup_interval = self.wakeup_interval;
        let chase_interval = self.chase_interval;
        let (tx, mut rx) = mpsc::unbounded_channel::<ClockEvent>();

        // One task per tick kind, each feeding the same channel; the
        // scheduler consumes a single merged stream and handles both event
        // kinds independently, matching the "ordering not guaranteed" note
        // in spec.md §4.1.
        let poll_tx = tx.clone();
        let poll_cancel = cancel.clone();
        tokio::spawn(async move {
            // Immediate startup tick so the scheduler works on a cold
            // database without waiting a full interval.
            if poll_tx.send(ClockEvent::PollWakeup(Utc::now())).is_err() {
                return;
            }
            let mut interval = tokio::time::interval(wakeup_interval);
            interval.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = poll_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if poll_tx.send(ClockEvent::PollWakeup(Utc::now())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let chase_tx = tx.clone();
        let chase_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(chase_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = chase_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if chase_tx.send(ClockEvent::ChaseWakeup(Utc::now())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        drop(tx);

        Box::pin(stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }
}

/// Test double that replays an externally-pushed sequence of events instead
/// of wall-clock timers, used to drive scenarios S1-S6 deterministically.
pub struct VirtualClock {
    events: std::sync::Mutex<Vec<ClockEvent>>,
}

impl VirtualClock {
    pub fn new(events: Vec<ClockEvent>) -> Self {
        Self {
            events: std::sync::Mutex::new(events),
        }
    }
}

impl Clock for VirtualClock {
    fn start(&self, _cancel: CancellationToken) -> EventStream {
        let events = std::mem::take(&mut *self.events.lock().expect("virtual clock mutex poisoned"));
        Box::pin(stream! {
            for event in events {
                yield event;
            }
        })
    }
}
