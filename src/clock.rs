//! Self-correcting periodic sampling clock.
//!
//! Ticks are scheduled on a fixed grid `start_time + k * interval`. Each deadline is
//! derived from the previous *expected* deadline, never from the moment the previous
//! tick actually ran, so callback latency does not accumulate into drift.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Duration, Timelike, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, warn};

use crate::error::Result;

/// Poll period while waiting for the first aligned second
const ALIGN_POLL_MS: i64 = 50;

/// Where the clock gets "now" from and how it waits
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Block until `deadline` or until a stop request arrives on `stop`.
    /// Returns false when stopped.
    fn sleep_until(&self, deadline: DateTime<Utc>, stop: &Receiver<()>) -> bool;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep_until(&self, deadline: DateTime<Utc>, stop: &Receiver<()>) -> bool {
        let wait = (deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        matches!(stop.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
    }
}

impl<T: TimeSource> TimeSource for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }

    fn sleep_until(&self, deadline: DateTime<Utc>, stop: &Receiver<()>) -> bool {
        self.as_ref().sleep_until(deadline, stop)
    }
}

/// A clock that only moves when slept on or advanced by hand
#[derive(Debug)]
pub struct SimulatedTime {
    now: Mutex<DateTime<Utc>>,
}

impl SimulatedTime {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Simulate work taking `d`
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += d;
    }
}

impl TimeSource for SimulatedTime {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_until(&self, deadline: DateTime<Utc>, stop: &Receiver<()>) -> bool {
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
            return false;
        }
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if *now < deadline {
            *now = deadline;
        }
        true
    }
}

/// One firing of the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Slot of the day: seconds since UTC midnight / interval
    pub index: usize,
    /// When the tick actually ran
    pub utc_now: DateTime<Utc>,
    /// When the tick was scheduled
    pub expected: DateTime<Utc>,
}

/// Slot of the day for time `t`
pub fn data_index(t: &DateTime<Utc>, interval: u32) -> usize {
    (t.num_seconds_from_midnight() / interval.max(1)) as usize
}

pub struct SampleClock {
    interval: u32,
    start_time: DateTime<Utc>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SampleClock {
    /// Wait for the next aligned second on the system clock, then fire `callback` every `interval` seconds
    pub fn start<F>(interval: u32, callback: F) -> Self
    where
        F: FnMut(&Tick) -> Result<()> + Send + 'static,
    {
        Self::start_with(interval, WallClock, callback)
    }

    pub fn start_with<T, F>(interval: u32, time: T, callback: F) -> Self
    where
        T: TimeSource,
        F: FnMut(&Tick) -> Result<()> + Send + 'static,
    {
        let interval = interval.max(1);
        let (stop_tx, stop_rx) = bounded(1);

        // Block until seconds-of-day is a multiple of the interval
        let mut now = time.now();
        while now.num_seconds_from_midnight() % interval != 0 {
            time.sleep_until(now + Duration::milliseconds(ALIGN_POLL_MS), &stop_rx);
            now = time.now();
        }
        let start_time = now.with_nanosecond(0).unwrap_or(now);
        debug!(%start_time, interval, "Sample clock synchronized");

        let handle = thread::spawn(move || {
            run_ticks(&time, interval, start_time, &stop_rx, callback);
        });

        Self {
            interval,
            start_time,
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// First aligned second, the origin of the tick grid
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Cancel pending ticks. A tick already running completes first.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            // Stopping from inside a tick: the thread exits on its next wait
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Sample clock thread panicked");
            }
        }
    }
}

impl Drop for SampleClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_ticks<T, F>(
    time: &T,
    interval: u32,
    start_time: DateTime<Utc>,
    stop: &Receiver<()>,
    mut callback: F,
) where
    T: TimeSource,
    F: FnMut(&Tick) -> Result<()>,
{
    let step = Duration::seconds(i64::from(interval));
    let mut expected = start_time + step;
    while time.sleep_until(expected, stop) {
        let utc_now = time.now();
        let tick = Tick {
            index: data_index(&utc_now, interval),
            utc_now,
            expected,
        };

        // Reschedule before running the callback so a failing tick can't skip it
        expected += step;
        if expected <= utc_now {
            let mut skipped = 0;
            while expected <= utc_now {
                expected += step;
                skipped += 1;
            }
            warn!(skipped, "Sample clock fell behind, skipping missed ticks");
        }

        match catch_unwind(AssertUnwindSafe(|| callback(&tick))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(index = tick.index, "Tick failed: {e}"),
            Err(_) => error!(index = tick.index, "Tick callback panicked"),
        }
    }
    debug!("Sample clock stopped");
}
