//! Frame timer with pause support.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

/// A monotonic time source, read as the time since some fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Jump to an absolute reading, including backwards.
    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

pub struct GameTimer {
    clock: Box<dyn Clock>,
    base_time: Duration,
    paused_time: Duration,
    stop_time: Duration,
    prev_time: Duration,
    curr_time: Duration,
    delta_time: f64,
    stopped: bool,
}

impl GameTimer {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let now = clock.now();
        Self {
            clock: Box::new(clock),
            base_time: now,
            paused_time: Duration::ZERO,
            stop_time: Duration::ZERO,
            prev_time: now,
            curr_time: now,
            delta_time: 0.0,
            stopped: false,
        }
    }

    /// Seconds since `reset`, not counting time spent stopped.
    pub fn total_time(&self) -> f32 {
        let end = if self.stopped {
            self.stop_time
        } else {
            self.curr_time
        };
        end.saturating_sub(self.paused_time)
            .saturating_sub(self.base_time)
            .as_secs_f32()
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time as f32
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn reset(&mut self) {
        let now = self.clock.now();
        self.base_time = now;
        self.prev_time = now;
        self.curr_time = now;
        self.paused_time = Duration::ZERO;
        self.stop_time = Duration::ZERO;
        self.delta_time = 0.0;
        self.stopped = false;
    }

    pub fn start(&mut self) {
        if !self.stopped {
            return;
        }
        let start_time = self.clock.now();
        self.paused_time += start_time.saturating_sub(self.stop_time);
        self.prev_time = start_time;
        self.stop_time = Duration::ZERO;
        self.stopped = false;
    }

    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stop_time = self.clock.now();
        self.stopped = true;
    }

    pub fn tick(&mut self) {
        if self.stopped {
            self.delta_time = 0.0;
            return;
        }
        self.curr_time = self.clock.now();
        // A clock that steps backwards yields a zero delta rather than a negative one.
        self.delta_time = match self.curr_time.checked_sub(self.prev_time) {
            Some(delta) => delta.as_secs_f64(),
            None => 0.0,
        };
        self.prev_time = self.curr_time;
    }
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GameTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameTimer")
            .field("total_time", &self.total_time())
            .field("delta_time", &self.delta_time)
            .field("stopped", &self.stopped)
            .finish()
    }
}
