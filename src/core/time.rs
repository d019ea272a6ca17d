//! Abstractions for providing the current time.

use std::fmt::Debug;
use std::time::{
    Duration,
    Instant,
};

/// An environment that provides the current time.
pub trait Env: Clone + Debug {
    /// Returns an instance corresponding to "now".
    fn now_instant(&self) -> Instant;
}

/// An environment that provides system based time.
#[derive(Clone, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    pub fn new() -> SystemEnv {
        SystemEnv {}
    }
}

impl Env for SystemEnv {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }
}

/// An environment that provides a configurable time.
#[derive(Clone, Debug)]
pub struct MockEnv {
    pub now: Instant,
}

impl MockEnv {
    pub fn new() -> MockEnv {
        MockEnv {
            now: Instant::now(),
        }
    }
}

impl Env for MockEnv {
    fn now_instant(&self) -> Instant {
        self.now
    }
}

/// Turns the passage of time in an environment into whole millisecond ticks.
///
/// Fractions of a millisecond are carried over to the next tick, so no time
/// is lost however often the ticker is polled.
#[derive(Debug)]
pub struct Ticker<T: Env = SystemEnv> {
    env: T,
    last: Instant,
}

impl<T: Env> Ticker<T> {
    pub fn new(env: T) -> Ticker<T> {
        let last = env.now_instant();
        Ticker { env, last }
    }

    /// Returns the whole milliseconds elapsed since the previous tick.
    pub fn tick(&mut self) -> u32 {
        let now = self.env.now_instant();
        let elapsed = now.duration_since(self.last);
        let elapsed_ms = elapsed.as_secs() * 1_000 + u64::from(elapsed.subsec_millis());

        self.last += Duration::from_millis(elapsed_ms);

        if elapsed_ms > u64::from(u32::max_value()) {
            u32::max_value()
        } else {
            elapsed_ms as u32
        }
    }

    pub fn env(&self) -> &T {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut T {
        &mut self.env
    }
}
