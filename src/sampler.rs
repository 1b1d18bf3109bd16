//! Sampling policies.
//!
//! A sampler decides, after the level check passed, whether an event is
//! built. Sampler state is atomic, so one sampler shared by every clone of a
//! logger counts all their calls together.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config;
use crate::level::Level;

/// Decides whether an event at a given level is kept.
pub trait Sampler: Send + Sync {
    fn sample(&self, level: Level) -> bool;
}

impl<S: Sampler + ?Sized> Sampler for Arc<S> {
    fn sample(&self, level: Level) -> bool {
        (**self).sample(level)
    }
}

/// Keeps every `n`th event, starting with the `n`th.
///
/// `n == 0` drops everything and `n == 1` keeps everything.
#[derive(Debug, Default)]
pub struct BasicSampler {
    n: u32,
    counter: AtomicU32,
}

impl BasicSampler {
    pub fn new(n: u32) -> Self {
        Self {
            n,
            counter: AtomicU32::new(0),
        }
    }
}

impl Sampler for BasicSampler {
    fn sample(&self, _level: Level) -> bool {
        match self.n {
            0 => false,
            1 => true,
            n => {
                let c = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                c % n == 0
            }
        }
    }
}

/// Keeps each event with probability `1/n`. `n == 0` drops everything.
#[derive(Debug, Clone, Copy)]
pub struct RandomSampler(pub u32);

impl Sampler for RandomSampler {
    fn sample(&self, _level: Level) -> bool {
        match self.0 {
            0 => false,
            n => rand::thread_rng().gen_range(0..n) == 0,
        }
    }
}

/// Keeps roughly one event in ten.
pub fn often() -> RandomSampler {
    RandomSampler(10)
}

/// Keeps roughly one event in a hundred.
pub fn sometimes() -> RandomSampler {
    RandomSampler(100)
}

/// Keeps roughly one event in a thousand.
pub fn rarely() -> RandomSampler {
    RandomSampler(1000)
}

/// Keeps the first `burst` events of every `period`, then defers to `next`
/// (or drops, when there is none) until the period is over.
///
/// Periods are measured with [`Config::timestamp_func`](crate::Config).
pub struct BurstSampler {
    burst: u32,
    period: Duration,
    next: Option<Arc<dyn Sampler>>,
    counter: AtomicU32,
    reset_at: AtomicI64,
}

impl BurstSampler {
    pub fn new(burst: u32, period: Duration) -> Self {
        Self {
            burst,
            period,
            next: None,
            counter: AtomicU32::new(0),
            reset_at: AtomicI64::new(i64::MIN),
        }
    }

    /// Sampler consulted once the burst is used up.
    pub fn next(mut self, sampler: impl Sampler + 'static) -> Self {
        self.next = Some(Arc::new(sampler));
        self
    }

    fn inc(&self) -> u32 {
        let now = clamp_nanos((config::current().timestamp_func)().unix_timestamp_nanos());
        let reset_at = self.reset_at.load(Ordering::Acquire);
        if now >= reset_at {
            let period = i64::try_from(self.period.as_nanos()).unwrap_or(i64::MAX);
            let next_reset = now.saturating_add(period);
            if self
                .reset_at
                .compare_exchange(reset_at, next_reset, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.counter.store(1, Ordering::Release);
                return 1;
            }
        }
        self.counter.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }
}

fn clamp_nanos(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

impl Sampler for BurstSampler {
    fn sample(&self, level: Level) -> bool {
        if self.burst > 0 && !self.period.is_zero() && self.inc() <= self.burst {
            return true;
        }
        match &self.next {
            Some(next) => next.sample(level),
            None => false,
        }
    }
}

/// Applies a different sampler per level. Levels without one are kept.
#[derive(Clone, Default)]
pub struct LevelSampler {
    samplers: [Option<Arc<dyn Sampler>>; Level::ALL.len()],
}

impl LevelSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sampler for events at `level`.
    pub fn on(mut self, level: Level, sampler: impl Sampler + 'static) -> Self {
        self.samplers[level.index()] = Some(Arc::new(sampler));
        self
    }
}

impl Sampler for LevelSampler {
    fn sample(&self, level: Level) -> bool {
        match &self.samplers[level.index()] {
            Some(sampler) => sampler.sample(level),
            None => true,
        }
    }
}
