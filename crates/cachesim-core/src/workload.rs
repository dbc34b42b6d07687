//! Request generation: key population, miss durations and arrival gaps.
//!
//! Everything here draws from one seeded [`ChaCha8Rng`], so a seed fixes the
//! key population and the sequence of (key, work time) pairs. Wall-clock
//! interleaving with the servers is of course not reproducible.

use crate::request::Request;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Exponentially distributed durations with a fixed mean.
#[derive(Debug, Clone, Copy)]
pub struct ExpDuration {
    mean: Duration,
    /// `None` for a zero mean, which always samples zero.
    dist: Option<Exp<f64>>,
}

impl ExpDuration {
    pub fn with_mean(mean: Duration) -> Self {
        let dist = if mean.is_zero() {
            None
        } else {
            Exp::new(1.0 / mean.as_secs_f64()).ok()
        };
        Self { mean, dist }
    }

    pub fn mean(&self) -> Duration {
        self.mean
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match &self.dist {
            Some(dist) => {
                Duration::try_from_secs_f64(dist.sample(rng)).unwrap_or(Duration::MAX)
            }
            None => Duration::ZERO,
        }
    }
}

/// How quickly the producer creates requests.
#[derive(Debug, Clone, Copy)]
pub enum ArrivalProcess {
    /// Back to back, limited only by queue backpressure.
    Firehose,
    /// Exponential gaps between arrivals.
    Poisson(ExpDuration),
}

impl ArrivalProcess {
    pub fn from_interval(interval: Option<Duration>) -> Self {
        match interval {
            Some(mean) => ArrivalProcess::Poisson(ExpDuration::with_mean(mean)),
            None => ArrivalProcess::Firehose,
        }
    }

    /// Gap to wait before the next request, `None` for the firehose.
    pub fn next_gap<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        match self {
            ArrivalProcess::Firehose => None,
            ArrivalProcess::Poisson(gap) => Some(gap.sample(rng)),
        }
    }
}

/// `count` distinct 16-character hex keys.
pub fn generate_resources<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Arc<str>> {
    let mut seen = HashSet::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = format!("{:016x}", rng.gen::<u64>());
        if seen.insert(key.clone()) {
            keys.push(Arc::from(key));
        }
    }
    keys
}

/// Request factory owned by the producer thread.
#[derive(Debug)]
pub struct Workload {
    resources: Vec<Arc<str>>,
    work: ExpDuration,
    arrival: ArrivalProcess,
    rng: ChaCha8Rng,
}

impl Workload {
    pub fn new(
        resource_count: usize,
        avg_miss_duration: Duration,
        arrival: ArrivalProcess,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let resources = generate_resources(resource_count, &mut rng);
        Self {
            resources,
            work: ExpDuration::with_mean(avg_miss_duration),
            arrival,
            rng,
        }
    }

    pub fn resources(&self) -> &[Arc<str>] {
        &self.resources
    }

    pub fn arrival(&self) -> ArrivalProcess {
        self.arrival
    }

    /// Uniformly chosen key with a freshly sampled miss duration.
    pub fn next_request(&mut self, id: u64) -> Request {
        let resource = self
            .resources
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| Arc::from(""));
        let work_time = self.work.sample(&mut self.rng);
        Request::new(id, resource, work_time)
    }

    pub fn next_gap(&mut self) -> Option<Duration> {
        self.arrival.next_gap(&mut self.rng)
    }
}
