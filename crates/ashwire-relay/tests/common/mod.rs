//! Shared test environment with a virtual clock and seeded RNG.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ashwire_relay::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual instant in milliseconds since environment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl std::ops::Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0 - rhs.0)
    }
}

/// Deterministic environment: virtual clock, seeded RNG, no-op sleep.
///
/// Tests drive time with [`SimEnv::advance`] and feed delayed events (like
/// `TerminationDue`) into the driver themselves.
#[derive(Clone)]
pub struct SimEnv {
    clock_ms: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock_ms: Arc::new(AtomicU64::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        self.clock_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        SimInstant(self.clock_ms.load(Ordering::SeqCst))
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fill_bytes(buffer);
    }

    fn wall_clock_ms(&self) -> u64 {
        // Fixed epoch plus virtual elapsed time
        1_700_000_000_000 + self.clock_ms.load(Ordering::SeqCst)
    }
}
