//! Guaranteed-monotonic process time in integer nanoseconds.
//!
//! All clock graphs ultimately read this source. The origin is
//! arbitrary (first read after process start) but consistent, which is
//! all the wall-clock protocol requires.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tandem_core::Nanos;

static ANCHOR: OnceLock<Instant> = OnceLock::new();
static LATCH: AtomicI64 = AtomicI64::new(0);

/// Current monotonic time in nanoseconds since the process anchor.
///
/// Non-decreasing: the underlying `Instant` source is monotonic on all
/// supported platforms, and a max-latch guards the guarantee even if a
/// platform source misbehaves.
pub fn now_nanos() -> Nanos {
    let anchor = *ANCHOR.get_or_init(Instant::now);
    let raw = anchor.elapsed().as_nanos() as i64;
    let prev = LATCH.fetch_max(raw, Ordering::Relaxed);
    raw.max(prev)
}

/// Sleep for at least `nanos` nanoseconds of monotonic time.
///
/// Never returns early: any remainder left by a short timer wake-up is
/// re-slept.
pub async fn sleep_nanos(nanos: Nanos) {
    let deadline = now_nanos().saturating_add(nanos.max(0));
    loop {
        let remaining = deadline - now_nanos();
        if remaining <= 0 {
            return;
        }
        tokio::time::sleep(Duration::from_nanos(remaining as u64)).await;
    }
}

/// Estimate the precision of a tick reader, in seconds.
///
/// Samples the reader repeatedly and records the smallest non-zero
/// delta between successive reads. Falls back to one tick period when
/// no boundary was observed across the samples (coarse clocks).
pub fn measure_precision<F>(mut read_ticks: F, tick_rate: f64, samples: usize) -> f64
where
    F: FnMut() -> f64,
{
    let mut best = f64::INFINITY;
    let mut prev = read_ticks();
    for _ in 0..samples {
        let next = read_ticks();
        let delta = next - prev;
        if delta > 0.0 && delta < best {
            best = delta;
        }
        prev = next;
    }
    if best.is_finite() {
        best / tick_rate
    } else {
        1.0 / tick_rate
    }
}
