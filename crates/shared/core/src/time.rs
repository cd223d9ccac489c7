/// Integer nanoseconds on some clock's timeline.
///
/// All measurement exchange between components is expressed in
/// nanoseconds; tick-rate conversion happens only at the edges.
pub type Nanos = i64;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert a nanosecond count to tick units at the given tick rate.
///
/// Takes an integer fast path when the rate divides a whole second, so
/// that e.g. a 1 GHz clock reads back the nanosecond count exactly.
pub fn ticks_from_nanos(nanos: Nanos, tick_rate: f64) -> f64 {
    let rate = tick_rate as i64;
    if rate > 0 && rate as f64 == tick_rate && NANOS_PER_SEC % rate == 0 {
        (nanos / (NANOS_PER_SEC / rate)) as f64
    } else {
        nanos as f64 * tick_rate / NANOS_PER_SEC as f64
    }
}

/// Convert tick units at the given tick rate to (fractional) nanoseconds.
///
/// Same integer fast path as [`ticks_from_nanos`], keeping conversions
/// exact for the common whole-divisor rates.
pub fn nanos_from_ticks(ticks: f64, tick_rate: f64) -> f64 {
    let rate = tick_rate as i64;
    if rate > 0 && rate as f64 == tick_rate && NANOS_PER_SEC % rate == 0 {
        ticks * ((NANOS_PER_SEC / rate) as f64)
    } else {
        ticks * NANOS_PER_SEC as f64 / tick_rate
    }
}

/// Nanoseconds expressed as seconds.
pub fn nanos_to_secs(nanos: Nanos) -> f64 {
    nanos as f64 / NANOS_PER_SEC as f64
}

/// Convert a frequency error in parts-per-million into a dispersion
/// growth rate in seconds per tick at the given tick rate.
pub fn ppm_to_growth_per_tick(ppm: f64, tick_rate: f64) -> f64 {
    ppm * 1e-6 / tick_rate
}
