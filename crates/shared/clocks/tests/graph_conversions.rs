//! Cross-clock conversion scenarios for the clock graph.

use tandem_clocks::{ClockGraph, CorrelatedClock, SystemClock};
use tandem_core::Correlation;

fn fixture() -> (SystemClock, CorrelatedClock) {
    let graph = ClockGraph::new();
    let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-8);
    let c1 = CorrelatedClock::new(&sys, 1000.0, Correlation::new(10_000_000_000.0, 0.0));
    (sys, c1)
}

#[test]
fn millisecond_clock_against_gigahertz_root() {
    let (_sys, c1) = fixture();

    // 5 s after the correlation point the 1 kHz clock reads 5000.
    assert_eq!(c1.from_root_ticks(15_000_000_000.0), 5000.0);
    assert_eq!(c1.to_root_ticks(5000.0), 15_000_000_000.0);

    // calc_when is expressed in root nanoseconds; the root runs at
    // 1 GHz so ticks and nanoseconds coincide.
    assert_eq!(c1.calc_when(5000.0), 15_000_000_000.0);
}

#[test]
fn conversion_round_trip_across_the_tree() {
    let (sys, c1) = fixture();
    let c2 = CorrelatedClock::new(&c1, 90_000.0, Correlation::new(100.0, 7_000.0));
    let side = CorrelatedClock::new(&sys, 48_000.0, Correlation::new(500_000_000.0, 0.0));

    for t in [0.0, 1.0, 9_999.5, 1_234_567.0] {
        let there = c2.to_other_clock_ticks(&side, t).unwrap();
        let back = side.to_other_clock_ticks(&c2, there).unwrap();
        assert!(
            (back - t).abs() <= 1e-6,
            "round trip drifted: {} -> {} -> {}",
            t,
            there,
            back
        );
    }
}

#[test]
fn lca_route_ignores_stopped_cousins() {
    let (sys, c1) = fixture();
    let a = CorrelatedClock::new(&c1, 1000.0, Correlation::new(0.0, 0.0));
    let b = CorrelatedClock::new(&c1, 1000.0, Correlation::new(1000.0, 0.0));
    let cousin = CorrelatedClock::new(&sys, 1000.0, Correlation::new(0.0, 0.0));
    cousin.set_speed(0.0);

    // a and b join at c1; the stopped clock elsewhere in the graph must
    // not poison the conversion.
    let converted = a.to_other_clock_ticks(&b, 2000.0).unwrap();
    assert_eq!(converted, 1000.0);
}

#[test]
fn speed_change_rescales_descendants() {
    let (_sys, c1) = fixture();
    let child = CorrelatedClock::new(&c1, 1000.0, Correlation::new(0.0, 0.0));

    c1.set_speed(2.0);
    // One root second now advances c1 (and its child) by 2000 ticks.
    let t0 = c1.from_root_ticks(10_000_000_000.0);
    let t1 = c1.from_root_ticks(11_000_000_000.0);
    assert_eq!(t1 - t0, 2000.0);

    let u0 = child.from_root_ticks(10_000_000_000.0);
    let u1 = child.from_root_ticks(11_000_000_000.0);
    assert_eq!(u1 - u0, 2000.0);
}

#[test]
fn dispersion_between_anchor_points_interpolates() {
    let (_sys, c1) = fixture();
    let measured = CorrelatedClock::new(
        &c1,
        1000.0,
        Correlation::with_errors(0.0, 0.0, 0.05, 0.002),
    );

    let d_near = measured.dispersion_at_ticks(10.0);
    let d_mid = measured.dispersion_at_ticks(50.0);
    let d_far = measured.dispersion_at_ticks(90.0);
    assert!(d_near <= d_mid && d_mid <= d_far);
}
