use super::*;

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn system_clock_epoch_millis_is_plausible() {
    let clock = SystemClock;
    // Some time after 2023-01-01
    assert!(clock.epoch_millis() > 1_672_000_000_000);
}

#[test]
fn fake_clock_advance_moves_both_views() {
    let clock = FakeClock::new();
    let start_instant = clock.now();
    let start_millis = clock.epoch_millis();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.now().duration_since(start_instant), Duration::from_secs(90));
    assert_eq!(clock.epoch_millis() - start_millis, 90_000);
}

#[test]
fn fake_clock_set_millis_pins_epoch_time() {
    let clock = FakeClock::new();
    clock.set_millis(42_000);
    assert_eq!(clock.epoch_millis(), 42_000);

    clock.advance(Duration::from_millis(500));
    assert_eq!(clock.epoch_millis(), 42_500);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();

    clock.advance(Duration::from_secs(5));

    assert_eq!(other.epoch_millis(), clock.epoch_millis());
}
