// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_both_scales() {
    let clock = FakeClock::new();
    let start = clock.now();
    let start_utc = clock.now_utc();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.now().duration_since(start), Duration::from_secs(90));
    assert_eq!((clock.now_utc() - start_utc).num_seconds(), 90);
}

#[test]
fn fake_clock_set_utc() {
    let clock = FakeClock::new();
    let ts = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).single().unwrap();
    clock.set_utc(ts);
    assert_eq!(clock.now_utc(), ts);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
