use serial2mqtt_core::schedule::Scheduler;

struct Lcg(u64);

impl Lcg {
    fn below(&mut self, bound: i64) -> i64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) % bound as u64) as i64
    }
}

/// Poll at the given times and return the times that fired
fn fire_times(period: i64, samples: &[i64]) -> Vec<i64> {
    let mut scheduler = Scheduler::new(period, samples[0]);
    samples
        .iter()
        .copied()
        .filter(|now| scheduler.poll(*now))
        .collect()
}

fn fires_in(fires: &[i64], start: i64, len: i64) -> i64 {
    fires.iter().filter(|t| **t >= start && **t < start + len).count() as i64
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

#[test]
fn test_rate_upper_bound_for_arbitrary_polls() {
    let period = 1_000;
    let mut rng = Lcg(3);

    for _ in 0..20 {
        // Mix of rapid polls and stalls of several periods
        let mut now = rng.below(10_000);
        let mut samples = vec![now];
        for _ in 0..2_000 {
            now += if rng.below(10) == 0 {
                rng.below(5 * period)
            } else {
                rng.below(period / 3)
            };
            samples.push(now);
        }

        let fires = fire_times(period, &samples);
        for window in [period / 2, period, 3 * period + 17, 10 * period] {
            for start in &samples {
                let count = fires_in(&fires, *start, window);
                assert!(
                    count <= div_ceil(window, period) + 1,
                    "{} fires in {}ms window at {}",
                    count,
                    window,
                    start
                );
            }
        }
    }
}

#[test]
fn test_rate_lower_bound_for_dense_polls() {
    let period = 1_000;
    let mut rng = Lcg(11);

    let mut now = 0;
    let mut samples = vec![now];
    while now < 100 * period {
        now += 1 + rng.below(period / 10);
        samples.push(now);
    }

    let fires = fire_times(period, &samples);
    let end = *samples.last().unwrap();
    for window in [period, 5 * period, 20 * period + 333] {
        for start in samples.iter().copied().filter(|s| s + window <= end) {
            let count = fires_in(&fires, start, window);
            assert!(count >= window / period - 1, "{} fires in {}ms window", count, window);
            assert!(count <= div_ceil(window, period) + 1);
        }
    }
}

#[test]
fn test_no_drift_over_many_periods() {
    let period = 250;
    // Polls land 7ms after every deadline
    let samples: Vec<i64> = (0..400).map(|k| k * period + 7).collect();
    let mut scheduler = Scheduler::new(period, 0);
    for (k, now) in samples.iter().enumerate() {
        assert!(scheduler.poll(*now));
        assert_eq!(scheduler.next_fire_ms(), (k as i64 + 1) * period);
    }
}

#[test]
fn test_disabled_never_fires() {
    let samples: Vec<i64> = (0..100).map(|k| k * 1_000).collect();
    assert!(fire_times(0, &samples).is_empty());
    assert!(fire_times(-1_000, &samples).is_empty());
}
