/// Distance-to-fill-level conversion.
///
/// The ultrasonic sensor is mounted under the lid pointing down, so the
/// measured distance shrinks as the bin fills. Readings at or beyond
/// `MAX_DISTANCE_CM` mean empty; at or under `MIN_DISTANCE_CM` mean full.

/// Distance from the sensor to the bottom of an empty bin.
pub const MAX_DISTANCE_CM: f64 = 100.0;

/// Closest distance the sensor can reliably measure; treated as full.
pub const MIN_DISTANCE_CM: f64 = 2.0;

/// Maps a raw distance to a fill percentage in `0..=100`.
///
/// Linear between the two bounds, rounded half away from zero. The caller
/// filters out missing and non-finite readings before calling.
pub fn compute_level(distance_cm: f64) -> u8 {
    if distance_cm >= MAX_DISTANCE_CM {
        return 0;
    }
    if distance_cm <= MIN_DISTANCE_CM {
        return 100;
    }
    let fraction = (MAX_DISTANCE_CM - distance_cm) / (MAX_DISTANCE_CM - MIN_DISTANCE_CM);
    (fraction * 100.0).round() as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(compute_level(100.0), 0);
        assert_eq!(compute_level(2.0), 100);
        assert_eq!(compute_level(0.0), 100);
    }

    #[test]
    fn test_midpoint_rounding() {
        // (100 - 51) / 98 * 100 == 50 exactly
        assert_eq!(compute_level(51.0), 50);
        // 84 / 98 * 100 == 85.71..
        assert_eq!(compute_level(16.0), 86);
        // 86 / 98 * 100 == 87.75..
        assert_eq!(compute_level(14.0), 88);
    }

    #[test]
    fn test_beyond_max_distance_is_empty() {
        for d in [100.0, 100.5, 150.0, 1_000.0, f64::INFINITY] {
            assert_eq!(compute_level(d), 0, "distance {} should read empty", d);
        }
    }

    #[test]
    fn test_under_min_distance_is_full() {
        for d in [2.0, 1.99, 1.0, 0.5, 0.0] {
            assert_eq!(compute_level(d), 100, "distance {} should read full", d);
        }
    }

    #[test]
    fn test_monotonically_non_increasing_in_distance() {
        let mut previous = compute_level(0.0);
        let mut d = 0.0;
        while d <= 110.0 {
            let level = compute_level(d);
            assert!(
                level <= previous,
                "level rose from {} to {} at distance {}",
                previous,
                level,
                d
            );
            assert!(level <= 100);
            previous = level;
            d += 0.25;
        }
    }

    #[test]
    fn test_critical_levels_are_reachable() {
        // 90% ~ 11.8 cm, 95% ~ 6.9 cm
        assert_eq!(compute_level(11.8), 90);
        assert_eq!(compute_level(6.9), 95);
    }
}
