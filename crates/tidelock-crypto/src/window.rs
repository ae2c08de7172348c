//! Time window arithmetic shared by key derivation and replay bounds.
//!
//! A window is `floor(unix_millis / window_size_ms)`. Client and server must
//! compute it the same way, so both sides go through [`window_at`].

/// Coarse time bucket index.
///
/// Signed so a declared window from the wire can be compared without
/// conversion; valid windows are always non-negative.
pub type Window = i64;

/// Default window length (30 seconds).
pub const DEFAULT_WINDOW_SIZE_MS: u64 = 30_000;

/// Default accepted distance between declared and current window (±90 s).
pub const DEFAULT_WINDOW_TOLERANCE: u32 = 3;

/// Window containing the given wall-clock instant.
///
/// `window_size_ms` must be non-zero; a zero size is treated as one
/// millisecond so the function stays total.
pub fn window_at(unix_millis: u64, window_size_ms: u64) -> Window {
    let size = window_size_ms.max(1);
    (unix_millis / size) as Window
}

/// Whether `declared` lies within `tolerance` windows of `current`.
///
/// The comparison is symmetric: early clocks and late requests are treated
/// alike.
pub fn within_tolerance(current: Window, declared: Window, tolerance: u32) -> bool {
    current.abs_diff(declared) <= u64::from(tolerance)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn window_boundaries() {
        assert_eq!(window_at(0, DEFAULT_WINDOW_SIZE_MS), 0);
        assert_eq!(window_at(29_999, DEFAULT_WINDOW_SIZE_MS), 0);
        assert_eq!(window_at(30_000, DEFAULT_WINDOW_SIZE_MS), 1);
        assert_eq!(window_at(1_710_000_000_000, DEFAULT_WINDOW_SIZE_MS), 57_000_000);
    }

    #[test]
    fn zero_window_size_does_not_divide_by_zero() {
        assert_eq!(window_at(1234, 0), 1234);
    }

    #[test]
    fn tolerance_is_inclusive_and_symmetric() {
        let current = 1_000;
        assert!(within_tolerance(current, current - 3, 3));
        assert!(within_tolerance(current, current + 3, 3));
        assert!(!within_tolerance(current, current - 4, 3));
        assert!(!within_tolerance(current, current + 4, 3));
    }

    #[test]
    fn extreme_declared_windows_are_rejected() {
        assert!(!within_tolerance(1_000, Window::MIN, 3));
        assert!(!within_tolerance(1_000, Window::MAX, 3));
    }

    proptest! {
        #[test]
        fn prop_tolerance_matches_distance(current in 0i64..1_000_000_000, delta in -10i64..=10) {
            prop_assert_eq!(within_tolerance(current, current + delta, 3), delta.abs() <= 3);
        }
    }
}
