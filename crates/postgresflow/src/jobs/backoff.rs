//! The exponential backoff used by `set_error_and_unlock`. Normative
//! formula: `(attempts^4) + 5` seconds, clamped to `max(cap, 5)` when a
//! cap is configured.

pub const BACKOFF_FLOOR_SECONDS: i64 = 5;

pub fn compute_backoff_seconds(attempts: i32, max_backoff_seconds: Option<i64>) -> i64 {
    let base = (attempts as i64).pow(4) + 5;
    match max_backoff_seconds {
        Some(cap) => base.min(cap.max(BACKOFF_FLOOR_SECONDS)),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_formula() {
        assert_eq!(compute_backoff_seconds(1, None), 6);
        assert_eq!(compute_backoff_seconds(4, None), 261);
    }

    #[test]
    fn backoff_cap_clamps_scenario_4() {
        // attempts after increment = 4: (4^4)+5 = 261, clamped to 20.
        assert_eq!(compute_backoff_seconds(4, Some(20)), 20);
    }

    #[test]
    fn cap_never_drops_below_floor() {
        assert_eq!(compute_backoff_seconds(1, Some(1)), BACKOFF_FLOOR_SECONDS);
    }
}
