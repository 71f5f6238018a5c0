// The night window during which the stationary-crowd rule is armed. Hours are local
// wall-clock hours supplied by the caller alongside each frame.

use crate::config::NightConfig;

/// True when `hour` falls inside `[start_hour, end_hour)`, wrapping past midnight
/// when the window starts later than it ends.
pub fn is_night(hour: u8, window: &NightConfig) -> bool {
    let (start, end) = (window.start_hour, window.end_hour);
    if start > end {
        hour >= start || hour < end
    } else {
        hour >= start && hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_past_midnight() {
        let window = NightConfig { start_hour: 20, end_hour: 6 };
        assert!(is_night(23, &window));
        assert!(is_night(0, &window));
        assert!(is_night(5, &window));
        assert!(!is_night(6, &window));
        assert!(!is_night(12, &window));
        assert!(is_night(20, &window));
    }

    #[test]
    fn same_day_window() {
        let window = NightConfig { start_hour: 1, end_hour: 4 };
        assert!(is_night(1, &window));
        assert!(!is_night(4, &window));
        assert!(!is_night(22, &window));
    }
}
