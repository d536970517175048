use std::fmt;

/// Rolling range of recent block numbers re-checked every validator tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationWindow {
    pub lower: i64,
    pub upper: i64,
}

impl ValidationWindow {
    pub fn size(&self) -> i64 {
        self.upper - self.lower
    }

    /// Every block number in the window, inclusive of both bounds.
    pub fn numbers(&self) -> Vec<i64> {
        make_range(self.lower, self.upper)
    }
}

impl fmt::Display for ValidationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({} blocks)", self.lower, self.upper, self.size())
    }
}

/// The `window_size` blocks below `head` plus the head itself, cut off at
/// genesis on a chain shorter than the window.
pub fn make_validation_window(head: i64, window_size: i64) -> ValidationWindow {
    ValidationWindow {
        lower: (head - window_size).max(0),
        upper: head,
    }
}

/// Block numbers from `start` to `end`, both included. Empty when
/// `start > end`.
pub fn make_range(start: i64, end: i64) -> Vec<i64> {
    (start..=end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_and_size() {
        for (head, size) in [(7, 2), (15, 15), (1_000_000, 0), (100, 20)] {
            let window = make_validation_window(head, size);
            assert_eq!(window.lower, head - size);
            assert_eq!(window.upper, head);
            assert_eq!(window.size(), size);
        }
    }

    #[test]
    fn test_window_clamped_at_genesis() {
        let window = make_validation_window(3, 15);
        assert_eq!(window, ValidationWindow { lower: 0, upper: 3 });
        assert_eq!(window.numbers(), vec![0, 1, 2, 3]);

        assert_eq!(make_validation_window(0, 15).numbers(), vec![0]);
    }

    #[test]
    fn test_make_range_is_inclusive() {
        for (a, b) in [(0, 0), (5, 7), (10, 25)] {
            let range = make_range(a, b);
            assert_eq!(range.len() as i64, b - a + 1);
            assert_eq!(range.first(), Some(&a));
            assert_eq!(range.last(), Some(&b));
            assert!(range.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_make_range_empty_when_reversed() {
        assert!(make_range(5, 4).is_empty());
    }

    #[test]
    fn test_window_report() {
        let window = make_validation_window(7, 2);
        assert_eq!(window.numbers(), vec![5, 6, 7]);
        assert_eq!(window.to_string(), "5-7 (2 blocks)");
    }
}
