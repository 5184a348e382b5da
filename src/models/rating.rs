//! Rating model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted rating value
pub const MIN_RATING: i32 = 1;
/// Highest accepted rating value
pub const MAX_RATING: i32 = 5;

/// A user's score for a picture. At most one per (user_id, picture_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub user_id: i64,
    pub picture_id: i64,
    /// Value within `MIN_RATING..=MAX_RATING`
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

/// Aggregate score of one picture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Arithmetic mean, `None` when the picture has no ratings
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    /// Build a summary from the sum and count of rating values.
    pub fn from_totals(sum: i64, count: i64) -> Self {
        let average = if count > 0 {
            Some(sum as f64 / count as f64)
        } else {
            None
        };
        Self { average, count }
    }
}

pub fn is_valid_rating(value: i32) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_empty() {
        let summary = RatingSummary::from_totals(0, 0);
        assert_eq!(summary.average, None);
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn test_summary_mean() {
        let summary = RatingSummary::from_totals(9, 2);
        let average = summary.average.unwrap();
        assert!((average - 4.5).abs() < f64::EPSILON);
        assert_eq!(summary.count, 2);

        let thirds = RatingSummary::from_totals(10, 3).average.unwrap();
        assert!((thirds - 10.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_valid_rating_bounds() {
        assert!(!is_valid_rating(0));
        assert!(is_valid_rating(1));
        assert!(is_valid_rating(5));
        assert!(!is_valid_rating(6));
    }
}
