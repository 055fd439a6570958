//! Review star rating.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Rating outside the accepted range.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct RatingError(pub i64);

/// A 1-5 star rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i16")]
pub struct Rating(u8);

impl Rating {
    /// Lowest accepted rating.
    pub const MIN: u8 = 1;
    /// Highest accepted rating.
    pub const MAX: u8 = 5;

    /// Create a rating.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError`] outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError(value))
    }

    /// Star count.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> Self {
        Self::from(rating.0)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_one_through_five() {
        for v in 1..=5 {
            assert_eq!(Rating::new(v).map(Rating::get), Ok(u8::try_from(v).unwrap_or(0)));
        }
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(Rating::new(0), Err(RatingError(0)));
        assert_eq!(Rating::new(6), Err(RatingError(6)));
        assert_eq!(Rating::new(-1), Err(RatingError(-1)));
        assert_eq!(Rating::new(300), Err(RatingError(300)));
    }
}
