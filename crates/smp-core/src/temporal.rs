//! Validity windows of endpoints.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Check that `not_before` does not lie after `not_after`.
///
/// Either bound may be absent; an open window is always valid.
pub fn check_validity_window(
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    match (not_before, not_after) {
        (Some(from), Some(to)) if from > to => Err(ValidationError::InvalidValidityWindow),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn ordered_window_is_valid() {
        assert!(check_validity_window(Some(at(2024)), Some(at(2025))).is_ok());
    }

    #[test]
    fn equal_bounds_are_valid() {
        assert!(check_validity_window(Some(at(2024)), Some(at(2024))).is_ok());
    }

    #[test]
    fn inverted_window_is_rejected() {
        assert_eq!(
            check_validity_window(Some(at(2026)), Some(at(2025))),
            Err(ValidationError::InvalidValidityWindow)
        );
    }

    #[test]
    fn open_bounds_are_valid() {
        assert!(check_validity_window(None, Some(at(2025))).is_ok());
        assert!(check_validity_window(Some(at(2025)), None).is_ok());
        assert!(check_validity_window(None, None).is_ok());
    }
}
