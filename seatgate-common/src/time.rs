//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's UTC date as `YYYY-MM-DD`
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2000() {
        assert!(now().timestamp() > 946_684_800);
    }

    #[test]
    fn test_today_format() {
        let day = today();
        assert_eq!(day.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&day, "%Y-%m-%d").is_ok());
    }
}
