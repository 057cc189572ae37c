//! Cell values

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A single cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing
    #[default]
    Null,
    /// Finite number
    Number(f64),
    /// Text (also categorical labels)
    Text(String),
    /// Date or date-time without zone
    DateTime(NaiveDateTime),
}

impl Value {
    /// Check for a missing cell
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text view
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Date-time view
    #[inline]
    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Total order over non-null values of the same kind
    ///
    /// Numbers compare numerically, date-times chronologically and text
    /// lexicographically. Mixed kinds order as number < date-time < text
    /// and `Null` sorts after everything.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::DateTime(_) => 1,
            Self::Text(_) => 2,
            Self::Null => 3,
        }
    }

    /// Hashable identity used for grouping and distinct counts
    #[must_use]
    pub fn key(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            // -0.0 and 0.0 group together
            Self::Number(n) => ValueKey::Number(if *n == 0.0 { 0 } else { n.to_bits() }),
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::DateTime(dt) => ValueKey::DateTime(*dt),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
            Self::DateTime(dt) => f.write_str(&format_datetime(dt)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(s) => serializer.serialize_str(s),
            Self::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
        }
    }
}

/// Hashable projection of a [`Value`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Missing
    Null,
    /// Bit pattern of the number
    Number(u64),
    /// Text
    Text(String),
    /// Date-time
    DateTime(NaiveDateTime),
}

/// Parse a date or date-time in one of the accepted layouts
///
/// Dates without a time component are taken at midnight.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a finite number from text
#[must_use]
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number without a trailing `.0` for integral values
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accepted_date_layouts() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(parse_datetime("2024-03-01"), Some(midnight));
        assert_eq!(parse_datetime("2024/03/01"), Some(midnight));
        assert!(parse_datetime("2024-03-01T10:30:00").is_some());
        assert!(parse_datetime("2024-03-01 10:30:00").is_some());
        assert_eq!(parse_datetime("03/01/2024"), None);
        assert_eq!(parse_datetime("soon"), None);
    }

    #[test]
    fn numbers_reject_non_finite() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("12a"), None);
    }

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn compare_orders_by_kind_then_value() {
        assert_eq!(Value::Number(1.0).compare(&Value::Number(2.0)), Ordering::Less);
        assert_eq!(Value::Text("b".into()).compare(&Value::Text("a".into())), Ordering::Greater);
        assert_eq!(Value::Number(9.0).compare(&Value::Text("a".into())), Ordering::Less);
        assert_eq!(Value::Null.compare(&Value::Text("a".into())), Ordering::Greater);
    }

    #[test]
    fn signed_zero_shares_a_key() {
        assert_eq!(Value::Number(0.0).key(), Value::Number(-0.0).key());
    }

    #[test]
    fn serializes_as_plain_json() {
        let dt = parse_datetime("2024-03-01").unwrap();
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Number(3.0),
            Value::Text("West".into()),
            Value::DateTime(dt),
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([null, 3.0, "West", "2024-03-01"]));
    }
}
