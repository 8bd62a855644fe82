//! Row-level transformations applied to staged customers
//!
//! Every function here is total: malformed input yields `None` or
//! [`AgeRange::Unknown`] instead of an error, so data quality problems end up
//! in nullable dimension columns and the validation counters.

use std::fmt;

use serde::{Serialize, Serializer};

/// Oldest age accepted as plausible
pub const MAX_AGE: i64 = 120;

/// A numeric input value that may be absent or malformed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    /// No value (SQL null, empty text or NaN)
    Missing,
    /// Text that is not a number
    Invalid,
    /// A finite or infinite floating-point value
    Value(f64),
}

impl Numeric {
    /// Parse a textual value such as `"34"`, `"1.0"` or `" 2.5e1 "`
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Self::from_float(value),
            Err(_) => Self::Invalid,
        }
    }

    /// Wrap a float, mapping NaN to [`Numeric::Missing`]
    pub fn from_float(value: f64) -> Self {
        if value.is_nan() {
            Self::Missing
        } else {
            Self::Value(value)
        }
    }

    /// Truncate towards zero when the value fits in an `i64`
    pub fn to_int(self) -> Option<i64> {
        match self {
            Self::Value(v) if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
                Some(v.trunc() as i64)
            }
            _ => None,
        }
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Self::from_float(value)
    }
}

impl From<Option<f64>> for Numeric {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::from_float)
    }
}

impl From<&str> for Numeric {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<Option<&str>> for Numeric {
    fn from(text: Option<&str>) -> Self {
        text.map_or(Self::Missing, Self::parse)
    }
}

/// Convert a possibly float-formatted value to an integer
///
/// `3.0`, `"3.0"` and `"3"` all yield `Some(3)`; missing, NaN, non-numeric
/// and out-of-range input yield `None`.
pub fn safe_int(value: impl Into<Numeric>) -> Option<i64> {
    value.into().to_int()
}

/// Derive a region code (0-9) from a postal code read as hexadecimal
///
/// The whole trimmed string is interpreted as a base-16 integer, so
/// arbitrarily long codes are reduced digit by digit instead of being
/// materialized. Accepts an optional sign, an optional `0x` prefix and single
/// underscores between digits. Returns `None` for missing, `"nan"` or non-hex
/// input.
pub fn region_from_postal(code: Option<&str>) -> Option<u8> {
    let trimmed = code?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (digits, prefixed) = match unsigned.get(..2) {
        Some("0x") | Some("0X") => (&unsigned[2..], true),
        _ => (unsigned, false),
    };

    let mut remainder: u32 = 0;
    let mut seen_digit = false;
    let mut previous_underscore = false;
    for ch in digits.chars() {
        if ch == '_' {
            // An underscore may follow the prefix or a digit, never another underscore.
            if previous_underscore || (!seen_digit && !prefixed) {
                return None;
            }
            previous_underscore = true;
            continue;
        }
        let digit = ch.to_digit(16)?;
        remainder = (remainder * 16 + digit) % 10;
        seen_digit = true;
        previous_underscore = false;
    }
    if !seen_digit || previous_underscore {
        return None;
    }

    let remainder = if negative {
        (10 - remainder) % 10
    } else {
        remainder
    };
    Some(remainder as u8)
}

/// Demographic age bucket of a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeRange {
    /// 0 to 17
    Under18,
    /// 18 to 24
    From18To24,
    /// 25 to 34
    From25To34,
    /// 35 to 44
    From35To44,
    /// 45 to 54
    From45To54,
    /// 55 to 64
    From55To64,
    /// 65 to 120
    Over64,
    /// Missing, non-numeric or implausible age
    Unknown,
}

impl AgeRange {
    /// Bucket an age in whole years
    pub fn from_age(age: Option<i64>) -> Self {
        match age {
            Some(a) if !(0..=MAX_AGE).contains(&a) => Self::Unknown,
            Some(0..=17) => Self::Under18,
            Some(18..=24) => Self::From18To24,
            Some(25..=34) => Self::From25To34,
            Some(35..=44) => Self::From35To44,
            Some(45..=54) => Self::From45To54,
            Some(55..=64) => Self::From55To64,
            Some(_) => Self::Over64,
            None => Self::Unknown,
        }
    }

    /// Bucket a raw numeric age such as `34.0` or `"34.0"`
    pub fn from_numeric(age: impl Into<Numeric>) -> Self {
        Self::from_age(safe_int(age))
    }

    /// Label stored in `dim_customer.age_range`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Under18 => "0-17",
            Self::From18To24 => "18-24",
            Self::From25To34 => "25-34",
            Self::From35To44 => "35-44",
            Self::From45To54 => "45-54",
            Self::From55To64 => "55-64",
            Self::Over64 => "65+",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AgeRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Age bucket for a cleaned age in whole years
pub fn age_range(age: Option<i64>) -> AgeRange {
    AgeRange::from_age(age)
}

/// Keep an age only when it is plausible (0 to 120)
pub fn clean_age(age: Option<i64>) -> Option<i64> {
    age.filter(|a| (0..=MAX_AGE).contains(a))
}

/// A customer row as read from `stg_customers`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedCustomer {
    pub customer_id: Option<String>,
    pub fn_flag: Option<f64>,
    pub active: Option<f64>,
    pub club_member_status: Option<String>,
    pub fashion_news_frequency: Option<String>,
    pub age: Option<f64>,
    pub postal_code: Option<String>,
}

/// A customer row as written to `dim_customer`
///
/// Field order matches the bulk-copy column list; `None` serializes to an
/// empty CSV field which the copy reads back as SQL null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerDimRow {
    pub customer_id: Option<String>,
    #[serde(rename = "fn")]
    pub fn_flag: Option<i64>,
    pub active: Option<i64>,
    pub club_member_status: Option<String>,
    pub fashion_news_frequency: Option<String>,
    pub age: Option<i64>,
    pub age_range: AgeRange,
    pub postal_code: Option<String>,
    pub region_id: Option<u8>,
}

impl CustomerDimRow {
    /// Column names of `dim_customer` in serialization order
    pub const COLUMNS: [&'static str; 9] = [
        "customer_id",
        "fn",
        "active",
        "club_member_status",
        "fashion_news_frequency",
        "age",
        "age_range",
        "postal_code",
        "region_id",
    ];
}

impl From<StagedCustomer> for CustomerDimRow {
    fn from(staged: StagedCustomer) -> Self {
        let age = safe_int(staged.age);
        let region_id = region_from_postal(staged.postal_code.as_deref());
        Self {
            customer_id: staged.customer_id,
            fn_flag: safe_int(staged.fn_flag),
            active: safe_int(staged.active),
            club_member_status: staged.club_member_status,
            fashion_news_frequency: staged.fashion_news_frequency,
            age: clean_age(age),
            age_range: age_range(age),
            postal_code: staged.postal_code,
            region_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference value of a hex string modulo 10 for strings short enough to fit a u128
    fn hex_mod_10(s: &str) -> u8 {
        (u128::from_str_radix(s, 16).unwrap() % 10) as u8
    }

    #[test]
    fn test_region_from_postal_known_code() {
        assert_eq!(region_from_postal(Some("1A2B")), Some(9));
        assert_eq!(region_from_postal(Some("  1a2b  ")), Some(9));
        assert_eq!(region_from_postal(Some("0")), Some(0));
        assert_eq!(region_from_postal(Some("F")), Some(5));
    }

    #[test]
    fn test_region_from_postal_matches_integer_parse() {
        let samples = [
            "0", "9", "a", "ff", "100", "dead", "BEEF", "1A2B", "7fffffff", "123456789abcdef",
            "ffffffffffffffffffffffffffffff",
        ];
        for s in samples {
            let region = region_from_postal(Some(s)).unwrap();
            assert_eq!(region, hex_mod_10(s), "postal code {s}");
            assert!(region <= 9);
        }
        for n in 0u32..5000 {
            let s = format!("{n:x}");
            assert_eq!(region_from_postal(Some(&s)), Some((n % 10) as u8));
        }
    }

    #[test]
    fn test_region_from_postal_long_code() {
        // Real H&M postal codes are 64 hex characters.
        let code = "52043ee2162cf5aa7ee79974281641c6f11a68d276429a91f8ca0d4b6efa8100";
        let expected = code
            .chars()
            .fold(0u32, |acc, c| (acc * 16 + c.to_digit(16).unwrap()) % 10);
        assert_eq!(region_from_postal(Some(code)), Some(expected as u8));
    }

    #[test]
    fn test_region_from_postal_prefix_sign_and_underscores() {
        assert_eq!(region_from_postal(Some("0x1A2B")), Some(9));
        assert_eq!(region_from_postal(Some("+1A2B")), Some(9));
        // -6699 mod 10 == 1 with a non-negative remainder
        assert_eq!(region_from_postal(Some("-1A2B")), Some(1));
        assert_eq!(region_from_postal(Some("1A_2B")), Some(9));
        assert_eq!(region_from_postal(Some("0x_1A2B")), Some(9));
        assert_eq!(region_from_postal(Some("_1A2B")), None);
        assert_eq!(region_from_postal(Some("1A__2B")), None);
        assert_eq!(region_from_postal(Some("1A2B_")), None);
    }

    #[test]
    fn test_region_from_postal_missing_or_invalid() {
        assert_eq!(region_from_postal(None), None);
        assert_eq!(region_from_postal(Some("")), None);
        assert_eq!(region_from_postal(Some("   ")), None);
        assert_eq!(region_from_postal(Some("nan")), None);
        assert_eq!(region_from_postal(Some("NaN")), None);
        assert_eq!(region_from_postal(Some("NAN")), None);
        assert_eq!(region_from_postal(Some("12G4")), None);
        assert_eq!(region_from_postal(Some("12 34")), None);
        assert_eq!(region_from_postal(Some("0x")), None);
        assert_eq!(region_from_postal(Some("-")), None);
        assert_eq!(region_from_postal(Some("ö1")), None);
    }

    #[test]
    fn test_safe_int() {
        assert_eq!(safe_int(3.0), Some(3));
        assert_eq!(safe_int(Some(1.0)), Some(1));
        assert_eq!(safe_int("1.0"), Some(1));
        assert_eq!(safe_int("34"), Some(34));
        assert_eq!(safe_int(" 2.9 "), Some(2));
        assert_eq!(safe_int(-2.9), Some(-2));
        assert_eq!(safe_int("1e2"), Some(100));
    }

    #[test]
    fn test_safe_int_absent_values() {
        assert_eq!(safe_int(None::<f64>), None);
        assert_eq!(safe_int(None::<&str>), None);
        assert_eq!(safe_int(f64::NAN), None);
        assert_eq!(safe_int(f64::INFINITY), None);
        assert_eq!(safe_int(""), None);
        assert_eq!(safe_int("abc"), None);
        assert_eq!(safe_int("nan"), None);
        assert_eq!(safe_int(1e300), None);
    }

    #[test]
    fn test_numeric_variants() {
        assert_eq!(Numeric::parse(""), Numeric::Missing);
        assert_eq!(Numeric::parse("x"), Numeric::Invalid);
        assert_eq!(Numeric::parse("4.5"), Numeric::Value(4.5));
        assert_eq!(Numeric::from(f64::NAN), Numeric::Missing);
        assert_eq!(Numeric::from(Some(1.0)), Numeric::Value(1.0));
        assert_eq!(Numeric::from(None::<f64>), Numeric::Missing);
    }

    #[test]
    fn test_age_range_buckets() {
        let cases = [
            (0, "0-17"),
            (17, "0-17"),
            (18, "18-24"),
            (24, "18-24"),
            (25, "25-34"),
            (34, "25-34"),
            (35, "35-44"),
            (44, "35-44"),
            (45, "45-54"),
            (54, "45-54"),
            (55, "55-64"),
            (64, "55-64"),
            (65, "65+"),
            (120, "65+"),
        ];
        for (age, label) in cases {
            assert_eq!(age_range(Some(age)).label(), label, "age {age}");
        }
    }

    #[test]
    fn test_age_range_monotonic() {
        let mut previous = age_range(Some(0));
        for age in 0..=MAX_AGE {
            let current = age_range(Some(age));
            assert_ne!(current, AgeRange::Unknown);
            assert!(current >= previous, "age {age}");
            previous = current;
        }
    }

    #[test]
    fn test_age_range_unknown() {
        assert_eq!(age_range(None), AgeRange::Unknown);
        assert_eq!(age_range(Some(-1)), AgeRange::Unknown);
        assert_eq!(age_range(Some(121)), AgeRange::Unknown);
        assert_eq!(AgeRange::from_numeric(""), AgeRange::Unknown);
        assert_eq!(AgeRange::from_numeric("old"), AgeRange::Unknown);
        assert_eq!(AgeRange::from_numeric(f64::NAN), AgeRange::Unknown);
        assert_eq!(AgeRange::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_age_range_from_float_text() {
        assert_eq!(AgeRange::from_numeric("34.0"), AgeRange::From25To34);
        assert_eq!(AgeRange::from_numeric(Some(64.9)), AgeRange::From55To64);
    }

    #[test]
    fn test_age_range_labels_are_distinct() {
        let labels: std::collections::HashSet<_> = [
            AgeRange::Under18,
            AgeRange::From18To24,
            AgeRange::From25To34,
            AgeRange::From35To44,
            AgeRange::From45To54,
            AgeRange::From55To64,
            AgeRange::Over64,
            AgeRange::Unknown,
        ]
        .iter()
        .map(|r| r.label())
        .collect();
        assert_eq!(labels.len(), 8);
    }

    #[test]
    fn test_customer_row_from_staged() {
        let staged = StagedCustomer {
            customer_id: Some("c1".to_string()),
            fn_flag: Some(1.0),
            active: None,
            club_member_status: Some("ACTIVE".to_string()),
            fashion_news_frequency: Some("NONE".to_string()),
            age: Some(34.0),
            postal_code: Some("1A2B".to_string()),
        };
        let row = CustomerDimRow::from(staged);
        assert_eq!(row.fn_flag, Some(1));
        assert_eq!(row.active, None);
        assert_eq!(row.age, Some(34));
        assert_eq!(row.age_range, AgeRange::From25To34);
        assert_eq!(row.region_id, Some(9));
    }

    #[test]
    fn test_customer_row_implausible_age_is_cleared() {
        let staged = StagedCustomer {
            customer_id: Some("c2".to_string()),
            age: Some(150.0),
            postal_code: Some("zz".to_string()),
            ..Default::default()
        };
        let row = CustomerDimRow::from(staged);
        assert_eq!(row.age, None);
        assert_eq!(row.age_range, AgeRange::Unknown);
        assert_eq!(row.region_id, None);
        assert_eq!(row.postal_code.as_deref(), Some("zz"));
    }

    #[test]
    fn test_customer_row_csv_shape() {
        let row = CustomerDimRow {
            customer_id: Some("c3".to_string()),
            fn_flag: None,
            active: Some(1),
            club_member_status: None,
            fashion_news_frequency: Some("Regularly".to_string()),
            age: None,
            age_range: AgeRange::Unknown,
            postal_code: None,
            region_id: Some(0),
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&row).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CustomerDimRow::COLUMNS.join(","));
        assert_eq!(lines.next().unwrap(), "c3,,1,,Regularly,,UNKNOWN,,0");
    }
}
