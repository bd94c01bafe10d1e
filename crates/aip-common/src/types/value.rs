//! Column types and cell values
//!
//! [`SqlType`] is the closed set of SQL:1999 types a target column can carry,
//! [`Value`] the closed set of values a source row can hold. The archive
//! writer checks every value against its column type before it is persisted.

use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AipError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQL:1999 type of an archived column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SqlType {
    Integer,
    Decimal { precision: u32, scale: u32 },
    NationalCharacterVarying { length: u32 },
    Timestamp,
    Interval,
    Boolean,
}

impl SqlType {
    /// XML Schema type used for the column in the generated table schema
    pub fn xsd_type(&self) -> &'static str {
        match self {
            SqlType::Integer => "xs:integer",
            SqlType::Decimal { .. } => "xs:decimal",
            SqlType::NationalCharacterVarying { .. } => "xs:string",
            SqlType::Timestamp => "xs:dateTime",
            SqlType::Interval => "xs:duration",
            SqlType::Boolean => "xs:boolean",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            SqlType::NationalCharacterVarying { length } => {
                write!(f, "NATIONAL CHARACTER VARYING({length})")
            },
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::Interval => write!(f, "INTERVAL DAY TO SECOND"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

impl FromStr for SqlType {
    type Err = AipError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let (name, args) = match normalized.find('(') {
            Some(open) => {
                let close = normalized
                    .rfind(')')
                    .filter(|close| *close > open && *close + 1 == normalized.len())
                    .ok_or_else(|| AipError::parse(format!("Unbalanced type arguments: {s}")))?;
                let args = normalized[open + 1..close]
                    .split(',')
                    .map(|a| a.trim().parse::<u32>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| AipError::parse(format!("Invalid type arguments: {s}")))?;
                (normalized[..open].trim().to_string(), args)
            },
            None => (normalized.clone(), Vec::new()),
        };

        match (name.as_str(), args.as_slice()) {
            ("INTEGER" | "INT", []) => Ok(SqlType::Integer),
            ("DECIMAL" | "NUMERIC", [precision]) => Ok(SqlType::Decimal {
                precision: *precision,
                scale: 0,
            }),
            ("DECIMAL" | "NUMERIC", [precision, scale]) if scale <= precision => {
                Ok(SqlType::Decimal {
                    precision: *precision,
                    scale: *scale,
                })
            },
            ("NATIONAL CHARACTER VARYING" | "NVARCHAR", [length]) => {
                Ok(SqlType::NationalCharacterVarying { length: *length })
            },
            ("TIMESTAMP", []) => Ok(SqlType::Timestamp),
            ("INTERVAL DAY TO SECOND" | "INTERVAL", []) => Ok(SqlType::Interval),
            ("BOOLEAN", []) => Ok(SqlType::Boolean),
            _ => Err(AipError::parse(format!("Unsupported SQL type: {s}"))),
        }
    }
}

impl TryFrom<String> for SqlType {
    type Error = AipError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SqlType> for String {
    fn from(value: SqlType) -> Self {
        value.to_string()
    }
}

/// A single cell of a source row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Decimal(BigDecimal),
    DateTime(NaiveDateTime),
    TimeSpan(Duration),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parse source text into a value of the given column type
    ///
    /// An empty string is a null.
    pub fn parse(text: &str, sql_type: &SqlType) -> Result<Value> {
        if text.is_empty() {
            return Ok(Value::Null);
        }

        let invalid = || AipError::parse(format!("'{text}' is not a valid {sql_type}"));

        match sql_type {
            SqlType::Integer => text.trim().parse().map(Value::Integer).map_err(|_| invalid()),
            SqlType::Decimal { .. } => BigDecimal::from_str(text.trim())
                .map(Value::Decimal)
                .map_err(|_| invalid()),
            SqlType::NationalCharacterVarying { .. } => Ok(Value::String(text.to_string())),
            SqlType::Timestamp => parse_timestamp(text.trim()).ok_or_else(invalid),
            SqlType::Interval => parse_duration(text.trim()).map(Value::TimeSpan).ok_or_else(invalid),
            SqlType::Boolean => match text.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Boolean(true)),
                "false" | "0" | "no" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// Check the value against a column type
    ///
    /// Nullability is the caller's concern; a null always conforms here.
    pub fn conforms_to(&self, sql_type: &SqlType) -> std::result::Result<(), String> {
        match (self, sql_type) {
            (Value::Null, _) => Ok(()),
            (Value::Integer(_), SqlType::Integer) => Ok(()),
            (Value::Integer(i), SqlType::Decimal { precision, scale }) => {
                check_decimal(&BigDecimal::from(*i), *precision, *scale)
            },
            (Value::Decimal(d), SqlType::Decimal { precision, scale }) => {
                check_decimal(d, *precision, *scale)
            },
            (Value::String(s), SqlType::NationalCharacterVarying { length }) => {
                let chars = s.chars().count();
                if chars > *length as usize {
                    Err(format!("{chars} characters exceed the declared length {length}"))
                } else {
                    Ok(())
                }
            },
            (Value::DateTime(_), SqlType::Timestamp) => Ok(()),
            (Value::TimeSpan(_), SqlType::Interval) => Ok(()),
            (Value::Boolean(_), SqlType::Boolean) => Ok(()),
            (value, sql_type) => Err(format!("{} value cannot be stored as {sql_type}", value.kind())),
        }
    }

    /// Lexical form used in table data files; `None` for null
    pub fn to_xml_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.normalized().to_string()),
            Value::DateTime(dt) => Some(dt.format(TIMESTAMP_FORMAT).to_string()),
            Value::TimeSpan(d) => Some(format_duration(d)),
            Value::Boolean(b) => Some(b.to_string()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::TimeSpan(_) => "timespan",
            Value::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_xml_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

fn check_decimal(d: &BigDecimal, precision: u32, scale: u32) -> std::result::Result<(), String> {
    let normalized = d.normalized();
    let (_, exponent) = normalized.as_bigint_and_exponent();
    let digits = normalized.digits() as i64;
    let fraction_digits = exponent.max(0);
    let integer_digits = (digits - exponent).max(0);

    if fraction_digits > scale as i64 {
        return Err(format!("{d} has more than {scale} fraction digits"));
    }
    if integer_digits > precision.saturating_sub(scale) as i64 {
        return Err(format!("{d} does not fit DECIMAL({precision},{scale})"));
    }
    Ok(())
}

fn parse_timestamp(text: &str) -> Option<Value> {
    const FORMATS: [&str; 3] = [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(Value::DateTime)
}

/// Parse `PnDTnHnMnS` (any part optional, optional leading `-`) or plain seconds
pub fn parse_duration(text: &str) -> Option<Duration> {
    if let Ok(seconds) = text.parse::<i64>() {
        return Duration::try_seconds(seconds);
    }

    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut seconds = 0i64;
    let mut take = |part: &str, units: &[(char, i64)]| -> Option<()> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let (_, factor) = units.iter().find(|(unit, _)| *unit == c)?;
            seconds = seconds.checked_add(number.parse::<i64>().ok()?.checked_mul(*factor)?)?;
            number.clear();
        }
        number.is_empty().then_some(())
    };

    take(date_part, &[('D', 86_400)])?;
    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        take(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    }

    Duration::try_seconds(if negative { -seconds } else { seconds })
}

/// Render a duration as an `xs:duration` (`PnDTnHnMnS`)
pub fn format_duration(duration: &Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{sign}P{days}DT{hours}H{minutes}M{seconds}S")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_round_trips_through_text() {
        for text in [
            "INTEGER",
            "DECIMAL(10,2)",
            "NATIONAL CHARACTER VARYING(50)",
            "TIMESTAMP",
            "INTERVAL DAY TO SECOND",
            "BOOLEAN",
        ] {
            assert_eq!(text.parse::<SqlType>().unwrap().to_string(), text);
        }
        assert_eq!(
            "nvarchar( 12 )".parse::<SqlType>().unwrap(),
            SqlType::NationalCharacterVarying { length: 12 }
        );
        assert!("DECIMAL(2,5)".parse::<SqlType>().is_err());
        assert!("BLOB".parse::<SqlType>().is_err());
        assert!("DECIMAL)(".parse::<SqlType>().is_err());
        assert!("DECIMAL(5".parse::<SqlType>().is_err());
        assert!("DECIMAL(5)X".parse::<SqlType>().is_err());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(Value::parse("", &SqlType::Integer).unwrap(), Value::Null);
        assert_eq!(Value::parse("42", &SqlType::Integer).unwrap(), Value::Integer(42));
        assert!(Value::parse("4x2", &SqlType::Integer).is_err());
        assert_eq!(
            Value::parse("2024-01-31", &SqlType::Timestamp).unwrap().to_xml_text().unwrap(),
            "2024-01-31T00:00:00"
        );
        assert_eq!(Value::parse("yes", &SqlType::Boolean).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_decimal_conformance() {
        let ty = SqlType::Decimal {
            precision: 5,
            scale: 2,
        };
        assert!(Value::parse("123.45", &ty).unwrap().conforms_to(&ty).is_ok());
        assert!(Value::parse("123.450", &ty).unwrap().conforms_to(&ty).is_ok());
        assert!(Value::parse("1234.5", &ty).unwrap().conforms_to(&ty).is_err());
        assert!(Value::parse("1.234", &ty).unwrap().conforms_to(&ty).is_err());
        assert!(Value::Integer(999).conforms_to(&ty).is_ok());
    }

    #[test]
    fn test_type_mismatch_and_length() {
        let ty = SqlType::NationalCharacterVarying { length: 3 };
        assert!(Value::String("abc".into()).conforms_to(&ty).is_ok());
        assert!(Value::String("abcd".into()).conforms_to(&ty).is_err());
        assert!(Value::Integer(1).conforms_to(&ty).is_err());
        assert!(Value::Null.conforms_to(&SqlType::Timestamp).is_ok());
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("P1DT2H3M4S").unwrap(), Duration::seconds(93_784));
        assert_eq!(parse_duration("-PT30M").unwrap(), Duration::seconds(-1_800));
        assert_eq!(parse_duration("90").unwrap(), Duration::seconds(90));
        assert!(parse_duration("P1Y").is_none());
        assert!(parse_duration("PT").is_none());
        assert_eq!(format_duration(&Duration::seconds(93_784)), "P1DT2H3M4S");
        assert_eq!(format_duration(&Duration::seconds(-60)), "-P0DT0H1M0S");
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        assert!(parse_duration("99999999999999999").is_none());
        assert!(parse_duration("P200000000000D").is_none());
        assert!(parse_duration("-P200000000000D").is_none());
        assert!(Value::parse("99999999999999999", &SqlType::Interval).is_err());
        assert!(Value::parse("P200000000000D", &SqlType::Interval).is_err());
    }
}
