//! Frictionless date/time format patterns
//!
//! Dictionaries give temporal formats as Python `strptime` patterns, or the
//! keywords `default` and `any`. A [`DateFormat`] holds the same pattern
//! rendered for MySQL `STR_TO_DATE` and for chrono parsing.

use crate::database::ColumnType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use dkan_common::{DkanError, Result};

const DEFAULT_DATE: &str = "%Y-%m-%d";
const DEFAULT_DATETIME: &str = "%Y-%m-%dT%H:%M:%SZ";
const DEFAULT_TIME: &str = "%H:%M:%S";

const ANY_DATE: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"];
const ANY_DATETIME: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const ANY_TIME: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    /// Pattern as written in the dictionary
    pub source: String,
    pub mysql: String,
    chrono: String,
    /// `any`: try a list of common layouts
    lenient: bool,
}

impl DateFormat {
    /// Translate one strptime pattern
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut mysql = String::with_capacity(pattern.len());
        let mut chrono = String::with_capacity(pattern.len());
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                mysql.push(c);
                chrono.push(c);
                continue;
            }

            let mut directive = chars
                .next()
                .ok_or_else(|| unsupported(pattern, "%"))?;
            let unpadded = directive == '-';
            if unpadded {
                directive = chars
                    .next()
                    .ok_or_else(|| unsupported(pattern, "%-"))?;
            }

            let (my, ch) = match (unpadded, directive) {
                (false, 'a') => ("%a", "%a"),
                (false, 'A') => ("%W", "%A"),
                (false, 'b') => ("%b", "%b"),
                (false, 'B') => ("%M", "%B"),
                (false, 'd') => ("%d", "%d"),
                (true, 'd') => ("%e", "%-d"),
                (false, 'e') => ("%e", "%e"),
                (false, 'H') => ("%H", "%H"),
                (true, 'H') => ("%k", "%-H"),
                (false, 'I') => ("%h", "%I"),
                (true, 'I') => ("%l", "%-I"),
                (false, 'j') => ("%j", "%j"),
                (false, 'm') => ("%m", "%m"),
                (true, 'm') => ("%c", "%-m"),
                (false, 'M') => ("%i", "%M"),
                (false, 'p') => ("%p", "%p"),
                (false, 'S') => ("%S", "%S"),
                (false, 'f') => ("%f", "%6f"),
                (false, 'y') => ("%y", "%y"),
                (false, 'Y') => ("%Y", "%Y"),
                (false, '%') => ("%%", "%%"),
                (true, other) => return Err(unsupported(pattern, &format!("%-{other}"))),
                (false, other) => return Err(unsupported(pattern, &format!("%{other}"))),
            };
            mysql.push_str(my);
            chrono.push_str(ch);
        }

        Ok(Self {
            source: pattern.to_string(),
            mysql,
            chrono,
            lenient: false,
        })
    }

    /// Format for a dictionary field of `column_type`; `None` for
    /// non-temporal types
    pub fn for_field(format: Option<&str>, column_type: ColumnType) -> Result<Option<Self>> {
        let default = match column_type {
            ColumnType::Date => DEFAULT_DATE,
            ColumnType::DateTime => DEFAULT_DATETIME,
            ColumnType::Time => DEFAULT_TIME,
            _ => return Ok(None),
        };

        let format = match format.map(str::trim) {
            None | Some("") | Some("default") => Self::parse(default)?,
            Some("any") => Self {
                lenient: true,
                ..Self::parse(default)?
            },
            Some(pattern) => Self::parse(pattern)?,
        };
        Ok(Some(format))
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    fn patterns<'a>(&'a self, fallbacks: &'a [&'a str]) -> Vec<&'a str> {
        let mut patterns = vec![self.chrono.as_str()];
        if self.lenient {
            patterns.extend(fallbacks.iter().copied());
        }
        patterns
    }

    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        self.patterns(ANY_DATE)
            .into_iter()
            .find_map(|p| NaiveDate::parse_from_str(value, p).ok())
    }

    pub fn parse_datetime(&self, value: &str) -> Option<NaiveDateTime> {
        let parsed = self
            .patterns(ANY_DATETIME)
            .into_iter()
            .find_map(|p| NaiveDateTime::parse_from_str(value, p).ok());
        if parsed.is_none() && self.lenient {
            return DateTime::parse_from_rfc3339(value).ok().map(|d| d.naive_utc());
        }
        parsed
    }

    pub fn parse_time(&self, value: &str) -> Option<NaiveTime> {
        self.patterns(ANY_TIME)
            .into_iter()
            .find_map(|p| NaiveTime::parse_from_str(value, p).ok())
    }
}

fn unsupported(pattern: &str, directive: &str) -> DkanError {
    DkanError::schema(format!(
        "Unsupported date format directive {directive} in '{pattern}'"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_translates_to_mysql() {
        assert_eq!(DateFormat::parse("%m/%d/%Y").unwrap().mysql, "%m/%d/%Y");
        assert_eq!(DateFormat::parse("%A, %B %-d %Y").unwrap().mysql, "%W, %M %e %Y");
        assert_eq!(DateFormat::parse("%I:%M %p").unwrap().mysql, "%h:%i %p");
        assert_eq!(DateFormat::parse("%-I:%M").unwrap().mysql, "%l:%i");
        assert_eq!(DateFormat::parse("%-m/%-d/%y %-H:%M").unwrap().mysql, "%c/%e/%y %k:%i");
        assert_eq!(DateFormat::parse("100%%").unwrap().mysql, "100%%");
    }

    #[test]
    fn test_rejects_unsupported_directives() {
        let err = DateFormat::parse("%Y-%m-%d %z").unwrap_err();
        assert!(err.to_string().contains("%z"));
        assert!(DateFormat::parse("%U").is_err());
        assert!(DateFormat::parse("%Y%").is_err());
    }

    #[test]
    fn test_defaults_per_type() {
        let date = DateFormat::for_field(Some("default"), ColumnType::Date).unwrap().unwrap();
        assert_eq!(date.mysql, "%Y-%m-%d");
        let datetime = DateFormat::for_field(None, ColumnType::DateTime).unwrap().unwrap();
        assert_eq!(datetime.mysql, "%Y-%m-%dT%H:%i:%SZ");
        assert!(DateFormat::for_field(Some("%Y"), ColumnType::Int).unwrap().is_none());
    }

    #[test]
    fn test_parses_values() {
        let f = DateFormat::parse("%m/%d/%Y").unwrap();
        assert_eq!(f.parse_date("12/31/2024"), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(f.parse_date("1/5/2024"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(f.parse_date("2024-12-31"), None);

        let t = DateFormat::parse("%I:%M %p").unwrap();
        assert_eq!(t.parse_time("03:15 PM"), NaiveTime::from_hms_opt(15, 15, 0));
    }

    #[test]
    fn test_any_accepts_common_layouts() {
        let f = DateFormat::for_field(Some("any"), ColumnType::Date).unwrap().unwrap();
        assert!(f.is_lenient());
        assert_eq!(f.parse_date("2024-02-03"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(f.parse_date("02/03/2024"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(f.parse_date("not a date"), None);

        let dt = DateFormat::for_field(Some("any"), ColumnType::DateTime).unwrap().unwrap();
        assert!(dt.parse_datetime("2024-02-03T04:05:06+02:00").is_some());
    }
}
