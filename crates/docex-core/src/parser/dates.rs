//! Date extraction: Gregorian formats and Japanese era notation.

use chrono::NaiveDate;
use regex::{Captures, Regex};

use super::patterns::{
    DATE_DAY_MONTH_NAME, DATE_DMY, DATE_ERA_KANJI, DATE_ERA_LETTER, DATE_MONTH_NAME_DAY,
    DATE_YMD, DATE_YMD_KANJI, DATE_YMD_SPACED,
};
use super::{ExtractionMatch, FieldExtractor};

/// A Japanese era: name, letter abbreviation, first day and last day as
/// `(year, month, day)`. The current era has no last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Era {
    pub name: &'static str,
    pub letter: char,
    pub start: (i32, u32, u32),
    pub end: Option<(i32, u32, u32)>,
}

/// Era years beyond this are rejected for the open-ended current era.
const MAX_OPEN_ERA_YEAR: i32 = 99;

pub const ERAS: [Era; 5] = [
    Era { name: "明治", letter: 'M', start: (1868, 1, 25), end: Some((1912, 7, 29)) },
    Era { name: "大正", letter: 'T', start: (1912, 7, 30), end: Some((1926, 12, 24)) },
    Era { name: "昭和", letter: 'S', start: (1926, 12, 25), end: Some((1989, 1, 7)) },
    Era { name: "平成", letter: 'H', start: (1989, 1, 8), end: Some((2019, 4, 30)) },
    Era { name: "令和", letter: 'R', start: (2019, 5, 1), end: None },
];

impl Era {
    fn lookup(era: &str) -> Option<&'static Era> {
        ERAS.iter()
            .find(|e| e.name == era || (era.chars().count() == 1 && era.starts_with(e.letter)))
    }

    fn last_year(&self) -> i32 {
        match self.end {
            Some((year, _, _)) => year - self.start.0 + 1,
            None => MAX_OPEN_ERA_YEAR,
        }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        let (y, m, d) = self.start;
        let after_start = NaiveDate::from_ymd_opt(y, m, d).is_some_and(|start| date >= start);
        let before_end = match self.end {
            Some((y, m, d)) => NaiveDate::from_ymd_opt(y, m, d).is_some_and(|end| date <= end),
            None => true,
        };
        after_start && before_end
    }
}

/// Convert an era year to a Gregorian year. Out-of-range era years yield `None`.
pub fn era_to_gregorian(era: &str, era_year: i32) -> Option<i32> {
    let era = Era::lookup(era)?;
    (1..=era.last_year())
        .contains(&era_year)
        .then_some(era.start.0 - 1 + era_year)
}

/// Convert an era date to a calendar date. Dates outside the era's reign
/// (平成31年5月1日, 令和元年4月1日) yield `None`.
pub fn era_date(era: &str, era_year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let year = era_to_gregorian(era, era_year)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Era::lookup(era)?.contains(date).then_some(date)
}

/// Date extractor covering every format seen on Japanese ID documents.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }

    fn collect(
        &self,
        text: &str,
        pattern: &Regex,
        results: &mut Vec<ExtractionMatch<NaiveDate>>,
        to_date: impl Fn(&Captures) -> Option<NaiveDate>,
    ) {
        for caps in pattern.captures_iter(text) {
            let Some(date) = to_date(&caps) else {
                continue;
            };
            // Position of the first capture group, so guard characters are excluded.
            let (Some(start), Some(whole)) = (caps.get(1), caps.get(0)) else {
                continue;
            };
            if results.iter().any(|r| r.position.map(|p| p.0) == Some(start.start())) {
                continue;
            }
            results.push(
                ExtractionMatch::new(date, whole.as_str().trim())
                    .with_position(start.start(), whole.end()),
            );
        }
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    /// Earliest valid date in the text.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        // 令和3年5月1日 / 平成元年1月8日
        self.collect(text, &DATE_ERA_KANJI, &mut results, |caps| {
            let era_year = if &caps[2] == "元" { 1 } else { caps[2].parse().ok()? };
            era_date(&caps[1], era_year, caps[3].parse().ok()?, caps[4].parse().ok()?)
        });

        // H2.3.4
        self.collect(text, &DATE_ERA_LETTER, &mut results, |caps| {
            era_date(&caps[1], caps[2].parse().ok()?, caps[3].parse().ok()?, caps[4].parse().ok()?)
        });

        // 1990年1月2日, 1990/01/02, 1990-01-02, 1990.01.02, 1990 01 02
        for pattern in [&*DATE_YMD_KANJI, &*DATE_YMD, &*DATE_YMD_SPACED] {
            self.collect(text, pattern, &mut results, |caps| {
                NaiveDate::from_ymd_opt(
                    caps[1].parse().ok()?,
                    caps[2].parse().ok()?,
                    caps[3].parse().ok()?,
                )
            });
        }

        // 02/01/1990: day first unless the first number cannot be a day
        self.collect(text, &DATE_DMY, &mut results, |caps| {
            let first: u32 = caps[1].parse().ok()?;
            let second: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, second, first)
                .or_else(|| NaiveDate::from_ymd_opt(year, first, second))
        });

        // 02 JAN 1990
        self.collect(text, &DATE_DAY_MONTH_NAME, &mut results, |caps| {
            NaiveDate::from_ymd_opt(
                caps[3].parse().ok()?,
                month_from_name(&caps[2])?,
                caps[1].parse().ok()?,
            )
        });

        // JAN 02, 1990
        self.collect(text, &DATE_MONTH_NAME_DAY, &mut results, |caps| {
            NaiveDate::from_ymd_opt(
                caps[3].parse().ok()?,
                month_from_name(&caps[1])?,
                caps[2].parse().ok()?,
            )
        });

        results.sort_by_key(|m| m.position.map(|p| p.0).unwrap_or(usize::MAX));
        results
    }
}

/// Normalize a date string to a `NaiveDate`, if it contains one.
pub fn normalize_date(text: &str) -> Option<NaiveDate> {
    DateExtractor::new().extract(text).map(|m| m.value)
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_ascii_uppercase().as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iso(text: &str) -> Option<String> {
        normalize_date(text).map(|d| d.format("%Y-%m-%d").to_string())
    }

    #[test]
    fn test_reiwa_date() {
        assert_eq!(iso("令和3年5月1日"), Some("2021-05-01".to_string()));
    }

    #[test]
    fn test_era_table() {
        assert_eq!(era_to_gregorian("明治", 1), Some(1868));
        assert_eq!(era_to_gregorian("大正", 1), Some(1912));
        assert_eq!(era_to_gregorian("昭和", 1), Some(1926));
        assert_eq!(era_to_gregorian("平成", 1), Some(1989));
        assert_eq!(era_to_gregorian("令和", 1), Some(2019));
        assert_eq!(era_to_gregorian("平成", 3), Some(1991));
        assert_eq!(era_to_gregorian("H", 3), Some(1991));
        assert_eq!(era_to_gregorian("X", 3), None);
    }

    #[test]
    fn test_gannen_is_year_one() {
        assert_eq!(iso("令和元年5月1日"), Some("2019-05-01".to_string()));
        assert_eq!(iso("平成元年 1月 8日"), Some("1989-01-08".to_string()));
    }

    #[test]
    fn test_invalid_era_dates_are_discarded() {
        assert_eq!(iso("平成32年1月1日"), None);
        assert_eq!(iso("昭和0年1月1日"), None);
        assert_eq!(iso("令和3年2月30日"), None);
        assert_eq!(iso("平成5年13月1日"), None);
    }

    #[test]
    fn test_era_dates_outside_reign_are_discarded() {
        assert_eq!(iso("平成31年5月1日"), None);
        assert_eq!(iso("令和元年4月1日"), None);
        assert_eq!(iso("昭和64年1月8日"), None);
        assert_eq!(iso("H31.5.1"), None);
        assert_eq!(iso("明治元年1月1日"), None);
    }

    #[test]
    fn test_era_boundaries() {
        assert_eq!(iso("平成31年4月30日"), Some("2019-04-30".to_string()));
        assert_eq!(iso("令和元年5月1日"), Some("2019-05-01".to_string()));
        assert_eq!(iso("昭和64年1月7日"), Some("1989-01-07".to_string()));
        assert_eq!(iso("大正15年12月24日"), Some("1926-12-24".to_string()));
        assert_eq!(iso("昭和元年12月25日"), Some("1926-12-25".to_string()));
        assert_eq!(era_date("大正", 15, 12, 25), None);
    }

    #[test]
    fn test_letter_era() {
        assert_eq!(iso("H2.3.4"), Some("1990-03-04".to_string()));
        assert_eq!(iso("生年月日S60.12.25"), Some("1985-12-25".to_string()));
    }

    #[test]
    fn test_gregorian_formats() {
        assert_eq!(iso("1990年1月2日"), Some("1990-01-02".to_string()));
        assert_eq!(iso("1990/01/02"), Some("1990-01-02".to_string()));
        assert_eq!(iso("生年月日1990-1-2"), Some("1990-01-02".to_string()));
        assert_eq!(iso("1990.01.02"), Some("1990-01-02".to_string()));
        assert_eq!(iso("25/12/1990"), Some("1990-12-25".to_string()));
        assert_eq!(iso("12/25/1990"), Some("1990-12-25".to_string()));
        assert_eq!(iso("02 JAN 1990"), Some("1990-01-02".to_string()));
        assert_eq!(iso("March 5, 2001"), Some("2001-03-05".to_string()));
    }

    #[test]
    fn test_earliest_date_wins() {
        let text = "交付 2020年4月1日 満了 2025年4月1日";
        assert_eq!(iso(text), Some("2020-04-01".to_string()));

        let all = DateExtractor::new().extract_all(text);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_no_date() {
        assert_eq!(iso("山田 太郎"), None);
        assert_eq!(iso(""), None);
    }
}
