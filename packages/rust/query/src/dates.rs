//! Korean date-phrase parsing.
//!
//! Turns relative expressions ("최근 3개월", "지난 1년"), absolute dates and
//! ranges ("2024-01-01 ~ 2024-06-30"), month/quarter names, and a handful of
//! calendar keywords into an inclusive `[begin, end]` window in `YYYYMMDD`.
//! Anything unrecognized falls back to the last 90 days with a warning flag.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use dartsearch_shared::DateRange;
use regex::Regex;

/// Fallback window for unrecognized input.
const DEFAULT_WINDOW_DAYS: u64 = 90;

/// Result of parsing a date phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedWindow {
    pub range: DateRange,
    /// False when the default window was applied.
    pub recognized: bool,
}

static EXPLICIT_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[.\-/](\d{1,2})[.\-/](\d{1,2})\s*[~\-]\s*(\d{4})[.\-/](\d{1,2})[.\-/](\d{1,2})")
        .expect("valid regex")
});

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:최근|지난)\s*(\d+)\s*(년|개월|주|일)").expect("valid regex")
});

static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*년\s*(\d{1,2})\s*월").expect("valid regex"));

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})\s*년").expect("valid regex"));

static QUARTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(\d{4})\s*년\s*)?([1-4])\s*분기").expect("valid regex"));

static SINGLE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[.\-/](\d{1,2})[.\-/](\d{1,2})").expect("valid regex"));

/// Parse the date expression(s) in `text` relative to `today`.
pub fn parse_date_phrase(text: &str, today: NaiveDate) -> ParsedWindow {
    if let Some(window) = try_parse(text, today) {
        let clamped = clamp(window, today);
        return ParsedWindow {
            range: clamped,
            recognized: true,
        };
    }

    let begin = today - Days::new(DEFAULT_WINDOW_DAYS);
    ParsedWindow {
        range: DateRange::from_dates(begin, today),
        recognized: false,
    }
}

fn try_parse(text: &str, today: NaiveDate) -> Option<DateRange> {
    // Explicit ranges take precedence over everything else.
    if let Some(caps) = EXPLICIT_RANGE_RE.captures(text) {
        let begin = ymd(&caps[1], &caps[2], &caps[3])?;
        let end = ymd(&caps[4], &caps[5], &caps[6])?;
        if begin <= end {
            return Some(DateRange::from_dates(begin, end));
        }
        return None;
    }

    // "최근/지난 N 년|개월|주|일" — open-ended, ending today.
    if let Some(caps) = RELATIVE_RE.captures(text) {
        let n: u64 = caps[1].parse().ok()?;
        let days = match &caps[2] {
            "년" => n.checked_mul(365)?,
            "개월" => n.checked_mul(30)?,
            "주" => n.checked_mul(7)?,
            _ => n,
        };
        let begin = today.checked_sub_days(Days::new(days))?;
        return Some(DateRange::from_dates(begin, today));
    }

    // Calendar keywords.
    if text.contains("올해") {
        let begin = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
        return Some(DateRange::from_dates(begin, today));
    }
    if text.contains("작년") {
        let year = today.year() - 1;
        return Some(DateRange::from_dates(
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        ));
    }
    if text.contains("지난달") || text.contains("전월") {
        let first_of_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
        let last_month_end = first_of_month.pred_opt()?;
        let last_month_begin =
            NaiveDate::from_ymd_opt(last_month_end.year(), last_month_end.month(), 1)?;
        return Some(DateRange::from_dates(last_month_begin, last_month_end));
    }
    if text.contains("이번달") || text.contains("당월") {
        let begin = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
        return Some(DateRange::from_dates(begin, today));
    }
    if text.contains("어제") {
        let yesterday = today.pred_opt()?;
        return Some(DateRange::from_dates(yesterday, yesterday));
    }
    if text.contains("오늘") {
        return Some(DateRange::from_dates(today, today));
    }

    // Quarters, before bare-year so "2024년 1분기" parses as a quarter.
    if let Some(caps) = QUARTER_RE.captures(text) {
        let year = caps
            .get(1)
            .and_then(|y| y.as_str().parse().ok())
            .unwrap_or(today.year());
        let quarter: u32 = caps[2].parse().ok()?;
        return quarter_range(year, quarter);
    }

    // "YYYY년 M월" / "YYYY년".
    if let Some(caps) = YEAR_MONTH_RE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return month_range(year, month);
    }
    if let Some(caps) = YEAR_RE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        return Some(DateRange::from_dates(
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        ));
    }

    // A single absolute date.
    if let Some(caps) = SINGLE_DATE_RE.captures(text) {
        let date = ymd(&caps[1], &caps[2], &caps[3])?;
        return Some(DateRange::from_dates(date, date));
    }

    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let begin = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?
    };
    Some(DateRange::from_dates(begin, end))
}

fn quarter_range(year: i32, quarter: u32) -> Option<DateRange> {
    let (start_month, end_month) = match quarter {
        1 => (1, 3),
        2 => (4, 6),
        3 => (7, 9),
        4 => (10, 12),
        _ => return None,
    };
    let begin = NaiveDate::from_ymd_opt(year, start_month, 1)?;
    let end = if end_month == 12 {
        NaiveDate::from_ymd_opt(year, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(year, end_month + 1, 1)?.pred_opt()?
    };
    Some(DateRange::from_dates(begin, end))
}

/// Keep `end ≤ today` and `begin ≤ end`.
fn clamp(range: DateRange, today: NaiveDate) -> DateRange {
    let today_s = today.format("%Y%m%d").to_string();
    let end = if range.end > today_s {
        today_s
    } else {
        range.end
    };
    let begin = if range.begin > end {
        end.clone()
    } else {
        range.begin
    };
    DateRange { begin, end }
}
