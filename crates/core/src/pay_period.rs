use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

/// Number of calendar days covered by one pay period.
pub const PERIOD_DAYS: i64 = 14;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Denver;

/// Local start date of `2025-PP1`. Every period boundary is a multiple of
/// [`PERIOD_DAYS`] away from it.
pub fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 22).unwrap_or(NaiveDate::MIN)
}

/// A fixed 14-day payroll window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayPeriod {
    /// `<year>-PP<index>`.
    pub name: String,
    pub year: i32,
    pub index: u32,
    /// First local day of the period.
    #[serde(skip)]
    pub first_day: NaiveDate,
    #[serde(skip)]
    pub last_day: NaiveDate,
    /// Local midnight of the first day, as UTC epoch milliseconds.
    #[serde(rename = "startDate")]
    pub start_ms: i64,
    /// Local `23:59:59` of the last day, as UTC epoch milliseconds.
    #[serde(rename = "endDate")]
    pub end_ms: i64,
}

impl PayPeriod {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start_ms).single()
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end_ms).single()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let ms = instant.timestamp_millis();
        ms >= self.start_ms && ms <= self.end_ms
    }
}

/// Maps dates onto a continuous grid of 14-day pay periods in one time zone.
///
/// A period is numbered within the year of its last day, so the period that
/// contains 1 January of a year is that year's `PP1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayPeriodCalendar {
    timezone: Tz,
    anchor: NaiveDate,
}

impl Default for PayPeriodCalendar {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE, default_anchor())
    }
}

impl PayPeriodCalendar {
    pub fn new(timezone: Tz, anchor: NaiveDate) -> Self {
        Self { timezone, anchor }
    }

    /// Builds a calendar from an IANA zone name and a `YYYY-MM-DD` anchor.
    pub fn from_names(timezone: &str, anchor: &str) -> Result<Self, PayPeriodError> {
        let tz = parse_timezone(timezone)?;
        let anchor = NaiveDate::parse_from_str(anchor, "%Y-%m-%d")
            .map_err(|_| PayPeriodError::InvalidDate(anchor.to_string()))?;
        Ok(Self::new(tz, anchor))
    }

    /// Same grid viewed from another zone.
    pub fn with_timezone(self, timezone: Tz) -> Self {
        Self { timezone, ..self }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    /// Period containing a calendar date in this calendar's zone.
    pub fn period_for(&self, date: NaiveDate) -> Result<PayPeriod, PayPeriodError> {
        let out_of_range = |_: PayPeriodError| PayPeriodError::InvalidDate(date.to_string());
        let first_day = self.period_start(date)?;
        let last_day = add_days(first_day, PERIOD_DAYS - 1).map_err(out_of_range)?;
        let year = last_day.year();

        let new_year = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PayPeriodError::InvalidDate(date.to_string()))?;
        let first_of_year = self.period_start(new_year).map_err(out_of_range)?;
        let index = (first_day - first_of_year).num_days() / PERIOD_DAYS + 1;

        let start_ms = self.local_to_utc_ms(first_day, (0, 0, 0))?;
        let end_ms = self.local_to_utc_ms(last_day, (23, 59, 59))?;

        Ok(PayPeriod {
            name: format!("{year}-PP{index}"),
            year,
            index: index as u32,
            first_day,
            last_day,
            start_ms,
            end_ms,
        })
    }

    /// Period containing an instant, judged by its local date.
    pub fn period_containing(&self, instant: DateTime<Utc>) -> Result<PayPeriod, PayPeriodError> {
        self.period_for(self.local_datetime(instant)?.date())
    }

    /// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp, or epoch milliseconds.
    pub fn period_for_str(&self, input: &str) -> Result<PayPeriod, PayPeriodError> {
        let trimmed = input.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return self.period_for(date);
        }
        self.period_containing(parse_instant(trimmed)?)
    }

    /// ISO-8601 week number of the instant in this calendar's zone.
    pub fn iso_week(&self, instant: DateTime<Utc>) -> Result<u32, PayPeriodError> {
        Ok(self.local_datetime(instant)?.iso_week().week())
    }

    pub fn next(&self, period: &PayPeriod) -> Result<PayPeriod, PayPeriodError> {
        self.period_for(add_days(period.first_day, PERIOD_DAYS)?)
    }

    pub fn previous(&self, period: &PayPeriod) -> Result<PayPeriod, PayPeriodError> {
        self.period_for(add_days(period.first_day, -PERIOD_DAYS)?)
    }

    /// Every period numbered within `year`, starting at `PP1`.
    pub fn periods_in_year(&self, year: i32) -> Result<Vec<PayPeriod>, PayPeriodError> {
        let new_year = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PayPeriodError::InvalidDate(format!("{year}-01-01")))?;
        let mut period = self.period_for(new_year)?;
        let mut periods = Vec::with_capacity(27);
        while period.year == year {
            let next = self.next(&period)?;
            periods.push(period);
            period = next;
        }
        Ok(periods)
    }

    fn period_start(&self, date: NaiveDate) -> Result<NaiveDate, PayPeriodError> {
        let offset = (date - self.anchor).num_days();
        self.anchor
            .checked_add_signed(Duration::days(offset.div_euclid(PERIOD_DAYS) * PERIOD_DAYS))
            .ok_or_else(|| PayPeriodError::InvalidDate(date.to_string()))
    }

    /// Wall-clock time of `instant` in this zone, or `InvalidDate` when the
    /// offset pushes it outside the representable range.
    fn local_datetime(&self, instant: DateTime<Utc>) -> Result<NaiveDateTime, PayPeriodError> {
        let utc = instant.naive_utc();
        let offset = self.timezone.offset_from_utc_datetime(&utc).fix();
        utc.checked_add_offset(offset)
            .ok_or_else(|| PayPeriodError::InvalidDate(instant.to_rfc3339()))
    }

    fn local_to_utc_ms(
        &self,
        date: NaiveDate,
        (hour, minute, second): (u32, u32, u32),
    ) -> Result<i64, PayPeriodError> {
        let local = date
            .and_hms_opt(hour, minute, second)
            .ok_or_else(|| PayPeriodError::InvalidDate(date.to_string()))?;
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|instant| instant.timestamp_millis())
            .ok_or_else(|| PayPeriodError::NonexistentLocalTime {
                local: local.to_string(),
                timezone: self.timezone.name().to_string(),
            })
    }
}

/// Parses an IANA zone name such as `America/Denver`.
pub fn parse_timezone(name: &str) -> Result<Tz, PayPeriodError> {
    name.parse::<Tz>()
        .map_err(|_| PayPeriodError::InvalidTimezone(name.to_string()))
}

/// Parses an RFC 3339 timestamp or integer epoch milliseconds.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, PayPeriodError> {
    let trimmed = input.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| PayPeriodError::InvalidDate(input.to_string()));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| PayPeriodError::InvalidDate(input.to_string()))
}

/// Shifts `date` by whole days; the error names the date that cannot be
/// shifted.
fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, PayPeriodError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| PayPeriodError::InvalidDate(date.to_string()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayPeriodError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("local time {local} does not exist in {timezone}")]
    NonexistentLocalTime { local: String, timezone: String },
}
