// libs/appointment-cell/src/clock.rs
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;

use doctor_cell::models::DayOfWeek;

use crate::models::BookingError;

/// A stored instant seen from the clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalMoment {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub weekday: DayOfWeek,
}

/// Converts between absolute instants and clinic wall-clock time. The clinic
/// runs on a fixed offset from UTC; there is no daylight-saving handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self, BookingError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
            .ok_or_else(|| BookingError::InvalidTimestamp(format!("UTC offset of {} minutes", minutes)))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> LocalMoment {
        let local = instant.with_timezone(&self.offset);
        LocalMoment {
            date: local.date_naive(),
            time: local.time(),
            weekday: local.weekday().into(),
        }
    }

    pub fn weekday_of(&self, date: NaiveDate) -> DayOfWeek {
        date.weekday().into()
    }

    /// The instant rendered with the clinic offset attached.
    pub fn in_clinic_time(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }

    pub fn to_absolute(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, BookingError> {
        self.offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| BookingError::InvalidTimestamp(format!("{} {}", date, time)))
    }

    pub fn start_of_local_day(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>, BookingError> {
        self.to_absolute(self.to_local(instant).date, NaiveTime::MIN)
    }

    /// Last representable instant of the local day containing `instant`.
    pub fn end_of_local_day(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>, BookingError> {
        let date = self.to_local(instant).date;
        let (_, end) = self.day_bounds(date)?;
        Ok(end)
    }

    /// Inclusive absolute bounds of a local calendar day.
    pub fn day_bounds(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), BookingError> {
        let next = date
            .succ_opt()
            .ok_or_else(|| BookingError::InvalidTimestamp(date.to_string()))?;
        let start = self.to_absolute(date, NaiveTime::MIN)?;
        let end = self.to_absolute(next, NaiveTime::MIN)? - Duration::nanoseconds(1);
        Ok((start, end))
    }

    pub fn today(&self) -> NaiveDate {
        self.to_local(Utc::now()).date
    }

    /// `YYYY-MM-DD`.
    pub fn parse_date(&self, raw: &str) -> Result<NaiveDate, BookingError> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| BookingError::InvalidTimestamp(raw.to_string()))
    }

    /// RFC 3339 with an explicit offset, or a bare `YYYY-MM-DDTHH:MM[:SS]`
    /// which is read as clinic wall-clock time.
    pub fn parse_instant(&self, raw: &str) -> Result<DateTime<Utc>, BookingError> {
        let raw = raw.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Ok(instant.with_timezone(&Utc));
        }

        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .map_err(|_| BookingError::InvalidTimestamp(raw.to_string()))?;
        self.to_absolute(naive.date(), naive.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ist() -> ClinicClock {
        ClinicClock::from_offset_minutes(330).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn local_nine_am_is_half_past_three_utc() {
        let instant = ist().to_absolute(date(2030, 1, 7), hm(9, 0)).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2030, 1, 7, 3, 30, 0).unwrap());

        let local = ist().to_local(instant);
        assert_eq!(local.date, date(2030, 1, 7));
        assert_eq!(local.time, hm(9, 0));
        assert_eq!(local.weekday, DayOfWeek::Monday);
    }

    #[test]
    fn late_utc_evening_belongs_to_next_local_day() {
        let instant = Utc.with_ymd_and_hms(2030, 1, 6, 20, 0, 0).unwrap();
        let local = ist().to_local(instant);
        assert_eq!(local.date, date(2030, 1, 7));
        assert_eq!(local.time, hm(1, 30));
    }

    #[test]
    fn day_bounds_cover_the_local_day() {
        let clock = ist();
        let noon = clock.to_absolute(date(2030, 1, 7), hm(12, 0)).unwrap();

        let start = clock.start_of_local_day(noon).unwrap();
        let end = clock.end_of_local_day(noon).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2030, 1, 6, 18, 30, 0).unwrap());
        assert_eq!(end + Duration::nanoseconds(1), Utc.with_ymd_and_hms(2030, 1, 7, 18, 30, 0).unwrap());
        assert_eq!(clock.to_local(end).date, date(2030, 1, 7));
    }

    #[test]
    fn parses_offset_and_local_instants() {
        let clock = ist();
        let explicit = clock.parse_instant("2030-01-07T03:35:00Z").unwrap();
        let local = clock.parse_instant("2030-01-07T09:05").unwrap();
        assert_eq!(explicit, local);
    }

    #[test]
    fn malformed_input_is_invalid_timestamp() {
        let clock = ist();
        assert_matches!(clock.parse_date("07/01/2030"), Err(BookingError::InvalidTimestamp(_)));
        assert_matches!(clock.parse_instant("soon"), Err(BookingError::InvalidTimestamp(_)));
        assert_matches!(ClinicClock::from_offset_minutes(24 * 60), Err(BookingError::InvalidTimestamp(_)));
    }
}
