// libs/doctor-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// WEEKDAY
// ==============================================================================

/// Day of the week as the clinic's schedule tables store it, Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayOfWeek {
    #[serde(rename = "SUN", alias = "sunday", alias = "Sunday")]
    Sunday,
    #[serde(rename = "MON", alias = "monday", alias = "Monday")]
    Monday,
    #[serde(rename = "TUE", alias = "tuesday", alias = "Tuesday")]
    Tuesday,
    #[serde(rename = "WED", alias = "wednesday", alias = "Wednesday")]
    Wednesday,
    #[serde(rename = "THU", alias = "thursday", alias = "Thursday")]
    Thursday,
    #[serde(rename = "FRI", alias = "friday", alias = "Friday")]
    Friday,
    #[serde(rename = "SAT", alias = "saturday", alias = "Saturday")]
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    /// 0 = Sunday .. 6 = Saturday.
    pub fn index(self) -> u8 {
        match self {
            DayOfWeek::Sunday => 0,
            DayOfWeek::Monday => 1,
            DayOfWeek::Tuesday => 2,
            DayOfWeek::Wednesday => 3,
            DayOfWeek::Thursday => 4,
            DayOfWeek::Friday => 5,
            DayOfWeek::Saturday => 6,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn code(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "SUN",
            DayOfWeek::Monday => "MON",
            DayOfWeek::Tuesday => "TUE",
            DayOfWeek::Wednesday => "WED",
            DayOfWeek::Thursday => "THU",
            DayOfWeek::Friday => "FRI",
            DayOfWeek::Saturday => "SAT",
        }
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, DayOfWeek::Saturday | DayOfWeek::Sunday)
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => DayOfWeek::Sunday,
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DayOfWeek {
    type Err = ScheduleError;

    /// Accepts "MON", "mon", "monday" or the numeric index "1".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_uppercase();
        if let Ok(index) = needle.parse::<u8>() {
            return Self::from_index(index)
                .ok_or_else(|| ScheduleError::Validation(format!("Unknown weekday: {}", s)));
        }
        Self::ALL
            .into_iter()
            .find(|day| day_name_matches(*day, &needle))
            .ok_or_else(|| ScheduleError::Validation(format!("Unknown weekday: {}", s)))
    }
}

fn day_name_matches(day: DayOfWeek, upper: &str) -> bool {
    let full = format!("{:?}", day).to_ascii_uppercase();
    upper == day.code() || upper == full
}

// ==============================================================================
// SCHEDULE CONFIGURATION
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyScheduleEntry {
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub is_working: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorBookingProfile {
    pub doctor_id: Uuid,
    pub appointment_duration_minutes: i32,
    pub max_patients_per_day: Option<i32>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A doctor's booking profile together with exactly one entry per weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub profile: DoctorBookingProfile,
    pub weekly: Vec<WeeklyScheduleEntry>,
}

/// Defaults applied when a user is promoted to doctor.
#[derive(Debug, Clone)]
pub struct ScheduleTemplate {
    pub appointment_duration_minutes: i32,
    pub max_patients_per_day: i32,
    pub working_start: NaiveTime,
    pub working_end: NaiveTime,
}

impl Default for ScheduleTemplate {
    fn default() -> Self {
        Self {
            appointment_duration_minutes: 15,
            max_patients_per_day: 20,
            working_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            working_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl DoctorSchedule {
    /// Unpublished profile plus Mon-Fri working days; weekends off.
    pub fn from_template(doctor_id: Uuid, template: &ScheduleTemplate, now: DateTime<Utc>) -> Self {
        let profile = DoctorBookingProfile {
            doctor_id,
            appointment_duration_minutes: template.appointment_duration_minutes,
            max_patients_per_day: Some(template.max_patients_per_day),
            is_published: false,
            created_at: now,
            updated_at: now,
        };

        let weekly = DayOfWeek::ALL
            .into_iter()
            .map(|day| WeeklyScheduleEntry {
                doctor_id,
                day_of_week: day,
                is_working: !day.is_weekend(),
                start_time: template.working_start,
                end_time: template.working_end,
                updated_at: now,
            })
            .collect();

        Self { profile, weekly }
    }

    pub fn entry(&self, day: DayOfWeek) -> Option<&WeeklyScheduleEntry> {
        self.weekly.iter().find(|entry| entry.day_of_week == day)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWeeklyEntryRequest {
    pub is_working: Option<bool>,
    /// Wall-clock "HH:MM" or "HH:MM:SS" in clinic time.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookingProfileRequest {
    pub appointment_duration_minutes: Option<i32>,
    pub max_patients_per_day: Option<i32>,
    pub is_published: Option<bool>,
}

/// Parses a clinic wall-clock time, with or without seconds.
pub fn parse_wall_clock(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ScheduleError::Validation(format!("Invalid wall-clock time: {}", raw)))
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Doctor {0} has no booking profile")]
    DoctorNotConfigured(Uuid),

    #[error("Doctor {0} already has a booking profile")]
    AlreadyConfigured(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schedule storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_parsing_accepts_codes_names_and_indexes() {
        assert_eq!("MON".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!("saturday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Saturday);
        assert_eq!("0".parse::<DayOfWeek>().unwrap(), DayOfWeek::Sunday);
        assert!("7".parse::<DayOfWeek>().is_err());
        assert!("Mond".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn chrono_weekdays_map_sunday_first() {
        assert_eq!(DayOfWeek::from(Weekday::Sun).index(), 0);
        assert_eq!(DayOfWeek::from(Weekday::Sat).index(), 6);
    }

    #[test]
    fn template_creates_one_entry_per_weekday() {
        let schedule = DoctorSchedule::from_template(Uuid::new_v4(), &ScheduleTemplate::default(), Utc::now());
        assert_eq!(schedule.weekly.len(), 7);
        assert!(!schedule.profile.is_published);
        assert!(schedule.entry(DayOfWeek::Monday).unwrap().is_working);
        assert!(!schedule.entry(DayOfWeek::Sunday).unwrap().is_working);
    }

    #[test]
    fn wall_clock_accepts_optional_seconds() {
        assert_eq!(parse_wall_clock("09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(parse_wall_clock("17:00:00").unwrap(), NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert!(parse_wall_clock("25:00").is_err());
    }
}
