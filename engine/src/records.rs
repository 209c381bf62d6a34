//! Flat record types carried in backups.
//!
//! Each struct mirrors one entity of the scheduling application as it appears
//! on the wire: camelCase field names, ISO-8601 dates and times, and
//! SCREAMING_SNAKE_CASE enumeration names. Optional fields may be omitted or
//! null, and unknown fields are ignored when decoding.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::RecordType;

/// Behaviour shared by every record that can travel through a backup.
pub trait BackupRecord:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// The category this record belongs to.
    const RECORD_TYPE: RecordType;

    /// Identity assigned by the owning store, if the record has one.
    ///
    /// Zero and negative ids mean "new record" and are reported as `None`.
    fn identity(&self) -> Option<i64>;

    /// Store a freshly assigned identity on the record.
    fn assign_identity(&mut self, id: i64);
}

fn stored_id(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl BackupRecord for Task {
    const RECORD_TYPE: RecordType = RecordType::Tasks;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub semester_id: i64,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// ISO weekday, Monday = 1
    pub day_of_week: u8,
    pub start_period: u32,
    pub end_period: u32,
    #[serde(default)]
    pub weeks: Vec<u32>,
    #[serde(default)]
    pub color: Option<String>,
}

impl BackupRecord for Course {
    const RECORD_TYPE: RecordType = RecordType::Courses;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl BackupRecord for Event {
    const RECORD_TYPE: RecordType = RecordType::Events;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleKind {
    Daily,
    Weekly,
    Monthly,
}

fn one() -> u32 {
    1
}

/// Repetition rule of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineCycle {
    #[serde(rename = "type")]
    pub kind: CycleKind,
    #[serde(default = "one")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub cycle: RoutineCycle,
    #[serde(default)]
    pub reminder_time: Option<NaiveTime>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl BackupRecord for Routine {
    const RECORD_TYPE: RecordType = RecordType::Routines;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub billing_cycle: BillingCycle,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub reminder_days_before: Option<u32>,
}

impl BackupRecord for Subscription {
    const RECORD_TYPE: RecordType = RecordType::Subscriptions;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    #[serde(default)]
    pub id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub duration_minutes: u32,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub completed: bool,
}

impl BackupRecord for TimerSession {
    const RECORD_TYPE: RecordType = RecordType::TimerSessions;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Timetable period layout of a semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodSettings {
    pub periods_per_day: u32,
    pub period_minutes: u32,
    pub break_minutes: u32,
    pub first_period_start: NaiveTime,
}

impl Default for PeriodSettings {
    fn default() -> Self {
        PeriodSettings {
            periods_per_day: 10,
            period_minutes: 45,
            break_minutes: 10,
            first_period_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
        }
    }
}

/// Timetable display options of a semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    pub show_weekends: bool,
    pub show_teacher: bool,
    pub show_location: bool,
    pub show_non_current_weeks: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            show_weekends: false,
            show_teacher: true,
            show_location: true,
            show_non_current_weeks: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_weeks: u32,
    #[serde(default)]
    pub period_settings: PeriodSettings,
    #[serde(default)]
    pub display_settings: DisplaySettings,
    #[serde(default)]
    pub is_current: bool,
}

/// Length of the semester created on first run.
pub const DEFAULT_SEMESTER_WEEKS: u32 = 20;

impl Semester {
    /// The semester created when the application has none yet.
    pub fn default_starting(start_date: NaiveDate) -> Self {
        Semester {
            id: None,
            name: "Default Semester".to_string(),
            start_date,
            end_date: start_date + Duration::weeks(i64::from(DEFAULT_SEMESTER_WEEKS)),
            total_weeks: DEFAULT_SEMESTER_WEEKS,
            period_settings: PeriodSettings::default(),
            display_settings: DisplaySettings::default(),
            is_current: true,
        }
    }
}

impl BackupRecord for Semester {
    const RECORD_TYPE: RecordType = RecordType::Semesters;

    fn identity(&self) -> Option<i64> {
        stored_id(self.id)
    }

    fn assign_identity(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// A single key/value application preference.
///
/// Preferences are keyed by name and carry no store identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: serde_json::Value,
}

impl BackupRecord for Preference {
    const RECORD_TYPE: RecordType = RecordType::Preferences;

    fn identity(&self) -> Option<i64> {
        None
    }

    fn assign_identity(&mut self, _id: i64) {}
}

/// Run `$body` with `$record` bound to the record struct of a runtime
/// `RecordType`.
macro_rules! with_record {
    ($ty:expr, |$record:ident| $body:expr) => {
        match $ty {
            $crate::model::RecordType::Tasks => {
                type $record = $crate::records::Task;
                $body
            }
            $crate::model::RecordType::Courses => {
                type $record = $crate::records::Course;
                $body
            }
            $crate::model::RecordType::Events => {
                type $record = $crate::records::Event;
                $body
            }
            $crate::model::RecordType::Routines => {
                type $record = $crate::records::Routine;
                $body
            }
            $crate::model::RecordType::Subscriptions => {
                type $record = $crate::records::Subscription;
                $body
            }
            $crate::model::RecordType::TimerSessions => {
                type $record = $crate::records::TimerSession;
                $body
            }
            $crate::model::RecordType::Semesters => {
                type $record = $crate::records::Semester;
                $body
            }
            $crate::model::RecordType::Preferences => {
                type $record = $crate::records::Preference;
                $body
            }
        }
    };
}

pub(crate) use with_record;
