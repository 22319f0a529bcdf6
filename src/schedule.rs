//! Weekly work schedule

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Shift, ShiftStatus};
use crate::repository::ShiftRepository;

/// Days shown, starting today
pub const DAYS_SHOWN: i64 = 7;

/// One scheduled entry on a day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftLine {
    pub day_off: bool,
    pub start: Option<String>,
    pub end: Option<String>,
    pub hours: f64,
    pub location: Option<String>,
    pub role: Option<String>,
}

impl ShiftLine {
    fn from_shift(shift: &Shift) -> Self {
        Self {
            day_off: shift.is_day_off(),
            start: shift.start_time.map(clock),
            end: shift.end_time.map(clock),
            hours: shift.duration().map_or(0.0, hours),
            location: shift.location.clone().filter(|l| !l.trim().is_empty()),
            role: shift.role.clone().filter(|r| !r.trim().is_empty()),
        }
    }

    /// "8 hours", "7.5 hours" or "Day Off"
    #[must_use]
    pub fn duration_label(&self) -> String {
        if self.day_off {
            return "Day Off".to_string();
        }
        if (self.hours - self.hours.round()).abs() < f64::EPSILON {
            format!("{} hours", self.hours.round())
        } else {
            format!("{:.1} hours", self.hours)
        }
    }
}

/// One row of the weekly view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleDay {
    pub date: NaiveDate,
    /// "Today" or the weekday abbreviation
    pub label: String,
    /// e.g. "Jan 15"
    pub date_label: String,
    pub status: ShiftStatus,
    pub shifts: Vec<ShiftLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSchedule {
    pub days: Vec<ScheduleDay>,
    pub total_hours: f64,
    /// Working shifts, days off excluded
    pub shift_count: usize,
}

fn clock(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}

#[allow(clippy::cast_precision_loss)]
fn hours(span: Duration) -> f64 {
    span.num_minutes() as f64 / 60.0
}

/// Lay out the seven days starting `today`
#[must_use]
pub fn week_view(shifts: &[Shift], today: NaiveDate) -> WeekSchedule {
    let days: Vec<ScheduleDay> = (0..DAYS_SHOWN)
        .map(|offset| {
            let date = today + Duration::days(offset);
            let label = if date == today {
                "Today".to_string()
            } else {
                date.weekday().to_string()
            };
            let mut lines: Vec<&Shift> = shifts.iter().filter(|s| s.shift_date == date).collect();
            lines.sort_by_key(|s| s.start_time);
            ScheduleDay {
                date,
                label,
                date_label: date.format("%b %-d").to_string(),
                status: if date == today { ShiftStatus::Today } else { ShiftStatus::Upcoming },
                shifts: lines.into_iter().map(ShiftLine::from_shift).collect(),
            }
        })
        .collect();

    let working = days.iter().flat_map(|d| &d.shifts).filter(|l| !l.day_off);
    let (shift_count, total_hours) = working.fold((0, 0.0), |(n, h), line| (n + 1, h + line.hours));
    WeekSchedule { days, total_hours, shift_count }
}

#[derive(Clone)]
pub struct ScheduleService {
    shifts: Arc<dyn ShiftRepository>,
}

impl ScheduleService {
    pub fn new(shifts: Arc<dyn ShiftRepository>) -> Self {
        Self { shifts }
    }

    pub async fn week(&self, profile: Uuid, today: NaiveDate) -> Result<WeekSchedule> {
        let until = today + Duration::days(DAYS_SHOWN - 1);
        let shifts = self.shifts.list_shifts(profile, today, until).await?;
        tracing::debug!(%profile, count = shifts.len(), "Loaded shifts");
        Ok(week_view(&shifts, today))
    }
}
