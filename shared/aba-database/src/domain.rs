use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use aba_common::{AppError, Role};

use crate::models::{
    AvailabilitySlotRow, ClientProfileRow, RbtProfileRow, ScheduleEventRow, SessionRow, TeamRow,
    UserRow,
};

/// A User joined with its RBT specialization (spec §3). Built by the
/// repository layer from a `UserRow` + `RbtProfileRow` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rbt {
    pub user_id: Uuid,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub active: bool,
    pub license_number: String,
    pub qualifications: Vec<String>,
    pub hourly_rate_cents: i64,
    pub hire_date: DateTime<Utc>,
    pub termination_date: Option<DateTime<Utc>>,
}

impl Rbt {
    pub fn from_rows(user: UserRow, profile: RbtProfileRow) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            given_name: user.given_name,
            family_name: user.family_name,
            active: user.active && profile.termination_date.is_none(),
            license_number: profile.license_number,
            qualifications: profile.qualifications,
            hourly_rate_cents: profile.hourly_rate_cents,
            hire_date: profile.hire_date,
            termination_date: profile.termination_date,
        }
    }

    pub fn has_qualifications(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|q| !self.qualifications.contains(q))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub user_id: Uuid,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub active: bool,
    pub date_of_birth: DateTime<Utc>,
    pub guardian_contact: String,
    pub special_needs: Vec<String>,
    pub enrollment_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
}

impl Client {
    pub fn from_rows(user: UserRow, profile: ClientProfileRow) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            given_name: user.given_name,
            family_name: user.family_name,
            active: user.active && profile.discharge_date.is_none(),
            date_of_birth: profile.date_of_birth,
            guardian_contact: profile.guardian_contact,
            special_needs: profile.special_needs,
            enrollment_date: profile.enrollment_date,
            discharge_date: profile.discharge_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_id: Uuid,
    pub client_id: Uuid,
    pub rbt_ids: Vec<Uuid>,
    pub primary_rbt_id: Uuid,
    pub effective_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn is_member(&self, rbt_id: Uuid) -> bool {
        self.rbt_ids.contains(&rbt_id)
    }
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Self {
            team_id: row.team_id,
            client_id: row.client_id,
            rbt_ids: row.rbt_ids,
            primary_rbt_id: row.primary_rbt_id,
            effective_date: row.effective_date,
            end_date: row.end_date,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekdaySlot {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub slot_id: Uuid,
    pub rbt_id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurring: bool,
    pub effective_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<AvailabilitySlotRow> for AvailabilitySlot {
    fn from(row: AvailabilitySlotRow) -> Self {
        Self {
            slot_id: row.slot_id,
            rbt_id: row.rbt_id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            recurring: row.recurring,
            effective_date: row.effective_date,
            end_date: row.end_date,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn is_cancelled_or_no_show(self) -> bool {
        matches!(self, SessionStatus::Cancelled | SessionStatus::NoShow)
    }

    pub fn holds_calendar_slot(self) -> bool {
        !self.is_cancelled_or_no_show()
    }

    /// Cancelled, no-show, or completed: a session with nothing left to change.
    pub fn is_terminal(self) -> bool {
        self.is_cancelled_or_no_show() || matches!(self, SessionStatus::Completed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoShow => "no_show",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "confirmed" => Ok(SessionStatus::Confirmed),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "no_show" => Ok(SessionStatus::NoShow),
            other => Err(AppError::Internal(format!("unknown session status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub client_id: Uuid,
    pub rbt_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub location: String,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: row.session_id,
            client_id: row.client_id,
            rbt_id: row.rbt_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse()?,
            location: row.location,
            notes: row.notes,
            cancellation_reason: row.cancellation_reason,
            completion_notes: row.completion_notes,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A partial update applied to an existing session; `None` fields are left
/// untouched, mirroring the `docpat` appointment service's dynamic
/// `UPDATE ... SET` builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub rbt_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub updated_by: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    SessionCreated,
    SessionCancelled,
    SessionRescheduled,
    RbtUnavailable,
    TeamCreated,
    TeamUpdated,
    TeamEnded,
    RbtAdded,
    RbtRemoved,
    PrimaryChanged,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::SessionCreated => "session_created",
            EventType::SessionCancelled => "session_cancelled",
            EventType::SessionRescheduled => "session_rescheduled",
            EventType::RbtUnavailable => "rbt_unavailable",
            EventType::TeamCreated => "team_created",
            EventType::TeamUpdated => "team_updated",
            EventType::TeamEnded => "team_ended",
            EventType::RbtAdded => "rbt_added",
            EventType::RbtRemoved => "rbt_removed",
            EventType::PrimaryChanged => "primary_changed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_created" => Ok(EventType::SessionCreated),
            "session_cancelled" => Ok(EventType::SessionCancelled),
            "session_rescheduled" => Ok(EventType::SessionRescheduled),
            "rbt_unavailable" => Ok(EventType::RbtUnavailable),
            "team_created" => Ok(EventType::TeamCreated),
            "team_updated" => Ok(EventType::TeamUpdated),
            "team_ended" => Ok(EventType::TeamEnded),
            "rbt_added" => Ok(EventType::RbtAdded),
            "rbt_removed" => Ok(EventType::RbtRemoved),
            "primary_changed" => Ok(EventType::PrimaryChanged),
            other => Err(AppError::Internal(format!("unknown event type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub session_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ScheduleEventRow> for ScheduleEvent {
    type Error = AppError;

    fn try_from(row: ScheduleEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: row.event_id,
            event_type: row.event_type.parse()?,
            session_id: row.session_id,
            rbt_id: row.rbt_id,
            client_id: row.client_id,
            old_values: row.old_values,
            new_values: row.new_values,
            reason: row.reason,
            metadata: row.metadata,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// A new event to append; `event_id` is caller-supplied so `EventLog::append`
/// can reject duplicates idempotently (spec §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduleEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub session_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EventLogFilter {
    pub event_type: Option<EventType>,
    pub session_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Marker the teacher's DTOs never needed: `aba-auth::Role` re-exported so
/// callers that only pulled in `aba-database` can still name a role without
/// an extra dependency edge.
pub type UserRole = Role;
