use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Common HTTP response envelope, carried from the teacher's wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_code: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error_with_code(message: String, error_code: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_code: Some(error_code),
            timestamp: Utc::now(),
        }
    }
}

/// User roles from the data model (§3): admin, coordinator, rbt,
/// client_family. Lives in `aba-common` so both `aba-auth` (JWT claims) and
/// `aba-database` (the persisted `User` row) agree on one representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Coordinator,
    Rbt,
    ClientFamily,
}

impl Role {
    pub fn can_administer_scheduling(self) -> bool {
        matches!(self, Role::Admin | Role::Coordinator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
            Role::Rbt => "rbt",
            Role::ClientFamily => "client_family",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "coordinator" => Ok(Role::Coordinator),
            "rbt" => Ok(Role::Rbt),
            "client_family" => Ok(Role::ClientFamily),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One failed ConstraintEngine rule (spec §4.4). Lives in `aba-common` rather
/// than the scheduling crate so `AppError::Invariant` can carry it without a
/// dependency cycle between the two crates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViolationType {
    Duration,
    BusinessHours,
    BusinessDay,
    NotInPast,
    TeamMembership,
    RbtConflict,
    ClientConflict,
    RbtAvailability,
    DailyCap,
    RestGap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintViolation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub description: String,
    pub suggested_resolution: Option<String>,
}

impl ConstraintViolation {
    pub fn new(violation_type: ViolationType, description: impl Into<String>) -> Self {
        Self {
            violation_type,
            description: description.into(),
            suggested_resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.suggested_resolution = Some(resolution.into());
        self
    }
}
