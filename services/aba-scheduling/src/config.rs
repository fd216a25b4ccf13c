use aba_common::{DatabaseConfig, JwtConfig, RedisConfig, ServerConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the scheduling core (spec §6, "Configurable
/// policy (enumerated)"). Built the same env-var-with-default style as the
/// teacher's `MeetingsConfig::from_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub scheduling: SchedulingPolicyConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BusinessHoursConfig {
    /// Minutes since local midnight.
    pub start_minutes: u32,
    pub end_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentStrategyConfig {
    pub prioritize_team_members: bool,
    pub maintain_continuity: bool,
    pub allow_time_changes: bool,
    pub max_days_to_reschedule: u32,
    pub notification_lead_time_hours: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    pub schedule_minutes: u64,
    pub availability_minutes: u64,
    pub rbt_daily_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingPolicyConfig {
    pub business_hours: BusinessHoursConfig,
    /// Valid weekdays for a business day, ISO 8601 numbering (1 = Monday).
    pub valid_days: Vec<i16>,
    /// Fixed at 180 (3h). Informational only per spec §9's Open Questions
    /// resolution — the authoritative check is `ConstraintEngine`'s
    /// `session_duration_minutes` constant, not a caller-supplied value.
    pub session_duration_minutes: i64,
    pub max_sessions_per_day: u32,
    pub min_break_between_sessions_minutes: i64,
    pub continuity_recency_window_days: i64,
    pub reassignment: ReassignmentStrategyConfig,
    pub cache_ttl: CacheTtlConfig,
}

impl SchedulingConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            server: ServerConfig {
                host: std::env::var("SCHEDULING_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("SCHEDULING_PORT")
                    .unwrap_or_else(|_| "8004".to_string())
                    .parse()
                    .unwrap_or(8004),
                cors_origins: std::env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            database: DatabaseConfig {
                host: std::env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: std::env::var("DATABASE_PORT")
                    .unwrap_or_else(|_| "5432".to_string())
                    .parse()
                    .unwrap_or(5432),
                username: std::env::var("DATABASE_USERNAME")
                    .unwrap_or_else(|_| "aba_scheduling_user".to_string()),
                password: std::env::var("DATABASE_PASSWORD")
                    .unwrap_or_else(|_| "aba_scheduling_password".to_string()),
                database: std::env::var("DATABASE_NAME")
                    .unwrap_or_else(|_| "aba_scheduling".to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            redis: RedisConfig {
                host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: std::env::var("REDIS_PORT")
                    .unwrap_or_else(|_| "6379".to_string())
                    .parse()
                    .unwrap_or(6379),
                password: std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
                database: std::env::var("REDIS_DATABASE")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "dev-secret-key-change-in-production".to_string()),
                expiration_hours: std::env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
                issuer: std::env::var("JWT_ISSUER")
                    .unwrap_or_else(|_| "aba-scheduling".to_string()),
            },
            scheduling: SchedulingPolicyConfig {
                business_hours: BusinessHoursConfig {
                    start_minutes: std::env::var("SCHEDULING_BUSINESS_START_MINUTES")
                        .unwrap_or_else(|_| "540".to_string()) // 09:00
                        .parse()
                        .unwrap_or(540),
                    end_minutes: std::env::var("SCHEDULING_BUSINESS_END_MINUTES")
                        .unwrap_or_else(|_| "1140".to_string()) // 19:00
                        .parse()
                        .unwrap_or(1140),
                },
                valid_days: std::env::var("SCHEDULING_VALID_DAYS")
                    .unwrap_or_else(|_| "1,2,3,4,5".to_string())
                    .split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect(),
                session_duration_minutes: std::env::var("SCHEDULING_SESSION_DURATION_MINUTES")
                    .unwrap_or_else(|_| "180".to_string())
                    .parse()
                    .unwrap_or(180),
                max_sessions_per_day: std::env::var("SCHEDULING_MAX_SESSIONS_PER_DAY")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                min_break_between_sessions_minutes: std::env::var("SCHEDULING_MIN_BREAK_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                continuity_recency_window_days: std::env::var("SCHEDULING_RECENCY_WINDOW_DAYS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                reassignment: ReassignmentStrategyConfig {
                    prioritize_team_members: std::env::var("SCHEDULING_PRIORITIZE_TEAM_MEMBERS")
                        .unwrap_or_else(|_| "true".to_string())
                        .parse()
                        .unwrap_or(true),
                    maintain_continuity: std::env::var("SCHEDULING_MAINTAIN_CONTINUITY")
                        .unwrap_or_else(|_| "true".to_string())
                        .parse()
                        .unwrap_or(true),
                    allow_time_changes: std::env::var("SCHEDULING_ALLOW_TIME_CHANGES")
                        .unwrap_or_else(|_| "false".to_string())
                        .parse()
                        .unwrap_or(false),
                    max_days_to_reschedule: std::env::var("SCHEDULING_MAX_DAYS_TO_RESCHEDULE")
                        .unwrap_or_else(|_| "7".to_string())
                        .parse()
                        .unwrap_or(7),
                    notification_lead_time_hours: std::env::var(
                        "SCHEDULING_NOTIFICATION_LEAD_TIME_HOURS",
                    )
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                },
                cache_ttl: CacheTtlConfig {
                    schedule_minutes: std::env::var("SCHEDULING_CACHE_SCHEDULE_MINUTES")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                    availability_minutes: std::env::var("SCHEDULING_CACHE_AVAILABILITY_MINUTES")
                        .unwrap_or_else(|_| "5".to_string())
                        .parse()
                        .unwrap_or(5),
                    rbt_daily_minutes: std::env::var("SCHEDULING_CACHE_RBT_DAILY_MINUTES")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                },
            },
        })
    }
}
