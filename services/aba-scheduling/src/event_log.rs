use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use aba_common::{AppError, Clock};
use aba_database::{EventLogFilter, EventLogRepository, EventType, NewScheduleEvent, ScheduleEvent};

/// Append-only history of scheduling actions (spec §4.11). A thin service
/// layer over the `EventLogRepository` port: it only adds the caller-facing
/// convenience of generating the idempotency id and stamping the clock, the
/// actual persistence and duplicate-rejection live in `aba-database`.
#[derive(Clone)]
pub struct EventLog {
    repository: Arc<dyn EventLogRepository>,
    clock: Arc<dyn Clock>,
}

impl EventLog {
    pub fn new(repository: Arc<dyn EventLogRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        event_type: EventType,
        session_id: Option<Uuid>,
        rbt_id: Option<Uuid>,
        client_id: Option<Uuid>,
        old_values: Option<Value>,
        new_values: Option<Value>,
        reason: Option<String>,
        created_by: Uuid,
    ) -> Result<ScheduleEvent, AppError> {
        let event = NewScheduleEvent {
            event_id: Uuid::new_v4(),
            event_type,
            session_id,
            rbt_id,
            client_id,
            old_values,
            new_values,
            reason,
            metadata: None,
            created_by,
            created_at: self.clock.now(),
        };
        self.repository.append(event).await
    }

    pub async fn query(&self, filter: EventLogFilter) -> Result<Vec<ScheduleEvent>, AppError> {
        self.repository.query(filter).await
    }
}
