//! Saga state store: shared-cluster `sagaId -> SagaState`, every transition
//! a CAS `replace` so concurrent writers from different services never
//! silently clobber each other's steps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridflow_grid::{Grid, InMemoryKeyedMap, KeyedMap, MapSpace};

use crate::error::SagaError;

/// Saga lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Started,
    InProgress,
    Completed,
    Compensating,
    Compensated,
    Failed,
    TimedOut,
}

impl SagaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed | SagaStatus::TimedOut)
    }
}

/// Outcome recorded against one step, either forward or compensating.
/// Immutable once written: a step is recorded once and never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStepRecord {
    pub step_number: u32,
    pub step_name: String,
    pub service: String,
    pub status: StepRecordStatus,
    pub timestamp: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRecordStatus {
    Completed,
    Failed,
    Compensated,
    CompensationFailed,
}

/// One saga instance's durable state. Every
/// transition returns a new value; nothing is ever mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaState {
    pub saga_id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub step_count: u32,
    pub completed_steps: u32,
    /// Indexed by `findByCorrelationId`, since choreographed sagas
    /// correlate purely by business id.
    pub correlation_id: Uuid,
    pub deadline: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub steps: Vec<SagaStepRecord>,
}

impl SagaState {
    fn touch(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }
}

/// Shared-cluster saga state store.
pub struct SagaStateStore {
    map: Arc<InMemoryKeyedMap<String, SagaState>>,
}

const MAX_CAS_ATTEMPTS: u32 = 8;

impl SagaStateStore {
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self { map: grid.keyed_map(MapSpace::Shared, space_name) }
    }

    pub fn start_saga(
        &self,
        saga_id: impl Into<String>,
        saga_type: impl Into<String>,
        step_count: u32,
        correlation_id: Uuid,
        deadline: Duration,
    ) -> Result<SagaState, SagaError> {
        let saga_id = saga_id.into();
        let now = Utc::now();
        let state = SagaState {
            saga_id: saga_id.clone(),
            saga_type: saga_type.into(),
            status: SagaStatus::Started,
            step_count,
            completed_steps: 0,
            correlation_id,
            deadline: now + chrono::Duration::from_std(deadline).unwrap_or(chrono::Duration::seconds(30)),
            started_at: now,
            updated_at: now,
            steps: Vec::new(),
        };
        if self.map.put_if_absent(saga_id.clone(), state.clone()) { Ok(state) } else { Err(SagaError::AlreadyExists(saga_id)) }
    }

    pub fn record_step_completed(&self, saga_id: &str, step_number: u32, step_name: &str, service: &str) -> Result<SagaState, SagaError> {
        self.update(saga_id, |state| {
            let mut state = state.clone();
            state.steps.push(SagaStepRecord {
                step_number,
                step_name: step_name.to_string(),
                service: service.to_string(),
                status: StepRecordStatus::Completed,
                timestamp: Utc::now(),
                failure_reason: None,
            });
            state.completed_steps += 1;
            state.status = if state.completed_steps >= state.step_count { SagaStatus::Completed } else { SagaStatus::InProgress };
            state.touch()
        })
    }

    pub fn record_step_failed(&self, saga_id: &str, step_number: u32, step_name: &str, service: &str, reason: &str) -> Result<SagaState, SagaError> {
        self.update(saga_id, |state| {
            let mut state = state.clone();
            state.steps.push(SagaStepRecord {
                step_number,
                step_name: step_name.to_string(),
                service: service.to_string(),
                status: StepRecordStatus::Failed,
                timestamp: Utc::now(),
                failure_reason: Some(reason.to_string()),
            });
            state.touch()
        })
    }

    pub fn record_compensation_started(&self, saga_id: &str) -> Result<SagaState, SagaError> {
        self.update(saga_id, |state| {
            let mut state = state.clone();
            state.status = SagaStatus::Compensating;
            state.touch()
        })
    }

    pub fn record_compensation_step(&self, saga_id: &str, step_number: u32, step_name: &str, service: &str, succeeded: bool, reason: Option<&str>) -> Result<SagaState, SagaError> {
        self.update(saga_id, |state| {
            let mut state = state.clone();
            state.steps.push(SagaStepRecord {
                step_number,
                step_name: step_name.to_string(),
                service: service.to_string(),
                status: if succeeded { StepRecordStatus::Compensated } else { StepRecordStatus::CompensationFailed },
                timestamp: Utc::now(),
                failure_reason: reason.map(|r| r.to_string()),
            });
            state.touch()
        })
    }

    pub fn complete_saga(&self, saga_id: &str, status: SagaStatus) -> Result<SagaState, SagaError> {
        self.update(saga_id, move |state| {
            let mut state = state.clone();
            state.status = status;
            state.touch()
        })
    }

    pub fn get_saga_state(&self, saga_id: &str) -> Option<SagaState> {
        self.map.get(&saga_id.to_string())
    }

    pub fn find_by_status(&self, status: SagaStatus) -> Vec<SagaState> {
        gridflow_grid::query(self.map.as_ref(), move |s: &SagaState| s.status == status, |s: &SagaState| s.started_at, 0, usize::MAX).items
    }

    pub fn find_by_correlation_id(&self, correlation_id: Uuid) -> Vec<SagaState> {
        gridflow_grid::query(self.map.as_ref(), move |s: &SagaState| s.correlation_id == correlation_id, |s: &SagaState| s.started_at, 0, usize::MAX).items
    }

    pub fn find_by_type(&self, saga_type: &str) -> Vec<SagaState> {
        let saga_type = saga_type.to_string();
        gridflow_grid::query(self.map.as_ref(), move |s: &SagaState| s.saga_type == saga_type, |s: &SagaState| s.started_at, 0, usize::MAX).items
    }

    /// Sagas whose deadline has already passed and whose status is not yet
    /// terminal.
    pub fn find_by_deadline(&self, before: DateTime<Utc>) -> Vec<SagaState> {
        gridflow_grid::query(self.map.as_ref(), move |s: &SagaState| s.deadline < before && !s.status.is_terminal(), |s: &SagaState| s.deadline, 0, usize::MAX).items
    }

    /// Retry-on-conflict CAS update. A transition applied to a saga already
    /// in a terminal status is a no-op — `current` is
    /// returned unchanged rather than handed to `f`.
    fn update(&self, saga_id: &str, f: impl Fn(&SagaState) -> SagaState) -> Result<SagaState, SagaError> {
        let saga_id_owned = saga_id.to_string();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.map.get(&saga_id_owned).ok_or_else(|| SagaError::NotFound(saga_id_owned.clone()))?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            let next = f(&current);
            match self.map.replace(&saga_id_owned, &current, next.clone()) {
                Ok(()) => return Ok(next),
                Err(_) => continue,
            }
        }
        Err(SagaError::Conflict(saga_id_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SagaStateStore {
        SagaStateStore::new(&Grid::new(), "saga-state")
    }

    #[test]
    fn start_saga_then_record_steps_auto_completes() {
        let store = store();
        store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

        store.record_step_completed("saga-1", 0, "ReserveStock", "inventory").unwrap();
        let state = store.record_step_completed("saga-1", 1, "ProcessPayment", "payment").unwrap();

        assert_eq!(state.status, SagaStatus::Completed);
        assert_eq!(state.completed_steps, 2);
    }

    #[test]
    fn starting_twice_is_rejected() {
        let store = store();
        store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30)).unwrap();
        let result = store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30));
        assert!(matches!(result, Err(SagaError::AlreadyExists(_))));
    }

    #[test]
    fn find_by_deadline_only_returns_expired_non_terminal_sagas() {
        let store = store();
        store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let expired = store.find_by_deadline(Utc::now());
        assert_eq!(expired.len(), 1);

        store.record_step_completed("saga-1", 0, "ReserveStock", "inventory").unwrap();
        assert!(store.find_by_deadline(Utc::now()).is_empty());
    }

    #[test]
    fn find_by_status_and_type_filter_correctly() {
        let store = store();
        store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();
        store.start_saga("saga-2", "RefundFlow", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

        assert_eq!(store.find_by_status(SagaStatus::Started).len(), 2);
        assert_eq!(store.find_by_type("OrderFulfillment").len(), 1);
    }

    #[test]
    fn transitions_on_a_terminal_saga_are_no_ops() {
        let store = store();
        store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();
        store.record_step_completed("saga-1", 0, "ReserveStock", "inventory").unwrap();

        let terminal = store.get_saga_state("saga-1").unwrap();
        assert_eq!(terminal.status, SagaStatus::Completed);

        let after_failed = store.record_step_failed("saga-1", 1, "ProcessPayment", "payment", "boom").unwrap();
        assert_eq!(after_failed, terminal);

        let after_complete = store.complete_saga("saga-1", SagaStatus::Failed).unwrap();
        assert_eq!(after_complete.status, SagaStatus::Completed);
        assert_eq!(after_complete.steps.len(), 1);
    }
}
