//! Saga coordination: choreographed event-driven sagas, orchestrated
//! state-machine sagas, and the shared state store and compensation
//! registry both styles draw on.

mod choreographed;
mod compensation;
mod error;
mod orchestrated;
mod state_store;

pub use choreographed::{ChoreographedSagaRuntime, CompensationConfig, CompensationHandler, ForwardStepConfig, StepHandler};
pub use compensation::{CompensationRegistration, CompensationRegistry};
pub use error::SagaError;
pub use orchestrated::{
    DefinitionRegistry, Orchestrator, SagaAction, SagaCompensation, SagaContext, SagaDefinition, SagaDefinitionBuilder, SagaStep,
    SagaStepResult, TimeoutScanner, TimeoutScannerHandle,
};
pub use state_store::{SagaState, SagaStateStore, SagaStatus, SagaStepRecord, StepRecordStatus};
