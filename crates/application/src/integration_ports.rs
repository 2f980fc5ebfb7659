mod audit;
mod dispatcher;
mod idempotency;
mod reports;
mod store;

pub use audit::{AuditChainRepository, IntegrationAuditRepository};
pub use dispatcher::{
    DispatchOutcome, EndpointCall, EndpointMethod, EndpointResponse, IntegrationDispatcher,
};
pub use idempotency::IdempotencyRepository;
pub use reports::{
    FlushResult, FlushWindowCounts, HealthSnapshot, HealthStatus, QueueOverview,
    SubmissionReceipt, SubmitEventInput,
};
pub use store::IntegrationStore;
