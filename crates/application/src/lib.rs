//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_chain_service;
mod audit_recorder;
mod config;
mod enterprise_autopilot_service;
mod idempotency_service;
mod integration_ports;
mod integration_queue_service;

#[cfg(test)]
mod test_support;

pub use audit_chain_service::AuditChainService;
pub use audit_recorder::AuditRecorder;
pub use config::IntegrationConfig;
pub use enterprise_autopilot_service::{
    AutopilotRequest, AutopilotResponse, EnterpriseAutopilotService,
};
pub use idempotency_service::{IdempotencyScope, IdempotencyService, SubmissionGuard};
pub use integration_ports::{
    AuditChainRepository, DispatchOutcome, EndpointCall, EndpointMethod, EndpointResponse,
    FlushResult, FlushWindowCounts, HealthSnapshot, HealthStatus, IdempotencyRepository,
    IntegrationAuditRepository, IntegrationDispatcher, IntegrationStore, QueueOverview,
    SubmissionReceipt, SubmitEventInput,
};
pub use integration_queue_service::IntegrationQueueService;
