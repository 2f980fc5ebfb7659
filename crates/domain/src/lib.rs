//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod bounded;
mod enterprise;
mod integration;
mod store_state;

pub use audit::{
    AuditEntry, CHAIN_GENESIS_HASH, ChainEntry, ChainVerification, NewAuditEntry, canonical_json,
    chain_hash, content_digest, normalize_chain_timestamp, verify_chain,
};
pub use bounded::push_bounded;
pub use enterprise::{
    AutopilotResult, AutopilotSettings, AutopilotStage, DEFAULT_APPROVAL_ROUTE,
    EnterpriseStatusSnapshot, ErpModule, StageResult, StageSummary,
};
pub use integration::{
    IntegrationRecord, NewIntegrationRecord, RecordId, RecordStatus, Transport,
};
pub use store_state::{IntegrationStoreState, StoreCapacity};
