//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_integration_dispatcher;
mod in_memory_integration_repositories;
mod json_file_integration_store;
mod postgres_audit_chain_repository;
mod postgres_idempotency_repository;
mod postgres_integration_audit_repository;
mod redis_idempotency_repository;

pub use http_integration_dispatcher::{DispatcherConfig, HttpIntegrationDispatcher};
pub use in_memory_integration_repositories::{
    InMemoryAuditChainRepository, InMemoryIdempotencyRepository, InMemoryIntegrationAuditRepository,
    InMemoryIntegrationStore,
};
pub use json_file_integration_store::JsonFileIntegrationStore;
pub use postgres_audit_chain_repository::PostgresAuditChainRepository;
pub use postgres_idempotency_repository::PostgresIdempotencyRepository;
pub use postgres_integration_audit_repository::PostgresIntegrationAuditRepository;
pub use redis_idempotency_repository::RedisIdempotencyRepository;
