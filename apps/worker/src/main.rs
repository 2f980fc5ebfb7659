//! Procura integration worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use procura_application::{
    AuditChainRepository, AuditChainService, AuditRecorder, IdempotencyRepository,
    IdempotencyService, IntegrationAuditRepository, IntegrationConfig, IntegrationQueueService,
};
use procura_core::{AppError, AppResult};
use procura_domain::StoreCapacity;
use procura_infrastructure::{
    DispatcherConfig, HttpIntegrationDispatcher, InMemoryAuditChainRepository,
    InMemoryIdempotencyRepository, InMemoryIntegrationAuditRepository, JsonFileIntegrationStore,
    PostgresAuditChainRepository, PostgresIdempotencyRepository,
    PostgresIntegrationAuditRepository, RedisIdempotencyRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct WorkerConfig {
    store_file: PathBuf,
    target_webhook_url: Option<String>,
    target_timeout_secs: u64,
    endpoint_timeout_secs: u64,
    max_attempts: u32,
    simulation_mode: bool,
    capacity: StoreCapacity,
    stale_seconds: i64,
    flush_limit: usize,
    flush_interval_ms: u64,
    database_url: Option<String>,
    redis_url: Option<String>,
    idempotency_ttl_seconds: u32,
}

struct AuditAdapters {
    audit: Arc<dyn IntegrationAuditRepository>,
    chain: Arc<dyn AuditChainRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let adapters = build_audit_adapters(&config).await?;
    let chain_service = AuditChainService::new(adapters.chain);
    let queue_service = build_queue_service(&config, adapters.audit, adapters.idempotency)?;

    info!(
        store_file = %config.store_file.display(),
        target_configured = config.target_webhook_url.is_some(),
        max_attempts = config.max_attempts,
        flush_limit = config.flush_limit,
        flush_interval_ms = config.flush_interval_ms,
        simulation_mode = config.simulation_mode,
        "procura-worker started"
    );

    match chain_service.verify().await {
        Ok(verification) => info!(
            valid = verification.valid,
            entries_checked = verification.entries_checked,
            "immutable audit chain verified"
        ),
        Err(error) => warn!(error = %error, "failed to verify immutable audit chain"),
    }

    let mut last_health_log: Option<Instant> = None;
    loop {
        if let Err(error) = queue_service.flush(config.flush_limit).await {
            warn!(error = %error, "integration queue flush failed");
        }

        if last_health_log.is_none_or(|logged_at| logged_at.elapsed() >= HEALTH_LOG_INTERVAL) {
            log_health(&queue_service).await;
            last_health_log = Some(Instant::now());
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(config.flush_interval_ms)) => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(error = %error, "failed to listen for shutdown signal");
                }
                info!("procura-worker stopping");
                return Ok(());
            }
        }
    }
}

async fn log_health(queue_service: &IntegrationQueueService) {
    match queue_service.health_snapshot().await {
        Ok(health) => info!(
            status = ?health.status,
            queue_total = health.queue_total,
            dead_letter_total = health.dead_letter_total,
            oldest_queued_seconds = health.oldest_queued_seconds,
            sent_24h = health.flush_24h_counts.sent,
            dead_lettered_24h = health.flush_24h_counts.dead_lettered,
            retried_24h = health.flush_24h_counts.retried,
            audit_write_failures = health.audit_write_failures,
            "integration queue health"
        ),
        Err(error) => warn!(error = %error, "failed to read integration queue health"),
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

/// Builds the shared adapters. The flush loop does not read idempotency
/// responses; the key store serves submissions composed from these adapters.
async fn build_audit_adapters(config: &WorkerConfig) -> AppResult<AuditAdapters> {
    let mut adapters = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = connect_pool(database_url).await?;
            AuditAdapters {
                audit: Arc::new(PostgresIntegrationAuditRepository::new(pool.clone())),
                chain: Arc::new(PostgresAuditChainRepository::new(pool.clone())),
                idempotency: Arc::new(PostgresIdempotencyRepository::new(
                    pool,
                    config.idempotency_ttl_seconds,
                )),
            }
        }
        None => {
            warn!("DATABASE_URL is not set, audit log and ledger are kept in memory");
            AuditAdapters {
                audit: Arc::new(InMemoryIntegrationAuditRepository::new()),
                chain: Arc::new(InMemoryAuditChainRepository::new()),
                idempotency: Arc::new(InMemoryIdempotencyRepository::new()),
            }
        }
    };

    if let Some(redis_url) = config.redis_url.as_deref() {
        let client = redis::Client::open(redis_url)
            .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
        adapters.idempotency = Arc::new(RedisIdempotencyRepository::new(
            client,
            "procura:idempotency",
            config.idempotency_ttl_seconds,
        ));
        info!("using redis for idempotency responses");
    }

    Ok(adapters)
}

fn build_queue_service(
    config: &WorkerConfig,
    audit: Arc<dyn IntegrationAuditRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
) -> AppResult<IntegrationQueueService> {
    let http_client = reqwest::Client::builder()
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let dispatcher = HttpIntegrationDispatcher::new(
        http_client,
        DispatcherConfig {
            target_webhook_url: config.target_webhook_url.clone(),
            target_timeout: Duration::from_secs(config.target_timeout_secs),
            endpoint_timeout: Duration::from_secs(config.endpoint_timeout_secs),
            ..DispatcherConfig::default()
        },
    );

    let integration_config = IntegrationConfig {
        stale_queue_threshold_seconds: config.stale_seconds,
        simulation_mode_default: config.simulation_mode,
        ..IntegrationConfig::default()
    }
    .with_max_attempts(config.max_attempts)
    .with_capacity(config.capacity);

    Ok(IntegrationQueueService::new(
        integration_config,
        Arc::new(JsonFileIntegrationStore::new(config.store_file.clone())),
        Arc::new(dispatcher),
        AuditRecorder::new(audit),
        IdempotencyService::new(idempotency),
    ))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let store_file = optional_env("INTEGRATION_STORE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("procura_integration_store.json"));
        let defaults = StoreCapacity::default();
        let capacity = StoreCapacity {
            queue: parse_env_usize("INTEGRATION_QUEUE_CAPACITY", defaults.queue)?,
            history: parse_env_usize("INTEGRATION_HISTORY_CAPACITY", defaults.history)?,
            dead_letter: parse_env_usize("INTEGRATION_DEAD_LETTER_CAPACITY", defaults.dead_letter)?,
            enterprise_status: defaults.enterprise_status,
        };
        let flush_limit = parse_env_usize("INTEGRATION_FLUSH_LIMIT", 100)?;
        let flush_interval_ms = parse_env_u64("INTEGRATION_FLUSH_INTERVAL_MS", 5_000)?;
        let max_attempts = parse_env_u32("INTEGRATION_MAX_ATTEMPTS", 5)?;

        if !(1..=500).contains(&flush_limit) {
            return Err(AppError::Validation(
                "INTEGRATION_FLUSH_LIMIT must be between 1 and 500".to_owned(),
            ));
        }

        if flush_interval_ms == 0 {
            return Err(AppError::Validation(
                "INTEGRATION_FLUSH_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        if max_attempts == 0 {
            return Err(AppError::Validation(
                "INTEGRATION_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        if capacity.queue == 0 || capacity.history == 0 || capacity.dead_letter == 0 {
            return Err(AppError::Validation(
                "integration collection capacities must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            store_file,
            target_webhook_url: optional_env("INTEGRATION_TARGET_WEBHOOK_URL"),
            target_timeout_secs: parse_env_u64("INTEGRATION_TARGET_TIMEOUT_SECS", 12)?,
            endpoint_timeout_secs: parse_env_u64("ENTERPRISE_HTTP_TIMEOUT_SECS", 20)?,
            max_attempts,
            simulation_mode: parse_env_flag("ENTERPRISE_SIMULATION_MODE", true),
            capacity,
            stale_seconds: parse_env_i64("INTEGRATION_STALE_SECONDS", 3_600)?,
            flush_limit,
            flush_interval_ms,
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            idempotency_ttl_seconds: parse_env_u32("IDEMPOTENCY_TTL_SECONDS", 86_400)?,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_flag(name: &str, default: bool) -> bool {
    match optional_env(name) {
        Some(value) => !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        None => default,
    }
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match optional_env(name) {
        Some(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match optional_env(name) {
        Some(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match optional_env(name) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match optional_env(name) {
        Some(value) => value.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
