use chrono::NaiveDate;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub saga: SagaConfig,
    pub locks: LockConfig,
    #[serde(default)]
    pub keys: KeySpace,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub property_topic: String,
    pub availability_topic: String,
    pub booking_topic: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SagaConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: u64,
    #[serde(default = "default_poll_backoff_ms")]
    pub poll_backoff_ms: u64,
    #[serde(default = "default_dlq_monitor_interval_secs")]
    pub dlq_monitor_interval_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_pop_timeout_secs() -> u64 { 1 }
fn default_poll_backoff_ms() -> u64 { 500 }
fn default_dlq_monitor_interval_secs() -> u64 { 60 }

#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    /// Availability locks live long enough to bridge the synchronous create
    /// path and the asynchronous saga release.
    #[serde(default = "default_availability_ttl_secs")]
    pub availability_ttl_secs: u64,
    /// Update locks only serialize competing status-update requests.
    #[serde(default = "default_update_ttl_secs")]
    pub update_ttl_secs: u64,
}

fn default_availability_ttl_secs() -> u64 { 300 }
fn default_update_ttl_secs() -> u64 { 10 }

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            availability_ttl_secs: default_availability_ttl_secs(),
            update_ttl_secs: default_update_ttl_secs(),
        }
    }
}

/// Queue names and key prefixes, passed to each component at construction so
/// tests can isolate namespaces.
#[derive(Debug, Deserialize, Clone)]
pub struct KeySpace {
    #[serde(default = "default_saga_queue")]
    pub saga_queue: String,
    #[serde(default = "default_dlq_queue")]
    pub dlq_queue: String,
    #[serde(default = "default_availability_lock_prefix")]
    pub availability_lock_prefix: String,
    #[serde(default = "default_update_lock_prefix")]
    pub update_lock_prefix: String,
    #[serde(default = "default_property_prefix")]
    pub property_prefix: String,
    #[serde(default = "default_booking_prefix")]
    pub booking_prefix: String,
    #[serde(default = "default_idempotency_prefix")]
    pub idempotency_prefix: String,
    #[serde(default = "default_availability_hash_prefix")]
    pub availability_hash_prefix: String,
}

fn default_saga_queue() -> String { "saga:events".into() }
fn default_dlq_queue() -> String { "saga:events:dlq".into() }
fn default_availability_lock_prefix() -> String { "lock:availability:".into() }
fn default_update_lock_prefix() -> String { "lock:booking:update:".into() }
fn default_property_prefix() -> String { "property:".into() }
fn default_booking_prefix() -> String { "booking:".into() }
fn default_idempotency_prefix() -> String { "idempotency:".into() }
fn default_availability_hash_prefix() -> String { "property:availability:".into() }

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            saga_queue: default_saga_queue(),
            dlq_queue: default_dlq_queue(),
            availability_lock_prefix: default_availability_lock_prefix(),
            update_lock_prefix: default_update_lock_prefix(),
            property_prefix: default_property_prefix(),
            booking_prefix: default_booking_prefix(),
            idempotency_prefix: default_idempotency_prefix(),
            availability_hash_prefix: default_availability_hash_prefix(),
        }
    }
}

impl KeySpace {
    pub fn availability_lock_key(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> String {
        format!(
            "{}{}:{}:{}",
            self.availability_lock_prefix, property_id, check_in, check_out
        )
    }

    pub fn update_lock_key(&self, booking_id: i64) -> String {
        format!("{}{}", self.update_lock_prefix, booking_id)
    }

    pub fn property_key(&self, id: i64) -> String {
        format!("{}{}", self.property_prefix, id)
    }

    pub fn booking_key(&self, id: i64) -> String {
        format!("{}{}", self.booking_prefix, id)
    }

    pub fn idempotency_key(&self, key: &str) -> String {
        format!("{}{}", self.idempotency_prefix, key)
    }

    pub fn availability_hash(&self, property_id: i64) -> String {
        format!("{}{}", self.availability_hash_prefix, property_id)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `ROOST__SAGA__MAX_ATTEMPTS=5` overrides saga.max_attempts
            .add_source(config::Environment::with_prefix("ROOST").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
