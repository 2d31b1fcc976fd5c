//! Configuration manager for roster.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name, also used as token issuer.
    pub name: String,
    /// Socket address the HTTP server binds to.
    pub address: String,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    pub token: Token,
    /// Related to PostgreSQL configuration.
    pub postgres: Option<Postgres>,
    /// Related to Kafka configuration.
    pub kafka: Kafka,
    /// Related to Argon2 configuration.
    pub argon2: Option<Argon2>,
    /// Related to the mutation store.
    pub store: Store,
    /// Related to OTLP export.
    pub telemetry: Telemetry,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            address: DEFAULT_ADDRESS.to_owned(),
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            token: Token::default(),
            postgres: None,
            kafka: Kafka::default(),
            argon2: None,
            store: Store::default(),
            telemetry: Telemetry::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Json Web Token configuration.
///
/// The signing secret is never read from this file, see
/// [`crate::token::SECRET_ENV`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Session duration, in hours.
    pub session_duration: u32,
    /// Role identifier allowed to run elevated operations.
    pub admin_role: String,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            session_duration: 24,
            admin_role: "1".into(),
        }
    }
}

/// Kafka configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Kafka {
    /// Comma separated `host:port` list.
    pub brokers: String,
    /// Consumer group identity used to track offsets.
    pub consumer_group: String,
    /// `v4`, `v6` or `any`.
    pub address_family: String,
    /// Consumer session timeout, in milliseconds.
    pub session_timeout: u64,
    /// `earliest` or `latest`.
    pub auto_offset_reset: String,
    /// Poll interval of the replication loop, in milliseconds.
    pub poll_interval: u64,
    /// Maximum wait for a delivery acknowledgment, in milliseconds.
    pub delivery_timeout: u64,
    pub topics: Topics,
}

impl Default for Kafka {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".into(),
            consumer_group: "roster".into(),
            address_family: "v4".into(),
            session_timeout: 6000,
            auto_offset_reset: "earliest".into(),
            poll_interval: 100,
            delivery_timeout: 5000,
            topics: Topics::default(),
        }
    }
}

impl Kafka {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout)
    }
}

/// Topic names.
///
/// `users` and `roles` receive the events of this instance. `mirrored` lists
/// the topics other services publish on; this instance consumes only those.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// Topic receiving local user events.
    pub users: String,
    /// Topic receiving local role events.
    pub roles: String,
    /// Topics consumed by the replication loop.
    pub mirrored: Vec<String>,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            users: "users".into(),
            roles: "roles".into(),
            mirrored: vec!["profile".into(), "auth".into(), "role".into()],
        }
    }
}

impl Topics {
    /// Every topic the replication loop subscribes to, without duplicates.
    ///
    /// Publish topics are left out, local writes are never applied twice.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in &self.mirrored {
            if *topic == self.users || *topic == self.roles {
                tracing::warn!(%topic, "publish topic ignored in mirrored topics");
                continue;
            }
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        topics
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Mutation store configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    /// Deadline of every store call, in seconds.
    pub timeout: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self { timeout: 10 }
    }
}

impl Store {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// OpenTelemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// Export spans through OTLP (endpoint from `OTEL_EXPORTER_OTLP_*`).
    pub otlp: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Arc::new(self.error(err));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();
                config.path = file_path.clone();

                Arc::new(config)
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not usable, using defaults");
        Self::default()
    }
}
