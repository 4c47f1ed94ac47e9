use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ber_header::DialogId;
use broker::ConnectionParameters;
use clap::{Args, Parser};
use dialog_sink::RoutingTable;
use serde::Deserialize;
use subscriber_api::secret::SECRET_PREFIX;

use crate::error::AppError;

#[derive(Parser)]
#[command(name = "dialog-subscriber", about = "Подписчик на поток диалогов: BER сообщения → файлы")]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config/subscriber.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

/// Ключи совпадают с именами исходного properties-файла.
/// Ссылки `secret:<name>` допустимы только в keystoreFile, truststoreFile
/// и storePassword.
#[derive(Debug, Deserialize)]
pub struct SubscriberConfig {
    #[serde(rename = "brokerURL")]
    pub broker_url: String,
    pub topic: String,
    #[serde(rename = "userName", default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "keystoreFile", default)]
    pub keystore_file: Option<String>,
    #[serde(rename = "truststoreFile", default)]
    pub truststore_file: Option<String>,
    #[serde(rename = "storePassword", default)]
    pub store_password: Option<String>,
    #[serde(rename = "clientId", default = "default_client_id")]
    pub client_id: String,
    #[serde(rename = "keepAliveSecs", default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(rename = "retryDelaySecs", default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(rename = "outputDir", default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(rename = "secretsDir", default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,
    /// dialog id → префикс имени файла.
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, String>,
}

const MIN_KEEP_ALIVE_SECS: u64 = 5;
const MIN_RETRY_DELAY_SECS: u64 = 1;

fn default_client_id() -> String {
    format!("dialog-subscriber-{}", std::process::id())
}
fn default_keep_alive_secs() -> u64 {
    30
}
fn default_retry_delay_secs() -> u64 {
    30
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/run/secrets")
}
fn default_routes() -> BTreeMap<String, String> {
    BTreeMap::from([(DialogId::VEHICLE_SITUATION_DATA.value().to_string(), "vsd".to_string())])
}

impl SubscriberConfig {
    pub fn load(path: &str) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| match e {
                AppError::Config { context, detail } => {
                    AppError::Config { context, detail: format!("'{path}': {detail}") }
                }
                other => other,
            })
    }

    pub fn parse(content: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.broker_url.trim().is_empty() {
            return Err(AppError::Config { context: "brokerURL", detail: "must not be empty".into() });
        }
        if self.topic.trim().is_empty() {
            return Err(AppError::Config { context: "topic", detail: "must not be empty".into() });
        }
        if self.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(AppError::Config {
                context: "keepAliveSecs",
                detail: format!("{} is below the minimum of {MIN_KEEP_ALIVE_SECS}", self.keep_alive_secs),
            });
        }
        if self.retry_delay_secs < MIN_RETRY_DELAY_SECS {
            return Err(AppError::Config {
                context: "retryDelaySecs",
                detail: format!("{} is below the minimum of {MIN_RETRY_DELAY_SECS}", self.retry_delay_secs),
            });
        }
        // Пароль брокера уходит в CONNECT как есть.
        if self.password.as_deref().is_some_and(|p| p.starts_with(SECRET_PREFIX)) {
            return Err(AppError::Config {
                context: "password",
                detail: format!("'{SECRET_PREFIX}' references are only resolved for the key/trust stores and storePassword"),
            });
        }
        self.routing_table()?;
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Пустые строки считаются незаданными значениями.
    pub fn to_params(&self) -> ConnectionParameters {
        ConnectionParameters {
            broker_url: self.broker_url.trim().to_string(),
            user_name: non_empty(&self.user_name),
            password: non_empty(&self.password),
            keystore_file: non_empty(&self.keystore_file),
            truststore_file: non_empty(&self.truststore_file),
            store_password: non_empty(&self.store_password),
            topic: self.topic.trim().to_string(),
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }

    pub fn routing_table(&self) -> Result<Arc<RoutingTable>, AppError> {
        let mut routes = Vec::with_capacity(self.routes.len());
        for (id, prefix) in &self.routes {
            let id: i64 = id.trim().parse().map_err(|_| AppError::Config {
                context: "routes",
                detail: format!("'{id}' is not a dialog id"),
            })?;
            routes.push((DialogId::new(id), prefix.clone()));
        }
        RoutingTable::new(routes)
            .map(Arc::new)
            .map_err(|e| AppError::Config { context: "routes", detail: e.to_string() })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}
