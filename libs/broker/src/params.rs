use std::time::Duration;

use subscriber_api::SubscriberError;

/// Параметры подключения к брокеру. Строятся один раз при старте
/// и дальше не меняются.
#[derive(Clone)]
pub struct ConnectionParameters {
    pub broker_url: String,
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Путь к key store (PEM: цепочка сертификатов клиента + ключ) или ссылка на секрет.
    pub keystore_file: Option<String>,
    /// Путь к trust store (PEM: доверенные CA) или ссылка на секрет.
    pub truststore_file: Option<String>,
    /// Пароль к зашифрованному ключу в key store (литерал или ссылка на секрет).
    pub store_password: Option<String>,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl ConnectionParameters {
    /// Mutual TLS настраивается только когда заданы оба хранилища.
    pub fn has_stores(&self) -> bool {
        self.keystore_file.is_some() && self.truststore_file.is_some()
    }
}

impl std::fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("broker_url", &self.broker_url)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("keystore_file", &self.keystore_file)
            .field("truststore_file", &self.truststore_file)
            .field("store_password", &self.store_password.as_ref().map(|_| "***"))
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

/// Разобранный `brokerURL`: `scheme://host[:port][/path][?query]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    pub fn parse(url: &str) -> Result<Self, SubscriberError> {
        let url = url.trim();
        let (scheme, rest) = match url.find("://") {
            Some(pos) => (url[..pos].to_ascii_lowercase(), &url[pos + 3..]),
            None => ("tcp".to_string(), url),
        };

        let tls = match scheme.as_str() {
            "tcp" | "mqtt" => false,
            "ssl" | "mqtts" | "tls" => true,
            other => {
                return Err(SubscriberError::config(format!(
                    "unsupported broker URL scheme '{other}' in '{url}'"
                )));
            }
        };

        // Query и path брокеру не нужны: `ssl://host:8883?wireFormat.x=y`
        let authority = rest
            .split(['/', '?'])
            .next()
            .unwrap_or_default();
        if authority.is_empty() {
            return Err(SubscriberError::config(format!("broker URL '{url}' has no host")));
        }

        let default_port = if tls { TLS_PORT } else { PLAIN_PORT };
        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let (host, tail) = v6
                .split_once(']')
                .ok_or_else(|| SubscriberError::config(format!("unterminated IPv6 host in '{url}'")))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, parse_port(port, url)?),
                None if tail.is_empty() => (host, default_port),
                None => return Err(SubscriberError::config(format!("malformed broker URL '{url}'"))),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port, url)?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return Err(SubscriberError::config(format!("broker URL '{url}' has no host")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

fn parse_port(port: &str, url: &str) -> Result<u16, SubscriberError> {
    port.parse()
        .map_err(|_| SubscriberError::config(format!("invalid port '{port}' in broker URL '{url}'")))
}
