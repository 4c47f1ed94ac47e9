use std::path::PathBuf;

use crate::SubscriberError;

/// Префикс, отличающий ссылку на защищённый ресурс от литерального значения.
pub const SECRET_PREFIX: &str = "secret:";

/// Разрешение секретов: ключевые хранилища и пароль к ним могут быть
/// заданы в конфиге либо литерально, либо ссылкой на защищённый ресурс.
pub trait SecretResolver: Send + Sync {
    /// Является ли значение ссылкой (а не литералом)?
    fn is_reference(&self, value: &str) -> bool;

    /// Разрешить ссылку в байты (файлы хранилищ).
    fn resolve_bytes(&self, reference: &str) -> Result<Vec<u8>, SubscriberError>;

    /// Разрешить ссылку в строку (пароль хранилища).
    fn resolve_string(&self, reference: &str) -> Result<String, SubscriberError>;
}

/// Секреты, смонтированные файлами в директорию (docker/k8s secrets).
///
/// Ссылка `secret:<name>` указывает на файл `{dir}/{name}`.
#[derive(Debug, Clone)]
pub struct SecretsDir {
    dir: PathBuf,
}

impl SecretsDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf, SubscriberError> {
        let name = reference
            .strip_prefix(SECRET_PREFIX)
            .ok_or_else(|| SubscriberError::config(format!("'{reference}' is not a secret reference")))?;
        if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
            return Err(SubscriberError::config(format!("invalid secret name '{name}'")));
        }
        Ok(self.dir.join(name))
    }
}

impl SecretResolver for SecretsDir {
    fn is_reference(&self, value: &str) -> bool {
        value.starts_with(SECRET_PREFIX)
    }

    fn resolve_bytes(&self, reference: &str) -> Result<Vec<u8>, SubscriberError> {
        let path = self.path_for(reference)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| SubscriberError::config(format!("secret {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), len = bytes.len(), "secret resolved");
        Ok(bytes)
    }

    fn resolve_string(&self, reference: &str) -> Result<String, SubscriberError> {
        let bytes = self.resolve_bytes(reference)?;
        let value = String::from_utf8(bytes)
            .map_err(|e| SubscriberError::config(format!("secret '{reference}' is not UTF-8: {e}")))?;
        // Файлы секретов обычно заканчиваются переводом строки
        Ok(value.trim_end_matches(['\r', '\n']).to_string())
    }
}
