use std::sync::Arc;
use std::time::Duration;

use subscriber_api::{MessageHandler, Sleeper, SubscriberError};
use tokio_util::sync::CancellationToken;

use crate::SessionManager;

/// Политика повторов: весь блок open → subscribe → start повторяется
/// с фиксированной паузой, без backoff и без лимита попыток.
pub struct Supervisor {
    retry_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Supervisor {
    pub fn new(retry_delay: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { retry_delay, sleeper }
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Подключиться и запустить доставку. Возвращает число попыток.
    ///
    /// Ошибок наружу не отдаёт: каждая неудачная попытка логируется,
    /// частичная сессия закрывается, после паузы всё начинается заново.
    pub async fn connect(
        &self,
        manager: &mut SessionManager,
        handler: Arc<dyn MessageHandler>,
    ) -> u64 {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match Self::establish(manager, handler.clone()).await {
                Ok(()) => {
                    tracing::info!(
                        broker = %manager.params().broker_url,
                        topic = %manager.params().topic,
                        attempt,
                        "subscriber running"
                    );
                    return attempt;
                }
                Err(e) => {
                    tracing::error!(
                        broker = %manager.params().broker_url,
                        attempt,
                        error = ?e,
                        retry_in = ?self.retry_delay,
                        "connect failed"
                    );
                    manager.close().await;
                    self.sleeper.sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn establish(
        manager: &mut SessionManager,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscriberError> {
        manager.open().await?;
        let topic = manager.params().topic.clone();
        manager.subscribe(&topic, handler).await?;
        manager.start()
    }

    /// Держать сессию живой до отмены: после потери сессии пауза и
    /// переподключение.
    pub async fn run(
        &self,
        manager: &mut SessionManager,
        handler: Arc<dyn MessageHandler>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = self.connect(manager, handler.clone()) => {}
                _ = cancel.cancelled() => break,
            }

            tokio::select! {
                result = manager.closed() => {
                    match result {
                        Ok(()) => tracing::warn!(retry_in = ?self.retry_delay, "session ended, reconnecting"),
                        Err(e) => tracing::error!(error = ?e, retry_in = ?self.retry_delay, "session lost, reconnecting"),
                    }
                }
                _ = cancel.cancelled() => break,
            }

            manager.close().await;
            tokio::select! {
                _ = self.sleeper.sleep(self.retry_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        manager.close().await;
        tracing::info!("supervisor stopped");
    }
}
