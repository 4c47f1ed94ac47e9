use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Local};

/// Источник текущего времени для имён выходных файлов.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Системные часы.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Пауза между попытками подключения.
///
/// Вынесена в трейт, чтобы тесты retry-цикла не ждали реальные 30 секунд.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
