use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use subscriber_api::{Clock, SubscriberError};

/// Расширение выходных файлов (сырые BER байты).
pub const FILE_EXTENSION: &str = "ber";

/// `yyyy.MM.dd.HH.mm.ss.SSS`
const TIMESTAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S%.3f";

const MAX_NAME_ATTEMPTS: usize = 16;

/// Имя файла: `{prefix}_{yyyy.MM.dd.HH.mm.ss.SSS}_{epoch_ms}.ber`.
pub fn file_name(prefix: &str, timestamp: &DateTime<Local>, epoch_ms: i64) -> String {
    format!(
        "{prefix}_{}_{epoch_ms}.{FILE_EXTENSION}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Один файл на сообщение, без перезаписи.
///
/// Структура на диске:
/// ```text
/// {output_dir}/{prefix}_{yyyy.MM.dd.HH.mm.ss.SSS}_{epoch_ms}.ber
/// ```
/// Компонента `epoch_ms` строго возрастает в пределах процесса: если часы
/// не сдвинулись с прошлой записи, берётся предыдущее значение + 1.
/// Файл открывается с `create_new`, поэтому чужой файл с тем же именем
/// не перезаписывается, имя сдвигается дальше.
pub struct FileSink {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    last_ms: Mutex<i64>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            last_ms: Mutex::new(i64::MIN),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Создать выходную директорию, если её нет.
    pub fn ensure_dir(&self) -> Result<(), SubscriberError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SubscriberError::io(format!("mkdir {}: {e}", self.dir.display())))
    }

    /// Записать байты в новый файл. Возвращает путь созданного файла.
    pub fn write(&self, prefix: &str, bytes: &[u8]) -> Result<PathBuf, SubscriberError> {
        self.ensure_dir()?;

        let now = self.clock.now();
        let mut epoch_ms = self.next_millis(now.timestamp_millis());

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(file_name(prefix, &now, epoch_ms));
            let mut file = match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    epoch_ms = self.next_millis(epoch_ms);
                    continue;
                }
                Err(e) => {
                    return Err(SubscriberError::io(format!("create {}: {e}", path.display())));
                }
            };

            if let Err(e) = file.write_all(bytes) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(SubscriberError::io(format!("write {}: {e}", path.display())));
            }
            return Ok(path);
        }

        Err(SubscriberError::io(format!(
            "no free file name for prefix '{prefix}' in {}",
            self.dir.display()
        )))
    }

    fn next_millis(&self, candidate: i64) -> i64 {
        let mut last = self.last_ms.lock().unwrap_or_else(PoisonError::into_inner);
        let ms = if *last == i64::MIN { candidate } else { candidate.max(*last + 1) };
        *last = ms;
        ms
    }
}
