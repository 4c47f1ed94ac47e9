//! Извлечение DialogID из BER-заголовка сообщения без полного разбора ASN.1.
//!
//! Сообщение начинается с SEQUENCE: тег, затем длина в short form
//! (один байт < 128) или long form (`0x80 | k`, за которым следуют
//! `k` байт длины). Сразу за длиной идёт поле DialogID с контекстным
//! тегом `0x80`:
//!
//! ```text
//! short form:  30 7C       80 02 00 9A ...   tag @ 2
//! long form:   30 81 9B    80 01 05 ...      tag @ 3
//! long form:   30 82 02 09 80 01 05 ...      tag @ 4
//! ```
//!
//! Остальная структура не разбирается и не валидируется.

mod error;

pub use error::HeaderError;

/// Контекстный примитивный тег поля DialogID.
pub const DIALOG_ID_TAG: u8 = 0x80;

/// Тип сообщения, по которому выполняется маршрутизация.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogId(i64);

impl DialogId {
    /// Vehicle Situation Data.
    pub const VEHICLE_SITUATION_DATA: DialogId = DialogId(154);
    /// Advisory (traveler) Situation Data.
    pub const ADVISORY_SITUATION_DATA: DialogId = DialogId(156);
    /// Intersection Situation Data.
    pub const INTERSECTION_SITUATION_DATA: DialogId = DialogId(162);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for DialogId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DialogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Положение и значение поля DialogID внутри буфера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogHeader {
    /// Смещение тега `0x80`.
    pub tag_offset: usize,
    /// Смещение первого байта значения.
    pub value_offset: usize,
    /// Длина значения в байтах.
    pub value_len: usize,
    pub id: DialogId,
}

/// Найти поле DialogID и декодировать его значение.
pub fn locate(buf: &[u8]) -> Result<DialogHeader, HeaderError> {
    let outer_len = byte_at(buf, 1)?;

    // Short form: содержимое начинается сразу за байтом длины.
    // Long form: младшие 7 бит задают число дополнительных байт длины.
    // 0x80 (indefinite form, k = 0) даёт то же смещение, что и short form.
    let tag_offset = if outer_len > 0x7F {
        2 + (outer_len & 0x7F) as usize
    } else {
        2
    };

    let tag = byte_at(buf, tag_offset)?;
    if tag != DIALOG_ID_TAG {
        return Err(HeaderError::TagMismatch {
            offset: tag_offset,
            found: tag,
        });
    }

    let value_len = match byte_at(buf, tag_offset + 1)? {
        0 => return Err(HeaderError::EmptyIdentifier),
        n if n > 0x7F => return Err(HeaderError::LongFormIdentifierLength(n)),
        n => n as usize,
    };

    let value_offset = tag_offset + 2;
    let end = value_offset + value_len;
    if buf.len() < end {
        return Err(HeaderError::Truncated {
            needed: end,
            len: buf.len(),
        });
    }

    Ok(DialogHeader {
        tag_offset,
        value_offset,
        value_len,
        id: DialogId(twos_complement(&buf[value_offset..end])),
    })
}

/// Только значение DialogID.
pub fn decode_dialog_id(buf: &[u8]) -> Result<DialogId, HeaderError> {
    locate(buf).map(|header| header.id)
}

fn byte_at(buf: &[u8], offset: usize) -> Result<u8, HeaderError> {
    buf.get(offset).copied().ok_or(HeaderError::Truncated {
        needed: offset + 1,
        len: buf.len(),
    })
}

/// Big-endian two's complement произвольной ширины → младшие 64 бита.
///
/// Для значений шире 8 байт старшие байты отбрасываются, знак
/// определяется оставшимися битами (как при сужении до i64).
fn twos_complement(bytes: &[u8]) -> i64 {
    let negative = bytes.first().is_some_and(|b| b & 0x80 != 0);
    let tail = &bytes[bytes.len().saturating_sub(8)..];
    let mut acc: u64 = if negative { u64::MAX } else { 0 };
    for &b in tail {
        acc = (acc << 8) | b as u64;
    }
    acc as i64
}
