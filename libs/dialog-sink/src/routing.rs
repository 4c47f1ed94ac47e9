use std::collections::HashMap;

use ber_header::DialogId;
use subscriber_api::SubscriberError;

/// Статическая таблица DialogID → префикс имени файла.
///
/// Строится один раз при старте и дальше только читается.
/// DialogID, которых нет в таблице, молча отбрасываются.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<DialogId, String>,
}

impl RoutingTable {
    /// Построить таблицу, проверив префиксы: они становятся частью имени файла.
    pub fn new(
        routes: impl IntoIterator<Item = (DialogId, String)>,
    ) -> Result<Self, SubscriberError> {
        let mut table = HashMap::new();
        for (id, prefix) in routes {
            if prefix.is_empty() {
                return Err(SubscriberError::config(format!("empty file prefix for DialogID {id}")));
            }
            if prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
                return Err(SubscriberError::config(format!(
                    "file prefix '{prefix}' for DialogID {id} must be a plain name"
                )));
            }
            if table.insert(id, prefix).is_some() {
                return Err(SubscriberError::config(format!("duplicate route for DialogID {id}")));
            }
        }
        Ok(Self { routes: table })
    }

    /// Префикс файла для DialogID. None: сообщение не сохраняется.
    pub fn route(&self, id: DialogId) -> Option<&str> {
        self.routes.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DialogId, &str)> {
        self.routes.iter().map(|(id, prefix)| (*id, prefix.as_str()))
    }
}

/// Сохраняется только Vehicle Situation Data. Advisory (156) и
/// Intersection (162) известны, но по умолчанию отфильтрованы.
impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            routes: HashMap::from([(DialogId::VEHICLE_SITUATION_DATA, "vsd".to_string())]),
        }
    }
}
