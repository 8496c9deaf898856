use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BenchError;

/// Типичный размер JSON одного сообщения, используется для преаллокации буферов.
pub const ENCODED_CAPACITY: usize = 256;

/// Синтетическое сообщение бенчмарка. Живёт от генерации до publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchMessage {
    pub id: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BenchMessage {
    pub fn new(id: u64, with_timestamp: bool) -> Self {
        Self {
            id,
            content: content_for(id),
            timestamp: with_timestamp.then(Utc::now),
        }
    }

    /// Сериализовать в JSON, дописывая в конец `buf`.
    /// Вызывающий очищает буфер сам, чтобы переиспользовать аллокацию.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), BenchError> {
        serde_json::to_writer(buf, self)?;
        Ok(())
    }

    /// Собрать сообщение `id` и записать его JSON в очищенный `buf`.
    pub fn encode_id(id: u64, with_timestamp: bool, buf: &mut Vec<u8>) -> Result<(), BenchError> {
        buf.clear();
        Self::new(id, with_timestamp).encode_into(buf)
    }
}

pub fn content_for(id: u64) -> String {
    format!("Hello World #{id}")
}
