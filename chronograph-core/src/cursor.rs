//! Opaque pagination cursors (§6 "Cursor format").
//!
//! Internally a canonical JSON object `{created_at, id}`; opaque to clients.
//! Encoded as base64 so it round-trips through a query string unescaped.

use base64::Engine;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ChronographError;
use crate::ids::VersionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: NaiveDateTime,
    pub id: VersionId,
}

impl Cursor {
    pub fn new(created_at: NaiveDateTime, id: VersionId) -> Self {
        Self { created_at, id }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor serialises");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, ChronographError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| ChronographError::bad_request(format!("malformed cursor: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ChronographError::bad_request(format!("malformed cursor: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursor_round_trips() {
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let id = VersionId::new();
        let cursor = Cursor::new(ts, id);
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(Cursor::decode("not-a-valid-cursor!!").is_err());
    }
}
