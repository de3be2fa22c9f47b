use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ListBidsError;

/// Keyset position: the last item of the previous page. Opaque to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    pub id: String,
}

pub fn encode_cursor(cursor: &Cursor) -> Result<String, serde_json::Error> {
    let raw = serde_json::to_vec(cursor)?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

pub fn decode_cursor(encoded: &str) -> Result<Cursor, ListBidsError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| ListBidsError::InvalidCursor)?;

    let cursor: Cursor =
        serde_json::from_slice(&raw).map_err(|_| ListBidsError::InvalidCursor)?;

    if cursor.id.is_empty() {
        return Err(ListBidsError::InvalidCursor);
    }
    Ok(cursor)
}
