// ── Response envelope ──
//
// Every call through the gateway resolves to this shape, success or not.
// `data` is the canonical payload field; `response` is read as a
// deprecated alias when `data` is missing or empty.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub to: Option<u64>,
}

/// Normalized API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEnvelope")]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    meta: Option<serde_json::Value>,
}

impl RawEnvelope {
    fn into_envelope(self, default_success: bool) -> Envelope {
        let data = match (self.data, self.response) {
            (Some(data), _) if !is_empty(&data) => Some(data),
            (_, Some(response)) if !is_empty(&response) => Some(response),
            (data, _) => data.filter(|d| !d.is_null()),
        };
        let message = self.message.and_then(|m| match m {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        // Non-pagination `meta` blocks are ignored rather than failing the parse.
        let meta = self.meta.and_then(|m| serde_json::from_value(m).ok());

        Envelope {
            success: self.success.unwrap_or(default_success),
            data,
            message,
            meta,
        }
    }
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        raw.into_envelope(false)
    }
}

fn is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl Envelope {
    /// A failed envelope carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            meta: None,
        }
    }

    /// A successful envelope with no payload.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
            meta: None,
        }
    }

    /// Parse a response body. `ok_status` is the `success` default when the
    /// body omits it; non-object bodies are treated as bare `data`.
    pub fn from_body(body: &str, ok_status: bool) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(if ok_status {
                Self::empty_success()
            } else {
                Self {
                    success: false,
                    data: None,
                    message: None,
                    meta: None,
                }
            });
        }
        let value: serde_json::Value = serde_json::from_str(body)?;
        if value.is_object() {
            let raw: RawEnvelope = serde_json::from_value(value)?;
            Ok(raw.into_envelope(ok_status))
        } else {
            Ok(Self {
                success: ok_status,
                data: Some(value).filter(|v| !v.is_null()),
                message: None,
                meta: None,
            })
        }
    }

    /// Deserialize `data` into `T`. `Ok(None)` when there is no data.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }

    /// The message, or `fallback` when the server sent none.
    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
    }
}
