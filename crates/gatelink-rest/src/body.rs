//! Request body encoding.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// `Content-Type` for JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// `Content-Type` for form bodies.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Body of a REST call, handed over by endpoint helpers.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    None,
    /// JSON document.
    Json(Value),
    /// Pre-encoded `application/x-www-form-urlencoded` string.
    Form(String),
}

impl RequestBody {
    /// Build a JSON body from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// `Content-Type` to send, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Json(_) => Some(CONTENT_TYPE_JSON),
            Self::Form(_) => Some(CONTENT_TYPE_FORM),
        }
    }

    /// Encode into wire bytes.
    pub fn encode(&self) -> Result<Option<Bytes>, serde_json::Error> {
        match self {
            Self::None => Ok(None),
            Self::Json(value) => Ok(Some(Bytes::from(serde_json::to_vec(value)?))),
            Self::Form(form) => Ok(Some(Bytes::from(form.clone()))),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Option<Value>> for RequestBody {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::None, Self::Json)
    }
}
