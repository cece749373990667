use serde::{Deserialize, Serialize};

/// Structured result returned by every user-facing operation instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ServiceResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a payload. Serialization failures leave the payload empty.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

impl<T, E> From<std::result::Result<T, E>> for ServiceResponse
where
    T: Into<String>,
    E: std::fmt::Display,
{
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(message) => ServiceResponse::ok(message),
            Err(e) => ServiceResponse::fail(e.to_string()),
        }
    }
}
