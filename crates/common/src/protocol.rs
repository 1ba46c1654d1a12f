//! Request and response types exchanged with HTTP clients.
//!
//! Record bodies themselves are defined next to their schema in the service
//! crate; this module only holds the envelopes wrapped around them.

use serde::{Deserialize, Serialize};

/// Value of the `status` field on successful envelopes.
pub const STATUS_SUCCESS: &str = "success";

// ---------------------------------------------------------------------------
// Collection envelopes
// ---------------------------------------------------------------------------

/// Envelope returned by list and create operations.
///
/// `{ "status": "success", "count": <n>, "data": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Always [`STATUS_SUCCESS`].
    pub status: String,
    /// Number of elements in `data`.
    pub count: usize,
    /// The records.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    /// Wrap `data` in a success envelope.
    pub fn success(data: Vec<T>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_owned(),
            count: data.len(),
            data,
        }
    }
}

/// Body accepted by create endpoints: a single object or an array of objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Array form.
    Many(Vec<T>),
    /// Single object form.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Flatten into a vector, preserving submission order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

// ---------------------------------------------------------------------------
// Delete responses
// ---------------------------------------------------------------------------

/// Response body for a single-record delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Status message.
    pub status: String,
    /// Identity of the deleted record.
    pub id: i64,
}

/// Response body for a batch delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeleteResponse {
    /// Status message.
    pub status: String,
    /// Identities removed, in request order.
    pub deleted_ids: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.public_message())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the store answered a ping.
    pub store_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_response_counts_data() {
        let resp = ListResponse::success(vec![1, 2, 3]);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v, json!({"status": "success", "count": 3, "data": [1, 2, 3]}));
    }

    #[test]
    fn one_or_many_accepts_object_and_array() {
        let one: OneOrMany<serde_json::Value> =
            serde_json::from_value(json!({"first_name": "A"})).unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let many: OneOrMany<serde_json::Value> =
            serde_json::from_value(json!([{"first_name": "A"}, {"first_name": "B"}])).unwrap();
        let items = many.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["first_name"], "B");
    }

    #[test]
    fn error_response_from_service_error() {
        let e = crate::ServiceError::Store("constraint failed: teachers.email".into());
        let body = ErrorResponse::from(&e);
        assert_eq!(body.code, "internal_error");
        assert!(!body.message.contains("teachers.email"));
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            store_ready: true,
        };
        let json = serde_json::to_string(&h).unwrap();
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert!(decoded.store_ready);
    }
}
