//! Provider response classification.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::store::DeliveryStatus;

pub const UNAUTHORIZED_DETAIL: &str = "Unauthorized";

/// The provider answered with a body that does not match its contract.
#[derive(Debug, Error)]
#[error("Malformed provider response (HTTP {status}): {reason}")]
pub struct MalformedResponse {
    pub status: u16,
    pub reason: String,
}

/// Outcome extracted from a provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: DeliveryStatus,
    pub message_id: Option<String>,
    pub error_detail: Option<String>,
}

impl Classification {
    fn success(message_id: String) -> Self {
        Self {
            status: DeliveryStatus::Success,
            message_id: Some(message_id),
            error_detail: None,
        }
    }

    fn error(detail: String) -> Self {
        Self {
            status: DeliveryStatus::Error,
            message_id: None,
            error_detail: Some(detail),
        }
    }
}

#[derive(Deserialize)]
struct AcceptedBody {
    #[allow(dead_code)]
    #[serde(default)]
    result: bool,
    messageid: String,
}

#[derive(Deserialize)]
struct RejectedBody {
    #[allow(dead_code)]
    #[serde(default)]
    result: bool,
    errors: Value,
}

/// Classify a provider response by status code and body.
pub fn classify(status: u16, body: &[u8]) -> Result<Classification, MalformedResponse> {
    let malformed = |reason: String| MalformedResponse { status, reason };

    match status {
        200 => {
            let accepted: AcceptedBody =
                serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
            Ok(Classification::success(accepted.messageid))
        }
        400 => {
            let rejected: RejectedBody =
                serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
            let detail = flatten_errors(&rejected.errors)
                .ok_or_else(|| malformed("\"errors\" is not an object".to_string()))?;
            Ok(Classification::error(detail))
        }
        401 => Ok(Classification::error(UNAUTHORIZED_DETAIL.to_string())),
        other => Ok(Classification::error(format!(
            "Unexpected provider response: HTTP {}",
            other
        ))),
    }
}

/// `{"to": "invalid", "code": 7}` becomes `"code: 7, to: invalid"`.
fn flatten_errors(errors: &Value) -> Option<String> {
    let map = errors.as_object()?;

    let mut entries: Vec<(&String, String)> = map
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    Some(
        entries
            .into_iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted() {
        let outcome = classify(200, br#"{"result":true,"messageid":"abc-123"}"#).unwrap();
        assert_eq!(outcome.status, DeliveryStatus::Success);
        assert_eq!(outcome.message_id.as_deref(), Some("abc-123"));
        assert_eq!(outcome.error_detail, None);
    }

    #[test]
    fn test_accepted_with_garbage_body_is_malformed() {
        let err = classify(200, b"<html>ok</html>").unwrap_err();
        assert_eq!(err.status, 200);

        assert!(classify(200, br#"{"result":true}"#).is_err());
    }

    #[test]
    fn test_rejected_single_error() {
        let outcome =
            classify(400, br#"{"result":false,"errors":{"to":"invalid"}}"#).unwrap();
        assert_eq!(outcome.status, DeliveryStatus::Error);
        assert_eq!(outcome.message_id, None);
        assert_eq!(outcome.error_detail.as_deref(), Some("to: invalid"));
    }

    #[test]
    fn test_rejected_errors_sorted_and_compact() {
        let body = br#"{"result":false,"errors":{"to":"invalid","html":["empty"],"code":7}}"#;
        let outcome = classify(400, body).unwrap();
        assert_eq!(
            outcome.error_detail.as_deref(),
            Some(r#"code: 7, html: ["empty"], to: invalid"#)
        );
    }

    #[test]
    fn test_rejected_with_non_object_errors_is_malformed() {
        assert!(classify(400, br#"{"result":false,"errors":"bad"}"#).is_err());
        assert!(classify(400, b"not json").is_err());
    }

    #[test]
    fn test_unauthorized_ignores_body() {
        let bodies: [&[u8]; 3] = [b"", b"garbage", br#"{"result":false}"#];
        for body in bodies {
            let outcome = classify(401, body).unwrap();
            assert_eq!(outcome.status, DeliveryStatus::Error);
            assert_eq!(outcome.error_detail.as_deref(), Some(UNAUTHORIZED_DETAIL));
        }
    }

    #[test]
    fn test_unexpected_status() {
        let outcome = classify(503, b"Service Unavailable").unwrap();
        assert_eq!(outcome.status, DeliveryStatus::Error);
        assert_eq!(
            outcome.error_detail.as_deref(),
            Some("Unexpected provider response: HTTP 503")
        );
    }
}
