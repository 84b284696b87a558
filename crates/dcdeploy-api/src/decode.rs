use dcdeploy_domain::{GraphqlError, IncompatibleSqlSchema, ViolationType};
use dcdeploy_engine::{ApiError, SchemaRejection};
use serde::Deserialize;
use serde_json::Value;

const INCOMPATIBLE_SCHEMA_DETAIL: &str = "IncompatibleSqlSchemaError";
const PRECONDITION_FAILURE_DETAIL: &str = "type.googleapis.com/google.rpc.PreconditionFailure";
const GRAPHQL_ERROR_DETAIL: &str = "GraphqlError";

const INCOMPATIBLE_CONNECTOR: &str = "INCOMPATIBLE_CONNECTOR";
const INCOMPATIBLE_SCHEMA: &str = "INCOMPATIBLE_SCHEMA";
const INACCESSIBLE_SCHEMA: &str = "INACCESSIBLE_SCHEMA";

/// `google.rpc.Status`, as found in error bodies and failed operations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RpcStatus {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: RpcStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PreconditionFailure {
    #[serde(default)]
    violations: Vec<Violation>,
}

#[derive(Debug, Default, Deserialize)]
struct Violation {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    subject: String,
}

fn detail_type(detail: &Value) -> &str {
    detail.get("@type").and_then(Value::as_str).unwrap_or_default()
}

/// Pull the schema-specific details out of a status, if it carries any.
fn schema_rejection(status: &RpcStatus) -> Option<SchemaRejection> {
    let mut rejection = SchemaRejection {
        message: status.message.clone(),
        ..SchemaRejection::default()
    };
    let mut violation_type = None;

    for detail in &status.details {
        let kind = detail_type(detail);
        if kind.contains(INCOMPATIBLE_SCHEMA_DETAIL) {
            if rejection.incompatible.is_none() {
                rejection.incompatible =
                    serde_json::from_value::<IncompatibleSqlSchema>(detail.clone()).ok();
            }
        } else if kind.contains(PRECONDITION_FAILURE_DETAIL) {
            let failure: PreconditionFailure =
                serde_json::from_value(detail.clone()).unwrap_or_default();
            for violation in failure.violations {
                match violation.kind.as_str() {
                    INCOMPATIBLE_CONNECTOR => rejection.invalid_connectors.push(violation.subject),
                    INCOMPATIBLE_SCHEMA if violation_type.is_none() => {
                        violation_type = Some(ViolationType::IncompatibleSchema);
                    }
                    INACCESSIBLE_SCHEMA if violation_type.is_none() => {
                        violation_type = Some(ViolationType::InaccessibleSchema);
                    }
                    _ => {}
                }
            }
        } else if kind.contains(GRAPHQL_ERROR_DETAIL) {
            if let Ok(error) = serde_json::from_value::<GraphqlError>(detail.clone()) {
                rejection.graphql_errors.push(error);
            }
        }
    }

    if let (Some(incompatible), Some(violation_type)) =
        (rejection.incompatible.as_mut(), violation_type)
    {
        incompatible.violation_type = violation_type;
    }
    (rejection.is_actionable() || !rejection.graphql_errors.is_empty()).then_some(rejection)
}

/// Decode a non-2xx response into the error the engine reasons about.
#[must_use]
pub fn decode_error(http_status: u16, body: &str) -> ApiError {
    let mut status = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_default();
    if status.message.is_empty() {
        status.message = if body.trim().is_empty() {
            format!("HTTP {http_status}")
        } else {
            body.trim().to_string()
        };
    }
    if let Some(rejection) = schema_rejection(&status) {
        return ApiError::SchemaRejected(rejection);
    }

    let message = status.message;
    match (http_status, status.status.as_str()) {
        (404, _) | (_, "NOT_FOUND") => ApiError::NotFound { message },
        (409, _) | (_, "ALREADY_EXISTS") => ApiError::AlreadyExists { message },
        (403, _) | (_, "PERMISSION_DENIED") => ApiError::PermissionDenied { message },
        (_, "FAILED_PRECONDITION") => ApiError::FailedPrecondition { message },
        _ => ApiError::Status {
            code: http_status,
            message,
        },
    }
}

/// Decode the `error` of a finished long-running operation. Codes are gRPC codes.
#[must_use]
pub fn decode_operation_error(operation: &str, status: &RpcStatus) -> ApiError {
    if let Some(rejection) = schema_rejection(status) {
        return ApiError::SchemaRejected(rejection);
    }
    let message = status.message.clone();
    match status.code {
        5 => ApiError::NotFound { message },
        6 => ApiError::AlreadyExists { message },
        7 => ApiError::PermissionDenied { message },
        9 => ApiError::FailedPrecondition { message },
        _ => ApiError::OperationFailed {
            operation: operation.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use dcdeploy_domain::{ViolationType, WarningLevel};
    use dcdeploy_engine::ApiError;
    use serde_json::json;

    use super::{RpcStatus, decode_error, decode_operation_error};

    fn body(error: &serde_json::Value) -> String {
        json!({ "error": error }).to_string()
    }

    #[test]
    fn incompatible_schema_details_become_a_rejection() {
        let body = body(&json!({
            "code": 400,
            "message": "schema is incompatible",
            "status": "FAILED_PRECONDITION",
            "details": [
                {
                    "@type": "type.googleapis.com/google.firebase.dataconnect.v1.IncompatibleSqlSchemaError",
                    "diffs": [
                        { "description": "add column", "sql": "ALTER TABLE \"movie\" ADD COLUMN \"year\" integer" },
                        { "description": "drop table", "sql": "DROP TABLE \"legacy\"", "destructive": true }
                    ],
                    "destructive": true
                },
                {
                    "@type": "type.googleapis.com/google.rpc.PreconditionFailure",
                    "violations": [
                        { "type": "INCOMPATIBLE_SCHEMA" },
                        { "type": "INCOMPATIBLE_CONNECTOR", "subject": "projects/p/locations/l/services/s/connectors/c" }
                    ]
                }
            ]
        }));

        let ApiError::SchemaRejected(rejection) = decode_error(400, &body) else {
            unreachable!("expected a schema rejection");
        };
        let incompatible = rejection.incompatible.expect("incompatible detail");
        assert_eq!(incompatible.diffs.len(), 2);
        assert!(incompatible.destructive);
        assert!(incompatible.diffs[1].destructive);
        assert_eq!(incompatible.violation_type, ViolationType::IncompatibleSchema);
        assert_eq!(
            rejection.invalid_connectors,
            vec!["projects/p/locations/l/services/s/connectors/c".to_string()]
        );
        assert_eq!(rejection.message, "schema is incompatible");
    }

    #[test]
    fn inaccessible_schema_violation_is_carried_over() {
        let body = body(&json!({
            "code": 400,
            "message": "cannot read schema",
            "details": [
                { "@type": "type.googleapis.com/google.firebase.dataconnect.v1.IncompatibleSqlSchemaError" },
                {
                    "@type": "type.googleapis.com/google.rpc.PreconditionFailure",
                    "violations": [{ "type": "INACCESSIBLE_SCHEMA" }]
                }
            ]
        }));

        let ApiError::SchemaRejected(rejection) = decode_error(400, &body) else {
            unreachable!("expected a schema rejection");
        };
        assert_eq!(
            rejection.incompatible.map(|incompatible| incompatible.violation_type),
            Some(ViolationType::InaccessibleSchema)
        );
    }

    #[test]
    fn graphql_error_details_are_decoded() {
        let body = body(&json!({
            "code": 400,
            "message": "invalid schema",
            "status": "INVALID_ARGUMENT",
            "details": [{
                "@type": "type.googleapis.com/google.firebase.dataconnect.v1.GraphqlError",
                "message": "unknown type Foo",
                "extensions": { "file": "schema.gql", "warningLevel": "REQUIRE_ACK" }
            }]
        }));

        let ApiError::SchemaRejected(rejection) = decode_error(400, &body) else {
            unreachable!("expected a schema rejection");
        };
        assert_eq!(rejection.graphql_errors.len(), 1);
        assert_eq!(rejection.graphql_errors[0].message, "unknown type Foo");
        assert_eq!(
            rejection.graphql_errors[0].warning_level(),
            Some(WarningLevel::RequireAck)
        );
    }

    #[test]
    fn plain_errors_map_by_status() {
        let not_found = body(&json!({
            "code": 404,
            "message": "no such service",
            "status": "NOT_FOUND"
        }));
        assert!(matches!(
            decode_error(404, &not_found),
            ApiError::NotFound { ref message } if message == "no such service"
        ));
        assert!(decode_error(409, "").is_already_exists());
        assert!(matches!(
            decode_error(403, "denied"),
            ApiError::PermissionDenied { ref message } if message == "denied"
        ));
        let precondition = body(&json!({
            "code": 400,
            "message": "busy",
            "status": "FAILED_PRECONDITION"
        }));
        assert!(matches!(
            decode_error(400, &precondition),
            ApiError::FailedPrecondition { .. }
        ));
        assert!(matches!(
            decode_error(500, "<html>oops</html>"),
            ApiError::Status { code: 500, ref message } if message == "<html>oops</html>"
        ));
        assert!(matches!(
            decode_error(502, "  "),
            ApiError::Status { ref message, .. } if message == "HTTP 502"
        ));
    }

    #[test]
    fn operation_errors_use_grpc_codes() {
        let status = RpcStatus {
            code: 6,
            message: "exists".to_string(),
            ..RpcStatus::default()
        };
        assert!(decode_operation_error("operations/1", &status).is_already_exists());

        let status = RpcStatus {
            code: 13,
            message: "internal".to_string(),
            ..RpcStatus::default()
        };
        assert!(matches!(
            decode_operation_error("operations/1", &status),
            ApiError::OperationFailed { ref operation, .. } if operation == "operations/1"
        ));
    }
}
