//! Normalizes server error payloads into user-facing messages.
//!
//! The admin API answers failures with several body shapes: Pydantic style
//! validation errors, database errors wrapped in a 422, custom form rejections,
//! plain `detail` strings and arbitrary text from proxies. Bodies are first
//! classified into [`ServerError`] and then rendered, so unknown shapes still
//! produce a message (the body serialized as JSON).

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// A response body as received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// Interpret raw response text. JSON strings are unwrapped to text.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::String(s)) => ResponseBody::Text(s),
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Json(value) => write!(f, "{}", value),
            ResponseBody::Text(text) => f.write_str(text),
        }
    }
}

/// One entry of a validation error's `detail` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<Value>,
    #[serde(default)]
    pub msg: Value,
}

impl FieldError {
    /// The field name is the last `loc` element; the first one is usually the
    /// fixed `"body"` marker.
    pub fn field(&self) -> Option<String> {
        self.loc.last().map(text_of)
    }

    pub fn message(&self) -> String {
        let msg = text_of(&self.msg);
        match self.field() {
            Some(field) => format!("{} field - {}", field, msg),
            None => msg,
        }
    }
}

/// Server error payloads, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerError {
    Database(String),
    Validation(Vec<FieldError>),
    CustomForm(String),
    MethodNotAllowed(String),
    /// Anything else, already rendered to text.
    Raw(String),
}

impl ServerError {
    pub fn classify(body: &ResponseBody, status: u16) -> Self {
        let object = match body {
            ResponseBody::Text(text) if text.trim().is_empty() => {
                return ServerError::Raw(status_text(status))
            }
            ResponseBody::Text(text) => return ServerError::Raw(text.clone()),
            ResponseBody::Json(Value::Object(object)) => object,
            ResponseBody::Json(other) => return ServerError::Raw(other.to_string()),
        };

        match status {
            422 => {
                if let Some(db_error) = object.get("db_error").filter(|v| is_present(v)) {
                    return ServerError::Database(text_of(db_error));
                }
                if let Some(errors) = object.get("detail").and_then(field_errors) {
                    return ServerError::Validation(errors);
                }
                if let Some(error) = object.get("custom_form_error").filter(|v| is_present(v)) {
                    return ServerError::CustomForm(text_of(error));
                }
            }
            405 => {
                if let Some(detail) = object.get("detail").filter(|v| is_present(v)) {
                    return ServerError::MethodNotAllowed(text_of(detail));
                }
            }
            _ => {}
        }

        ServerError::Raw(Value::Object(object.clone()).to_string())
    }

    /// Render as user-facing messages. Never empty.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ServerError::Database(error) => vec![format!("Database error: {}", error)],
            ServerError::Validation(errors) => errors.iter().map(FieldError::message).collect(),
            ServerError::CustomForm(text)
            | ServerError::MethodNotAllowed(text)
            | ServerError::Raw(text) => vec![text.clone()],
        }
    }
}

/// Convert an error body and status into messages for display.
pub fn parse_error_response(body: &ResponseBody, status: u16) -> Vec<String> {
    ServerError::classify(body, status).messages()
}

fn field_errors(detail: &Value) -> Option<Vec<FieldError>> {
    let items = detail.as_array().filter(|items| !items.is_empty())?;
    items
        .iter()
        .map(|item| serde_json::from_value::<FieldError>(item.clone()).ok())
        .collect()
}

/// Truthiness as the admin UI sees it: null, false, zero and "" are absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `500 Internal Server Error`, or just the code when it's non-standard.
fn status_text(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason());
    match reason {
        Some(reason) => format!("{} {}", status, reason),
        None => status.to_string(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn json_body(value: Value) -> ResponseBody {
        ResponseBody::Json(value)
    }

    #[test]
    fn test_validation_uses_last_loc_element() {
        let body = json_body(json!({"detail": [{"loc": ["body", "email"], "msg": "invalid"}]}));
        assert_eq!(parse_error_response(&body, 422), vec!["email field - invalid"]);
    }

    #[test]
    fn test_validation_multiple_fields() {
        let body = json_body(json!({"detail": [
            {"loc": ["body", "name"], "msg": "field required", "type": "value_error.missing"},
            {"loc": ["body", "tags", 1], "msg": "not an integer"}
        ]}));
        assert_eq!(
            parse_error_response(&body, 422),
            vec!["name field - field required", "1 field - not an integer"]
        );
    }

    #[test]
    fn test_database_error_preferred() {
        let body = json_body(json!({"db_error": "unique violation", "detail": []}));
        assert_eq!(
            parse_error_response(&body, 422),
            vec!["Database error: unique violation"]
        );
    }

    #[test]
    fn test_custom_form_error() {
        let body = json_body(json!({"custom_form_error": "Email server unavailable"}));
        assert_eq!(parse_error_response(&body, 422), vec!["Email server unavailable"]);
    }

    #[test]
    fn test_unrecognized_422_is_serialized() {
        let body = json_body(json!({"unexpected": true}));
        assert_eq!(parse_error_response(&body, 422), vec![r#"{"unexpected":true}"#]);
    }

    #[test]
    fn test_empty_detail_falls_back_to_json() {
        let body = json_body(json!({"detail": []}));
        assert_eq!(parse_error_response(&body, 422), vec![r#"{"detail":[]}"#]);
    }

    #[test]
    fn test_422_plain_string() {
        let body = ResponseBody::Text("Bad input".into());
        assert_eq!(parse_error_response(&body, 422), vec!["Bad input"]);
    }

    #[test]
    fn test_method_not_allowed() {
        assert_eq!(
            parse_error_response(&ResponseBody::Text("Not allowed".into()), 405),
            vec!["Not allowed"]
        );
        let body = json_body(json!({"detail": "Method Not Allowed"}));
        assert_eq!(parse_error_response(&body, 405), vec!["Method Not Allowed"]);
        let body = json_body(json!({"error": "nope"}));
        assert_eq!(parse_error_response(&body, 405), vec![r#"{"error":"nope"}"#]);
    }

    #[test]
    fn test_other_status_serializes_object() {
        let body = json_body(json!({"detail": "Internal error"}));
        assert_eq!(
            parse_error_response(&body, 500),
            vec![r#"{"detail":"Internal error"}"#]
        );
        let body = ResponseBody::Text("Bad gateway".into());
        assert_eq!(parse_error_response(&body, 502), vec!["Bad gateway"]);
    }

    #[test]
    fn test_falsy_db_error_is_ignored() {
        for db_error in [json!(false), json!(0), json!(""), json!(null)] {
            let body = json_body(json!({
                "db_error": db_error,
                "detail": [{"loc": ["body", "name"], "msg": "field required"}]
            }));
            assert_eq!(parse_error_response(&body, 422), vec!["name field - field required"]);
        }
    }

    #[test]
    fn test_empty_body_uses_status_text() {
        let empty = ResponseBody::from_text(String::new());
        assert_eq!(parse_error_response(&empty, 500), vec!["500 Internal Server Error"]);
        assert_eq!(
            parse_error_response(&ResponseBody::Text("  ".into()), 502),
            vec!["502 Bad Gateway"]
        );
        assert_eq!(parse_error_response(&empty, 599), vec!["599"]);
    }

    #[test]
    fn test_from_text_detects_json() {
        assert_eq!(
            ResponseBody::from_text(r#"{"detail":"x"}"#.into()),
            json_body(json!({"detail": "x"}))
        );
        assert_eq!(
            ResponseBody::from_text(r#""quoted""#.into()),
            ResponseBody::Text("quoted".into())
        );
        assert_eq!(
            ResponseBody::from_text("<html>oops</html>".into()),
            ResponseBody::Text("<html>oops</html>".into())
        );
    }

    #[test]
    fn test_classify_variants() {
        let body = json_body(json!({"detail": [{"loc": ["body", "email"], "msg": "invalid"}]}));
        match ServerError::classify(&body, 422) {
            ServerError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field().as_deref(), Some("email"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
