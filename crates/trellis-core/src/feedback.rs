//! User-facing feedback: alerts, per-field config errors, and the parsing of
//! failed server responses into either.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Shown when a failed response carries nothing readable.
pub const GENERIC_SERVER_MESSAGE: &str =
    "An error occurred on the server. Please check the server logs for more details.";

/// Severity of an alert banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Danger,
}

/// A dismissible banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Danger,
            message: message.into(),
        }
    }
}

/// Validation messages keyed by entry point, then by field.
///
/// Nested fields (the STOMP `ssl` block) use dotted names such as
/// `ssl.use_ssl`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ConfigErrors(BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(
        &mut self,
        entry_point: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.0
            .entry(entry_point.into())
            .or_default()
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: Self) {
        for (entry_point, fields) in other.0 {
            let target = self.0.entry(entry_point).or_default();
            for (field, messages) in fields {
                target.entry(field).or_default().extend(messages);
            }
        }
    }

    /// Entry points with at least one error, in name order.
    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(field, messages)` for one entry point.
    pub fn fields(&self, entry_point: &str) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .get(entry_point)
            .into_iter()
            .flat_map(|fields| fields.iter().map(|(f, m)| (f.as_str(), m.as_slice())))
    }

    pub fn messages(&self, entry_point: &str, field: &str) -> &[String] {
        self.0
            .get(entry_point)
            .and_then(|fields| fields.get(field))
            .map_or(&[], Vec::as_slice)
    }

    /// Read a `{entry_point: {field: messages}}` document. Messages may be a
    /// list or a single string; nested objects are flattened to dotted field
    /// names. Returns `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entry_points = value.as_object()?;
        let mut errors = Self::new();
        for (entry_point, fields) in entry_points {
            match fields {
                Value::Object(_) => collect_field_messages(&mut errors, entry_point, "", fields),
                other => {
                    if let Some(message) = message_text(other) {
                        errors.add(entry_point, "", message);
                    }
                }
            }
        }
        Some(errors)
    }

    /// One warning per offending entry point.
    pub fn alerts(&self) -> Vec<Alert> {
        self.entry_points()
            .map(|entry_point| {
                Alert::warning(format!(
                    "The {} connection parameters were rejected; \
                     correct the highlighted fields and try again.",
                    entry_point.to_uppercase()
                ))
            })
            .collect()
    }
}

fn collect_field_messages(
    errors: &mut ConfigErrors,
    entry_point: &str,
    prefix: &str,
    value: &Value,
) {
    let Value::Object(fields) = value else {
        return;
    };
    for (field, messages) in fields {
        let name = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}.{field}")
        };
        match messages {
            Value::Object(_) => collect_field_messages(errors, entry_point, &name, messages),
            Value::Array(items) => {
                for item in items {
                    if let Some(message) = message_text(item) {
                        errors.add(entry_point, name.as_str(), message);
                    }
                }
            }
            other => {
                if let Some(message) = message_text(other) {
                    errors.add(entry_point, name.as_str(), message);
                }
            }
        }
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// A failed server response, classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The server rejected specific connection fields.
    #[error("server rejected the connection configuration")]
    Config(ConfigErrors),

    /// Anything else.
    #[error("server error ({status}): {message}")]
    Generic { status: u16, message: String },
}

impl ServerError {
    /// Classify a failed response from its status and body.
    ///
    /// A body whose `message` is a JSON object (or a string holding one) with
    /// a `connection_params` mapping is a [`ServerError::Config`]. Otherwise
    /// the readable message is extracted best-effort.
    pub fn from_response(status: u16, body: &str) -> Self {
        let Ok(document) = serde_json::from_str::<Value>(body) else {
            return Self::generic(status, body.trim());
        };

        let message = document.get("message").or_else(|| document.get("error"));
        let structured = match message {
            Some(Value::Object(_)) => message.cloned(),
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .ok()
                .filter(Value::is_object),
            _ => None,
        };

        if let Some(errors) = structured
            .as_ref()
            .and_then(|m| m.get("connection_params"))
            .and_then(ConfigErrors::from_value)
            .filter(|errors| !errors.is_empty())
        {
            return Self::Config(errors);
        }

        let text = match message {
            Some(Value::String(text)) => text.as_str(),
            _ => "",
        };
        Self::generic(status, text)
    }

    fn generic(status: u16, message: &str) -> Self {
        let message = if message.is_empty() {
            GENERIC_SERVER_MESSAGE.to_string()
        } else {
            message.to_string()
        };
        Self::Generic { status, message }
    }

    /// The banners to show for this error.
    pub fn alerts(&self) -> Vec<Alert> {
        match self {
            Self::Config(errors) => errors.alerts(),
            Self::Generic { message, .. } => vec![Alert::danger(message.clone())],
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_message_becomes_config_error() {
        let body = json!({
            "message": {
                "connection_params": {
                    "http": {
                        "host": ["Missing data for required field."],
                        "port": ["Missing data for required field."]
                    },
                    "stomp": {"ssl": {"use_ssl": ["Missing data for required field."]}}
                }
            }
        })
        .to_string();

        let ServerError::Config(errors) = ServerError::from_response(400, &body) else {
            panic!("expected config error");
        };
        assert_eq!(errors.entry_points().collect::<Vec<_>>(), vec!["http", "stomp"]);
        assert_eq!(
            errors.messages("http", "host"),
            ["Missing data for required field.".to_string()]
        );
        assert_eq!(errors.messages("stomp", "ssl.use_ssl").len(), 1);
        assert_eq!(errors.alerts().len(), 2);
    }

    #[test]
    fn message_string_holding_json_is_parsed() {
        let inner = json!({
            "connection_params": {"stomp": {"port": "Value out of range for ports"}}
        });
        let body = json!({"message": inner.to_string()}).to_string();

        let ServerError::Config(errors) = ServerError::from_response(400, &body) else {
            panic!("expected config error");
        };
        assert_eq!(
            errors.messages("stomp", "port"),
            ["Value out of range for ports".to_string()]
        );
    }

    #[test]
    fn python_repr_message_is_not_coerced() {
        let body = json!({"message": "{'connection_params': {'http': {'host': ['bad']}}}"})
            .to_string();
        let err = ServerError::from_response(400, &body);
        assert!(matches!(err, ServerError::Generic { status: 400, .. }));
    }

    #[test]
    fn plain_message_becomes_danger_alert() {
        let body = json!({"message": "Garden not found"}).to_string();
        let err = ServerError::from_response(404, &body);
        assert_eq!(
            err,
            ServerError::Generic {
                status: 404,
                message: "Garden not found".into()
            }
        );
        assert_eq!(err.alerts(), vec![Alert::danger("Garden not found")]);
    }

    #[test]
    fn empty_body_falls_back_to_server_logs_message() {
        let err = ServerError::from_response(500, "");
        assert_eq!(err.alerts(), vec![Alert::danger(GENERIC_SERVER_MESSAGE)]);

        let err = ServerError::from_response(500, "{}");
        assert_eq!(err.alerts(), vec![Alert::danger(GENERIC_SERVER_MESSAGE)]);
    }

    #[test]
    fn non_json_body_is_used_verbatim() {
        let err = ServerError::from_response(502, "Bad Gateway\n");
        assert_eq!(err.alerts(), vec![Alert::danger("Bad Gateway")]);
    }

    #[test]
    fn merge_combines_messages_per_field() {
        let mut a = ConfigErrors::new();
        a.add("http", "port", "one");
        let mut b = ConfigErrors::new();
        b.add("http", "port", "two");
        b.add("stomp", "host", "three");
        a.merge(b);

        assert_eq!(a.messages("http", "port").len(), 2);
        assert_eq!(a.fields("stomp").count(), 1);
    }
}
