//! Repairs garden records whose connection params would fail validation.

use tracing::debug;

use crate::model::{ConnectionParams, ConnectionType, GardenRecord, HttpParams, StompParams};
use crate::validate::{validate_http, validate_stomp};

pub const DEFAULT_HOST: &str = "child_hostname";
pub const DEFAULT_PORT: i64 = 2337;

/// A repaired record plus a description of every repair made.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub record: GardenRecord,
    pub notes: Vec<String>,
}

/// Fallback HTTP params for a garden with none usable.
pub fn http_defaults() -> HttpParams {
    HttpParams {
        host: Some(DEFAULT_HOST.to_string()),
        port: Some(DEFAULT_PORT),
        url_prefix: Some("/".to_string()),
        ca_cert: None,
        ca_verify: Some(false),
        ssl: Some(false),
        client_cert: None,
        client_key: None,
    }
}

fn with_defaults_under(given: &HttpParams) -> HttpParams {
    let defaults = http_defaults();
    HttpParams {
        host: given.host.clone().or(defaults.host),
        port: given.port.or(defaults.port),
        url_prefix: given.url_prefix.clone().or(defaults.url_prefix),
        ca_cert: given.ca_cert.clone().or(defaults.ca_cert),
        ca_verify: given.ca_verify.or(defaults.ca_verify),
        ssl: given.ssl.or(defaults.ssl),
        client_cert: given.client_cert.clone().or(defaults.client_cert),
        client_key: given.client_key.clone(),
    }
}

fn clean_or_default_http(
    given: Option<&HttpParams>,
    garden: &str,
    notes: &mut Vec<String>,
) -> HttpParams {
    let Some(given) = given else {
        notes.push(format!(
            "Used defaults for all values of http connection params for garden {garden}"
        ));
        return http_defaults();
    };

    if let Ok(valid) = validate_http(given) {
        return valid;
    }
    if let Ok(valid) = validate_http(&with_defaults_under(given)) {
        notes.push(format!(
            "Used defaults for some values of http connection params for garden {garden}"
        ));
        return valid;
    }
    notes.push(format!(
        "Used defaults for all values of http connection params for garden {garden}"
    ));
    http_defaults()
}

fn clean_or_drop_stomp(
    given: Option<&StompParams>,
    garden: &str,
    notes: &mut Vec<String>,
) -> Option<StompParams> {
    let given = given?;
    match validate_stomp(given) {
        Ok(valid) => Some(valid),
        Err(_) => {
            notes.push(format!(
                "Removed unparseable stomp connection params from garden {garden}"
            ));
            None
        }
    }
}

fn clean_or_drop_http(
    given: Option<&HttpParams>,
    garden: &str,
    notes: &mut Vec<String>,
) -> Option<HttpParams> {
    let given = given?;
    match validate_http(given) {
        Ok(valid) => Some(valid),
        Err(_) => {
            notes.push(format!(
                "Removed unparseable http connection params from garden {garden}"
            ));
            None
        }
    }
}

/// Return `record` with connection params that will pass validation.
///
/// Local gardens lose their params. HTTP gardens always end up with usable
/// HTTP params. A STOMP garden without usable STOMP params is switched to
/// HTTP. Unusable secondary entry points are dropped.
pub fn sanitize(mut record: GardenRecord) -> Sanitized {
    let mut notes = Vec::new();
    let garden = record.name.clone();
    let params = record.connection_params.take().unwrap_or_default();

    if record.connection_type == Some(ConnectionType::Local) {
        if !params.is_empty() {
            notes.push(format!("Removed connection params for local garden {garden}"));
        }
        record.connection_params = None;
        return finish(record, notes);
    }

    let stomp = clean_or_drop_stomp(params.stomp.as_ref(), &garden, &mut notes);

    let cleaned = if record.connection_type == Some(ConnectionType::Http) {
        ConnectionParams {
            http: Some(clean_or_default_http(params.http.as_ref(), &garden, &mut notes)),
            stomp,
        }
    } else if stomp.is_none() {
        notes.push(format!("Forcing connection type to HTTP for garden {garden}"));
        record.connection_type = Some(ConnectionType::Http);
        ConnectionParams {
            http: Some(clean_or_default_http(params.http.as_ref(), &garden, &mut notes)),
            stomp: None,
        }
    } else {
        ConnectionParams {
            http: clean_or_drop_http(params.http.as_ref(), &garden, &mut notes),
            stomp,
        }
    };

    record.connection_params = Some(cleaned);
    finish(record, notes)
}

fn finish(record: GardenRecord, notes: Vec<String>) -> Sanitized {
    for note in &notes {
        debug!(garden = %record.name, "{note}");
    }
    Sanitized { record, notes }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> GardenRecord {
        serde_json::from_value(value).unwrap()
    }

    fn valid_stomp() -> serde_json::Value {
        json!({"host": "broker", "port": 61613, "ssl": {"use_ssl": false}})
    }

    #[test]
    fn local_garden_loses_params() {
        let out = sanitize(record(json!({
            "name": "local",
            "connection_type": "LOCAL",
            "connection_params": {"http": {"host": "h", "port": 1}}
        })));
        assert!(out.record.connection_params.is_none());
        assert_eq!(out.notes.len(), 1);
    }

    #[test]
    fn local_garden_without_params_is_untouched() {
        let out = sanitize(record(json!({"name": "local", "connection_type": "LOCAL"})));
        assert!(out.notes.is_empty());
    }

    #[test]
    fn http_garden_without_params_gets_defaults() {
        let out = sanitize(record(json!({"name": "g", "connection_type": "HTTP"})));
        let params = out.record.connection_params.unwrap();
        assert_eq!(params.http, Some(http_defaults()));
        assert!(params.stomp.is_none());
    }

    #[test]
    fn http_garden_keeps_given_values_and_fills_gaps() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "HTTP",
            "connection_params": {"http": {"host": "web"}}
        })));
        let http = out.record.connection_params.unwrap().http.unwrap();
        assert_eq!(http.host.as_deref(), Some("web"));
        assert_eq!(http.port, Some(DEFAULT_PORT));
        assert!(out.notes[0].contains("some values"));
    }

    #[test]
    fn unsalvageable_http_is_replaced_by_defaults() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "HTTP",
            "connection_params": {"http": {"host": "web", "port": 70000}}
        })));
        let http = out.record.connection_params.unwrap().http.unwrap();
        assert_eq!(http, http_defaults());
        assert!(out.notes[0].contains("all values"));
    }

    #[test]
    fn invalid_stomp_is_dropped_from_http_garden() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "HTTP",
            "connection_params": {
                "http": {"host": "web", "port": 2337},
                "stomp": {"host": "broker"}
            }
        })));
        let params = out.record.connection_params.unwrap();
        assert!(params.stomp.is_none());
        assert_eq!(params.http.unwrap().host.as_deref(), Some("web"));
    }

    #[test]
    fn stomp_garden_without_valid_stomp_is_forced_to_http() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "STOMP",
            "connection_params": {"stomp": {"host": "broker"}}
        })));
        assert_eq!(out.record.connection_type, Some(ConnectionType::Http));
        let params = out.record.connection_params.unwrap();
        assert_eq!(params.http, Some(http_defaults()));
        assert!(params.stomp.is_none());
        assert!(out.notes.iter().any(|n| n.starts_with("Forcing connection type")));
    }

    #[test]
    fn stomp_garden_drops_invalid_http() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "STOMP",
            "connection_params": {"stomp": valid_stomp(), "http": {"port": 0}}
        })));
        assert_eq!(out.record.connection_type, Some(ConnectionType::Stomp));
        let params = out.record.connection_params.unwrap();
        assert!(params.http.is_none());
        assert_eq!(params.stomp.unwrap().host.as_deref(), Some("broker"));
    }

    #[test]
    fn valid_record_passes_without_notes() {
        let out = sanitize(record(json!({
            "name": "g",
            "connection_type": "STOMP",
            "connection_params": {
                "stomp": valid_stomp(),
                "http": {
                    "host": "web", "port": 2337, "url_prefix": "/",
                    "ca_verify": false, "ssl": false
                }
            }
        })));
        assert!(out.notes.is_empty());
        assert!(out.record.connection_params.unwrap().http.is_some());
    }
}
