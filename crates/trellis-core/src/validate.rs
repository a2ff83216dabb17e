//! Client-side mirror of the server's connection-param schema.
//!
//! Errors come back in the same entry point → field → messages shape the
//! server uses, so the panel can treat both sources alike.

use crate::feedback::ConfigErrors;
use crate::model::{ConnectionParams, HTTP, HttpParams, STOMP, StompParams};

pub const MISSING_FIELD: &str = "Missing data for required field.";
pub const PORT_OUT_OF_RANGE: &str = "Value out of range for ports";

const DEFAULT_URL_PREFIX: &str = "/";

/// Exclusive bounds.
fn port_in_range(port: i64) -> bool {
    0 < port && port < 65535
}

fn check_port(errors: &mut ConfigErrors, entry_point: &str, port: Option<i64>) {
    match port {
        None => errors.add(entry_point, "port", MISSING_FIELD),
        Some(port) if !port_in_range(port) => errors.add(entry_point, "port", PORT_OUT_OF_RANGE),
        Some(_) => {}
    }
}

/// Validate HTTP params, filling in `url_prefix`, `ca_verify` and `ssl`
/// defaults on success.
pub fn validate_http(http: &HttpParams) -> Result<HttpParams, ConfigErrors> {
    let mut errors = ConfigErrors::new();
    if http.host.is_none() {
        errors.add(HTTP, "host", MISSING_FIELD);
    }
    check_port(&mut errors, HTTP, http.port);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(HttpParams {
        url_prefix: http
            .url_prefix
            .clone()
            .or_else(|| Some(DEFAULT_URL_PREFIX.to_string())),
        ca_verify: http.ca_verify.or(Some(false)),
        ssl: http.ssl.or(Some(false)),
        ..http.clone()
    })
}

pub fn validate_stomp(stomp: &StompParams) -> Result<StompParams, ConfigErrors> {
    let mut errors = ConfigErrors::new();
    if stomp.host.is_none() {
        errors.add(STOMP, "host", MISSING_FIELD);
    }
    check_port(&mut errors, STOMP, stomp.port);
    match &stomp.ssl {
        None => errors.add(STOMP, "ssl", MISSING_FIELD),
        Some(ssl) if ssl.use_ssl.is_none() => errors.add(STOMP, "ssl.use_ssl", MISSING_FIELD),
        Some(_) => {}
    }

    if errors.is_empty() {
        Ok(stomp.clone())
    } else {
        Err(errors)
    }
}

/// Validate every entry point present, collecting all errors.
pub fn validate_params(params: &ConnectionParams) -> Result<ConnectionParams, ConfigErrors> {
    let mut errors = ConfigErrors::new();
    let http = params
        .http
        .as_ref()
        .map(validate_http)
        .transpose()
        .unwrap_or_else(|e| {
            errors.merge(e);
            None
        });
    let stomp = params
        .stomp
        .as_ref()
        .map(validate_stomp)
        .transpose()
        .unwrap_or_else(|e| {
            errors.merge(e);
            None
        });

    if errors.is_empty() {
        Ok(ConnectionParams { http, stomp })
    } else {
        Err(errors)
    }
}
