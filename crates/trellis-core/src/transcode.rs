//! Record/form transcoding.
//!
//! [`server_to_form`] materialises a fetched record into the editable form,
//! [`form_to_server`] turns an edited form back into a record ready for a
//! `config` patch. Both are pure.

use thiserror::Error;
use tracing::debug;

use crate::model::{
    ConnectionParams, GardenForm, GardenRecord, HeaderPair, HttpParams, StompForm, StompParams,
    StompSsl,
};

/// The form could not be turned into a submittable record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    #[error("at least one of HTTP or STOMP connection must be configured")]
    NoEntryPointConfigured,
}

/// Build the form model for a record.
///
/// Empty strings are dropped at every depth and STOMP headers become an
/// ordered list of rows. A record without connection params yields a form
/// with no entry points.
pub fn server_to_form(record: &GardenRecord) -> GardenForm {
    let params = record.connection_params.as_ref();
    GardenForm {
        connection_type: record.connection_type,
        http: params.and_then(|p| p.http.as_ref()).map(prune_http),
        stomp: params.and_then(|p| p.stomp.as_ref()).map(stomp_to_form),
    }
}

/// Build the record to submit from an edited form.
///
/// `base` supplies every field the form does not represent. Header rows
/// missing a key or a value are dropped; entry points that end up empty are
/// left out. Fails when no entry point is left.
pub fn form_to_server(
    base: &GardenRecord,
    form: &GardenForm,
) -> Result<GardenRecord, TranscodeError> {
    let http = form.http.clone().filter(|http| !http.is_empty());
    let stomp = form
        .stomp
        .as_ref()
        .map(stomp_from_form)
        .filter(|stomp| !stomp.is_empty());

    if http.is_none() && stomp.is_none() {
        debug!(garden = %base.name, "Rejecting form with no configured entry point");
        return Err(TranscodeError::NoEntryPointConfigured);
    }

    Ok(GardenRecord {
        connection_type: form.connection_type.or(base.connection_type),
        connection_params: Some(ConnectionParams { http, stomp }),
        ..base.clone()
    })
}

fn prune(value: Option<&String>) -> Option<String> {
    value.filter(|text| !text.is_empty()).cloned()
}

fn prune_http(http: &HttpParams) -> HttpParams {
    HttpParams {
        host: prune(http.host.as_ref()),
        port: http.port,
        url_prefix: prune(http.url_prefix.as_ref()),
        ca_cert: prune(http.ca_cert.as_ref()),
        ca_verify: http.ca_verify,
        ssl: http.ssl,
        client_cert: prune(http.client_cert.as_ref()),
        client_key: prune(http.client_key.as_ref()),
    }
}

fn prune_ssl(ssl: &StompSsl) -> StompSsl {
    StompSsl {
        use_ssl: ssl.use_ssl,
        ca_cert: prune(ssl.ca_cert.as_ref()),
        client_cert: prune(ssl.client_cert.as_ref()),
        client_key: prune(ssl.client_key.as_ref()),
    }
}

fn stomp_to_form(stomp: &StompParams) -> StompForm {
    StompForm {
        host: prune(stomp.host.as_ref()),
        port: stomp.port,
        send_destination: prune(stomp.send_destination.as_ref()),
        subscribe_destination: prune(stomp.subscribe_destination.as_ref()),
        username: prune(stomp.username.as_ref()),
        password: prune(stomp.password.as_ref()),
        ssl: stomp.ssl.as_ref().map(prune_ssl),
        headers: stomp
            .headers
            .iter()
            .map(|header| HeaderPair {
                key: prune(Some(&header.key)),
                value: prune(Some(&header.value)),
            })
            .collect(),
    }
}

fn stomp_from_form(form: &StompForm) -> StompParams {
    StompParams {
        host: form.host.clone(),
        port: form.port,
        send_destination: form.send_destination.clone(),
        subscribe_destination: form.subscribe_destination.clone(),
        username: form.username.clone(),
        password: form.password.clone(),
        ssl: form.ssl.clone(),
        headers: form
            .headers
            .iter()
            .filter_map(HeaderPair::complete)
            .collect(),
    }
}
