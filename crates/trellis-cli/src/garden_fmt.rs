//! Garden output formatting helpers.

use std::io::{self, Write};

use trellis_core::events::Event;
use trellis_core::feedback::{Alert, AlertLevel, ConfigErrors};
use trellis_core::model::{GardenForm, GardenRecord, HttpParams, StompForm};

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn opt(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn type_str(garden: &GardenRecord) -> String {
    garden
        .connection_type
        .map_or_else(|| "-".to_string(), |t| t.to_string())
}

pub fn write_garden_table(w: &mut impl Write, gardens: &[GardenRecord]) -> io::Result<()> {
    if gardens.is_empty() {
        return writeln!(w, "No gardens found.");
    }
    writeln!(w, "{:<24} {:<8} {:<12} {:<24}", "NAME", "TYPE", "STATUS", "ID")?;
    for garden in gardens {
        writeln!(
            w,
            "{:<24} {:<8} {:<12} {:<24}",
            truncate(&garden.name, 24),
            type_str(garden),
            opt(garden.status.as_deref()),
            opt(garden.id.as_deref()),
        )?;
    }
    writeln!(w, "\n{} garden(s)", gardens.len())
}

pub fn write_garden_detail(
    w: &mut impl Write,
    garden: &GardenRecord,
    form: &GardenForm,
) -> io::Result<()> {
    writeln!(w, "  Name:     {}", garden.name)?;
    writeln!(w, "  ID:       {}", opt(garden.id.as_deref()))?;
    writeln!(w, "  Type:     {}", type_str(garden))?;
    writeln!(w, "  Status:   {}", opt(garden.status.as_deref()))?;
    if garden.is_local() {
        writeln!(w, "  (local garden, connection settings are not editable)")?;
    }
    if let Some(http) = &form.http {
        write_http(w, http)?;
    }
    if let Some(stomp) = &form.stomp {
        write_stomp(w, stomp)?;
    }
    Ok(())
}

fn write_http(w: &mut impl Write, http: &HttpParams) -> io::Result<()> {
    writeln!(w, "  HTTP:")?;
    writeln!(w, "    Host:       {}", opt(http.host.as_deref()))?;
    writeln!(w, "    Port:       {}", http.port.map_or_else(|| "-".into(), |p| p.to_string()))?;
    writeln!(w, "    URL prefix: {}", opt(http.url_prefix.as_deref()))?;
    writeln!(w, "    SSL:        {}", yes_no(http.ssl))?;
    writeln!(w, "    CA verify:  {}", yes_no(http.ca_verify))?;
    if let Some(cert) = &http.ca_cert {
        writeln!(w, "    CA cert:    {cert}")?;
    }
    if let Some(cert) = &http.client_cert {
        writeln!(w, "    Client cert: {cert}")?;
    }
    Ok(())
}

fn write_stomp(w: &mut impl Write, stomp: &StompForm) -> io::Result<()> {
    writeln!(w, "  STOMP:")?;
    writeln!(w, "    Host:       {}", opt(stomp.host.as_deref()))?;
    writeln!(w, "    Port:       {}", stomp.port.map_or_else(|| "-".into(), |p| p.to_string()))?;
    writeln!(w, "    Send to:    {}", opt(stomp.send_destination.as_deref()))?;
    writeln!(w, "    Subscribe:  {}", opt(stomp.subscribe_destination.as_deref()))?;
    writeln!(w, "    Username:   {}", opt(stomp.username.as_deref()))?;
    if stomp.password.is_some() {
        writeln!(w, "    Password:   ********")?;
    }
    if let Some(ssl) = &stomp.ssl {
        writeln!(w, "    SSL:        {}", yes_no(ssl.use_ssl))?;
    }
    for header in &stomp.headers {
        writeln!(
            w,
            "    Header:     {} = {}",
            opt(header.key.as_deref()),
            opt(header.value.as_deref())
        )?;
    }
    Ok(())
}

fn yes_no(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

pub fn write_alerts(w: &mut impl Write, alerts: &[Alert]) -> io::Result<()> {
    for alert in alerts {
        let tag = match alert.level {
            AlertLevel::Warning => "warning",
            AlertLevel::Danger => "error",
        };
        writeln!(w, "[{tag}] {}", alert.message)?;
    }
    Ok(())
}

pub fn write_field_errors(w: &mut impl Write, errors: &ConfigErrors) -> io::Result<()> {
    for entry_point in errors.entry_points() {
        for (field, messages) in errors.fields(entry_point) {
            for message in messages {
                if field.is_empty() {
                    writeln!(w, "  {entry_point}: {message}")?;
                } else {
                    writeln!(w, "  {entry_point}.{field}: {message}")?;
                }
            }
        }
    }
    Ok(())
}

pub fn write_event(w: &mut impl Write, event: &Event) -> io::Result<()> {
    let subject = event
        .payload
        .get("name")
        .and_then(|v| v.as_str())
        .or(event.garden.as_deref())
        .unwrap_or("-");
    let marker = if event.error == Some(true) { " (error)" } else { "" };
    writeln!(w, "{:<24} {subject}{marker}", event.name)
}
