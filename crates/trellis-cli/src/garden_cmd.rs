//! Garden subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use trellis_core::config::Config;
use trellis_core::events::{Event, EventRegistry, StreamState};
use trellis_core::model::{
    ConnectionType, GardenForm, GardenRecord, HeaderPair, HttpParams, StompForm,
};
use trellis_core::panel::GardenPanel;
use trellis_core::sanitize::sanitize;

use crate::client::{ClientError, GardenClient};
use crate::garden_fmt::{
    write_alerts, write_event, write_field_errors, write_garden_detail, write_garden_table,
};
use crate::stream::WebsocketTransport;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Garden subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum GardenAction {
    /// List all gardens.
    List,
    /// Show one garden and its connection settings.
    Show {
        /// Garden name.
        name: String,
    },
    /// Create a garden from a JSON record file.
    Create {
        /// Path to the garden record.
        file: PathBuf,
    },
    /// Delete a garden.
    Delete {
        /// Garden name.
        name: String,
    },
    /// Edit a garden's connection settings and submit them.
    Configure(ConfigureArgs),
    /// Ask a garden (or all gardens) to sync.
    Sync {
        /// Garden name; all gardens when omitted.
        name: Option<String>,
    },
    /// Stream garden events until interrupted.
    Watch {
        /// Only show events about this garden.
        name: Option<String>,
    },
    /// Check a connection form file without contacting the server.
    Check {
        /// Path to the form document.
        file: PathBuf,
    },
    /// Repair the connection params of a garden record file.
    Sanitize {
        /// Path to the garden record.
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ConfigureArgs {
    /// Garden name.
    pub name: String,
    /// Replace the whole form with this JSON document before applying flags.
    #[arg(long)]
    pub form: Option<PathBuf>,
    /// Connection type: http or stomp.
    #[arg(long = "type", value_parser = parse_connection_type)]
    pub connection_type: Option<ConnectionType>,
    #[arg(long)]
    pub http_host: Option<String>,
    #[arg(long)]
    pub http_port: Option<i64>,
    #[arg(long)]
    pub stomp_host: Option<String>,
    #[arg(long)]
    pub stomp_port: Option<i64>,
    /// STOMP header as KEY=VALUE; repeatable, appended to existing rows.
    #[arg(long = "stomp-header", value_parser = parse_header)]
    pub stomp_headers: Vec<HeaderPair>,
    /// Drop existing STOMP header rows first.
    #[arg(long)]
    pub clear_stomp_headers: bool,
    /// Print the record that would be submitted instead of sending it.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_connection_type(s: &str) -> Result<ConnectionType, String> {
    match s.to_ascii_lowercase().as_str() {
        "http" => Ok(ConnectionType::Http),
        "stomp" => Ok(ConnectionType::Stomp),
        _ => Err(format!("unknown connection type '{s}' (expected http or stomp)")),
    }
}

fn parse_header(s: &str) -> Result<HeaderPair, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("header '{s}' must be KEY=VALUE"))?;
    Ok(HeaderPair::new(key.trim(), value.trim()))
}

/// Execute a garden subcommand.
pub async fn run(action: GardenAction, config: &Config) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        GardenAction::Check { file } => check(&mut out, &file),
        GardenAction::Sanitize { file } => sanitize_file(&mut out, &file),
        GardenAction::Watch { name } => watch(config, name).await,
        remote => {
            let client = GardenClient::new(&config.api)?;
            execute(&mut out, &client, remote).await
        }
    }
}

/// Execute a subcommand that talks to the garden server.
pub async fn execute(
    out: &mut (impl Write + Send),
    client: &GardenClient,
    action: GardenAction,
) -> anyhow::Result<()> {
    match action {
        GardenAction::List => {
            let gardens = client.list_gardens().await?;
            write_garden_table(out, &gardens)?;
        }
        GardenAction::Show { name } => {
            let panel = GardenPanel::load(client.get_garden(&name).await?);
            write_garden_detail(out, panel.garden(), panel.form())?;
        }
        GardenAction::Create { file } => {
            let record: GardenRecord = read_json(&file)?;
            let created = client.create_garden(&record).await?;
            writeln!(out, "Created garden {}", created.name)?;
        }
        GardenAction::Delete { name } => {
            client.delete_garden(&name).await?;
            writeln!(out, "Deleted garden {name}")?;
        }
        GardenAction::Configure(args) => configure(out, client, &args).await?,
        GardenAction::Sync { name } => {
            client.sync(name.as_deref()).await?;
            match name {
                Some(name) => writeln!(out, "Sync requested for garden {name}")?,
                None => writeln!(out, "Sync requested for all gardens")?,
            }
        }
        GardenAction::Watch { .. } | GardenAction::Check { .. } | GardenAction::Sanitize { .. } => {
            bail!("this command does not talk to the garden API");
        }
    }
    Ok(())
}

async fn configure(
    out: &mut (impl Write + Send),
    client: &GardenClient,
    args: &ConfigureArgs,
) -> anyhow::Result<()> {
    let mut panel = GardenPanel::load(client.get_garden(&args.name).await?);
    if let Some(form) = panel.form_mut() {
        apply_edits(form, args)?;
    }

    let Some(record) = panel.prepare_submission() else {
        write_alerts(out, panel.alerts())?;
        write_field_errors(out, panel.field_errors())?;
        bail!("connection settings for {} were not submitted", args.name);
    };

    if args.dry_run {
        writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        return Ok(());
    }

    match client.update_config(&record).await {
        Ok(updated) => {
            panel.reload(updated);
            writeln!(out, "Updated connection settings for {}", args.name)?;
            write_garden_detail(out, panel.garden(), panel.form())?;
            Ok(())
        }
        Err(ClientError::Server(err)) => {
            panel.apply_server_error(&err);
            write_alerts(out, panel.alerts())?;
            write_field_errors(out, panel.field_errors())?;
            bail!("server rejected connection settings for {}", args.name)
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply the configure flags to a form.
pub fn apply_edits(form: &mut GardenForm, args: &ConfigureArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.form {
        let replacement: GardenForm = read_json(path)?;
        *form = replacement;
    }
    if let Some(connection_type) = args.connection_type {
        form.connection_type = Some(connection_type);
    }

    if args.http_host.is_some() || args.http_port.is_some() {
        let http = form.http.get_or_insert_with(HttpParams::default);
        if let Some(host) = &args.http_host {
            http.host = Some(host.clone());
        }
        if args.http_port.is_some() {
            http.port = args.http_port;
        }
    }

    let touches_stomp = args.stomp_host.is_some()
        || args.stomp_port.is_some()
        || args.clear_stomp_headers
        || !args.stomp_headers.is_empty();
    if touches_stomp {
        let stomp = form.stomp.get_or_insert_with(StompForm::default);
        if let Some(host) = &args.stomp_host {
            stomp.host = Some(host.clone());
        }
        if args.stomp_port.is_some() {
            stomp.port = args.stomp_port;
        }
        if args.clear_stomp_headers {
            stomp.headers.clear();
        }
        stomp.headers.extend(args.stomp_headers.iter().cloned());
    }
    Ok(())
}

fn check(out: &mut impl Write, file: &Path) -> anyhow::Result<()> {
    let form: GardenForm = read_json(file)?;
    let name = file
        .file_stem()
        .map_or_else(|| "form".to_string(), |s| s.to_string_lossy().into_owned());

    let mut panel = GardenPanel::load(GardenRecord {
        id: Some(format!("check-{name}")),
        name,
        connection_type: form.connection_type,
        ..Default::default()
    });
    if let Some(edited) = panel.form_mut() {
        *edited = form;
    }

    match panel.prepare_submission() {
        Some(record) => {
            writeln!(out, "Connection settings are valid.")?;
            writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(&record.connection_params)?
            )?;
            Ok(())
        }
        None => {
            write_alerts(out, panel.alerts())?;
            write_field_errors(out, panel.field_errors())?;
            bail!("{} is not a valid connection form", file.display())
        }
    }
}

fn sanitize_file(out: &mut impl Write, file: &Path) -> anyhow::Result<()> {
    let record: GardenRecord = read_json(file)?;
    let sanitized = sanitize(record);
    for note in &sanitized.notes {
        writeln!(out, "[info] {note}")?;
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&sanitized.record)?)?;
    Ok(())
}

async fn watch(config: &Config, name: Option<String>) -> anyhow::Result<()> {
    let registry = EventRegistry::new(WebsocketTransport, config.events_url()?);
    registry
        .add_callback("watch", move |event: &Event| {
            if name.as_deref().is_some_and(|n| !concerns(event, n)) {
                return;
            }
            let _ = write_event(&mut io::stdout().lock(), event);
        })
        .await;
    registry.connect().await?;
    info!("Watching garden events, press Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            () = tokio::time::sleep(RECONNECT_DELAY) => {
                if registry.state().await == StreamState::Closed {
                    warn!("Event stream closed, reconnecting");
                    if let Err(e) = registry.connect().await {
                        warn!(error = %e, "Reconnect failed");
                    }
                }
            }
        }
    }

    registry.close().await;
    Ok(())
}

/// Whether `event` is about the garden called `name`.
fn concerns(event: &Event, name: &str) -> bool {
    event.payload.get("name").and_then(|v| v.as_str()) == Some(name)
        || event.garden.as_deref() == Some(name)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    fn write_file(contents: &serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn header_flag_parses_key_value() {
        assert_eq!(parse_header("x-a = 1").unwrap(), HeaderPair::new("x-a", "1"));
        assert!(parse_header("novalue").is_err());
    }

    #[test]
    fn connection_type_flag_is_case_insensitive() {
        assert_eq!(parse_connection_type("STOMP").unwrap(), ConnectionType::Stomp);
        assert!(parse_connection_type("local").is_err());
    }

    #[test]
    fn edits_create_missing_entry_points() {
        let mut form = GardenForm::default();
        let args = ConfigureArgs {
            name: "g".into(),
            connection_type: Some(ConnectionType::Stomp),
            stomp_host: Some("broker".into()),
            stomp_headers: vec![HeaderPair::new("k", "v")],
            ..Default::default()
        };
        apply_edits(&mut form, &args).unwrap();

        assert_eq!(form.connection_type, Some(ConnectionType::Stomp));
        assert!(form.http.is_none());
        let stomp = form.stomp.unwrap();
        assert_eq!(stomp.host.as_deref(), Some("broker"));
        assert_eq!(stomp.headers, vec![HeaderPair::new("k", "v")]);
    }

    #[test]
    fn clear_headers_runs_before_append() {
        let mut form = GardenForm {
            stomp: Some(StompForm {
                headers: vec![HeaderPair::new("old", "1")],
                ..Default::default()
            }),
            ..Default::default()
        };
        let args = ConfigureArgs {
            clear_stomp_headers: true,
            stomp_headers: vec![HeaderPair::new("new", "2")],
            ..Default::default()
        };
        apply_edits(&mut form, &args).unwrap();
        assert_eq!(form.stomp.unwrap().headers, vec![HeaderPair::new("new", "2")]);
    }

    #[test]
    fn form_file_replaces_form() {
        let file = write_file(&json!({
            "connection_type": "HTTP", "http": {"host": "web", "port": 80}
        }));
        let mut form = GardenForm {
            stomp: Some(StompForm::default()),
            ..Default::default()
        };
        let args = ConfigureArgs {
            form: Some(file.path().to_path_buf()),
            http_port: Some(8080),
            ..Default::default()
        };
        apply_edits(&mut form, &args).unwrap();
        assert!(form.stomp.is_none());
        assert_eq!(form.http.unwrap().port, Some(8080));
    }

    #[test]
    fn check_accepts_valid_form() {
        let file = write_file(&json!({
            "connection_type": "HTTP", "http": {"host": "web", "port": 2337}
        }));
        let mut out = Vec::new();
        check(&mut out, file.path()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Connection settings are valid."));
        assert!(text.contains("\"url_prefix\": \"/\""));
    }

    #[test]
    fn check_reports_field_errors() {
        let file = write_file(&json!({
            "connection_type": "HTTP", "http": {"host": "web", "port": 0}
        }));
        let mut out = Vec::new();
        assert!(check(&mut out, file.path()).is_err());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("http.port: Value out of range for ports"));
    }

    #[test]
    fn check_rejects_empty_form() {
        let file = write_file(&json!({
            "connection_type": "HTTP",
            "http": {"host": ""},
            "stomp": {"headers": []}
        }));
        let mut out = Vec::new();
        assert!(check(&mut out, file.path()).is_err());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("at least one of HTTP or STOMP"));
    }

    #[test]
    fn sanitize_prints_notes_and_record() {
        let file = write_file(&json!({"name": "g", "connection_type": "STOMP"}));
        let mut out = Vec::new();
        sanitize_file(&mut out, file.path()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[info] Forcing connection type to HTTP for garden g"));
        assert!(text.contains("child_hostname"));
    }

    #[test]
    fn concerns_matches_payload_or_origin() {
        let event: Event = serde_json::from_value(json!({
            "name": "GARDEN_SYNC",
            "garden": "parent",
            "payload": {"name": "child"}
        }))
        .unwrap();
        assert!(concerns(&event, "child"));
        assert!(concerns(&event, "parent"));
        assert!(!concerns(&event, "other"));
    }
}
