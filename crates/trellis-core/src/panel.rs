//! Controller state for one displayed garden.

use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::feedback::{Alert, ConfigErrors, ServerError};
use crate::model::{GardenForm, GardenRecord};
use crate::transcode::{form_to_server, server_to_form};
use crate::validate::validate_params;

const LOCAL_GARDEN_WARNING: &str = "Connection settings of the local garden cannot be edited.";

/// The displayed garden, its editable form, and the feedback shown with it.
#[derive(Debug, Clone)]
pub struct GardenPanel {
    garden: GardenRecord,
    form: GardenForm,
    alerts: Vec<Alert>,
    field_errors: ConfigErrors,
}

impl GardenPanel {
    pub fn load(record: GardenRecord) -> Self {
        let form = server_to_form(&record);
        Self {
            garden: record,
            form,
            alerts: Vec::new(),
            field_errors: ConfigErrors::new(),
        }
    }

    /// Replace the displayed record, discarding edits and feedback.
    pub fn reload(&mut self, record: GardenRecord) {
        *self = Self::load(record);
    }

    pub const fn garden(&self) -> &GardenRecord {
        &self.garden
    }

    pub fn is_local(&self) -> bool {
        self.garden.is_local()
    }

    pub const fn form(&self) -> &GardenForm {
        &self.form
    }

    /// The form for editing; `None` for the local garden.
    pub fn form_mut(&mut self) -> Option<&mut GardenForm> {
        if self.is_local() {
            None
        } else {
            Some(&mut self.form)
        }
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub const fn field_errors(&self) -> &ConfigErrors {
        &self.field_errors
    }

    /// Turn the current form into the record to patch, or record why not.
    pub fn prepare_submission(&mut self) -> Option<GardenRecord> {
        self.alerts.clear();
        self.field_errors = ConfigErrors::new();

        if self.is_local() {
            self.alerts.push(Alert::warning(LOCAL_GARDEN_WARNING));
            return None;
        }

        let mut record = match form_to_server(&self.garden, &self.form) {
            Ok(record) => record,
            Err(e) => {
                self.alerts.push(Alert::warning(e.to_string()));
                return None;
            }
        };

        let params = record.connection_params.take().unwrap_or_default();
        match validate_params(&params) {
            Ok(checked) => {
                record.connection_params = Some(checked);
                debug!(garden = %record.name, "Prepared connection update");
                Some(record)
            }
            Err(errors) => {
                self.show_config_errors(errors);
                None
            }
        }
    }

    pub fn apply_server_error(&mut self, err: &ServerError) {
        match err {
            ServerError::Config(errors) => self.show_config_errors(errors.clone()),
            ServerError::Generic { .. } => self.alerts.extend(err.alerts()),
        }
    }

    /// React to a real-time event. Returns whether the panel changed.
    pub fn handle_event(&mut self, event: &Event) -> bool {
        let Some(id) = self.garden.id.as_deref() else {
            return false;
        };
        if event.payload_id() != Some(id) {
            return false;
        }

        match event.kind() {
            EventKind::GardenUpdated => {
                match serde_json::from_value::<GardenRecord>(event.payload.clone()) {
                    Ok(record) => {
                        info!(garden = %record.name, "Garden updated on the server, reloading");
                        self.reload(record);
                        true
                    }
                    Err(e) => {
                        warn!(
                            garden = %self.garden.name,
                            error = %e,
                            "Ignoring undecodable garden update"
                        );
                        false
                    }
                }
            }
            EventKind::GardenRemoved => {
                self.alerts.push(Alert::warning(format!(
                    "Garden {} was removed on the server.",
                    self.garden.name
                )));
                true
            }
            _ => false,
        }
    }

    pub fn dismiss_alert(&mut self, index: usize) -> Option<Alert> {
        (index < self.alerts.len()).then(|| self.alerts.remove(index))
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    fn show_config_errors(&mut self, errors: ConfigErrors) {
        self.alerts.extend(errors.alerts());
        self.field_errors.merge(errors);
    }
}
