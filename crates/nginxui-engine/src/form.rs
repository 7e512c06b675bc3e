//! Encoding of an action into the firmware's "apply settings" form.

use serde::Serialize;

use crate::types::{EngineResult, SubmitAction};

/// Page the firmware associates with the add-on.
pub const DEFAULT_PAGE: &str = "nginxui.asp";
/// Service-event script name dispatched by `action_script`.
pub const DEFAULT_SCRIPT: &str = "nginxui";

/// Fixed parts of the form that do not vary per request.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    pub page: String,
    pub script: String,
}

impl Default for FormTemplate {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
        }
    }
}

impl FormTemplate {
    /// Build the ordered `(name, value)` list for one submission.
    ///
    /// `nginxui_config` is only present when `config` serializes to
    /// something other than `null`.
    pub fn fields<C: Serialize + ?Sized>(
        &self,
        action: SubmitAction,
        config: Option<&C>,
        wait_secs: u64,
    ) -> EngineResult<Vec<(&'static str, String)>> {
        let mut fields = vec![
            ("current_page", self.page.clone()),
            ("next_page", self.page.clone()),
            ("group_id", String::new()),
            ("modified", "0".to_string()),
            ("action_mode", "apply".to_string()),
            ("action_wait", wait_secs.to_string()),
            ("first_time", String::new()),
            ("action_script", self.script.clone()),
            ("amng_custom", action.as_str().to_string()),
        ];

        if let Some(config) = config {
            let value = serde_json::to_value(config)?;
            if !value.is_null() {
                fields.push(("nginxui_config", serde_json::to_string(&value)?));
            }
        }

        Ok(fields)
    }
}
