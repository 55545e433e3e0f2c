use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::MAX_CUSTOM_FIELDS;
use crate::engine::TicketEngine;
use crate::models::{Category, FieldDef, FieldStyle, GuildConfig, Member, Ticket};
use crate::{Result, TicketError};

/// The always-present multi-line input every submission form starts with.
pub const ISSUE_FIELD_NAME: &str = "issue";
pub const ISSUE_FIELD_LABEL: &str = "What's the issue?";

const MAX_PANEL_OPTIONS: usize = 25;
const MAX_OPTION_DESCRIPTION: usize = 100;

/// Category-selection panel content, a pure projection of the config store.
/// The transport renders this as a dropdown message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelView {
    pub title: String,
    pub description: String,
    pub options: Vec<PanelOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelOption {
    pub label: String,
    pub description: Option<String>,
    pub value: String,
}

/// One submission-form input: either the fixed issue descriptor or a
/// configured field. Validation runs uniformly over the combined sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub required: bool,
    pub style: FieldStyle,
    pub min_len: Option<i64>,
    pub max_len: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TicketForm {
    pub category_name: String,
    pub inputs: Vec<FieldDescriptor>,
}

pub fn render_panel(config: &GuildConfig, categories: &[Category]) -> Result<PanelView> {
    if categories.is_empty() {
        return Err(TicketError::Validation(
            "add at least one category before posting the panel".into(),
        ));
    }
    let contact = config.contact_name.as_deref().unwrap_or("Support");
    let title = config
        .panel_title
        .clone()
        .unwrap_or_else(|| "Contact Support".to_string());
    let description = config
        .panel_description
        .clone()
        .unwrap_or_else(|| format!("Contact {contact} directly for issues."));
    let options = categories
        .iter()
        .take(MAX_PANEL_OPTIONS)
        .map(|c| PanelOption {
            label: c.name.clone(),
            description: c
                .placeholder
                .as_deref()
                .map(|p| p.chars().take(MAX_OPTION_DESCRIPTION).collect()),
            value: format!("cat:{}", c.name),
        })
        .collect();
    Ok(PanelView {
        title,
        description,
        options,
    })
}

/// Category name carried in a panel option value, `None` for values this
/// crate did not mint.
pub fn parse_panel_value(value: &str) -> Option<&str> {
    value.strip_prefix("cat:")
}

/// Combines the fixed issue descriptor with the category's configured
/// fields, in configured order. A configured field that shadows the fixed
/// label is skipped; anything past the platform input limit is dropped.
pub fn build_form(category: &Category, fields: &[FieldDef]) -> TicketForm {
    let mut inputs = vec![FieldDescriptor {
        name: ISSUE_FIELD_NAME.to_string(),
        label: ISSUE_FIELD_LABEL.to_string(),
        required: true,
        style: FieldStyle::MultiLine,
        min_len: None,
        max_len: None,
    }];
    inputs.extend(
        fields
            .iter()
            .filter(|f| !f.label.trim().eq_ignore_ascii_case(ISSUE_FIELD_LABEL))
            .take(MAX_CUSTOM_FIELDS)
            .map(|f| FieldDescriptor {
                name: f.name.clone(),
                label: f.label.clone(),
                required: f.required,
                style: f.style,
                min_len: f.min_len,
                max_len: f.max_len,
            }),
    );
    TicketForm {
        category_name: category.name.clone(),
        inputs,
    }
}

/// Checks submitted values against the form and serializes them into the
/// field-name to value map stored as the ticket's first message. Fails with
/// `Validation` before any state change.
pub fn validate_submission(
    form: &TicketForm,
    values: &HashMap<String, String>,
) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for input in &form.inputs {
        let value = values.get(&input.name).map(|v| v.trim()).unwrap_or("");
        if input.required && value.is_empty() {
            return Err(TicketError::Validation(format!(
                "'{}' is required",
                input.label
            )));
        }
        if !value.is_empty() {
            if let Some(min) = input.min_len {
                if (value.chars().count() as i64) < min {
                    return Err(TicketError::Validation(format!(
                        "'{}' must be at least {min} characters",
                        input.label
                    )));
                }
            }
            if let Some(max) = input.max_len {
                if (value.chars().count() as i64) > max {
                    return Err(TicketError::Validation(format!(
                        "'{}' must be at most {max} characters",
                        input.label
                    )));
                }
            }
        }
        map.insert(input.name.clone(), serde_json::Value::from(value));
    }
    Ok(serde_json::Value::Object(map))
}

/// Full submission path: resolve the category, validate against its form
/// and hand the serialized field map to the lifecycle engine.
pub async fn submit(
    engine: &TicketEngine,
    guild_id: i64,
    opener: &Member,
    category_name: &str,
    values: &HashMap<String, String>,
) -> Result<Ticket> {
    let category = engine.config().category(guild_id, category_name).await?;
    let fields = engine.config().fields(guild_id, &category.name).await?;
    let form = build_form(&category, &fields);
    let content = validate_submission(&form, values)?;
    engine.open_ticket(guild_id, opener, &category, content).await
}
