//! Form definitions and the process-wide registry.
//!
//! Forms are declared in the config file and collected into a `FormRegistry`
//! at startup. The registry is read-only after construction and passed by
//! reference to anything that needs to resolve a slug into a title, field
//! list, or notification recipients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FormboxError, Result};

/// Kind of a form field — drives sanitization and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Email,
    Textarea,
}

/// A single field of a form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// A registered form: its fields, validation rules, and notification targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDefinition {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Fixed notification recipients for every submission.
    #[serde(default)]
    pub notify: Vec<String>,
    /// Optional data field holding extra recipients (comma/semicolon separated),
    /// e.g. to copy the submitter on their own entry.
    #[serde(default)]
    pub notify_from_field: Option<String>,
}

impl FormDefinition {
    /// Label for a field name, or None if the form has no such field.
    pub fn field_label(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.label.as_str())
    }

    /// Sanitize raw submitted values: keep only declared fields, trim strings,
    /// strip illegal characters from email fields.
    pub fn sanitize(&self, input: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for field in &self.fields {
            let Some(value) = input.get(&field.name) else {
                continue;
            };
            let clean = match (field.kind, value) {
                (FieldKind::Email, Value::String(s)) => {
                    Value::String(sanitize_email(s))
                }
                (_, Value::String(s)) => Value::String(s.trim().to_string()),
                // Non-string values (arrays from multi-selects, numbers) pass through.
                (_, other) => other.clone(),
            };
            out.insert(field.name.clone(), clean);
        }
        out
    }

    /// Validate sanitized values. Returns per-field error messages, empty if valid.
    pub fn validate(&self, values: &Map<String, Value>) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        for field in &self.fields {
            let value = values.get(&field.name);
            let text = value.and_then(|v| v.as_str()).unwrap_or("");
            let empty = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if field.required && empty {
                errors.insert(field.name.clone(), "Este campo es obligatorio".to_string());
                continue;
            }
            if field.kind == FieldKind::Email && !empty && !is_valid_email(text) {
                errors.insert(
                    field.name.clone(),
                    "Dirección de correo inválida".to_string(),
                );
            }
        }
        errors
    }

    /// Notification recipients for a submission: the fixed `notify` list plus
    /// any addresses found in the configured `notify_from_field` of the data.
    pub fn notification_emails(&self, data: &Map<String, Value>) -> Vec<String> {
        let mut emails: Vec<String> = self
            .notify
            .iter()
            .map(|e| sanitize_email(e))
            .filter(|e| is_valid_email(e))
            .collect();
        if let Some(field) = &self.notify_from_field
            && let Some(Value::String(raw)) = data.get(field)
        {
            for email in parse_string_emails(raw) {
                if !emails.contains(&email) {
                    emails.push(email);
                }
            }
        }
        emails
    }
}

/// Read-only lookup of form definitions by slug.
#[derive(Debug, Default)]
pub struct FormRegistry {
    forms: BTreeMap<String, FormDefinition>,
}

impl FormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of definitions (config order; later
    /// definitions win on duplicate slugs).
    pub fn from_definitions(forms: impl IntoIterator<Item = FormDefinition>) -> Self {
        let mut registry = Self::new();
        for form in forms {
            registry.register(form);
        }
        registry
    }

    pub fn register(&mut self, form: FormDefinition) {
        self.forms.insert(form.slug.clone(), form);
    }

    pub fn get(&self, slug: &str) -> Option<&FormDefinition> {
        self.forms.get(slug)
    }

    /// Slugs of all registered forms.
    pub fn slugs(&self) -> Vec<String> {
        self.forms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

/// Process a raw submission against a registered form.
///
/// Sanitizes, validates, and returns the cleaned values. Validation failures
/// come back as `FormboxError::Validation` with per-field messages — nothing
/// is persisted for an invalid submission.
pub fn process_submission(
    registry: &FormRegistry,
    form_slug: &str,
    input: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let form = registry
        .get(form_slug)
        .ok_or_else(|| FormboxError::UnknownForm(form_slug.to_string()))?;
    let values = form.sanitize(input);
    let errors = form.validate(&values);
    if !errors.is_empty() {
        return Err(FormboxError::Validation(errors));
    }
    Ok(values)
}

/// Strip characters that cannot appear in an email address.
pub fn sanitize_email(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.@".contains(*c))
        .collect()
}

/// Minimal structural check: one '@', non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let Some(domain) = parts.next() else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(' ')
}

/// Extract sanitized, deduplicated addresses from a string with ",", ";" or
/// whitespace separators.
pub fn parse_string_emails(raw: &str) -> Vec<String> {
    let mut emails = Vec::new();
    for token in raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        let sanitized = sanitize_email(token);
        if is_valid_email(&sanitized) && !emails.contains(&sanitized) {
            emails.push(sanitized);
        }
    }
    emails
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact_form() -> FormDefinition {
        FormDefinition {
            slug: "contact".into(),
            title: "Contacto".into(),
            fields: vec![
                FieldDef {
                    name: "from_name".into(),
                    label: "Nombre".into(),
                    kind: FieldKind::Text,
                    required: true,
                },
                FieldDef {
                    name: "from_email".into(),
                    label: "Correo".into(),
                    kind: FieldKind::Email,
                    required: true,
                },
                FieldDef {
                    name: "message".into(),
                    label: "Mensaje".into(),
                    kind: FieldKind::Textarea,
                    required: false,
                },
            ],
            notify: vec!["inbox@example.org".into()],
            notify_from_field: None,
        }
    }

    fn as_map(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_sanitize_drops_undeclared_fields() {
        let form = contact_form();
        let input = as_map(json!({
            "from_name": "  Ana  ",
            "from_email": "a@x.com",
            "hidden_admin_flag": true,
        }));
        let values = form.sanitize(&input);
        assert_eq!(values.get("from_name"), Some(&json!("Ana")));
        assert!(!values.contains_key("hidden_admin_flag"));
    }

    #[test]
    fn test_validate_required_and_email() {
        let form = contact_form();
        let values = as_map(json!({ "from_email": "not-an-email" }));
        let errors = form.validate(&values);
        assert!(errors.contains_key("from_name"));
        assert!(errors.contains_key("from_email"));
        assert!(!errors.contains_key("message"));
    }

    #[test]
    fn test_process_submission_ok() {
        let registry = FormRegistry::from_definitions([contact_form()]);
        let input = as_map(json!({
            "from_name": "Ana",
            "from_email": "a@x.com",
            "message": "Hola",
        }));
        let values = process_submission(&registry, "contact", &input).unwrap();
        assert_eq!(values.get("from_email"), Some(&json!("a@x.com")));
    }

    #[test]
    fn test_process_submission_unknown_form() {
        let registry = FormRegistry::new();
        let input = Map::new();
        let err = process_submission(&registry, "nope", &input).unwrap_err();
        assert!(matches!(err, FormboxError::UnknownForm(_)));
    }

    #[test]
    fn test_notification_emails_with_field() {
        let mut form = contact_form();
        form.notify_from_field = Some("cc".into());
        let data = as_map(json!({
            "cc": "b@y.com; inbox@example.org a@x.com,",
        }));
        let emails = form.notification_emails(&data);
        // Fixed recipient first, then field addresses, deduplicated.
        assert_eq!(emails, vec!["inbox@example.org", "b@y.com", "a@x.com"]);
    }

    #[test]
    fn test_parse_string_emails() {
        let emails = parse_string_emails("a@x.com, b@y.org;  bogus  c@z.net");
        assert_eq!(emails, vec!["a@x.com", "b@y.org", "c@z.net"]);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = FormRegistry::from_definitions([contact_form()]);
        assert!(registry.get("contact").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.slugs(), vec!["contact".to_string()]);
    }
}
