//! Notification message rendering.
//!
//! The renderer is an explicit strategy: the dispatcher is handed a
//! `MessageRenderer` at construction and never resolves one dynamically.

use serde_json::{Map, Value};

use crate::entry::Entry;
use crate::form::FormDefinition;
use crate::notification::Notification;

/// Everything a renderer needs to build the message body.
#[derive(Debug, Default)]
pub struct RenderContext<'a> {
    pub title: &'a str,
    pub submitted_on: &'a str,
    pub entry_id: Option<i64>,
    pub notification_id: i64,
    pub form: Option<&'a FormDefinition>,
    pub values: Option<&'a Map<String, Value>>,
    /// Link back to the entry detail for this notification.
    pub action_link: String,
}

impl<'a> RenderContext<'a> {
    /// Assemble a context from the notification and its collaborators.
    pub fn build(
        notification: &'a Notification,
        form: Option<&'a FormDefinition>,
        entry: Option<&'a Entry>,
        action_link: String,
    ) -> Self {
        Self {
            title: form.map(|f| f.title.as_str()).unwrap_or(""),
            submitted_on: entry.map(|e| e.submitted_on.as_str()).unwrap_or(""),
            entry_id: entry.map(|e| e.id),
            notification_id: notification.id,
            form,
            values: entry.map(|e| &e.data),
            action_link,
        }
    }
}

/// Strategy for turning a submission into a mail body.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, ctx: &RenderContext) -> String;
}

/// Default HTML rendering: title, entry reference line, then one block per
/// form field with a non-empty submitted value, and the action link.
#[derive(Debug, Default)]
pub struct HtmlRenderer;

impl MessageRenderer for HtmlRenderer {
    fn render(&self, ctx: &RenderContext) -> String {
        let mut out = String::new();
        out.push_str("<div class=\"container\" style=\"font-size:16px;line-height:1.25;\">");
        out.push_str(&format!(
            "<h1 style=\"font-weight:700;margin:16px 0;font-size:28px;\">{}</h1>",
            escape_html(ctx.title)
        ));
        out.push_str(
            "<div class=\"description\" style=\"text-transform:uppercase;margin:16px 0 24px;opacity:.75;font-weight:500\">",
        );
        if let Some(entry_id) = ctx.entry_id {
            out.push_str(&format!("#{entry_id} / "));
        }
        out.push_str(&escape_html(ctx.submitted_on));
        out.push_str("</div>");

        if let (Some(form), Some(values)) = (ctx.form, ctx.values) {
            for field in &form.fields {
                let Some(value) = values.get(&field.name) else {
                    continue;
                };
                if is_empty_value(value) {
                    continue;
                }
                out.push_str(
                    "<div style=\"margin:0;padding:16px 0;border-bottom:1px dotted rgba(0, 0, 0, 0.15);\">",
                );
                if !field.label.is_empty() {
                    out.push_str(&format!(
                        "<div><b style=\"font-weight:500\">{}</b></div>",
                        escape_html(&field.label)
                    ));
                }
                out.push_str(&format!("<div>{}</div>", render_value(value)));
                out.push_str("</div>");
            }
        }

        if !ctx.action_link.is_empty() {
            out.push_str(&format!(
                "<p style=\"margin:24px 0;\"><a href=\"{}\">Ver datos del envío</a></p>",
                escape_html(&ctx.action_link)
            ));
        }
        out.push_str("</div>");
        out
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => escape_html(s).replace('\n', "<br>"),
        other => escape_html(&other.to_string()),
    }
}

/// Minimal HTML entity escaping for body text and attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldDef;
    use serde_json::json;

    fn form() -> FormDefinition {
        FormDefinition {
            slug: "contact".into(),
            title: "Contacto".into(),
            fields: vec![
                FieldDef {
                    name: "from_name".into(),
                    label: "Nombre".into(),
                    kind: Default::default(),
                    required: true,
                },
                FieldDef {
                    name: "message".into(),
                    label: "Mensaje".into(),
                    kind: Default::default(),
                    required: false,
                },
            ],
            notify: vec![],
            notify_from_field: None,
        }
    }

    fn entry(data: Value) -> Entry {
        Entry {
            id: 12,
            form: "contact".into(),
            submitted_on: "2026-02-03 09:30:00".into(),
            data: data.as_object().unwrap().clone(),
            meta: Default::default(),
        }
    }

    #[test]
    fn test_render_includes_nonempty_fields() {
        let f = form();
        let e = entry(json!({"from_name": "Ana", "message": "Hola <mundo>"}));
        let n = Notification::new("contact", e.id, "a@x.com");
        let ctx = RenderContext::build(&n, Some(&f), Some(&e), String::new());
        let html = HtmlRenderer.render(&ctx);
        assert!(html.contains("Contacto"));
        assert!(html.contains("#12 / 2026-02-03 09:30:00"));
        assert!(html.contains("Nombre"));
        assert!(html.contains("Hola &lt;mundo&gt;"));
    }

    #[test]
    fn test_render_omits_empty_fields() {
        let f = form();
        let e = entry(json!({"from_name": "Ana", "message": ""}));
        let n = Notification::new("contact", e.id, "a@x.com");
        let ctx = RenderContext::build(&n, Some(&f), Some(&e), String::new());
        let html = HtmlRenderer.render(&ctx);
        assert!(!html.contains("Mensaje"));
    }

    #[test]
    fn test_render_without_entry() {
        let n = Notification::new("contact", 0, "a@x.com");
        let ctx = RenderContext::build(&n, None, None, "https://x/e/1".into());
        let html = HtmlRenderer.render(&ctx);
        assert!(html.contains("https://x/e/1"));
    }

    #[test]
    fn test_multiline_values_become_breaks() {
        let f = form();
        let e = entry(json!({"from_name": "Ana", "message": "línea 1\nlínea 2"}));
        let n = Notification::new("contact", e.id, "a@x.com");
        let ctx = RenderContext::build(&n, Some(&f), Some(&e), String::new());
        let html = HtmlRenderer.render(&ctx);
        assert!(html.contains("línea 1<br>línea 2"));
    }
}
