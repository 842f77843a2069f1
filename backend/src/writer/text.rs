//! Plain text through a handlebars template.
//!
//! The template is rendered once per resource. Its context:
//!
//! ```json
//! {
//!   "id": 12,
//!   "resource_type": "items",
//!   "title": "…",
//!   "separator": "|",
//!   "fields": [{ "name": "Title", "key": "dcterms:title", "values": ["…"], "value": "…" }]
//! }
//! ```
//!
//! Output is not HTML-escaped.

use super::{Exporter, Formatter};
use crate::error::{WriterError, WriterResult};
use handlebars::{handlebars_helper, Handlebars};
use serde_json::{json, Value};
use std::io::Write;

const TEMPLATE_NAME: &str = "resource";

/// Template used when the export sets none.
pub const DEFAULT_TEMPLATE: &str = "{{#each fields}}{{#if value}}{{name}}: {{value}}\n{{/if}}{{/each}}\n";

/// Templated plain text.
#[derive(Debug, Clone, Copy)]
pub struct TextFormatter;

fn handlebars(template: &str) -> WriterResult<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars_helper!(join: |values: array, sep: str| values
        .iter()
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(sep));
    handlebars.register_helper("join", Box::new(join));

    handlebars
        .register_template_string(TEMPLATE_NAME, template)
        .map_err(|e| WriterError::Template(e.to_string()))?;
    Ok(handlebars)
}

impl Formatter for TextFormatter {
    fn format(&self) -> &'static str {
        "txt"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn media_type(&self) -> &'static str {
        "text/plain"
    }

    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let template = exporter.config().template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let handlebars = handlebars(template)?;
        let separator = exporter.separator();

        let mut count = 0;
        for row in exporter.rows()? {
            let row = row?;
            let fields: Vec<Value> = exporter
                .fields()
                .iter()
                .zip(&row.cells)
                .map(|(field, values)| {
                    json!({
                        "name": field.header,
                        "key": field.key,
                        "values": values,
                        "value": values.join(separator),
                    })
                })
                .collect();
            let title = exporter
                .store()
                .get(row.id)?
                .map(|r| r.display_title())
                .unwrap_or_default();
            let context = json!({
                "id": row.id,
                "resource_type": row.resource_type.api_name(),
                "title": title,
                "separator": separator,
                "fields": fields,
            });
            let text = handlebars
                .render(TEMPLATE_NAME, &context)
                .map_err(|e| WriterError::Template(e.to_string()))?;
            out.write_all(text.as_bytes())?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::tests::sample_store;
    use crate::writer::ExportConfig;

    fn render(config: ExportConfig) -> WriterResult<String> {
        let store = sample_store();
        let exporter = Exporter::new(&store, config).unwrap();
        let mut out = Vec::new();
        TextFormatter.write(&exporter, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_default_template() {
        let text = render(ExportConfig {
            include: vec!["dcterms:title".into(), "dcterms:subject".into()],
            ..ExportConfig::default()
        })
        .unwrap();
        assert_eq!(text, "dcterms:title: A\ndcterms:subject: x|y\n\ndcterms:title: B\n\n");
    }

    #[test]
    fn test_custom_template_is_not_escaped() {
        let text = render(ExportConfig {
            include: vec!["dcterms:subject".into()],
            template: Some("#{{id}} {{title}} <{{#each fields}}{{join values \" & \"}}{{/each}}>\n".into()),
            ..ExportConfig::default()
        })
        .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(" A <x & y>"));
        assert!(lines[1].ends_with(" B <>"));
    }

    #[test]
    fn test_invalid_template() {
        let result = render(ExportConfig {
            template: Some("{{#each fields}".into()),
            ..ExportConfig::default()
        });
        assert!(matches!(result, Err(WriterError::Template(_))));
    }
}
