//! DC-005: Canonical rendering.
//!
//! Writes a record back out as declaration text: two-space indent, `=`
//! aligned within each block, one blank line between blocks. Loading the
//! output yields a record equal to the input.

use super::grammar::is_identifier;
use super::types::{DeclarationRecord, Expression, Literal};

/// Render a record as canonical declaration text.
pub fn render(record: &DeclarationRecord) -> String {
    let provider = record.provider();
    let mut attrs = vec![("region", quote(&provider.region))];
    attrs.extend(
        provider
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), render_expression(v))),
    );

    let mut out = String::new();
    write_block(&mut out, "provider", &[provider.name.as_str()], &attrs);

    for resource in record.resources() {
        let attrs: Vec<(&str, String)> = resource
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), render_expression(v)))
            .collect();
        out.push('\n');
        write_block(
            &mut out,
            "resource",
            &[
                resource.resource_type.as_str(),
                resource.logical_name.as_str(),
            ],
            &attrs,
        );
    }
    out
}

/// Render one expression on a single line.
pub fn render_expression(expr: &Expression) -> String {
    match expr {
        Expression::Literal(lit) => render_literal(lit),
        Expression::Call(call) => format!("{}({})", call.name, render_list(&call.args)),
        Expression::Reference(reference) => reference.to_string(),
        Expression::List(items) => format!("[{}]", render_list(items)),
        Expression::Object(entries) if entries.is_empty() => "{}".to_string(),
        Expression::Object(entries) => {
            let body: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} = {}", render_key(k), render_expression(v)))
                .collect();
            format!("{{ {} }}", body.join(", "))
        }
    }
}

fn write_block(out: &mut String, kind: &str, labels: &[&str], attrs: &[(&str, String)]) {
    out.push_str(kind);
    for label in labels {
        out.push(' ');
        out.push_str(&quote(label));
    }
    if attrs.is_empty() {
        out.push_str(" {}\n");
        return;
    }
    out.push_str(" {\n");
    let width = attrs.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    for (key, value) in attrs {
        out.push_str(&format!("  {:<width$} = {}\n", key, value, width = width));
    }
    out.push_str("}\n");
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::String(s) => quote(s),
        Literal::Integer(i) => i.to_string(),
        // Debug keeps a `.0` or exponent so the value reloads as a float
        Literal::Float(f) => format!("{:?}", f),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
    }
}

fn render_list(items: &[Expression]) -> String {
    items
        .iter()
        .map(render_expression)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
