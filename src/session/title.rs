use anyhow::{bail, Result};
use serde_json::Value;

/// A parsed session title template.
///
/// Syntax is `{{ .Field }}` substitution over a fixed set of runtime
/// fields (`Command`, `Hostname`) plus any scalar preference key.
/// Parsing happens once at startup so syntax errors abort early;
/// unknown fields only surface at render time and are fatal to the
/// session that hit them.
#[derive(Debug, Clone)]
pub struct TitleTemplate {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Runtime facts substituted into the template.
pub struct TitleVars<'a> {
    pub command: &'a str,
    pub hostname: &'a str,
    pub preferences: &'a Value,
}

impl TitleTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                bail!("Title format string syntax error: unterminated field");
            };
            let inner = after[..end].trim();
            let Some(name) = inner.strip_prefix('.') else {
                bail!("Title format string syntax error: field must start with '.'");
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                bail!("Title format string syntax error: invalid field name {:?}", inner);
            }
            segments.push(Segment::Field(name.to_string()));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, vars: &TitleVars) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(&resolve_field(name, vars)?),
            }
        }
        Ok(out)
    }
}

fn resolve_field(name: &str, vars: &TitleVars) -> Result<String> {
    match name {
        "Command" => return Ok(vars.command.to_string()),
        "Hostname" => return Ok(vars.hostname.to_string()),
        _ => {}
    }
    match vars.preferences.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => bail!("Unknown title field: {}", name),
    }
}
