use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("unsupported template action `{0}` (only `.field` references are understood)")]
    UnsupportedAction(String),
    #[error("template does not reference field `{0}`")]
    MissingPlaceholder(&'static str),
    #[error("no value supplied for template field `{0}`")]
    MissingValue(String),
}

/// How substituted strings are written into the rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// The template is a JSON object; strings are escaped as JSON string
    /// contents so the frame stays valid JSON.
    Json,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Str(&'a str),
    Num(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A `{{.field}}` substitution template, the subset of Go text/template
/// syntax the tunnel endpoints are configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    escape: Escape,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let body = &rest[start + 2..];
            let end = body
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let action = body[..end].trim();
            let name = action
                .strip_prefix('.')
                .filter(|name| {
                    !name.is_empty()
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_')
                })
                .ok_or_else(|| TemplateError::UnsupportedAction(action.to_string()))?;
            segments.push(Segment::Field(name.to_string()));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        let escape = match (segments.first(), segments.last()) {
            (Some(Segment::Literal(head)), Some(Segment::Literal(tail)))
                if head.trim_start().starts_with('{') && tail.trim_end().ends_with('}') =>
            {
                Escape::Json
            }
            _ => Escape::Raw,
        };

        Ok(Self {
            source: source.to_string(),
            segments,
            escape,
        })
    }

    /// Fails unless the template substitutes `field` somewhere.
    pub fn require(self, field: &'static str) -> Result<Self, TemplateError> {
        if self.references(field) {
            Ok(self)
        } else {
            Err(TemplateError::MissingPlaceholder(field))
        }
    }

    pub fn references(&self, field: &str) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field(name) if name == field))
    }

    pub fn escape(&self) -> Escape {
        self.escape
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render with every referenced field required.
    pub fn render(&self, values: &[(&str, Value<'_>)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = lookup(values, name)
                        .ok_or_else(|| TemplateError::MissingValue(name.clone()))?;
                    push_value(&mut out, value, self.escape);
                }
            }
        }
        Ok(out)
    }

    /// Render without escaping, leaving absent fields empty. Used when the
    /// template extracts text from an inbound frame rather than building one.
    pub fn fill(&self, values: &[(&str, Value<'_>)]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    if let Some(value) = lookup(values, name) {
                        push_value(&mut out, value, Escape::Raw);
                    }
                }
            }
        }
        out
    }

    /// For `prefix{{.field}}suffix` templates, recover the substituted text
    /// from a rendered frame.
    pub fn extract(&self, text: &str) -> Option<String> {
        let mut fields = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Field(_)));
        fields.next()?;
        if fields.next().is_some() {
            return None;
        }

        let (prefix, suffix) = match self.segments.as_slice() {
            [Segment::Field(_)] => ("", ""),
            [Segment::Literal(prefix), Segment::Field(_)] => (prefix.as_str(), ""),
            [Segment::Field(_), Segment::Literal(suffix)] => ("", suffix.as_str()),
            [
                Segment::Literal(prefix),
                Segment::Field(_),
                Segment::Literal(suffix),
            ] => (prefix.as_str(), suffix.as_str()),
            _ => return None,
        };
        if text.len() < prefix.len() + suffix.len() {
            return None;
        }
        text.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .map(str::to_string)
    }
}

fn lookup<'v>(values: &[(&str, Value<'v>)], name: &str) -> Option<Value<'v>> {
    values
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
}

fn push_value(out: &mut String, value: Value<'_>, escape: Escape) {
    match (value, escape) {
        (Value::Num(n), _) => out.push_str(&n.to_string()),
        (Value::Str(text), Escape::Raw) => out.push_str(text),
        (Value::Str(text), Escape::Json) => {
            let quoted = serde_json::Value::String(text.to_owned()).to_string();
            out.push_str(&quoted[1..quoted.len() - 1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPLOAD: &str = r#"{"operation":"stdin","data":"{{.data}}"}"#;

    #[test]
    fn renders_json_template_with_escaping() {
        let template = Template::parse(UPLOAD).expect("parse");
        assert_eq!(template.escape(), Escape::Json);
        let frame = template
            .render(&[("data", Value::Str("echo \"hi\"\r"))])
            .expect("render");
        assert_eq!(frame, r#"{"operation":"stdin","data":"echo \"hi\"\r"}"#);
        let parsed: serde_json::Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(parsed["data"], "echo \"hi\"\r");
    }

    #[test]
    fn every_control_character_survives_json_rendering() {
        let template = Template::parse(UPLOAD).expect("parse");
        let data: String = (0u8..0x20).map(char::from).chain("\\\"é\u{7f}".chars()).collect();
        let frame = template
            .render(&[("data", Value::Str(&data))])
            .expect("render");
        assert!(!frame.bytes().any(|b| b < 0x20));
        assert!(frame.contains(r"\u0001") && frame.contains(r"\t"));
        let parsed: serde_json::Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(parsed["data"], data.as_str());
    }

    #[test]
    fn raw_template_substitutes_verbatim() {
        let template = Template::parse("IN:{{ .data }}").expect("parse");
        assert_eq!(template.escape(), Escape::Raw);
        assert_eq!(
            template.render(&[("data", Value::Str("a\"b"))]).unwrap(),
            "IN:a\"b"
        );
    }

    #[test]
    fn numeric_fields_render_as_numbers() {
        let template =
            Template::parse(r#"{"operation":"resize","rows":{{.rows}},"cols":{{.cols}}}"#)
                .expect("parse");
        let frame = template
            .render(&[("rows", Value::Num(40)), ("cols", Value::Num(120))])
            .unwrap();
        assert_eq!(frame, r#"{"operation":"resize","rows":40,"cols":120}"#);
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert_eq!(
            Template::parse("{\"data\":\"{{.data\"}").unwrap_err(),
            TemplateError::Unterminated(9)
        );
        assert!(matches!(
            Template::parse("{{data}}").unwrap_err(),
            TemplateError::UnsupportedAction(_)
        ));
        assert!(matches!(
            Template::parse("{{.}}").unwrap_err(),
            TemplateError::UnsupportedAction(_)
        ));
        assert_eq!(
            Template::parse("static").unwrap().require("data").unwrap_err(),
            TemplateError::MissingPlaceholder("data")
        );
    }

    #[test]
    fn render_requires_values_but_fill_does_not() {
        let template = Template::parse("<{{.data}}>").unwrap();
        assert_eq!(
            template.render(&[]).unwrap_err(),
            TemplateError::MissingValue("data".into())
        );
        assert_eq!(template.fill(&[]), "<>");
    }

    #[test]
    fn extract_recovers_single_field() {
        let template = Template::parse("OUT[{{.data}}]").unwrap();
        assert_eq!(template.extract("OUT[ls -la]").as_deref(), Some("ls -la"));
        assert_eq!(template.extract("other"), None);
        assert_eq!(
            Template::parse("{{.data}}").unwrap().extract("plain").as_deref(),
            Some("plain")
        );
        assert_eq!(Template::parse("{{.a}}{{.b}}").unwrap().extract("ab"), None);
    }
}
