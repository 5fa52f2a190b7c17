use crate::error::{Error, Result};
use crate::models::Event;
use crate::store::ResultPage;
use regex::Regex;
use std::io::Write;
use tracing::debug;

/// `{field}` placeholders in an output template.
const TOKEN_PATTERN: &str = r"\{([^}]+)\}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { name: String, token: String },
}

/// A parsed output template such as `{@timestamp} {host}: {message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    segments: Vec<Segment>,
}

impl OutputTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let re = Regex::new(TOKEN_PATTERN).map_err(|e| Error::InvalidTemplate(e.to_string()))?;

        let mut segments = Vec::new();
        let mut last_end = 0;
        for caps in re.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last_end {
                segments.push(Segment::Literal(template[last_end..whole.start()].to_string()));
            }
            segments.push(Segment::Field {
                name: name.as_str().to_string(),
                token: whole.as_str().to_string(),
            });
            last_end = whole.end();
        }
        if last_end < template.len() {
            segments.push(Segment::Literal(template[last_end..].to_string()));
        }

        Ok(OutputTemplate { segments })
    }

    /// Field names referenced by the template, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitutes each token with the event's value. Tokens naming a field
    /// the event lacks are left as written.
    pub fn render(&self, event: &Event) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, token } => match event.get(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(token),
                },
            }
        }
        out
    }
}

/// Writes one line per decodable hit. Hits that fail to decode are skipped.
pub fn render_page<W: Write>(
    template: &OutputTemplate,
    page: &ResultPage,
    out: &mut W,
) -> Result<usize> {
    let mut written = 0;
    for hit in &page.hits {
        let event = match Event::from_source(&hit.source) {
            Ok(event) => event,
            Err(e) => {
                debug!(index = %hit.index, id = %hit.id, error = %e, "skipping hit");
                continue;
            }
        };
        writeln!(out, "{}", template.render(&event))?;
        written += 1;
    }
    Ok(written)
}
