//! Body markup: HTML escaping, quote highlighting, post citations.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use sumi_core::error::CoreError;
use sumi_core::ports::MarkupRenderer;
use sumi_core::types::DbId;

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Compiled from a literal; cannot fail.
    RE.get_or_init(|| Regex::new(r"&gt;&gt;(\d+)").expect("static citation regex"))
}

fn escape_html(raw: &str) -> String {
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

/// Minimal renderer: escape everything, linkify `>>123` citations, wrap
/// greentext lines, convert newlines to `<br/>`.
pub struct BasicMarkup;

#[async_trait]
impl MarkupRenderer for BasicMarkup {
    async fn render(&self, board: &str, raw: &str) -> Result<(String, Vec<DbId>), CoreError> {
        let mut cited = Vec::new();
        let mut lines = Vec::new();

        for line in raw.lines() {
            let escaped = escape_html(line);
            let linked = citation_re().replace_all(&escaped, |caps: &regex::Captures| {
                if let Ok(id) = caps[1].parse::<DbId>() {
                    if !cited.contains(&id) {
                        cited.push(id);
                    }
                    format!(
                        "<a class=\"cite\" href=\"/{board}/res/{id}.html#{id}\">&gt;&gt;{id}</a>"
                    )
                } else {
                    caps[0].to_string()
                }
            });
            // Greentext: a literal leading '>' that is not a citation.
            if escaped.starts_with("&gt;") && !escaped.starts_with("&gt;&gt;") {
                lines.push(format!("<span class=\"quote\">{linked}</span>"));
            } else {
                lines.push(linked.into_owned());
            }
        }

        Ok((lines.join("<br/>"), cited))
    }
}
