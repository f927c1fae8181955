//! Minimal `{{name}}` substitution for HTML documents.
//!
//! `{{name}}` inserts the HTML-escaped value, `{{{name}}}` inserts it as is
//! (for data URIs and prepared markup). Whitespace inside the braces is
//! ignored. Unknown names render as nothing.

use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Escaped(String),
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn new(source: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            let (raw, open, close) = if rest[start..].starts_with("{{{") {
                (true, 3, "}}}")
            } else {
                (false, 2, "}}")
            };

            let after = &rest[start + open..];
            let end = match after.find(close) {
                Some(end) => end,
                None => break,
            };

            if start > 0 {
                parts.push(Part::Text(rest[..start].to_string()));
            }

            let name = after[..end].trim().to_string();
            parts.push(if raw {
                Part::Raw(name)
            } else {
                Part::Escaped(name)
            });

            rest = &after[end + close.len()..];
        }

        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }

        Self { parts }
    }

    /// Names referenced by the template, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for part in &self.parts {
            if let Part::Escaped(name) | Part::Raw(name) = part {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }

        names
    }

    pub fn render<V: AsRef<str>>(&self, vars: &BTreeMap<&str, V>) -> String {
        let mut out = String::new();

        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Escaped(name) => match vars.get(name.as_str()) {
                    Some(value) => escape_html_into(value.as_ref(), &mut out),
                    None => log::debug!("template variable `{}` not provided", name),
                },
                Part::Raw(name) => match vars.get(name.as_str()) {
                    Some(value) => out.push_str(value.as_ref()),
                    None => log::debug!("template variable `{}` not provided", name),
                },
            }
        }

        out
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    escape_html_into(input, &mut out);
    out
}

fn escape_html_into(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if c.is_control() && c != '\n' && c != '\t' => {
                let _ = write!(out, "&#{};", c as u32);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &[(&'a str, &'a str)]) -> BTreeMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn substitutes_and_escapes() {
        let tpl = Template::new("<p>{{ credor }}</p><img src=\"{{{uri}}}\">");
        let out = tpl.render(&vars(&[("credor", "A & <B>"), ("uri", "data:x,<y>")]));

        assert_eq!(out, "<p>A &amp; &lt;B&gt;</p><img src=\"data:x,<y>\">");
    }

    #[test]
    fn unknown_names_render_empty() {
        let tpl = Template::new("a{{missing}}b");
        assert_eq!(tpl.render(&vars(&[])), "ab");
    }

    #[test]
    fn unterminated_tag_is_kept_as_text() {
        let tpl = Template::new("x {{ open");
        assert_eq!(tpl.render(&vars(&[("open", "no")])), "x {{ open");
    }

    #[test]
    fn placeholders_are_deduplicated() {
        let tpl = Template::new("{{a}}{{b}}{{{a}}}");
        assert_eq!(tpl.placeholders(), vec!["a", "b"]);
    }
}
