//! Render-time HTML sanitizer for assistant replies.
//!
//! Replies are model output and are only trusted as far as this allow-list:
//! structural tags from the output rules keep their shape, `div` keeps only
//! one of the labeled classes, `a` keeps only `tel:` and `http(s):` targets.
//! Every other tag is escaped and shows up as text.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)\b([^<>]*)>").unwrap());

static CLASS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

static HREF_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Tags passed through without attributes.
const PLAIN_TAGS: &[&str] = &[
    "h3", "h4", "p", "ul", "ol", "li", "strong", "em", "b", "i", "br",
];

/// Classes a `div` may carry.
const DIV_CLASSES: &[&str] = &["emergency-contact", "warning", "tip", "location-specific"];

const LINK_SCHEMES: &[&str] = &["tel:", "http://", "https://"];

/// Escape text for inclusion in HTML.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Escape only the characters that could open or close a tag, leaving
/// entities the model wrote intact.
fn escape_angle_brackets(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

fn attr_value(re: &Regex, attrs: &str) -> Option<String> {
    re.captures(attrs)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
}

/// Canonical form of an allowed tag, or `None` if the tag must be escaped.
fn rebuild_tag(closing: bool, name: &str, attrs: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    let allowed = PLAIN_TAGS.contains(&name.as_str()) || name == "div" || name == "a";
    if !allowed {
        return None;
    }

    if closing {
        return Some(format!("</{}>", name));
    }

    let tag = match name.as_str() {
        "div" => match attr_value(&CLASS_ATTR_RE, attrs) {
            Some(class) if DIV_CLASSES.contains(&class.as_str()) => {
                format!("<div class=\"{}\">", class)
            }
            _ => "<div>".to_string(),
        },
        "a" => match attr_value(&HREF_ATTR_RE, attrs) {
            Some(href)
                if LINK_SCHEMES
                    .iter()
                    .any(|s| href.to_ascii_lowercase().starts_with(s)) =>
            {
                format!("<a href=\"{}\">", escape_text(&href))
            }
            _ => "<a>".to_string(),
        },
        other => format!("<{}>", other),
    };
    Some(tag)
}

/// Sanitize assistant HTML against the allow-list.
pub fn sanitize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&escape_angle_brackets(&html[cursor..whole.start()]));

        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map_or("", |m| m.as_str());
        let attrs = caps.get(3).map_or("", |m| m.as_str());

        match rebuild_tag(closing, name, attrs) {
            Some(tag) => out.push_str(&tag),
            None => out.push_str(&escape_text(whole.as_str())),
        }
        cursor = whole.end();
    }

    out.push_str(&escape_angle_brackets(&html[cursor..]));
    out
}
