//! Input sanitization and format validation.
//!
//! Free-text input is trimmed; rich-text challenge descriptions go through a
//! tag whitelist that also strips inline event handlers and javascript: URLs.

use once_cell::sync::Lazy;
use regex::Regex;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("username regex"));

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

static FLAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^FLAG\{[a-zA-Z0-9_]+\}$").expect("flag regex"));

static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?([a-zA-Z0-9]+)[^>]*>").expect("tag regex"));

static EVENT_HANDLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s*on\w+\s*=\s*["'][^"']*["']"#).expect("event handler regex"));

static JS_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']javascript:[^"']*["']"#).expect("js href regex"));

/// Tags allowed in challenge descriptions and story chapters
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "b", "em", "i", "code", "pre", "a", "h3", "h4", "ul", "ol", "li", "div",
    "span", "hr",
];

/// Basic cleanup for free-text input
pub fn sanitize_input(input: &str) -> String {
    input.trim().to_string()
}

/// Username: letters, digits, underscore, 3-20 chars
pub fn validate_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Flag format: FLAG{...} with alphanumerics and underscore inside
pub fn validate_flag_format(flag: &str) -> bool {
    FLAG_RE.is_match(flag)
}

/// Whitelist-sanitize rich-text HTML.
///
/// Non-whitelisted tags are stripped entirely; whitelisted tags keep their
/// attributes except inline event handlers and javascript: hrefs.
pub fn sanitize_description(html: &str) -> String {
    let stripped = HTML_TAG_RE.replace_all(html, |caps: &regex::Captures| {
        let tag_name = caps[1].to_lowercase();
        if ALLOWED_TAGS.contains(&tag_name.as_str()) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });

    let no_handlers = EVENT_HANDLER_RE.replace_all(&stripped, "");
    JS_HREF_RE.replace_all(&no_handlers, r##"href="#""##).to_string()
}
