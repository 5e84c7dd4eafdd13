//! Response rendering: content negotiation and the HTML pages.

use crate::gate::Denial;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};

/// Representation chosen from the client's `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preferred {
    Json,
    Html,
    Text,
}

/// Offered representations, in tie-break order.
const OFFERS: [(&str, &str, Preferred); 2] = [
    ("application", "json", Preferred::Json),
    ("text", "html", Preferred::Html),
];

/// Pick JSON or HTML by `Accept` quality; plain text when neither is
/// acceptable. Equal qualities go to the type the client listed first. A
/// missing header accepts everything.
pub fn negotiate(headers: &HeaderMap) -> Preferred {
    let ranges: Vec<MediaRange<'_>> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(MediaRange::parse)
        .collect();

    if ranges.is_empty() {
        return Preferred::Json;
    }

    // (quality, position of the matching range, offer)
    let mut best: Option<(f32, usize, Preferred)> = None;
    for (ty, subtype, preferred) in OFFERS {
        let Some((position, range)) = ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(ty, subtype))
            .max_by_key(|(i, r)| (r.specificity(), std::cmp::Reverse(*i)))
        else {
            continue;
        };
        if range.quality <= 0.0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((quality, pos, _)) => {
                range.quality > quality || (range.quality == quality && position < pos)
            }
        };
        if better {
            best = Some((range.quality, position, preferred));
        }
    }
    best.map_or(Preferred::Text, |(_, _, preferred)| preferred)
}

#[derive(Debug)]
struct MediaRange<'a> {
    ty: &'a str,
    subtype: &'a str,
    quality: f32,
}

impl<'a> MediaRange<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (ty, subtype) = parts.next()?.trim().split_once('/')?;
        let quality = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        Some(Self {
            ty: ty.trim(),
            subtype: subtype.trim(),
            quality,
        })
    }

    fn matches(&self, ty: &str, subtype: &str) -> bool {
        (self.ty == "*" || self.ty.eq_ignore_ascii_case(ty))
            && (self.subtype == "*" || self.subtype.eq_ignore_ascii_case(subtype))
    }

    fn specificity(&self) -> u8 {
        u8::from(self.ty != "*") + u8::from(self.subtype != "*")
    }
}

/// 403 response for a failed capability check.
pub fn denial(headers: &HeaderMap, denial: &Denial) -> Response {
    let message = denial.message();
    match negotiate(headers) {
        Preferred::Json => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "message": message,
                "capability": denial.capability,
                "code": -1,
                "msg": denial.reason(),
            })),
        )
            .into_response(),
        Preferred::Html => (
            StatusCode::FORBIDDEN,
            Html(render_access_denied(&denial.capability)),
        )
            .into_response(),
        Preferred::Text => (StatusCode::FORBIDDEN, message).into_response(),
    }
}

// ── HTML Templates ────────────────────────────────────────────────────

fn base_style() -> &'static str {
    r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
        background: #f5f5f5; color: #333;
        display: flex; justify-content: center; align-items: center;
        min-height: 100vh; padding: 20px;
    }
    .card {
        background: #fff; border-radius: 16px; padding: 32px;
        max-width: 400px; width: 100%; box-shadow: 0 4px 24px rgba(0,0,0,0.08);
    }
    .card h1 { font-size: 24px; color: #1a1a2e; margin-bottom: 12px; }
    .card p { font-size: 14px; color: #666; }
    .error { background: #fff0f0; color: #d32f2f; padding: 10px 14px; border-radius: 8px; }
    "#
}

fn render_access_denied(capability: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en"><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>Access Denied</title>
<style>{style}</style>
</head><body>
<div class="card">
  <h1>Access Denied</h1>
  <p class="error">You don't have permission to: {capability}</p>
</div>
</body></html>"#,
        style = base_style(),
        capability = escape_html(capability),
    )
}

/// Minimal HTML escaping for interpolated text.
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn missing_accept_prefers_json() {
        assert_eq!(negotiate(&HeaderMap::new()), Preferred::Json);
    }

    #[test]
    fn explicit_types() {
        assert_eq!(negotiate(&accept("application/json")), Preferred::Json);
        assert_eq!(negotiate(&accept("text/html")), Preferred::Html);
        assert_eq!(negotiate(&accept("text/plain")), Preferred::Text);
    }

    #[test]
    fn browser_accept_prefers_html() {
        let browser = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
        assert_eq!(negotiate(&accept(browser)), Preferred::Html);
    }

    #[test]
    fn quality_values_are_respected() {
        assert_eq!(
            negotiate(&accept("text/html;q=0.5, application/json;q=0.9")),
            Preferred::Json
        );
        assert_eq!(
            negotiate(&accept("application/json;q=0, text/*")),
            Preferred::Html
        );
    }

    #[test]
    fn equal_quality_follows_client_order() {
        assert_eq!(
            negotiate(&accept("text/html, application/json")),
            Preferred::Html
        );
        assert_eq!(
            negotiate(&accept("application/json, text/html")),
            Preferred::Json
        );
    }

    #[test]
    fn wildcard_ties_go_to_json() {
        assert_eq!(negotiate(&accept("*/*")), Preferred::Json);
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn access_denied_page_names_capability() {
        let page = render_access_denied("admin");
        assert!(page.contains("You don't have permission to: admin"));
    }
}
