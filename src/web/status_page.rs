//! HTML status page

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
};
use std::sync::Arc;

use contact_gateway_core::lookup::{RequestGateway, StatusView};

/// Handler for the root path
pub async fn index(State(gateway): State<Arc<RequestGateway>>) -> impl IntoResponse {
    let view = gateway.status_view();
    let status = if view.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (status, Html(render(&view)))
}

/// Render the page for a view
fn render(view: &StatusView) -> String {
    let refresh = view
        .refresh_secs()
        .map(|secs| format!(r#"<meta http-equiv="refresh" content="{}">"#, secs))
        .unwrap_or_default();

    let (background, body) = match view {
        StatusView::Ready => (
            "#f0f9f4",
            r#"<h1 style="color: #28a745;">&#x2705; Contact lookup API is ready</h1>
<p style="color: #555;">The session is active. No QR scan is needed.</p>
<p style="color: #777; font-size: 0.9em;">Use <code>/search?number=PHONE_NUMBER</code> to run a lookup.</p>"#
                .to_string(),
        ),
        StatusView::AwaitingChallenge { image } => (
            "#fffbe6",
            format!(
                r#"<h1 style="color: #ffc107;">Scan to activate the API</h1>
<p style="color: #555;">Open the provider app on your phone and scan the QR code below.</p>
<img src="{}" alt="Login QR code" style="width: 280px; height: 280px; margin-top: 15px;">
<p style="color: #777; font-size: 0.9em; margin-top: 20px;">This page refreshes every 15 seconds until login succeeds.</p>"#,
                escape_html(image)
            ),
        ),
        StatusView::Waiting {
            last_failure,
            consecutive_failures,
        } => {
            let failure = match last_failure {
                Some(reason) => format!(
                    r#"<p style="color: #c0392b; font-size: 0.9em;">Last failure ({} in a row): {}</p>"#,
                    consecutive_failures,
                    escape_html(reason)
                ),
                None => String::new(),
            };
            (
                "#eef2f7",
                format!(
                    r#"<h1 style="color: #007bff;">&#x23F3; Initializing...</h1>
<p style="color: #555;">Restoring the saved session or waiting for a QR code.</p>
{}<p style="color: #777; font-size: 0.9em;">This page refreshes in 5 seconds.</p>"#,
                    failure
                ),
            )
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8">{refresh}<title>Contact Gateway</title></head>
<body style="font-family: Arial, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background-color: {background};">
<div style="text-align: center; padding: 40px; border-radius: 12px; background-color: white; box-shadow: 0 4px 20px rgba(0,0,0,0.1);">
{body}
</div>
</body>
</html>
"#
    )
}

/// Escape text for HTML content and attribute values
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
