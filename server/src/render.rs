//! Server-side rendering of the single page

use std::fmt::Write;

use crate::config::NetworkTarget;
use crate::presentation::{format_temperature, format_timestamp, Notification, NotificationLevel, UiState};

const STYLE: &str = "body{font-family:sans-serif;background:#0b1530;color:#fff;display:flex;flex-direction:column;align-items:center;padding:2rem}\
.card{background:rgba(255,255,255,.08);border-radius:12px;padding:1.5rem;margin:1rem;min-width:22rem;text-align:center}\
.grid{display:grid;grid-template-columns:1fr 1fr;gap:1rem}\
.label{color:#93c5fd;font-size:.85rem}\
.toasts{position:fixed;top:1rem;right:1rem;width:22rem}\
.toast{background:#333;border-radius:10px;padding:.75rem 1rem;margin-bottom:.5rem;display:flex;justify-content:space-between}\
.toast.error{border-left:4px solid #ef4444}.toast.success{border-left:4px solid #22c55e}\
button{background:#3b82f6;color:#fff;font-weight:bold;border:0;border-radius:12px;padding:1rem 2rem;cursor:pointer}\
button:disabled{opacity:.5;cursor:not-allowed}";

pub fn escape_html(raw: &str) -> String {
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

pub fn page(state: &UiState, notifications: &[Notification], network: &NetworkTarget) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Temperature Verifier</title>");
    if state.is_busy() {
        // no scripts: poll by reloading until the run settles
        html.push_str("<meta http-equiv=\"refresh\" content=\"2\">");
    }
    let _ = write!(html, "<style>{STYLE}</style></head><body>");

    render_toasts(&mut html, notifications);

    let _ = write!(
        html,
        "<h1>Temperature Verifier</h1>\
         <h2>Verify SF &amp; NYC temperatures on-chain to earn USDC</h2>\
         <p>Requirements:<br>• San Francisco temperature must be above 10°C (50°F)\
         <br>• New York temperature must be below -1°C (30°F)<br>Network: {}</p>",
        escape_html(network.name)
    );

    if let UiState::Succeeded { stats, .. } = state {
        let last = format_timestamp(stats.last_time).unwrap_or_else(|| stats.last_time.to_string());
        let _ = write!(
            html,
            "<div class=\"card grid\"><div><p class=\"label\">Last Verification</p><p>{}</p></div>\
             <div><p class=\"label\">Total Verifications</p><p>{}</p></div></div>",
            escape_html(&last),
            stats.total
        );
    }

    let _ = write!(
        html,
        "<form method=\"post\" action=\"/verify\"><button type=\"submit\"{}>{}</button></form>",
        if state.is_busy() { " disabled" } else { "" },
        if state.is_busy() {
            "Verifying Temperatures..."
        } else {
            "Verify and Claim 1 USDC"
        }
    );

    if let UiState::Succeeded { proof, .. } = state {
        let sf = proof.sf_temp().map(format_temperature).unwrap_or_else(|| "n/a".to_string());
        let nyc = proof.nyc_temp().map(format_temperature).unwrap_or_else(|| "n/a".to_string());
        let _ = write!(
            html,
            "<div class=\"card\"><h3>Current Temperatures</h3><div class=\"grid\">\
             <div><p class=\"label\">San Francisco</p><p>{}</p></div>\
             <div><p class=\"label\">New York</p><p>{}</p></div></div></div>",
            escape_html(&sf),
            escape_html(&nyc)
        );
    }

    html.push_str("</body></html>");
    html
}

fn render_toasts(html: &mut String, notifications: &[Notification]) {
    if notifications.is_empty() {
        return;
    }
    html.push_str("<div class=\"toasts\">");
    for n in notifications {
        let class = match n.level {
            NotificationLevel::Success => "success",
            NotificationLevel::Error => "error",
        };
        let _ = write!(
            html,
            "<div class=\"toast {class}\"><span>{}</span>\
             <form method=\"post\" action=\"/notifications/{}/dismiss\"><button type=\"submit\">×</button></form></div>",
            escape_html(&n.message),
            n.id
        );
    }
    html.push_str("</div>");
}
