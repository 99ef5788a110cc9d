//! Utility functions.
//!
//! Collection of helper functions used across the plugins.

mod target;

pub use target::{resolve_target, Target};

/// Escape text for Telegram HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Clickable HTML mention of a user.
pub fn mention(user_id: u64, name: &str) -> String {
    format!("<a href=\"tg://user?id={}\">{}</a>", user_id, html_escape(name))
}

/// Render a duration as `1d 2h 3m 4s`, skipping leading zero units.
pub fn format_uptime(secs: u64) -> String {
    let units = [(86_400, "d"), (3_600, "h"), (60, "m")];
    let mut out = Vec::new();
    let mut rest = secs;
    for (size, suffix) in units {
        if rest >= size || !out.is_empty() {
            out.push(format!("{}{}", rest / size, suffix));
            rest %= size;
        }
    }
    out.push(format!("{}s", rest));
    out.join(" ")
}
