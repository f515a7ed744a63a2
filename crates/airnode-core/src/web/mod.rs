//! Status page, configuration form and the minimal HTTP and DNS handling
//! behind the captive portal
//!
//! Rendering and routing are plain functions over [`StatusSnapshot`] so the
//! firmware's socket tasks and the simulator's std server share them.
//!
//! [`StatusSnapshot`]: crate::app_state::StatusSnapshot

pub mod dns;
pub mod form;
pub mod http;
pub mod status_page;

use alloc::string::String;

pub use dns::{DnsError, answer_query};
pub use form::{FormError, apply_form, render_config_form};
pub use http::{HttpError, Method, Request, Response, expected_len, handle_request, parse_request};
pub use status_page::render_status_page;

/// Append `text` to `out` with the HTML metacharacters escaped.
pub fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

pub(crate) const PAGE_HEAD: &str = "<!DOCTYPE html><html lang=\"en\"><head>\
<meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1, user-scalable=no\">";

pub(crate) const PAGE_TAIL: &str = "</body></html>";

/// Open a page with the given (already safe) title and thing name heading.
pub(crate) fn open_page(out: &mut String, title: &str, thing_name: &str) {
    out.push_str(PAGE_HEAD);
    out.push_str("<title>");
    push_escaped(out, thing_name);
    out.push_str(" - ");
    out.push_str(title);
    out.push_str("</title></head><body><h1>");
    push_escaped(out, thing_name);
    out.push_str("</h1>");
}
