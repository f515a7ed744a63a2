//! Just enough HTTP/1.1 for the portal: one request per connection,
//! `Connection: close`, bodies sized by `Content-Length`.

use alloc::string::String;
use core::fmt::Write;

use log::{debug, info};
use thiserror_no_std::Error;

use super::{
    PAGE_TAIL, apply_form, open_page, push_escaped, render_config_form, render_status_page,
};
use crate::app_state::StatusSnapshot;
use crate::config::PersistedConfig;

/// Largest request the portal accepts, headers and body together.
pub const MAX_REQUEST_LEN: usize = 2048;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("request is not valid UTF-8")]
    NotUtf8,
    #[error("request is incomplete")]
    Incomplete,
    #[error("malformed request line")]
    Malformed,
    #[error("request larger than {} bytes", MAX_REQUEST_LEN)]
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    /// Path without the query string.
    pub path: &'a str,
    pub body: &'a str,
}

/// Total request length once the headers have arrived, or `None` while they
/// are still incomplete. Socket readers use it to know when to stop reading.
pub fn expected_len(buf: &[u8]) -> Option<usize> {
    let header_end = header_end(buf)?;
    let headers = core::str::from_utf8(&buf[..header_end]).ok()?;
    // Clients pick the length; an absurd one saturates and reads as too large.
    Some(header_end.saturating_add(content_length(headers)))
}

pub fn parse_request(buf: &[u8]) -> Result<Request<'_>, HttpError> {
    let header_end = header_end(buf).ok_or(if buf.len() >= MAX_REQUEST_LEN {
        HttpError::TooLarge
    } else {
        HttpError::Incomplete
    })?;
    let text = core::str::from_utf8(buf).map_err(|_| HttpError::NotUtf8)?;
    let headers = &text[..header_end];

    let mut parts = headers
        .lines()
        .next()
        .ok_or(HttpError::Malformed)?
        .split_whitespace();
    let method = match parts.next().ok_or(HttpError::Malformed)? {
        "GET" | "HEAD" => Method::Get,
        "POST" => Method::Post,
        _ => Method::Other,
    };
    let target = parts.next().ok_or(HttpError::Malformed)?;
    let path = target.split_once('?').map_or(target, |(path, _)| path);

    let body_end = header_end.saturating_add(content_length(headers));
    if body_end > MAX_REQUEST_LEN {
        return Err(HttpError::TooLarge);
    }
    let body = text.get(header_end..body_end).ok_or(HttpError::Incomplete)?;

    Ok(Request { method, path, body })
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub location: Option<&'static str>,
    pub body: String,
}

impl Response {
    fn html(status: u16, reason: &'static str, body: String) -> Self {
        Self {
            status,
            reason,
            location: None,
            body,
        }
    }

    fn redirect(location: &'static str) -> Self {
        Self {
            status: 302,
            reason: "Found",
            location: Some(location),
            body: String::new(),
        }
    }

    /// Answer to a request that could not be parsed.
    pub fn for_error(error: HttpError) -> Self {
        match error {
            HttpError::TooLarge => Self::html(413, "Payload Too Large", String::new()),
            _ => Self::html(400, "Bad Request", String::new()),
        }
    }

    /// Status line and headers, terminated by the blank line.
    pub fn head(&self) -> String {
        let mut head = String::with_capacity(160);
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nCache-Control: no-store\r\n",
            self.status, self.reason
        );
        if let Some(location) = self.location {
            let _ = write!(head, "Location: {}\r\n", location);
        }
        let _ = write!(
            head,
            "Connection: close\r\nContent-Length: {}\r\n\r\n",
            self.body.len()
        );
        head
    }
}

/// Route one request.
///
/// A valid configuration submission is returned alongside the response; the
/// caller forwards it to the node, which persists it and restarts.
pub fn handle_request(
    request: &Request<'_>,
    status: &StatusSnapshot,
) -> (Response, Option<PersistedConfig>) {
    match (request.method, request.path) {
        (Method::Get, "/") => (
            Response::html(200, "OK", render_status_page(status)),
            None,
        ),
        (Method::Get, "/config") => (
            Response::html(200, "OK", render_config_form(&status.config)),
            None,
        ),
        (Method::Post, "/config") => match apply_form(&status.config, request.body) {
            Ok(config) => {
                info!("web: configuration submitted");
                let page = saved_page(&config);
                (Response::html(200, "OK", page), Some(config))
            }
            Err(e) => {
                debug!("web: rejected configuration: {}", e);
                let page = rejected_page(status, &e);
                (Response::html(400, "Bad Request", page), None)
            }
        },
        // Captive portal probes and anything unknown land on the status page.
        (Method::Get, _) => (Response::redirect("/"), None),
        _ => (
            Response::html(405, "Method Not Allowed", String::new()),
            None,
        ),
    }
}

fn saved_page(config: &PersistedConfig) -> String {
    let mut out = String::with_capacity(512);
    open_page(&mut out, "Saved", &config.system.thing_name);
    out.push_str("<p>Configuration saved. The device restarts now.</p>");
    out.push_str(PAGE_TAIL);
    out
}

fn rejected_page(status: &StatusSnapshot, error: &super::FormError) -> String {
    let mut out = String::with_capacity(256);
    open_page(&mut out, "Rejected", &status.config.system.thing_name);
    out.push_str("<p>Configuration rejected: ");
    let mut message = String::new();
    let _ = write!(message, "{}", error);
    push_escaped(&mut out, &message);
    out.push_str("</p><p><a href=\"config\">Back</a></p>");
    out.push_str(PAGE_TAIL);
    out
}
