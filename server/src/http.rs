//! minimal HTTP/1.1 framing for the trigger endpoint: one POST with a JSON
//! body in, one JSON response out, then the connection closes.

use crate::error::{Result, ServerError};

/// request head fields the trigger endpoint looks at.
#[derive(Debug, Default)]
struct Head {
    method: String,
    path: String,
    user_agent: Option<String>,
    content_length: usize,
}

/// a buffered request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (head_len, head) = split_head(buf)?
            .ok_or_else(|| ServerError::InvalidHttp("Incomplete HTTP request".to_string()))?;

        let body = &buf[head_len..];
        if body.len() < head.content_length {
            return Err(ServerError::InvalidHttp(format!(
                "Incomplete body: expected {}, got {}",
                head.content_length,
                body.len()
            )));
        }

        Ok(HttpRequest {
            method: head.method,
            path: head.path,
            user_agent: head.user_agent,
            body: body[..head.content_length].to_vec(),
        })
    }

    /// true once the head and the announced body are buffered. a malformed head
    /// counts as complete so `parse` can reject it.
    pub fn is_complete(buf: &[u8]) -> bool {
        match split_head(buf) {
            Ok(Some((head_len, head))) => buf.len() - head_len >= head.content_length,
            Ok(None) => false,
            Err(_) => true,
        }
    }
}

/// head length including the blank line, and the parsed head.
fn split_head(buf: &[u8]) -> Result<Option<(usize, Head)>> {
    let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(end) => end,
        None => return Ok(None),
    };
    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| ServerError::InvalidHttp("Invalid UTF-8 in headers".to_string()))?;

    let mut lines = text.split("\r\n");
    let mut head = Head::default();

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(_version)) => {
            head.method = method.to_string();
            head.path = path.to_string();
        }
        _ => {
            return Err(ServerError::InvalidHttp(format!(
                "Invalid request line: {}",
                request_line
            )))
        }
    }

    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ServerError::InvalidHttp(format!("Invalid header: {}", line)))?;
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-length") {
            head.content_length = value
                .parse()
                .map_err(|_| ServerError::InvalidHttp("Invalid Content-Length".to_string()))?;
        } else if name.trim().eq_ignore_ascii_case("user-agent") {
            head.user_agent = Some(value.to_string());
        }
    }

    Ok(Some((end + 4, head)))
}

/// response with a JSON body, or none.
pub struct HttpResponse {
    status: u16,
    reason: &'static str,
    allow: bool,
    body: Option<Vec<u8>>,
}

impl HttpResponse {
    fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            allow: false,
            body: None,
        }
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::status(200, "OK")
        }
    }

    pub fn bad_request() -> Self {
        Self::status(400, "Bad Request")
    }

    pub fn method_not_allowed() -> Self {
        Self {
            allow: true,
            ..Self::status(405, "Method Not Allowed")
        }
    }

    pub fn payload_too_large() -> Self {
        Self::status(413, "Payload Too Large")
    }

    pub fn build(self) -> Vec<u8> {
        let body = self.body.as_deref().unwrap_or_default();
        let mut len = itoa::Buffer::new();
        let mut status = itoa::Buffer::new();

        let mut buf = Vec::with_capacity(160 + body.len());
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(status.format(self.status).as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.reason.as_bytes());
        buf.extend_from_slice(b"\r\nContent-Length: ");
        buf.extend_from_slice(len.format(body.len()).as_bytes());
        buf.extend_from_slice(b"\r\nDate: ");
        // imf-fixdate
        buf.extend_from_slice(
            chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string()
                .as_bytes(),
        );
        buf.extend_from_slice(b"\r\n");
        if self.body.is_some() {
            buf.extend_from_slice(b"Content-Type: application/json\r\n");
        }
        if self.allow {
            buf.extend_from_slice(b"Allow: POST\r\n");
        }
        buf.extend_from_slice(b"Connection: close\r\n\r\n");
        buf.extend_from_slice(body);
        buf
    }
}
