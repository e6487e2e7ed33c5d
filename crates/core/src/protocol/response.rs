use chrono::Local;

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// Date: ...\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern — chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
///
/// Every response carries a `Date` header. The TEARDOWN response is the one
/// deliberate deviation from RFC 2326: it is emitted without the trailing
/// blank line (see [`without_terminator`](Self::without_terminator)), which
/// interoperates with clients that only inspect the status line.
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    terminated: bool,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Date".to_string(), Local::now().to_rfc2822())],
            body: None,
            terminated: true,
        }
    }

    /// 200 OK — success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request — the request could not be parsed.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 404 Stream Not Found — no catalog file backs the requested name.
    pub fn stream_not_found() -> Self {
        Self::new(404, "Stream Not Found")
    }

    /// 405 Method Not Allowed — a method outside the supported six.
    pub fn method_not_allowed() -> Self {
        Self::new(405, "Method Not Allowed")
    }

    /// 455 Method Not Valid in This State — PLAY/PAUSE/TEARDOWN before SETUP.
    pub fn method_not_valid() -> Self {
        Self::new(455, "Method Not Valid in This State")
    }

    /// 461 Unsupported Transport — missing or non-UDP `Transport` header.
    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Suppress the trailing blank line (TEARDOWN responses only).
    pub fn without_terminator(mut self) -> Self {
        self.terminated = false;
        self
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else if self.terminated {
            response.push_str("\r\n");
        }
        response
    }
}
