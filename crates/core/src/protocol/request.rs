use crate::error::{ParseErrorKind, RtspError};

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. The last path
/// segment of the URI names the stream (a file in the server's catalog).
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:8554/movie.ts`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    /// Parse an RTSP request from its text representation.
    ///
    /// Accepts a request line with at least `Method URI` tokens and requires
    /// at least one line after it. A missing `CSeq` header is tolerated
    /// ([`cseq`](Self::cseq) then returns an empty string) — only a
    /// structurally broken request is an error.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts.get(2).unwrap_or(&"").to_string();

        if !version.is_empty() && version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        let mut saw_more_lines = false;

        for line in lines {
            saw_more_lines = true;
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        if !saw_more_lines {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::TruncatedRequest,
            });
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value, or `""` when the client omitted it.
    ///
    /// The response must echo the CSeq so the client can correlate it
    /// (RFC 2326 §12.17).
    pub fn cseq(&self) -> &str {
        self.get_header("CSeq").unwrap_or("")
    }

    /// The stream name: the last path segment of the request URI.
    ///
    /// `rtsp://host:8554/movie.ts` → `movie.ts`
    pub fn stream_name(&self) -> &str {
        match self.uri.rfind('/') {
            Some(pos) => &self.uri[pos + 1..],
            None => &self.uri,
        }
    }

    /// Parses the `Range: npt=start-end` header, if present.
    ///
    /// A single-endpoint range (`npt=5-`) yields `(5.0, 0.0)`; unparsable
    /// endpoints default to 0.0 rather than failing the request.
    pub fn range(&self) -> Option<(f64, f64)> {
        let value = self.get_header("Range")?;
        let npt = value.trim().strip_prefix("npt=")?;
        let mut ends = npt.splitn(2, '-');
        let start = ends
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let end = ends
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        Some((start, end))
    }

    /// Parses the `Scale:` header, if present. Unparsable values yield 0.0.
    pub fn scale(&self) -> Option<f64> {
        let value = self.get_header("Scale")?;
        Some(value.trim().parse::<f64>().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = "OPTIONS rtsp://localhost:8554/movie.ts RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "rtsp://localhost:8554/movie.ts");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), "1");
        assert_eq!(req.stream_name(), "movie.ts");
    }

    #[test]
    fn parse_setup_with_transport() {
        let raw = "SETUP rtsp://localhost:8554/movie.ts RTSP/1.0\r\n\
                   CSeq: 3\r\n\
                   Transport: client_port=8000-8001;\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(req.cseq(), "3");
        assert_eq!(req.get_header("Transport"), Some("client_port=8000-8001;"));
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_single_line_request() {
        assert!(RtspRequest::parse("OPTIONS rtsp://h/x RTSP/1.0").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\nCSeq: 1\r\n\r\n").is_err());
    }

    #[test]
    fn missing_cseq_is_tolerated() {
        let raw = "OPTIONS rtsp://h/x RTSP/1.0\r\nUser-Agent: test\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.cseq(), "");
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "OPTIONS rtsp://localhost RTSP/1.0\r\ncseq: 42\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.cseq(), "42");
        assert_eq!(req.get_header("CSEQ"), Some("42"));
    }

    #[test]
    fn range_full() {
        let raw = "PLAY rtsp://h/x RTSP/1.0\r\nCSeq: 4\r\nRange: npt=12.5-45.0\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.range(), Some((12.5, 45.0)));
    }

    #[test]
    fn range_open_ended() {
        let raw = "PLAY rtsp://h/x RTSP/1.0\r\nCSeq: 4\r\nRange: npt=5-\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.range(), Some((5.0, 0.0)));
    }

    #[test]
    fn scale_header() {
        let raw = "PLAY rtsp://h/x RTSP/1.0\r\nCSeq: 4\r\nScale: 2.0\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.scale(), Some(2.0));
    }
}
