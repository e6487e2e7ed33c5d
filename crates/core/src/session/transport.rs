/// Parsed client-side parameters from the SETUP `Transport` header
/// (RFC 2326 §12.39).
///
/// Only RTP-over-UDP unicast is implemented; an interleaved-TCP request is
/// rejected by the caller before parsing.
///
/// ## Wire format
///
/// ```text
/// Client → Server:
///   Transport: client_port=8000-8001;
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;destination=<clientIP>;source=<serverIP>;client_port=8000-8001;server_port=6000-6001
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,
}

impl TransportHeader {
    /// Extract `client_port=RTP-RTCP` from a semicolon-separated header
    /// value. A lone port (`client_port=8000`) leaves the RTCP port 0, as
    /// a degenerate-but-parseable request.
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("client_port=") {
                let mut ends = ports.splitn(2, '-');
                let rtp_port: u16 = ends.next()?.trim().parse().ok()?;
                let rtcp_port: u16 = match ends.next() {
                    Some(p) => p.trim().parse().ok()?,
                    None => 0,
                };
                return Some(TransportHeader {
                    client_rtp_port: rtp_port,
                    client_rtcp_port: rtcp_port,
                });
            }
        }
        None
    }
}
