//! SDP (Session Description Protocol) generation (RFC 4566).
//!
//! Produces the SDP body returned by DESCRIBE responses. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- <sess-id> <sess-ver> IN IP4 <addr>       ← origin
//! s=<session-name>                              ← session name
//! i=<file-name>                                 ← information
//! t=0 0                                         ← timing
//! m=video 0 RTP/AVP 33                          ← media description (MP2T)
//! c=IN IP4 <addr>                               ← connection address
//! a=range:npt=0-<duration>                      ← playable range
//! a=size:fs=<bytes>                             ← backing file size
//! a=control:track1                              ← track control id
//! ```
//!
//! The `a=size` attribute is not a registered SDP attribute — the client
//! needs the byte size to preallocate its output file, and this private
//! attribute carries it.

/// Session name advertised in the `s=` line.
pub const SESSION_NAME: &str = "MPEG-TS file, streamed by tscast";

/// Generate an SDP session description for one streamable file.
///
/// `duration` of 0.0 (unknown) produces an open-ended range (`npt=0-`).
pub fn generate_sdp(
    file_name: &str,
    ip: &str,
    session_id: &str,
    payload_type: u8,
    duration: f64,
    file_size: u64,
    track_id: &str,
) -> String {
    let mut sdp: Vec<String> = Vec::new();

    sdp.push("v=0".to_string());
    sdp.push(format!("o=- {} 1 IN IP4 {}", session_id, ip));
    sdp.push(format!("s={}", SESSION_NAME));
    sdp.push(format!("i={}", file_name));
    sdp.push("t=0 0".to_string());
    sdp.push(format!("m=video 0 RTP/AVP {}", payload_type));
    sdp.push(format!("c=IN IP4 {}", ip));
    if duration == 0.0 {
        sdp.push("a=range:npt=0-".to_string());
    } else {
        sdp.push(format!("a=range:npt=0-{}", duration));
    }
    sdp.push(format!("a=size:fs={}", file_size));
    sdp.push(format!("a=control:{}", track_id));

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_mp2t_sdp() {
        let sdp = generate_sdp(
            "movie.ts",
            "192.168.1.100",
            "4217",
            crate::media::PAYLOAD_TYPE_MP2T,
            120.0,
            10_000_000,
            "track1",
        );
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 4217 1 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("i=movie.ts\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 33\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("a=range:npt=0-120\r\n"));
        assert!(sdp.contains("a=size:fs=10000000\r\n"));
        assert!(sdp.contains("a=control:track1\r\n"));
        assert!(sdp.ends_with("\r\n"));

        // Media attributes must follow the m= line.
        let m_idx = sdp.find("m=video").unwrap();
        assert!(sdp.find("a=range").unwrap() > m_idx);
        assert!(sdp.find("a=control").unwrap() > m_idx);
    }

    #[test]
    fn unknown_duration_is_open_ended() {
        let sdp = generate_sdp("x.ts", "10.0.0.1", "1", 33, 0.0, 42, "track1");
        assert!(sdp.contains("a=range:npt=0-\r\n"));
    }
}
