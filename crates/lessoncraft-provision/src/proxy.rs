//! Proxy-host encoding.
//!
//! Each instance gets a domain-safe hostname encoding
//! `{session, routable_ip, options}` so the reverse proxy can route
//! browser traffic to the instance without any shared state:
//! `ip10-0-0-2-ab12cd34` (plus `-2222` when a port override is encoded).

use lessoncraft_core::SessionId;

use crate::error::{ProvisionError, Result};

/// Optional parts of an encoded host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostOpts {
    /// Port the proxy should dial instead of the default.
    pub encoded_port: Option<u16>,
}

/// Encode a session + instance IP into a domain-safe hostname label.
#[must_use]
pub fn encode_host(session_id: &SessionId, routable_ip: &str, opts: HostOpts) -> String {
    let ip_part = routable_ip.replace('.', "-");
    let mut host = format!("ip{ip_part}-{}", session_id.short());
    if let Some(port) = opts.encoded_port {
        host.push('-');
        host.push_str(&port.to_string());
    }
    host
}

/// The components recovered from an encoded host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHost {
    /// The instance's routable IP.
    pub ip: String,
    /// The 8-character session prefix.
    pub session_short: String,
    /// Encoded port override, if any.
    pub port: Option<u16>,
}

/// Decode a hostname label produced by [`encode_host`].
///
/// # Errors
///
/// Returns a protocol error if the label does not parse.
pub fn decode_host(host: &str) -> Result<DecodedHost> {
    let rest = host
        .strip_prefix("ip")
        .ok_or_else(|| ProvisionError::Protocol(format!("not an encoded host: {host}")))?;

    let parts: Vec<&str> = rest.split('-').collect();
    if parts.len() < 5 {
        return Err(ProvisionError::Protocol(format!(
            "not an encoded host: {host}"
        )));
    }

    // IPv4 always contributes exactly four labels.
    let octets = &parts[..4];
    if !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return Err(ProvisionError::Protocol(format!(
            "bad address in encoded host: {host}"
        )));
    }
    let ip = octets.join(".");

    let session_short = parts[4].to_string();
    let port = match parts.get(5) {
        Some(p) => Some(p.parse::<u16>().map_err(|_| {
            ProvisionError::Protocol(format!("bad port in encoded host: {host}"))
        })?),
        None => None,
    };

    Ok(DecodedHost {
        ip,
        session_short,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_without_port() {
        let session = SessionId::generate();
        let host = encode_host(&session, "10.0.5.3", HostOpts::default());

        let decoded = decode_host(&host).unwrap();
        assert_eq!(decoded.ip, "10.0.5.3");
        assert_eq!(decoded.session_short, session.short());
        assert_eq!(decoded.port, None);
    }

    #[test]
    fn roundtrip_with_port() {
        let session = SessionId::generate();
        let host = encode_host(
            &session,
            "192.168.1.20",
            HostOpts {
                encoded_port: Some(222),
            },
        );

        let decoded = decode_host(&host).unwrap();
        assert_eq!(decoded.ip, "192.168.1.20");
        assert_eq!(decoded.port, Some(222));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_host("nginx").is_err());
        assert!(decode_host("ip10-0-0").is_err());
        assert!(decode_host("ip999-0-0-1-abcd1234").is_err());
    }
}
