//! Address detection and wall-clock helpers

use std::net::UdpSocket;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
#[must_use]
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Best-effort detection of the host address peers should dial.
///
/// Connecting a UDP socket sends no packets; it only asks the kernel which
/// interface would route to the target. Falls back to loopback on hosts
/// with no route.
#[must_use]
pub fn detect_host() -> String {
    let detected = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());
    detected.unwrap_or_else(|_| "127.0.0.1".to_owned())
}

/// The `host:port` other nodes should use for this service.
#[must_use]
pub fn advertised_addr(advertised_host: Option<&str>, port: u16) -> String {
    match advertised_host {
        Some(host) => format!("{host}:{port}"),
        None => format!("{}:{port}", detect_host()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ms_monotonic_enough() {
        let a = epoch_ms();
        let b = epoch_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // after 2020
    }

    #[test]
    fn test_advertised_addr_prefers_configured_host() {
        assert_eq!(advertised_addr(Some("node1"), 9700), "node1:9700");
    }

    #[test]
    fn test_advertised_addr_detects_something() {
        let addr = advertised_addr(None, 9700);
        assert!(addr.ends_with(":9700"));
        assert!(addr.len() > ":9700".len());
    }
}
