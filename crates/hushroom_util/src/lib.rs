#![forbid(unsafe_code)]

pub mod endpoint {
	use std::net::SocketAddr;

	/// Default chat port.
	pub const DEFAULT_PORT: u16 = 8081;

	/// Parsed `tcp://host:port` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct TcpEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl TcpEndpoint {
		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Convert to `SocketAddr` only if the host is an IP literal.
		pub fn to_socket_addr_if_ip_literal(&self) -> Result<SocketAddr, String> {
			self.hostport()
				.parse()
				.map_err(|_| format!("host must be an IP literal (DNS names not supported here): {}", self.host))
		}

		/// Parse an endpoint string in the form `tcp://host:port`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected tcp://host:port)".to_string());
			}

			let rest = s
				.strip_prefix("tcp://")
				.ok_or_else(|| format!("invalid endpoint (expected tcp://host:port): {s}"))?;

			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(format!(
					"invalid endpoint (expected tcp://host:port without path/query/fragment): {s}"
				));
			}

			let (host, port_str) = rest
				.rsplit_once(':')
				.ok_or_else(|| format!("invalid endpoint (missing :port, expected tcp://host:port): {s}"))?;

			let host = host.trim();
			if host.is_empty() {
				return Err(format!("invalid endpoint host (expected tcp://host:port): {s}"));
			}

			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(format!(
					"invalid endpoint host (IPv6 must be bracketed like tcp://[::1]:8081): {s}"
				));
			}

			let port: u16 = port_str
				.trim()
				.parse()
				.map_err(|_| format!("invalid endpoint port (expected 0..=65535): {s}"))?;

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	impl From<SocketAddr> for TcpEndpoint {
		fn from(addr: SocketAddr) -> Self {
			let host = match addr {
				SocketAddr::V4(v4) => v4.ip().to_string(),
				SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
			};
			Self { host, port: addr.port() }
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_dns_hostname() {
			let e = TcpEndpoint::parse("tcp://chat.example.com:8081").unwrap();
			assert_eq!(e.host, "chat.example.com");
			assert_eq!(e.port, 8081);
			assert_eq!(e.hostport(), "chat.example.com:8081");
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = TcpEndpoint::parse("tcp://[::1]:8081").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.hostport(), "[::1]:8081");
		}

		#[test]
		fn port_zero_is_allowed_for_ephemeral_binds() {
			let e = TcpEndpoint::parse("tcp://127.0.0.1:0").unwrap();
			assert_eq!(e.port, 0);
		}

		#[test]
		fn rejects_malformed_endpoints() {
			assert!(TcpEndpoint::parse("").is_err());
			assert!(TcpEndpoint::parse("127.0.0.1:8081").is_err());
			assert!(TcpEndpoint::parse("tcp://::1:8081").is_err());
			assert!(TcpEndpoint::parse("tcp://127.0.0.1").is_err());
			assert!(TcpEndpoint::parse("tcp://127.0.0.1:8081/").is_err());
		}

		#[test]
		fn default_port_endpoint_parses() {
			assert_eq!(DEFAULT_PORT, 8081);
			let e = TcpEndpoint::parse(&format!("tcp://127.0.0.1:{DEFAULT_PORT}")).unwrap();
			assert_eq!(e.port, DEFAULT_PORT);
			assert_eq!(e.to_socket_addr_if_ip_literal().unwrap().port(), DEFAULT_PORT);
		}

		#[test]
		fn errors_name_the_expected_scheme() {
			for bad in ["", "   ", "quic://127.0.0.1:8081", "tcp://127.0.0.1:8081?x=1", "tcp://:8081"] {
				let err = TcpEndpoint::parse(bad).unwrap_err();
				assert!(err.contains("expected tcp://host:port"), "{bad:?}: {err}");
			}

			let err = TcpEndpoint::parse("tcp://127.0.0.1:99999").unwrap_err();
			assert!(err.contains("0..=65535"), "{err}");
		}

		#[test]
		fn socket_addr_roundtrip() {
			let addr: SocketAddr = "[::1]:9000".parse().unwrap();
			let e = TcpEndpoint::from(addr);
			assert_eq!(e.to_socket_addr_if_ip_literal().unwrap(), addr);

			let dns = TcpEndpoint::parse("tcp://chat.example.com:1").unwrap();
			assert!(dns.to_socket_addr_if_ip_literal().is_err());
		}
	}
}
