use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker used in place of a host id when binding a listener on every
/// interface.
const WILDCARD_ID: &str = "*";

/// Transport protocol of an [`Endpoint`], in prefix priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP-like protocol; the endpoint carries a host id and a port.
    Tcp,
    /// In-process protocol; the endpoint is an opaque name with no port.
    Inproc,
    /// IPC-like protocol; addressed like [`Protocol::Tcp`].
    Ipc,
}

impl Protocol {
    const ALL: [Self; 3] = [Self::Tcp, Self::Inproc, Self::Ipc];

    /// Canonical address prefix for this protocol.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Tcp => "tcp://",
            Self::Inproc => "inproc://",
            Self::Ipc => "ipc://",
        }
    }
}

/// Errors that can occur while parsing a canonical endpoint string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseEndpointError {
    /// The id and port halves must be separated by exactly one `:`.
    #[error("expected exactly one `:` between id and port in {0:?}")]
    MissingPort(String),

    /// The port half was not a base-10 integer.
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

/// Canonical address of a transport endpoint: protocol, host or opaque id,
/// and an optional port.
///
/// The canonical string form is `<prefix><id>` when the port is unset or the
/// protocol is in-process, `<prefix><id>:<port>` otherwise. When embedded in
/// a JSON structure an endpoint serializes as that string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Endpoint {
    protocol: Protocol,
    id: String,
    port: u16,
}

impl Endpoint {
    /// Builds an endpoint from its parts. The port is forced to zero for
    /// in-process endpoints.
    pub fn new(protocol: Protocol, id: impl Into<String>, port: u16) -> Self {
        let port = if protocol == Protocol::Inproc { 0 } else { port };
        Self {
            protocol,
            id: id.into(),
            port,
        }
    }

    /// The endpoint's protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Host or opaque name part of the address.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Port part of the address; zero means unset.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Derived copy with the id replaced by the wildcard bind marker.
    ///
    /// The original endpoint is left untouched, and the derived copy does
    /// not compare equal to it.
    #[must_use]
    pub fn wildcard(&self) -> Self {
        Self {
            protocol: self.protocol,
            id: WILDCARD_ID.to_owned(),
            port: self.port,
        }
    }

    /// Cheap probe for whether `s` could carry an address at all.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        s.contains(':')
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 || self.protocol == Protocol::Inproc {
            write!(f, "{}{}", self.protocol.prefix(), self.id)
        } else {
            write!(f, "{}{}:{}", self.protocol.prefix(), self.id, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut protocol = Protocol::Tcp;
        let mut rest = s;

        for candidate in Protocol::ALL {
            if let Some(stripped) = s.strip_prefix(candidate.prefix()) {
                protocol = candidate;
                rest = stripped;
                break;
            }
        }

        if protocol == Protocol::Inproc {
            return Ok(Self {
                protocol,
                id: rest.to_owned(),
                port: 0,
            });
        }

        let mut parts = rest.splitn(3, ':');
        let (id, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(port), None) => (id, port),
            _ => return Err(ParseEndpointError::MissingPort(s.to_owned())),
        };
        let port = port
            .parse::<u16>()
            .map_err(|_| ParseEndpointError::InvalidPort(s.to_owned()))?;

        Ok(Self {
            protocol,
            id: id.to_owned(),
            port,
        })
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ParseEndpointError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_tcp_with_port() {
        let endpoint = Endpoint::new(Protocol::Tcp, "127.0.0.1", 1000);

        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:1000");
    }

    #[test]
    fn inproc_suppresses_port() {
        let endpoint = Endpoint::new(Protocol::Inproc, "127.0.0.1", 1000);

        assert_eq!(endpoint.to_string(), "inproc://127.0.0.1");
        assert_eq!(endpoint.port(), 0);
    }

    #[test]
    fn round_trips_canonical_strings() {
        for s in [
            "tcp://127.0.0.1:1000",
            "inproc://blahblahblah",
            "ipc://some-name:9001",
        ] {
            let endpoint: Endpoint = s.parse().unwrap();
            assert_eq!(endpoint.to_string(), s);
        }
    }

    #[test]
    fn defaults_to_tcp_without_prefix() {
        let endpoint: Endpoint = "127.0.0.1:9000".parse().unwrap();

        assert_eq!(endpoint.protocol(), Protocol::Tcp);
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:9000");
    }

    #[test]
    fn inproc_id_is_taken_verbatim() {
        let endpoint: Endpoint = "inproc://a:b:c".parse().unwrap();

        assert_eq!(endpoint.id(), "a:b:c");
        assert_eq!(endpoint.port(), 0);
    }

    #[test]
    fn rejects_missing_or_extra_separators() {
        assert!(matches!(
            "tcp://127.0.0.1".parse::<Endpoint>(),
            Err(ParseEndpointError::MissingPort(_))
        ));
        assert!(matches!(
            "tcp://127.0.0.1:9000:1".parse::<Endpoint>(),
            Err(ParseEndpointError::MissingPort(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(matches!(
            "tcp://127.0.0.1:howdy".parse::<Endpoint>(),
            Err(ParseEndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn equality_is_structural() {
        let a = Endpoint::new(Protocol::Tcp, "127.0.0.1", 1000);
        let b = Endpoint::new(Protocol::Tcp, "127.0.0.1", 1000);
        let c = Endpoint::new(Protocol::Tcp, "127.0.0.1", 1001);
        let d = Endpoint::new(Protocol::Tcp, "10.0.0.1", 1000);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn wildcard_is_a_derived_copy() {
        let original = Endpoint::new(Protocol::Tcp, "127.0.0.1", 10000);
        let bound = original.wildcard();

        assert_eq!(bound.to_string(), "tcp://*:10000");
        assert_eq!(original.id(), "127.0.0.1");
        assert_ne!(original, bound);
    }

    #[test]
    fn serializes_as_canonical_string() {
        let endpoint = Endpoint::new(Protocol::Tcp, "127.0.0.1", 1000);

        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(json, "\"tcp://127.0.0.1:1000\"");

        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, endpoint);
    }

    #[test]
    fn deserialization_rejects_malformed_strings() {
        assert!(serde_json::from_str::<Endpoint>("\"tcp://127.0.0.1\"").is_err());
    }

    #[test]
    fn validity_probe() {
        assert!(Endpoint::is_valid("tcp://127.0.0.1:1000"));
        assert!(!Endpoint::is_valid("howdy"));
    }
}
