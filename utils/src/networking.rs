use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;

/// A `host:port` network address. The host part is kept unresolved: announced
/// addresses may carry names that only resolve at dial time, and the daemon
/// must be able to reason about addresses such as `":4280"` before binding.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[repr(transparent)]
pub struct NetAddress(String);

impl NetAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the final colon, or the whole string when no port
    /// separator is present.
    pub fn host(&self) -> &str {
        match self.0.rfind(':') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// Everything after the final colon.
    pub fn port(&self) -> &str {
        match self.0.rfind(':') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    /// True when the host part names the local machine. A blank host is not
    /// loopback: it binds all interfaces.
    pub fn is_loopback(&self) -> bool {
        let host = self.host();
        if host == "localhost" {
            return true;
        }
        match IpAddr::from_str(host) {
            Ok(ip) => ip.is_loopback(),
            Err(_) => false,
        }
    }
}

impl Display for NetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetAddress {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for NetAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}
