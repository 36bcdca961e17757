use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("dns server error: {code} {text}")]
    DnsServer { code: u16, text: String },

    #[error("dns lookup pool exceeded retries ({retries}): {cause}")]
    PoolExceeded { retries: u32, cause: String },

    #[error("Balancer is unhealthy")]
    BalancerUnhealthy,

    #[error("No peers are available")]
    NoPeersAvailable,

    #[error("Address is marked as unavailable")]
    AddressUnavailable,

    #[error("Cannot get peer, a DNS update changed the balancer structure, please retry")]
    DnsUpdated,

    #[error("Cannot get peer, current index got reassigned to another address")]
    IndexReassigned,

    #[error("maximum dns recursion level reached")]
    MaxRecursion,

    #[error("recursion detected")]
    RecursionDetected,

    #[error("{0}")]
    PeerNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid wheel order: {0}")]
    InvalidWheelOrder(String),

    #[error("dns cache only lookup failed")]
    CacheOnlyMiss,

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DiscoveryError {
    /// Build the "no peer found" error for `set_peer_status` lookups,
    /// listing the nested dns names when the only matches were
    /// name-typed addresses from SRV indirection.
    pub fn peer_not_found(
        hostname: Option<&str>,
        ip: &str,
        port: u16,
        nested_names: &[String],
    ) -> Self {
        let mut msg = format!(
            "no peer found by name '{}' and address {}:{}",
            hostname.unwrap_or("<unknown>"),
            ip,
            port
        );
        if !nested_names.is_empty() {
            msg.push_str(&format!(
                " (possibly the IP originated from these nested dns names: {})",
                nested_names.join(",")
            ));
        }
        DiscoveryError::PeerNotFound(msg)
    }

    /// Error from a DNS response code, with the stable message format.
    pub fn from_rcode(code: u16) -> Self {
        DiscoveryError::DnsServer {
            code,
            text: crate::record::rcode_text(code).to_string(),
        }
    }
}
