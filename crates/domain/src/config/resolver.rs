use super::source::ConfigSource;
use crate::record::{OrderType, RecordType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Upstream nameservers, `ip` or `ip:port`. Empty means "use the
    /// servers from resolv.conf".
    #[serde(default)]
    pub nameservers: Vec<String>,

    #[serde(default = "default_hosts")]
    pub hosts: ConfigSource,

    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: ConfigSource,

    /// Lookup type order. `LAST` is replaced by the type that last
    /// succeeded for the queried name.
    #[serde(default = "default_order")]
    pub order: Vec<OrderType>,

    /// Minimum dot count before a bare name skips search-list expansion.
    /// `None` falls back to resolv.conf (default 1).
    #[serde(default)]
    pub ndots: Option<u32>,

    /// Search suffixes. `None` falls back to resolv.conf search/domain.
    #[serde(default)]
    pub search: Option<Vec<String>>,

    /// Cache ttl, seconds, for non-NXDOMAIN server errors.
    #[serde(default = "default_bad_ttl")]
    pub bad_ttl: f64,

    /// Cache ttl, seconds, for NXDOMAIN and empty answers.
    #[serde(default = "default_empty_ttl")]
    pub empty_ttl: f64,

    /// Extra lifetime, seconds, an entry stays usable past expiry for
    /// stale-while-refreshing serving.
    #[serde(default = "default_stale_ttl")]
    pub stale_ttl: f64,

    /// Accept IPv6 nameservers from resolv.conf.
    #[serde(default)]
    pub enable_ipv6: bool,

    /// Per-attempt transport timeout, milliseconds. `None` falls back to
    /// resolv.conf `options timeout:N` (seconds), then 2000 ms.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Transport attempts per query. `None` falls back to resolv.conf
    /// `options attempts:N`, then 5.
    #[serde(default)]
    pub retrans: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            hosts: default_hosts(),
            resolv_conf: default_resolv_conf(),
            order: default_order(),
            ndots: None,
            search: None,
            bad_ttl: default_bad_ttl(),
            empty_ttl: default_empty_ttl(),
            stale_ttl: default_stale_ttl(),
            enable_ipv6: false,
            timeout: None,
            retrans: None,
        }
    }
}

fn default_hosts() -> ConfigSource {
    ConfigSource::Path("/etc/hosts".to_string())
}

fn default_resolv_conf() -> ConfigSource {
    ConfigSource::Path("/etc/resolv.conf".to_string())
}

pub(crate) fn default_order() -> Vec<OrderType> {
    vec![
        OrderType::LastSuccess,
        OrderType::Query(RecordType::SRV),
        OrderType::Query(RecordType::A),
        OrderType::Query(RecordType::AAAA),
        OrderType::Query(RecordType::CNAME),
    ]
}

fn default_bad_ttl() -> f64 {
    1.0
}

fn default_empty_ttl() -> f64 {
    30.0
}

fn default_stale_ttl() -> f64 {
    4.0
}
