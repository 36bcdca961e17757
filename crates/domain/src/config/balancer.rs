use serde::{Deserialize, Serialize};

/// One upstream in the balancer's initial host set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamHost {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_node_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancerConfig {
    /// Hosts registered at construction time.
    #[serde(default)]
    pub hosts: Vec<UpstreamHost>,

    /// Retry interval, seconds, for hosts whose DNS resolution failed.
    #[serde(default = "default_requery")]
    pub requery: u64,

    /// Pseudo-ttl, seconds, applied to records DNS refuses to cache
    /// (ttl=0).
    #[serde(default = "default_ttl0")]
    pub ttl0: u64,

    /// Minimum percentage of available weight for the balancer to report
    /// healthy. 0 disables the threshold (weight > 0 is enough).
    #[serde(default)]
    pub health_threshold: f64,

    /// Prefix for balancer log lines, to tell instances apart.
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    /// Ring balancer: number of wheel slots.
    #[serde(default = "default_wheel_size")]
    pub wheel_size: usize,

    /// Ring balancer: explicit slot assignment order, a permutation of
    /// `0..wheel_size`. Omit for the deterministic seeded shuffle.
    #[serde(default)]
    pub order: Option<Vec<usize>>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            requery: default_requery(),
            ttl0: default_ttl0(),
            health_threshold: 0.0,
            log_prefix: default_log_prefix(),
            wheel_size: default_wheel_size(),
            order: None,
        }
    }
}

fn default_port() -> u16 {
    80
}

fn default_node_weight() -> u32 {
    10
}

fn default_requery() -> u64 {
    30
}

fn default_ttl0() -> u64 {
    60
}

fn default_log_prefix() -> String {
    "balancer".to_string()
}

fn default_wheel_size() -> usize {
    1000
}
