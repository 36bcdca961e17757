//! resolv.conf parsing: nameservers, search list, and the options the
//! resolver honors, with the usual environment overrides applied on top.

use std::env;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ResolvConf {
    /// Raw nameserver fields, IPv4 or IPv6, without port.
    pub nameservers: Vec<String>,
    pub domain: Option<String>,
    pub search: Vec<String>,
    pub ndots: Option<u32>,
    /// `options timeout:N`, seconds.
    pub timeout_secs: Option<u32>,
    /// `options attempts:N`.
    pub attempts: Option<u32>,
}

impl ResolvConf {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut conf = Self::default();
        for line in lines {
            let line = line.as_ref();
            let line = line.split(['#', ';']).next().unwrap_or("");
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => {
                    if let Some(addr) = fields.next() {
                        conf.nameservers.push(addr.to_string());
                    }
                }
                Some("domain") => {
                    conf.domain = fields.next().map(|d| d.to_ascii_lowercase());
                }
                Some("search") => {
                    conf.search = fields.map(|d| d.to_ascii_lowercase()).collect();
                }
                Some("options") => {
                    for opt in fields {
                        conf.apply_option(opt);
                    }
                }
                _ => {}
            }
        }
        conf
    }

    fn apply_option(&mut self, opt: &str) {
        if let Some(v) = opt.strip_prefix("ndots:") {
            self.ndots = v.parse().ok();
        } else if let Some(v) = opt.strip_prefix("timeout:") {
            self.timeout_secs = v.parse().ok();
        } else if let Some(v) = opt.strip_prefix("attempts:") {
            self.attempts = v.parse().ok();
        }
    }

    /// Apply `LOCALDOMAIN` and `RES_OPTIONS`, which override the file.
    pub fn apply_env(&mut self) {
        if let Ok(localdomain) = env::var("LOCALDOMAIN") {
            let domains: Vec<String> = localdomain
                .split_whitespace()
                .map(|d| d.to_ascii_lowercase())
                .collect();
            if !domains.is_empty() {
                debug!(?domains, "search list overridden by LOCALDOMAIN");
                self.search = domains;
                self.domain = None;
            }
        }
        if let Ok(res_options) = env::var("RES_OPTIONS") {
            for opt in res_options.split_whitespace() {
                self.apply_option(opt);
            }
        }
    }

    /// The effective search list: `search` when present, else the single
    /// `domain`, else empty.
    pub fn effective_search(&self) -> Vec<String> {
        if !self.search.is_empty() {
            self.search.clone()
        } else if let Some(d) = &self.domain {
            vec![d.clone()]
        } else {
            Vec::new()
        }
    }
}
