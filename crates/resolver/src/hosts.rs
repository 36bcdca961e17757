//! Hosts-file parsing. Produces the name → address maps the resolver
//! consults for search-list decisions and seeds into its cache at init.

use rudder_domain::RecordType;
use rustc_hash::FxHashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

#[derive(Debug, Default)]
pub struct HostsFile {
    v4: FxHashMap<String, Ipv4Addr>,
    v6: FxHashMap<String, Ipv6Addr>,
}

impl HostsFile {
    /// Parse hosts-file lines. Comments are stripped, the first address
    /// seen for a name wins, aliases are registered like the canonical
    /// name. Guarantees `localhost` entries for both families.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut hosts = Self::default();
        for line in lines {
            let line = line.as_ref();
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();
            let Some(addr_str) = fields.next() else {
                continue;
            };
            let addr: IpAddr = match addr_str.parse() {
                Ok(a) => a,
                Err(_) => {
                    warn!(line, "skipping unparseable hosts line");
                    continue;
                }
            };
            for name in fields {
                let name = name.to_ascii_lowercase();
                match addr {
                    IpAddr::V4(v4) => {
                        hosts.v4.entry(name).or_insert(v4);
                    }
                    IpAddr::V6(v6) => {
                        hosts.v6.entry(name).or_insert(v6);
                    }
                }
            }
        }
        hosts
            .v4
            .entry("localhost".to_string())
            .or_insert(Ipv4Addr::LOCALHOST);
        hosts
            .v6
            .entry("localhost".to_string())
            .or_insert(Ipv6Addr::LOCALHOST);
        hosts
    }

    pub fn lookup_v4(&self, name: &str) -> Option<Ipv4Addr> {
        self.v4.get(name).copied()
    }

    pub fn lookup_v6(&self, name: &str) -> Option<Ipv6Addr> {
        self.v6.get(name).copied()
    }

    /// Whether the hosts file defines `name` for the given record type.
    /// Used to skip search-list expansion for locally defined names.
    pub fn defines(&self, name: &str, qtype: RecordType) -> bool {
        match qtype {
            RecordType::A => self.v4.contains_key(name),
            RecordType::AAAA => self.v6.contains_key(name),
            _ => false,
        }
    }

    /// All entries, for cache seeding.
    pub fn entries(&self) -> impl Iterator<Item = (&str, IpAddr)> {
        self.v4
            .iter()
            .map(|(n, a)| (n.as_str(), IpAddr::V4(*a)))
            .chain(self.v6.iter().map(|(n, a)| (n.as_str(), IpAddr::V6(*a))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_aliases_and_comments() {
        let hosts = HostsFile::parse(&[
            "# system hosts",
            "127.0.0.1  localhost",
            "198.51.100.10 app.internal app  # gateway",
            "::1 localhost ip6-localhost",
            "bogus-line",
        ]);
        assert_eq!(hosts.lookup_v4("localhost"), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(
            hosts.lookup_v4("app"),
            Some(Ipv4Addr::new(198, 51, 100, 10))
        );
        assert_eq!(hosts.lookup_v6("ip6-localhost"), Some(Ipv6Addr::LOCALHOST));
        assert!(hosts.defines("app.internal", RecordType::A));
        assert!(!hosts.defines("app.internal", RecordType::AAAA));
        assert!(!hosts.defines("app.internal", RecordType::SRV));
    }

    #[test]
    fn test_first_entry_wins() {
        let hosts = HostsFile::parse(&["10.0.0.1 dup.internal", "10.0.0.2 dup.internal"]);
        assert_eq!(hosts.lookup_v4("dup.internal"), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_localhost_fallbacks() {
        let hosts = HostsFile::parse::<&str>(&[]);
        assert_eq!(hosts.lookup_v4("localhost"), Some(Ipv4Addr::LOCALHOST));
        assert_eq!(hosts.lookup_v6("localhost"), Some(Ipv6Addr::LOCALHOST));
    }
}
