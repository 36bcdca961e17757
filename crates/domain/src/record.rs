use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// The record types the resolver understands. Wire codes per RFC 1035/2782.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    SRV,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
            RecordType::SRV => "SRV",
        }
    }

    pub fn to_u16(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::CNAME => 5,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(RecordType::A),
            5 => Some(RecordType::CNAME),
            16 => Some(RecordType::TXT),
            28 => Some(RecordType::AAAA),
            33 => Some(RecordType::SRV),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "TXT" => Ok(RecordType::TXT),
            "SRV" => Ok(RecordType::SRV),
            _ => Err(format!("Unknown record type: {}", s)),
        }
    }
}

/// One entry in the lookup type order. `LastSuccess` is the sentinel that
/// is replaced at resolution time by the type that last succeeded for the
/// queried name (integer tag -1, matching no wire code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderType {
    LastSuccess,
    Query(RecordType),
}

impl OrderType {
    pub fn to_i32(&self) -> i32 {
        match self {
            OrderType::LastSuccess => -1,
            OrderType::Query(t) => t.to_u16() as i32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::LastSuccess => "LAST",
            OrderType::Query(t) => t.as_str(),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("LAST") {
            Ok(OrderType::LastSuccess)
        } else {
            s.parse::<RecordType>().map(OrderType::Query)
        }
    }
}

impl TryFrom<String> for OrderType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OrderType> for String {
    fn from(o: OrderType) -> String {
        o.as_str().to_string()
    }
}

/// SRV record data (RFC 2782).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvData {
    pub target: String,
    pub port: u16,
    pub weight: u16,
    pub priority: u16,
}

/// Type-specific record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Txt(Vec<String>),
    Srv(SrvData),
}

/// A single DNS resource record as surfaced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub class: u16,
    pub ttl: u32,
    pub data: RData,
}

impl Record {
    pub fn rtype(&self) -> RecordType {
        match self.data {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::AAAA,
            RData::Cname(_) => RecordType::CNAME,
            RData::Txt(_) => RecordType::TXT,
            RData::Srv(_) => RecordType::SRV,
        }
    }

    pub fn a(name: impl Into<String>, address: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.into(),
            class: 1,
            ttl,
            data: RData::A(address),
        }
    }

    pub fn aaaa(name: impl Into<String>, address: Ipv6Addr, ttl: u32) -> Self {
        Self {
            name: name.into(),
            class: 1,
            ttl,
            data: RData::Aaaa(address),
        }
    }

    pub fn ip(name: impl Into<String>, address: IpAddr, ttl: u32) -> Self {
        match address {
            IpAddr::V4(v4) => Self::a(name, v4, ttl),
            IpAddr::V6(v6) => Self::aaaa(name, v6, ttl),
        }
    }

    pub fn cname(name: impl Into<String>, target: impl Into<String>, ttl: u32) -> Self {
        Self {
            name: name.into(),
            class: 1,
            ttl,
            data: RData::Cname(target.into()),
        }
    }

    pub fn srv(
        name: impl Into<String>,
        target: impl Into<String>,
        port: u16,
        weight: u16,
        priority: u16,
        ttl: u32,
    ) -> Self {
        Self {
            name: name.into(),
            class: 1,
            ttl,
            data: RData::Srv(SrvData {
                target: target.into(),
                port,
                weight,
                priority,
            }),
        }
    }

    /// The address carried by an A or AAAA record.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match &self.data {
            RData::A(v4) => Some(IpAddr::V4(*v4)),
            RData::Aaaa(v6) => Some(IpAddr::V6(*v6)),
            _ => None,
        }
    }
}

/// Human-readable text for a DNS response code, as embedded in
/// "dns server error" messages.
pub fn rcode_text(code: u16) -> &'static str {
    match code {
        0 => "no error",
        1 => "format error",
        2 => "server failure",
        3 => "name error",
        4 => "not implemented",
        5 => "refused",
        _ => "unknown error",
    }
}
