//! DNS transport seam. The resolver only needs "query this name and type,
//! give me records or an error"; the UDP implementation speaks RFC 1035
//! wire format, and the mock replays scripted answers for tests.

mod mock;
mod udp;

pub use mock::MockTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use rudder_domain::{DiscoveryError, Record, RecordType};

/// One decoded DNS response: status plus answer/additional records the
/// resolver knows how to classify.
#[derive(Debug, Clone, Default)]
pub struct QueryReply {
    pub rcode: u16,
    pub answers: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl QueryReply {
    pub fn answer(records: Vec<Record>) -> Self {
        Self {
            rcode: 0,
            answers: records,
            additionals: Vec::new(),
        }
    }

    pub fn nxdomain() -> Self {
        Self {
            rcode: 3,
            answers: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn servfail() -> Self {
        Self {
            rcode: 2,
            answers: Vec::new(),
            additionals: Vec::new(),
        }
    }
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn query(&self, qname: &str, qtype: RecordType)
        -> Result<QueryReply, DiscoveryError>;
}
