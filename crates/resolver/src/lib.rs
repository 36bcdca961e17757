//! Caching DNS client for rudder: record cache with stale handling, query
//! coalescing, search-list expansion, type-order fallback, CNAME
//! dereferencing, and record-level load balancing (`to_ip`).

pub mod cache;
pub mod clock;
pub mod hosts;
pub mod resolv_conf;
pub mod transport;

mod inflight;
mod resolver;

pub use cache::{CacheAnswer, RecordCache};
pub use resolver::Resolver;
pub use transport::{DnsTransport, MockTransport, QueryReply, UdpTransport};
