//! Core types for the rudder service-discovery workspace: the DNS record
//! model, answer sets with cache metadata, the error taxonomy, and
//! configuration structs shared by the resolver and balancer crates.

pub mod config;

mod answer;
mod errors;
mod record;

pub use answer::{AnswerSet, RecordSet, RotationState, SrvRotation};
pub use config::{BalancerConfig, ConfigSource, ResolverConfig, UpstreamHost};
pub use errors::DiscoveryError;
pub use record::{rcode_text, OrderType, RData, Record, RecordType, SrvData};
