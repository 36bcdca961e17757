//! Load balancing over DNS-discovered upstream endpoints: a host/address
//! tree kept in sync with the resolver, and a consistent-hashing ring of
//! wheel slots over the weighted address set.

mod base;
mod events;
mod handle;
mod ring;

pub use base::{AddressStatus, BalancerStatus, HostStatus, PeerTarget, WeightStatus};
pub use events::{BalancerCallback, BalancerEvent};
pub use handle::{GcHook, Handle, HandleData, HandlePool};
pub use ring::{hash_crc32, hash_md5, Peer, RingBalancer};
