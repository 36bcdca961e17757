use crate::base::PeerTarget;
use std::sync::Arc;

/// Notifications fired after balancer mutations complete. The callback
/// observes the final state; it is always invoked outside the balancer
/// lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalancerEvent {
    /// An address was first placed in the balancer.
    Added {
        target: PeerTarget,
        port: u16,
        hostname: String,
    },
    /// An address was deleted.
    Removed {
        target: PeerTarget,
        port: u16,
        hostname: String,
    },
    /// The balancer health bit flipped.
    Health { healthy: bool },
}

pub type BalancerCallback = Arc<dyn Fn(&BalancerEvent) + Send + Sync>;
