//! # Reachability Seam
//!
//! The manager checks reachability before every run and fails fast when
//! offline. Cost-avoidance policy: never spend battery or network
//! attempting work known to fail.

use async_trait::async_trait;

/// Network reachability check, injected by the host.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// True when the network is believed reachable.
    async fn is_reachable(&self) -> bool;
}

/// Fallback for hosts without a reachability signal; always answers yes.
#[derive(Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn is_reachable(&self) -> bool {
        true
    }
}
