//! Peer address resolution and cluster membership (§4.2, SUPPLEMENT).
//!
//! The wire protocol only ever names peers by [`Node`]; turning a node name
//! into a `SocketAddr` to dial is a pluggable concern so deployments can
//! back it with whatever discovery mechanism they already run (DNS, a
//! config file, a gossip layer). [`StaticMembership`] is the default,
//! config-driven implementation.

use std::net::SocketAddr;

use ahash::HashMap;
use codec::packet::Node;

/// A cluster membership provider: given a peer's name, produce the address
/// of its control port, and (optionally consulted before a send) whether
/// the peer currently looks reachable. Implementations are expected to be
/// cheap to call repeatedly — the resolver consults `control_address` on
/// every dispatcher miss, and a client actor may consult `ping` before
/// every call if liveness checking is enabled.
pub trait Membership: Send + Sync + 'static {
    fn control_address(&self, peer: &Node) -> Option<SocketAddr>;

    /// Whether `peer` currently looks reachable. This is a best-effort,
    /// out-of-band signal — a `true` here is not a guarantee the next send
    /// will succeed, only an earlier one than waiting for a TCP write to a
    /// dead peer to eventually time out.
    fn ping(&self, peer: &Node) -> bool;
}

/// A fixed, config-loaded node name -> control address table. Good enough
/// for a cluster whose membership is known up front and changes rarely.
pub struct StaticMembership {
    addresses: HashMap<Node, SocketAddr>,
}

impl StaticMembership {
    pub fn new(addresses: impl IntoIterator<Item = (Node, SocketAddr)>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }
}

impl Membership for StaticMembership {
    fn control_address(&self, peer: &Node) -> Option<SocketAddr> {
        self.addresses.get(peer).copied()
    }

    /// A peer configured with an address is always reported reachable —
    /// this implementation has no real liveness signal of its own.
    fn ping(&self, peer: &Node) -> bool {
        self.addresses.contains_key(peer)
    }
}

/// Layers a static `node -> address` override table in front of another
/// membership provider. A peer named in the table is always resolved from
/// it, even if `inner` also has an opinion — the override is assumed to be
/// an operator correction and wins.
pub struct OverrideMembership<M> {
    overrides: HashMap<Node, SocketAddr>,
    inner: M,
}

impl<M: Membership> OverrideMembership<M> {
    pub fn new(overrides: impl IntoIterator<Item = (Node, SocketAddr)>, inner: M) -> Self {
        Self {
            overrides: overrides.into_iter().collect(),
            inner,
        }
    }
}

impl<M: Membership> Membership for OverrideMembership<M> {
    fn control_address(&self, peer: &Node) -> Option<SocketAddr> {
        self.overrides
            .get(peer)
            .copied()
            .or_else(|| self.inner.control_address(peer))
    }

    fn ping(&self, peer: &Node) -> bool {
        self.overrides.contains_key(peer) || self.inner.ping(peer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveError;

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer not present in cluster membership")
    }
}

impl std::error::Error for ResolveError {}

/// Resolves a peer to the control-port address a new client actor should
/// dial, consulting the membership provider.
pub struct Resolver<M> {
    membership: std::sync::Arc<M>,
}

impl<M: Membership> Resolver<M> {
    pub fn new(membership: std::sync::Arc<M>) -> Self {
        Self { membership }
    }

    pub fn resolve(&self, peer: &Node) -> Result<SocketAddr, ResolveError> {
        self.membership.control_address(peer).ok_or(ResolveError)
    }

    /// Hands back the membership provider as a trait object, so a client
    /// actor can hold onto it for pre-send liveness checks without the
    /// actor itself needing to be generic over `M`.
    pub fn membership(&self) -> std::sync::Arc<dyn Membership> {
        self.membership.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    #[test]
    fn resolves_known_peer() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 9000));
        let membership = StaticMembership::new([(Node::from("peerB"), addr)]);
        let resolver = Resolver::new(std::sync::Arc::new(membership));
        assert_eq!(resolver.resolve(&Node::from("peerB")), Ok(addr));
    }

    #[test]
    fn unknown_peer_fails() {
        let membership = StaticMembership::new([]);
        let resolver = Resolver::new(std::sync::Arc::new(membership));
        assert_eq!(resolver.resolve(&Node::from("ghost")), Err(ResolveError));
    }

    #[test]
    fn ping_reports_reachable_only_for_configured_peers() {
        let membership = StaticMembership::new([(Node::from("peerB"), SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)))]);
        assert!(membership.ping(&Node::from("peerB")));
        assert!(!membership.ping(&Node::from("ghost")));
    }

    #[test]
    fn override_wins_over_inner_membership() {
        let inner_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 1111));
        let override_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 2222));
        let inner = StaticMembership::new([(Node::from("peerB"), inner_addr)]);
        let membership = OverrideMembership::new([(Node::from("peerB"), override_addr)], inner);
        let resolver = Resolver::new(std::sync::Arc::new(membership));
        assert_eq!(resolver.resolve(&Node::from("peerB")), Ok(override_addr));
    }
}
