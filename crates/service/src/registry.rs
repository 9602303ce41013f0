//! The client registry and dispatcher (§4.7). The registry is a plain
//! lookup table; the dispatcher is the only thing allowed to populate it,
//! serializing creation so two concurrent calls to the same peer never
//! race into spawning two actors (I1).

use std::sync::Arc;

use ahash::HashMap;
use codec::packet::Node;
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::EngineOptions;
use crate::client::{self, ClientHandle};
use crate::error::TransportError;
use crate::resolver::{Membership, Resolver};
use crate::stats::Statistics;
use crate::supervisor::ClientSupervisor;

/// The live node -> client actor table. Reads never block on creation;
/// only [`Dispatcher::get_or_create`] takes the creation lock.
pub struct ClientRegistry {
    table: RwLock<HashMap<Node, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the current handle for `peer`, if one is registered and
    /// still alive. A dead entry is left in place — the dispatcher
    /// overwrites it on the next creation, rather than every reader paying
    /// for a write lock to clean it up.
    pub fn get_live(&self, peer: &Node) -> Option<ClientHandle> {
        let table = self.table.read();
        table.get(peer).filter(|h| h.is_alive()).cloned()
    }

    fn insert(&self, peer: Node, handle: ClientHandle) {
        self.table.write().insert(peer, handle);
    }

    fn remove(&self, peer: &Node) -> Option<ClientHandle> {
        self.table.write().remove(peer)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The only writer of [`ClientRegistry`]. `create_lock` makes "check, then
/// create, then insert" atomic across concurrent callers targeting the same
/// (or different) peers — it is coarse-grained on purpose, since actor
/// creation is rare compared to calls against an already-live actor.
pub struct Dispatcher<M> {
    options: Arc<EngineOptions>,
    registry: Arc<ClientRegistry>,
    resolver: Resolver<M>,
    supervisor: Arc<ClientSupervisor>,
    statistics: Arc<Statistics>,
    create_lock: AsyncMutex<()>,
}

impl<M: Membership> Dispatcher<M> {
    pub fn new(
        options: Arc<EngineOptions>,
        registry: Arc<ClientRegistry>,
        resolver: Resolver<M>,
        supervisor: Arc<ClientSupervisor>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            options,
            registry,
            resolver,
            supervisor,
            statistics,
            create_lock: AsyncMutex::new(()),
        }
    }

    pub async fn get_or_create(&self, peer: Node) -> Result<ClientHandle, TransportError> {
        if let Some(handle) = self.registry.get_live(&peer) {
            return Ok(handle);
        }

        let _guard = self.create_lock.lock().await;
        // Re-check: another caller may have created it while we waited for
        // the lock.
        if let Some(handle) = self.registry.get_live(&peer) {
            return Ok(handle);
        }

        let control_addr = self.resolver.resolve(&peer).map_err(|_| TransportError::UnknownPeer)?;
        let liveness = self.options.liveness_check.then(|| self.resolver.membership());
        let handle = client::spawn(
            self.options.local_node.clone(),
            peer.clone(),
            control_addr,
            self.options.timeouts.connect,
            self.options.timeouts.send,
            self.options.timeouts.client_inactivity,
            liveness,
            self.supervisor.clone(),
            self.statistics.clone(),
        )
        .await?;

        self.registry.insert(peer, handle.clone());
        Ok(handle)
    }

    /// Stops the actor for `peer`, if registered, and removes it from the
    /// table immediately (unlike the lazy reap on natural death).
    pub async fn stop(&self, peer: &Node) -> bool {
        match self.registry.remove(peer) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CallPolicy;
    use crate::Timeouts;
    use crate::resolver::StaticMembership;
    use std::net::{Ipv4Addr, SocketAddr};

    fn options() -> Arc<EngineOptions> {
        Arc::new(EngineOptions {
            local_node: Node::from("local"),
            control_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            policy: CallPolicy::Off,
            timeouts: Timeouts::default(),
            liveness_check: false,
        })
    }

    #[tokio::test]
    async fn unknown_peer_is_rejected_before_connecting() {
        let membership = Arc::new(StaticMembership::new([]));
        let dispatcher = Dispatcher::new(
            options(),
            Arc::new(ClientRegistry::new()),
            Resolver::new(membership),
            Arc::new(ClientSupervisor::new()),
            Arc::new(Statistics::default()),
        );

        let result = dispatcher.get_or_create(Node::from("ghost")).await;
        assert_eq!(result.err(), Some(TransportError::UnknownPeer));
    }

    #[tokio::test]
    async fn stop_on_unregistered_peer_is_a_no_op() {
        let membership = Arc::new(StaticMembership::new([]));
        let dispatcher = Dispatcher::new(
            options(),
            Arc::new(ClientRegistry::new()),
            Resolver::new(membership),
            Arc::new(ClientSupervisor::new()),
            Arc::new(Statistics::default()),
        );

        assert!(!dispatcher.stop(&Node::from("ghost")).await);
    }
}
