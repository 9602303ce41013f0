//! A thin client over a [`service::Engine`]: `call`/`cast` against a single
//! peer, plus `multicall`/`broadcast` fan-out helpers that are just
//! concurrent calls over several peers (SUPPLEMENT — §4.11 names these as
//! part of the client API but leaves the fan-out itself as an obvious
//! generalization of `call`/`cast`, not a new wire behavior).

use std::time::Duration;

use futures::future::join_all;
use service::{CallError, Engine, Invoke, Membership, Node, Term, TransportError};

/// Wraps an [`Engine`] reference so callers don't need to import `service`
/// themselves for the common call/cast/fan-out path.
pub struct Client<'a, M, I> {
    engine: &'a Engine<M, I>,
}

impl<'a, M: Membership, I: Invoke> Client<'a, M, I> {
    pub fn new(engine: &'a Engine<M, I>) -> Self {
        Self { engine }
    }

    pub async fn call(
        &self,
        peer: Node,
        module: impl Into<String>,
        function: impl Into<String>,
        args: Term,
        recv_timeout: Option<Duration>,
    ) -> Result<Term, CallError> {
        self.engine.call(peer, module, function, args, recv_timeout).await
    }

    pub async fn cast(
        &self,
        peer: Node,
        module: impl Into<String>,
        function: impl Into<String>,
        args: Term,
    ) -> Result<(), TransportError> {
        self.engine.cast(peer, module, function, args).await
    }

    pub async fn stop(&self, peer: &Node) -> bool {
        self.engine.stop(peer).await
    }

    /// Calls every peer in `peers` with the same module/function/args
    /// concurrently, returning one result per peer in the same order. A
    /// slow or unreachable peer only delays its own slot — it does not
    /// hold up the others. `recv_timeout` defaults to the engine's
    /// `sbcast_receive_timeout` when not given, since a fan-out is expected
    /// to wait on the slowest peer rather than a single one.
    pub async fn multicall(
        &self,
        peers: impl IntoIterator<Item = Node>,
        module: impl Into<String> + Clone,
        function: impl Into<String> + Clone,
        args: Term,
        recv_timeout: Option<Duration>,
    ) -> Vec<(Node, Result<Term, CallError>)> {
        let recv_timeout = Some(recv_timeout.unwrap_or_else(|| self.engine.sbcast_receive_timeout()));
        let calls = peers.into_iter().map(|peer| {
            let module = module.clone().into();
            let function = function.clone().into();
            let args = args.clone();
            async move {
                let result = self.engine.call(peer.clone(), module, function, args, recv_timeout).await;
                (peer, result)
            }
        });
        join_all(calls).await
    }

    /// Casts to every peer in `peers` concurrently.
    pub async fn broadcast(
        &self,
        peers: impl IntoIterator<Item = Node>,
        module: impl Into<String> + Clone,
        function: impl Into<String> + Clone,
        args: Term,
    ) -> Vec<(Node, Result<(), TransportError>)> {
        let casts = peers.into_iter().map(|peer| {
            let module = module.clone().into();
            let function = function.clone().into();
            let args = args.clone();
            async move {
                let result = self.engine.cast(peer.clone(), module, function, args).await;
                (peer, result)
            }
        });
        join_all(casts).await
    }
}
