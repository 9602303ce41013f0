//! The transport engine: client actors that carry calls and casts out to
//! peers, server acceptors that carry them in, and the registry and
//! supervision machinery that ties them together.
//!
//! This crate has no opinion on configuration file formats or process
//! startup — it is handed an [`EngineOptions`], a [`resolver::Membership`],
//! and a [`dispatch::Invoke`], and gets on with moving calls.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod supervisor;

pub use codec::Term;
pub use codec::packet::{Node, Ref, WaiterHandle};
pub use dispatch::{FunctionRegistry, Invoke, Outcome};
pub use error::{CallError, RpcError, TransportError};
pub use policy::CallPolicy;
pub use resolver::{Membership, OverrideMembership, StaticMembership};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use registry::{ClientRegistry, Dispatcher};
use resolver::Resolver;
use server::Listener;
use stats::{Snapshot, Statistics};
use supervisor::{ClientSupervisor, ServerSupervisor};

/// Every timeout the engine enforces. All are per-call unless noted.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Bound on the control handshake plus the data-socket TCP connect.
    pub connect: Duration,
    /// Bound on writing a request frame to the wire.
    pub send: Duration,
    /// Default bound a call-waiter gives a reply before declaring timeout.
    pub receive: Duration,
    /// Default receive bound for a multicall fan-out, which waits on the
    /// slowest of several peers rather than one.
    pub sbcast_receive: Duration,
    /// A client actor with no outstanding calls and no traffic for this
    /// long terminates. `None` disables the idle reap.
    pub client_inactivity: Option<Duration>,
    /// A server acceptor with no inbound frames and no in-flight executor
    /// completions for this long terminates. `None` disables the idle reap.
    pub server_inactivity: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            send: Duration::from_secs(5),
            receive: Duration::from_secs(15),
            sbcast_receive: Duration::from_secs(15),
            client_inactivity: Some(Duration::from_secs(120)),
            server_inactivity: Some(Duration::from_secs(120)),
        }
    }
}

/// Everything the engine needs to know about its own place in the cluster.
pub struct EngineOptions {
    pub local_node: Node,
    /// Address the control-channel listener binds to.
    pub control_addr: SocketAddr,
    pub policy: CallPolicy,
    pub timeouts: Timeouts,
    /// Probe the membership layer for reachability before every send,
    /// short-circuiting with `RpcError::NodeDown` rather than writing into
    /// a socket that may look alive but lead to a crashed peer (§4.5). Off
    /// by default: it adds a call to the membership layer on every call's
    /// hot path, and a static membership table's `ping` is rarely a better
    /// signal than just attempting the send.
    pub liveness_check: bool,
}

/// The running transport: a registry of client actors keyed by peer, a
/// dispatcher that creates them on demand, and (once [`Engine::serve`] is
/// called) a control listener accepting inbound connections.
pub struct Engine<M, I> {
    options: Arc<EngineOptions>,
    dispatcher: Dispatcher<M>,
    invoke: Arc<I>,
    server_supervisor: Arc<ServerSupervisor>,
    client_supervisor: Arc<ClientSupervisor>,
    statistics: Arc<Statistics>,
}

impl<M: Membership, I: Invoke> Engine<M, I> {
    pub fn new(options: EngineOptions, membership: Arc<M>, invoke: Arc<I>) -> Self {
        let options = Arc::new(options);
        let statistics = Arc::new(Statistics::default());
        let registry = Arc::new(ClientRegistry::new());
        let resolver = Resolver::new(membership);
        let client_supervisor = Arc::new(ClientSupervisor::new());

        let dispatcher = Dispatcher::new(
            options.clone(),
            registry,
            resolver,
            client_supervisor.clone(),
            statistics.clone(),
        );

        Self {
            options,
            dispatcher,
            invoke,
            server_supervisor: Arc::new(ServerSupervisor::new()),
            client_supervisor,
            statistics,
        }
    }

    /// Invokes `module:function(args)` on `peer` and waits for the reply,
    /// bounded by `recv_timeout` (falling back to [`Timeouts::receive`]).
    pub async fn call(
        &self,
        peer: Node,
        module: impl Into<String>,
        function: impl Into<String>,
        args: Term,
        recv_timeout: Option<Duration>,
    ) -> Result<Term, CallError> {
        let handle = self.dispatcher.get_or_create(peer).await?;
        self.statistics.calls_sent.fetch_add(1, Ordering::Relaxed);
        let result = handle
            .call(
                module.into(),
                function.into(),
                args,
                recv_timeout.unwrap_or(self.options.timeouts.receive),
            )
            .await;
        match &result {
            Ok(_) => {
                self.statistics.calls_replied.fetch_add(1, Ordering::Relaxed);
            }
            Err(CallError::Rpc(RpcError::Timeout)) => {
                self.statistics.calls_timed_out.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
        result
    }

    /// Sends `module:function(args)` to `peer` without waiting for a reply.
    pub async fn cast(
        &self,
        peer: Node,
        module: impl Into<String>,
        function: impl Into<String>,
        args: Term,
    ) -> Result<(), TransportError> {
        let handle = self.dispatcher.get_or_create(peer).await?;
        self.statistics.casts_sent.fetch_add(1, Ordering::Relaxed);
        handle.cast(module.into(), function.into(), args).await
    }

    /// Tears down the client actor for `peer`, if one exists. Returns
    /// whether an actor was found and stopped.
    pub async fn stop(&self, peer: &Node) -> bool {
        self.dispatcher.stop(peer).await
    }

    /// Runs the control listener forever, accepting peers and handing each
    /// data connection to a [`server::ServerAcceptor`]. Typically spawned
    /// onto its own task.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = Listener::bind(
            self.options.control_addr,
            self.options.clone(),
            self.invoke.clone(),
            self.server_supervisor.clone(),
            self.statistics.clone(),
        )
        .await?;
        listener.serve().await
    }

    pub fn statistics(&self) -> Snapshot {
        self.statistics.snapshot()
    }

    /// The receive timeout a multicall fan-out should use when the caller
    /// doesn't name one explicitly.
    pub fn sbcast_receive_timeout(&self) -> Duration {
        self.options.timeouts.sbcast_receive
    }

    /// Stops every client actor and server acceptor this engine owns.
    pub fn shutdown(&self) {
        self.client_supervisor.shutdown();
        self.server_supervisor.shutdown();
    }
}
