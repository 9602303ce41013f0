//! The client actor (§4.5): one per peer, owning the single data socket
//! used for every call and cast this node sends that peer. Created on
//! demand by the [`crate::registry::Dispatcher`], never by an application
//! directly.

mod waiter;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use codec::Term;
use codec::packet::{Node, Ref, ReplyPacket, RequestPacket, WaiterHandle};
use log::{debug, warn};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{CallError, RpcError, TransportError};
use crate::framing::{self, FrameError};
use crate::resolver::Membership;
use crate::stats::Statistics;
use crate::supervisor::ClientSupervisor;

enum Command {
    Call {
        module: String,
        function: String,
        args: Term,
        recv_timeout: Duration,
        respond: oneshot::Sender<Result<Term, CallError>>,
    },
    Cast {
        module: String,
        function: String,
        args: Term,
        respond: oneshot::Sender<Result<(), TransportError>>,
    },
    Stop,
}

/// A handle to a running client actor. Cheap to clone; every clone shares
/// the same underlying actor and socket.
#[derive(Clone)]
pub struct ClientHandle {
    peer: Node,
    commands: mpsc::UnboundedSender<Command>,
}

impl ClientHandle {
    pub fn peer(&self) -> &Node {
        &self.peer
    }

    /// Whether the actor behind this handle is still running. An actor
    /// that has terminated (idle reap, socket error, or explicit stop)
    /// drops its command receiver, which this observes.
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    pub async fn call(
        &self,
        module: String,
        function: String,
        args: Term,
        recv_timeout: Duration,
    ) -> Result<Term, CallError> {
        let (respond, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Call {
                module,
                function,
                args,
                recv_timeout,
                respond,
            })
            .is_err()
        {
            return Err(CallError::Transport(TransportError::Closed));
        }
        rx.await.unwrap_or(Err(CallError::Transport(TransportError::Closed)))
    }

    pub async fn cast(&self, module: String, function: String, args: Term) -> Result<(), TransportError> {
        let (respond, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Cast {
                module,
                function,
                args,
                respond,
            })
            .is_err()
        {
            return Err(TransportError::Closed);
        }
        rx.await.unwrap_or(Err(TransportError::Closed))
    }

    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

/// Performs the control handshake and data-socket connect, then spawns the
/// actor's run loop. Returns once the actor is ready to accept commands.
pub async fn spawn(
    local_node: Node,
    peer: Node,
    control_addr: SocketAddr,
    connect_timeout: Duration,
    send_timeout: Duration,
    client_inactivity: Option<Duration>,
    liveness: Option<Arc<dyn Membership>>,
    supervisor: Arc<ClientSupervisor>,
    statistics: Arc<Statistics>,
) -> Result<ClientHandle, TransportError> {
    let socket = tokio::time::timeout(connect_timeout, connect(control_addr, &local_node))
        .await
        .map_err(|_| TransportError::ConnectFailed("handshake timed out".to_string()))??;

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ClientHandle {
        peer: peer.clone(),
        commands: tx,
    };

    statistics.client_actors_spawned.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    statistics.client_actors_active.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let actor = Actor {
        local_node,
        peer,
        socket,
        commands: rx,
        pending: HashMap::default(),
        send_timeout,
        client_inactivity,
        liveness,
        shutdown: supervisor.shutdown_signal(),
        statistics,
    };

    let join = tokio::spawn(actor.run());
    supervisor.track(join);

    Ok(handle)
}

async fn connect(control_addr: SocketAddr, local_node: &Node) -> Result<TcpStream, TransportError> {
    let mut control = TcpStream::connect(control_addr)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    let hello = codec::packet::ControlRequest::Hello { node: local_node.clone() };
    framing::write_frame(&mut control, &hello.to_term())
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    let response = framing::read_frame(&mut control)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    let response = codec::packet::ControlResponse::from_term(response)
        .map_err(|_| TransportError::ConnectFailed("malformed handshake response".to_string()))?;

    let port = match response {
        codec::packet::ControlResponse::Port(port) => port,
        codec::packet::ControlResponse::Error(reason) => return Err(TransportError::ConnectFailed(reason)),
    };

    // The control connection is released immediately; only the data
    // connection is kept.
    let _ = control.shutdown().await;

    let data_addr = SocketAddr::new(control_addr.ip(), port);
    TcpStream::connect(data_addr)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))
}

fn generate_ref() -> Ref {
    Ref(rand::rng().random())
}

struct Actor {
    local_node: Node,
    peer: Node,
    socket: TcpStream,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: HashMap<Ref, oneshot::Sender<Term>>,
    send_timeout: Duration,
    client_inactivity: Option<Duration>,
    liveness: Option<Arc<dyn Membership>>,
    shutdown: broadcast::Receiver<()>,
    statistics: Arc<Statistics>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            let idle = self.client_inactivity.unwrap_or(Duration::MAX);
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    debug!("client actor for {} shutting down", self.peer);
                    break;
                }

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Stop) | None => break,
                        Some(Command::Call { module, function, args, recv_timeout, respond }) => {
                            self.handle_call(module, function, args, recv_timeout, respond).await;
                        }
                        Some(Command::Cast { module, function, args, respond }) => {
                            self.handle_cast(module, function, args, respond).await;
                        }
                    }
                }

                frame = framing::read_frame(&mut self.socket) => {
                    match frame {
                        Ok(term) => {
                            if !self.handle_reply(term) {
                                warn!("client actor for {} terminating on corrupt reply", self.peer);
                                break;
                            }
                        }
                        Err(FrameError::Eof) => {
                            debug!("peer {} closed the data connection", self.peer);
                            break;
                        }
                        Err(e) => {
                            warn!("client actor for {} terminating on frame error: {e}", self.peer);
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep(idle), if self.client_inactivity.is_some() => {
                    debug!("client actor for {} idle, terminating", self.peer);
                    break;
                }
            }
        }

        self.terminate();
    }

    async fn handle_call(
        &mut self,
        module: String,
        function: String,
        args: Term,
        recv_timeout: Duration,
        respond: oneshot::Sender<Result<Term, CallError>>,
    ) {
        if let Some(liveness) = &self.liveness {
            if !liveness.ping(&self.peer) {
                let _ = respond.send(Err(CallError::Rpc(RpcError::NodeDown)));
                return;
            }
        }

        let r#ref = generate_ref();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(r#ref, reply_tx);
        waiter::spawn(reply_rx, recv_timeout, respond);

        let packet = RequestPacket::Call {
            sender: self.local_node.clone(),
            waiter: WaiterHandle(r#ref.0),
            r#ref,
            module,
            function,
            args,
        };

        if let Err(e) = self.write(&packet.to_term()).await {
            warn!("call send to {} failed: {e}", self.peer);
            // Leave the pending entry; the waiter's own timeout will fire
            // and the actor is about to terminate anyway.
        }
    }

    async fn handle_cast(
        &mut self,
        module: String,
        function: String,
        args: Term,
        respond: oneshot::Sender<Result<(), TransportError>>,
    ) {
        let packet = RequestPacket::Cast {
            sender: self.local_node.clone(),
            module,
            function,
            args,
        };

        let result = self
            .write(&packet.to_term())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()));
        let _ = respond.send(result);
    }

    /// Returns `false` if the reply was corrupt and the connection must
    /// close (a corrupt frame can't be trusted to have left the rest of the
    /// stream in a parseable state).
    fn handle_reply(&mut self, term: Term) -> bool {
        let reply = match ReplyPacket::from_term(term) {
            Ok(reply) => reply,
            Err(_) => return false,
        };

        match self.pending.remove(&reply.r#ref) {
            Some(waiter) => {
                // A failed send means the waiter already timed out and
                // walked away; the reply is discarded, per design.
                let _ = waiter.send(reply.value);
            }
            None => debug!("discarding reply for unknown ref from {}", self.peer),
        }
        true
    }

    async fn write(&mut self, term: &Term) -> Result<(), FrameError> {
        match tokio::time::timeout(self.send_timeout, framing::write_frame(&mut self.socket, term)).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "send timed out",
            ))),
        }
    }

    /// Drops every outstanding waiter's reply sender, which wakes each
    /// waiter task with a closed channel and delivers `TransportError::Closed`.
    /// The registry entry is left in place; the dispatcher's liveness check
    /// (`ClientHandle::is_alive`) notices it on the next call or cast and
    /// replaces it.
    fn terminate(mut self) {
        self.pending.clear();
        self.statistics.client_actors_active.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}
