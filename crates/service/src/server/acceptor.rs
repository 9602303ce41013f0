//! The server acceptor and its executors (§4.4). One acceptor owns one data
//! socket for the lifetime of a single peer connection; each accepted
//! request is handed to a short-lived executor task so a slow or panicking
//! invocation never blocks the socket's read loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use ahash::HashMap;
use codec::Term;
use codec::packet::{Node, Ref, ReplyPacket, RequestPacket};
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::EngineOptions;
use crate::dispatch::{Invoke, Outcome};
use crate::error::{ReplyValue, RpcError};
use crate::framing::{self, FrameError};
use crate::stats::Statistics;
use crate::supervisor::ServerSupervisor;

pub fn spawn(
    socket: TcpStream,
    options: Arc<EngineOptions>,
    invoke: Arc<dyn Invoke>,
    supervisor: Arc<ServerSupervisor>,
    statistics: Arc<Statistics>,
) {
    statistics.acceptors_spawned.fetch_add(1, Ordering::Relaxed);
    statistics.acceptors_active.fetch_add(1, Ordering::Relaxed);

    let (completions, completions_rx) = mpsc::unbounded_channel();
    let acceptor = Acceptor {
        socket,
        peer: None,
        options,
        invoke,
        completions,
        completions_rx,
        inflight: HashMap::default(),
        statistics,
        shutdown: supervisor.shutdown_signal(),
    };

    let join = tokio::spawn(acceptor.run());
    supervisor.track(join);
}

struct Acceptor {
    socket: TcpStream,
    peer: Option<Node>,
    options: Arc<EngineOptions>,
    invoke: Arc<dyn Invoke>,
    completions: mpsc::UnboundedSender<ReplyPacket>,
    completions_rx: mpsc::UnboundedReceiver<ReplyPacket>,
    inflight: HashMap<Ref, JoinHandle<()>>,
    statistics: Arc<Statistics>,
    shutdown: tokio::sync::broadcast::Receiver<()>,
}

impl Acceptor {
    async fn run(mut self) {
        loop {
            let idle = self.options.timeouts.server_inactivity.unwrap_or(std::time::Duration::MAX);
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    debug!("server acceptor for {:?} shutting down", self.peer);
                    break;
                }

                frame = framing::read_frame(&mut self.socket) => {
                    match frame {
                        Ok(term) => {
                            if !self.handle_request(term).await {
                                break;
                            }
                        }
                        Err(FrameError::Eof) => {
                            debug!("peer {:?} closed the data connection", self.peer);
                            break;
                        }
                        Err(e) => {
                            warn!("server acceptor for {:?} terminating on frame error: {e}", self.peer);
                            break;
                        }
                    }
                }

                completion = self.completions_rx.recv() => {
                    match completion {
                        Some(reply) => self.handle_completion(reply).await,
                        None => unreachable!("acceptor holds its own completions sender"),
                    }
                }

                _ = tokio::time::sleep(idle), if self.options.timeouts.server_inactivity.is_some() => {
                    debug!("server acceptor for {:?} idle, terminating", self.peer);
                    break;
                }
            }
        }

        self.terminate();
    }

    /// Returns `false` if the connection should close (decode failure or
    /// write failure).
    async fn handle_request(&mut self, term: Term) -> bool {
        let request = match RequestPacket::from_term(term) {
            Ok(request) => request,
            Err(_) => {
                warn!("closing connection to {:?} on malformed request", self.peer);
                return false;
            }
        };

        if self.peer.is_none() {
            self.peer = Some(request.sender().clone());
        }

        if !self.options.policy.is_allowed(request.module()) {
            self.statistics.calls_rejected.fetch_add(1, Ordering::Relaxed);
            return self.reject(request).await;
        }

        match request {
            RequestPacket::Call {
                waiter,
                r#ref,
                module,
                function,
                args,
                ..
            } => {
                let invoke = self.invoke.clone();
                let completions = self.completions.clone();
                let handle = tokio::spawn(async move {
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| invoke.invoke(&module, &function, args)));
                    let value = match outcome {
                        Ok(Outcome::Value(value)) => ReplyValue::Ok(value),
                        Ok(Outcome::Crash(reason)) => ReplyValue::Err(RpcError::Crash(reason)),
                        Ok(Outcome::NoSuchFunction) => ReplyValue::Err(RpcError::NoSuchFunction),
                        Err(_) => ReplyValue::Err(RpcError::Crash("panicked".to_string())),
                    };
                    let reply = ReplyPacket {
                        waiter,
                        r#ref,
                        value: value.to_term(),
                    };
                    let _ = completions.send(reply);
                });
                self.inflight.insert(r#ref, handle);
                true
            }
            RequestPacket::Cast { module, function, args, .. } => {
                let invoke = self.invoke.clone();
                tokio::spawn(async move {
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| invoke.invoke(&module, &function, args)));
                });
                true
            }
        }
    }

    async fn reject(&mut self, request: RequestPacket) -> bool {
        match request {
            RequestPacket::Call { waiter, r#ref, .. } => {
                let reply = ReplyPacket {
                    waiter,
                    r#ref,
                    value: ReplyValue::Err(RpcError::NotAllowed).to_term(),
                };
                self.write(&reply.to_term()).await
            }
            RequestPacket::Cast { module, .. } => {
                debug!("dropping disallowed cast to module {module} from {:?}", self.peer);
                true
            }
        }
    }

    async fn handle_completion(&mut self, reply: ReplyPacket) {
        self.inflight.remove(&reply.r#ref);
        self.write(&reply.to_term()).await;
    }

    /// Writes a reply frame, returning `false` (connection should close) on
    /// failure.
    async fn write(&mut self, term: &Term) -> bool {
        let timeout = self.options.timeouts.send;
        match tokio::time::timeout(timeout, framing::write_frame(&mut self.socket, term)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("reply write to {:?} failed: {e}", self.peer);
                false
            }
            Err(_) => {
                warn!("reply write to {:?} timed out", self.peer);
                false
            }
        }
    }

    fn terminate(self) {
        for (_, handle) in self.inflight {
            handle.abort();
        }
        self.statistics.acceptors_active.fetch_sub(1, Ordering::Relaxed);
    }
}
