//! The control listener (§4.3): accepts a connection from any peer wanting
//! to talk to this node, hands out a fresh ephemeral data port, and closes
//! the control connection. Each data port is used for exactly one
//! connection, served by a [`acceptor::ServerAcceptor`].

pub mod acceptor;

use std::net::SocketAddr;
use std::sync::Arc;

use codec::packet::{ControlRequest, ControlResponse};
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::EngineOptions;
use crate::dispatch::Invoke;
use crate::framing;
use crate::stats::Statistics;
use crate::supervisor::ServerSupervisor;

pub struct Listener {
    control: TcpListener,
    options: Arc<EngineOptions>,
    invoke: Arc<dyn Invoke>,
    supervisor: Arc<ServerSupervisor>,
    statistics: Arc<Statistics>,
}

impl Listener {
    pub async fn bind<I: Invoke>(
        addr: SocketAddr,
        options: Arc<EngineOptions>,
        invoke: Arc<I>,
        supervisor: Arc<ServerSupervisor>,
        statistics: Arc<Statistics>,
    ) -> std::io::Result<Self> {
        let control = TcpListener::bind(addr).await?;
        info!("control listener bound on {addr}");
        Ok(Self {
            control,
            options,
            invoke,
            supervisor,
            statistics,
        })
    }

    /// Runs forever, handshaking each inbound control connection and
    /// spawning a data acceptor for it.
    pub async fn serve(self) -> std::io::Result<()> {
        loop {
            let (control, peer_addr) = self.control.accept().await?;
            let options = self.options.clone();
            let invoke = self.invoke.clone();
            let supervisor = self.supervisor.clone();
            let statistics = self.statistics.clone();

            tokio::spawn(async move {
                if let Err(e) = handshake(control, peer_addr, options, invoke, supervisor, statistics).await {
                    warn!("handshake with {peer_addr} failed: {e}");
                }
            });
        }
    }
}

async fn handshake(
    mut control: TcpStream,
    peer_addr: SocketAddr,
    options: Arc<EngineOptions>,
    invoke: Arc<dyn Invoke>,
    supervisor: Arc<ServerSupervisor>,
    statistics: Arc<Statistics>,
) -> std::io::Result<()> {
    let request = tokio::time::timeout(options.timeouts.connect, framing::read_frame(&mut control))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake read timed out"))?
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let ControlRequest::Hello { node } = ControlRequest::from_term(request)
        .map_err(|e| std::io::Error::other(format!("malformed hello: {e}")))?;

    let data_listener = TcpListener::bind(SocketAddr::new(control.local_addr()?.ip(), 0)).await?;
    let port = data_listener.local_addr()?.port();

    framing::write_frame(&mut control, &ControlResponse::Port(port).to_term()).await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    info!("allocated data port {port} for {node} ({peer_addr})");

    let connect_timeout = options.timeouts.connect;
    tokio::spawn(async move {
        match tokio::time::timeout(connect_timeout, data_listener.accept()).await {
            Ok(Ok((socket, _))) => {
                acceptor::spawn(socket, options, invoke, supervisor, statistics);
            }
            Ok(Err(e)) => warn!("data accept for {node} failed: {e}"),
            Err(_) => warn!("{node} never connected to its allocated data port {port}"),
        }
    });

    Ok(())
}
