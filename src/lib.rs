pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;

use service::{Engine, EngineOptions, FunctionRegistry, Node, Outcome, StaticMembership, Term, Timeouts};

use self::config::Config;

/// Registers the handful of built-in modules every node exposes regardless
/// of what the embedding application adds: right now just a liveness probe
/// a peer can `call` to check this node is up and its policy allows it.
fn builtin_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("node", "ping", |_args| Outcome::Value(Term::atom("pong")));
    registry
}

/// In order to let integration tests and embedding applications start the
/// engine directly, this is split out from `main` rather than living there.
pub async fn startup(config: Arc<Config>) -> Result<()> {
    let control_addr = SocketAddr::from(([0, 0, 0, 0], config.server.tcp_server_port));

    let options = EngineOptions {
        local_node: Node::from(config.server.node_name.clone()),
        control_addr,
        policy: config.server.policy(),
        timeouts: Timeouts {
            connect: duration_or_default(config.timeouts.connect_timeout.as_duration(), "connect_timeout"),
            send: duration_or_default(config.timeouts.send_timeout.as_duration(), "send_timeout"),
            receive: duration_or_default(config.timeouts.receive_timeout.as_duration(), "receive_timeout"),
            sbcast_receive: duration_or_default(
                config.timeouts.sbcast_receive_timeout.as_duration(),
                "sbcast_receive_timeout",
            ),
            client_inactivity: config.timeouts.client_inactivity_timeout.as_duration(),
            server_inactivity: config.timeouts.server_inactivity_timeout.as_duration(),
        },
        liveness_check: config.server.liveness_check,
    };

    let membership = Arc::new(StaticMembership::new(config.server.peer_addresses()));
    let invoke = Arc::new(builtin_registry());
    let engine = Engine::new(options, membership, invoke);

    log::info!(
        "node {} listening for control connections on {control_addr}",
        config.server.node_name
    );

    engine.serve().await?;
    Ok(())
}

/// `connect_timeout` and `send_timeout` have no "infinity" meaning for the
/// engine (a connect or send that never completes would wedge the actor
/// forever); fall back to a generous bound if the config set one to
/// infinity rather than propagating `None` into a context that can't use
/// it.
fn duration_or_default(setting: Option<std::time::Duration>, name: &str) -> std::time::Duration {
    setting.unwrap_or_else(|| {
        log::warn!("{name} cannot be infinity; using 60s");
        std::time::Duration::from_secs(60)
    })
}
