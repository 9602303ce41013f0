use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use service::{
    CallError, CallPolicy, Engine, EngineOptions, FunctionRegistry, Membership, Node, Outcome, RpcError,
    StaticMembership, Term, Timeouts, TransportError,
};

fn free_port() -> u16 {
    StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn peer_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("math", "add", |args| {
        let sum: i64 = args.as_list().unwrap_or(&[]).iter().filter_map(Term::as_int).sum();
        Outcome::Value(Term::Int(sum))
    });
    registry.register("slow", "sleep", |args| {
        let millis = args
            .as_list()
            .and_then(|items| items.first())
            .and_then(Term::as_int)
            .unwrap_or(0);
        std::thread::sleep(Duration::from_millis(millis as u64));
        Outcome::Value(Term::atom("done"))
    });
    registry
}

/// Starts a peer engine on a loopback port and returns its node name and
/// control port.
async fn spawn_peer(policy: CallPolicy) -> (Node, u16) {
    let port = free_port();
    let node = Node::from("peerB");
    let options = EngineOptions {
        local_node: node.clone(),
        control_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        policy,
        timeouts: Timeouts::default(),
        liveness_check: false,
    };
    let engine = Arc::new(Engine::new(
        options,
        Arc::new(StaticMembership::new([])),
        Arc::new(peer_registry()),
    ));

    let serving = engine.clone();
    tokio::spawn(async move {
        let _ = serving.serve().await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (node, port)
}

fn caller_engine(peer: Node, peer_port: u16) -> Engine<StaticMembership, FunctionRegistry> {
    let options = EngineOptions {
        local_node: Node::from("peerA"),
        control_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, free_port())),
        policy: CallPolicy::Off,
        timeouts: Timeouts::default(),
        liveness_check: false,
    };
    let membership = StaticMembership::new([(peer, SocketAddr::from((Ipv4Addr::LOCALHOST, peer_port)))]);
    Engine::new(options, Arc::new(membership), Arc::new(FunctionRegistry::new()))
}

fn int_list(values: &[i64]) -> Term {
    Term::List(values.iter().map(|v| Term::Int(*v)).collect())
}

#[tokio::test]
async fn call_succeeds_and_reuses_the_client_actor() {
    let (peer, port) = spawn_peer(CallPolicy::Off).await;
    let caller = caller_engine(peer.clone(), port);

    let first = caller.call(peer.clone(), "math", "add", int_list(&[2, 3]), None).await;
    assert_eq!(first, Ok(Term::Int(5)));

    let second = caller.call(peer, "math", "add", int_list(&[10, 20]), None).await;
    assert_eq!(second, Ok(Term::Int(30)));

    assert_eq!(caller.statistics().client_actors_spawned, 1);
}

#[tokio::test]
async fn whitelist_policy_rejects_modules_outside_the_list() {
    let (peer, port) = spawn_peer(CallPolicy::whitelist(["math"])).await;
    let caller = caller_engine(peer.clone(), port);

    let rejected = caller.call(peer.clone(), "os", "cmd", int_list(&[]), None).await;
    assert_eq!(rejected, Err(CallError::Rpc(RpcError::NotAllowed)));

    let allowed = caller.call(peer, "math", "add", int_list(&[1, 1]), None).await;
    assert_eq!(allowed, Ok(Term::Int(2)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_timed_out_call_does_not_break_the_connection() {
    let (peer, port) = spawn_peer(CallPolicy::Off).await;
    let caller = caller_engine(peer.clone(), port);

    let timed_out = caller
        .call(peer.clone(), "slow", "sleep", int_list(&[300]), Some(Duration::from_millis(30)))
        .await;
    assert_eq!(timed_out, Err(CallError::Rpc(RpcError::Timeout)));

    let recovered = caller.call(peer, "math", "add", int_list(&[1, 2]), None).await;
    assert_eq!(recovered, Ok(Term::Int(3)));
}

#[tokio::test]
async fn cast_succeeds_even_when_the_function_does_not_exist() {
    let (peer, port) = spawn_peer(CallPolicy::Off).await;
    let caller = caller_engine(peer.clone(), port);

    let result = caller.cast(peer, "does_not_exist", "whatever", int_list(&[])).await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn call_to_an_unregistered_peer_fails_without_connecting() {
    let caller = caller_engine(Node::from("peerA"), free_port());
    let result = caller.call(Node::from("ghost"), "math", "add", int_list(&[1]), None).await;
    assert_eq!(result, Err(CallError::Transport(TransportError::UnknownPeer)));
}

/// Resolves addresses normally but always reports peers unreachable,
/// simulating a peer whose address is known but whose process has died
/// without the TCP connection itself noticing yet.
struct FlakyMembership {
    inner: StaticMembership,
}

impl Membership for FlakyMembership {
    fn control_address(&self, peer: &Node) -> Option<SocketAddr> {
        self.inner.control_address(peer)
    }

    fn ping(&self, _peer: &Node) -> bool {
        false
    }
}

#[tokio::test]
async fn liveness_check_short_circuits_before_touching_the_socket() {
    let (peer, port) = spawn_peer(CallPolicy::Off).await;

    let options = EngineOptions {
        local_node: Node::from("peerA"),
        control_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, free_port())),
        policy: CallPolicy::Off,
        timeouts: Timeouts::default(),
        liveness_check: true,
    };
    let membership = FlakyMembership {
        inner: StaticMembership::new([(peer.clone(), SocketAddr::from((Ipv4Addr::LOCALHOST, port)))]),
    };
    let caller = Engine::new(options, Arc::new(membership), Arc::new(FunctionRegistry::new()));

    let result = caller.call(peer, "math", "add", int_list(&[1, 2]), None).await;
    assert_eq!(result, Err(CallError::Rpc(RpcError::NodeDown)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_do_not_cross_wires() {
    let (peer, port) = spawn_peer(CallPolicy::Off).await;
    let caller = Arc::new(caller_engine(peer.clone(), port));

    let calls = (0..64).map(|i| {
        let caller = caller.clone();
        let peer = peer.clone();
        async move {
            let result = caller.call(peer, "math", "add", int_list(&[i, i]), None).await;
            (i, result)
        }
    });

    for (i, result) in futures_join_all(calls).await {
        assert_eq!(result, Ok(Term::Int(i * 2)));
    }
}

async fn futures_join_all<F: std::future::Future>(iter: impl IntoIterator<Item = F>) -> Vec<F::Output> {
    let mut handles = Vec::new();
    for (idx, fut) in iter.into_iter().enumerate() {
        handles.push((idx, tokio::spawn(fut)));
    }
    let mut results = vec![None; handles.len()];
    for (idx, handle) in handles {
        results[idx] = Some(handle.await.unwrap());
    }
    results.into_iter().map(Option::unwrap).collect()
}
