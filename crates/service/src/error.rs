//! The two error taxonomies a call can fail with: [`RpcError`], produced by
//! the remote side and carried back as an ordinary reply value, and
//! [`TransportError`], produced locally when the connection to the peer
//! never let the request get that far.

use codec::Term;

/// Failure reported by (or on behalf of) the remote node. These travel over
/// the wire as the reply value, tagged `{error, Reason}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The call's module was rejected by the peer's authorization policy.
    NotAllowed,
    /// The invoked function panicked; `reason` is its panic message, if any.
    Crash(String),
    /// No function registered under that module/name on the peer.
    NoSuchFunction,
    /// A request or reply term didn't match the expected shape.
    Malformed,
    /// The call's own receive timeout elapsed before a reply arrived. The
    /// connection itself is fine — only this one call gave up on it.
    Timeout,
    /// The pre-send liveness probe found the peer unreachable; the request
    /// was never written to the socket.
    NodeDown,
}

impl RpcError {
    pub fn to_term(&self) -> Term {
        match self {
            Self::NotAllowed => Term::atom("not_allowed"),
            Self::Crash(reason) => Term::Tuple(vec![Term::atom("crash"), Term::atom(reason.clone())]),
            Self::NoSuchFunction => Term::atom("no_such_function"),
            Self::Malformed => Term::atom("malformed"),
            Self::Timeout => Term::atom("timeout"),
            Self::NodeDown => Term::atom("node_down"),
        }
    }

    pub fn from_term(term: &Term) -> Option<Self> {
        if let Some(atom) = term.as_atom() {
            return Some(match atom {
                "not_allowed" => Self::NotAllowed,
                "no_such_function" => Self::NoSuchFunction,
                "malformed" => Self::Malformed,
                "timeout" => Self::Timeout,
                "node_down" => Self::NodeDown,
                _ => return None,
            });
        }
        let tuple = term.as_tuple()?;
        if tuple.len() == 2 && tuple[0].as_atom() == Some("crash") {
            return Some(Self::Crash(tuple[1].as_atom()?.to_string()));
        }
        None
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllowed => write!(f, "call not allowed by peer policy"),
            Self::Crash(reason) => write!(f, "remote function crashed: {reason}"),
            Self::NoSuchFunction => write!(f, "no such function on peer"),
            Self::Malformed => write!(f, "malformed request or reply"),
            Self::Timeout => write!(f, "call timed out waiting for a reply"),
            Self::NodeDown => write!(f, "peer is unreachable"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Failure that never reached the remote side: it happened to the
/// connection itself, either before the request left or after the reply
/// could no longer be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Couldn't resolve the peer to an address.
    UnknownPeer,
    /// TCP connect, or the control handshake that precedes it, failed.
    ConnectFailed(String),
    /// Writing the request frame failed or exceeded the send timeout.
    SendFailed(String),
    /// The client actor terminated (socket closed, idle, or crashed) while
    /// the call was outstanding.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPeer => write!(f, "unknown peer"),
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            Self::SendFailed(reason) => write!(f, "send failed: {reason}"),
            Self::Closed => write!(f, "connection closed before a reply arrived"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Everything `call` can return besides success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Rpc(RpcError),
    Transport(TransportError),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CallError {}

impl From<RpcError> for CallError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// The tagged `{ok, Value} | {error, Reason}` wrapper a reply's `value`
/// field actually carries, so a successful result can never be confused
/// with an `RpcError` that happens to share its shape.
pub enum ReplyValue {
    Ok(Term),
    Err(RpcError),
}

impl ReplyValue {
    pub fn to_term(&self) -> Term {
        match self {
            Self::Ok(value) => Term::Tuple(vec![Term::atom("ok"), value.clone()]),
            Self::Err(err) => Term::Tuple(vec![Term::atom("error"), err.to_term()]),
        }
    }

    pub fn from_term(term: Term) -> Result<Self, RpcError> {
        let mut fields = match term.into_tuple() {
            Ok(fields) if fields.len() == 2 => fields,
            _ => return Err(RpcError::Malformed),
        };
        let value = fields.pop().unwrap();
        let tag = fields.pop().unwrap();
        match tag.as_atom() {
            Some("ok") => Ok(Self::Ok(value)),
            Some("error") => Err(RpcError::from_term(&value).unwrap_or(RpcError::Malformed)),
            _ => Err(RpcError::Malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_roundtrips() {
        for err in [
            RpcError::NotAllowed,
            RpcError::Crash("boom".to_string()),
            RpcError::NoSuchFunction,
            RpcError::Malformed,
            RpcError::Timeout,
            RpcError::NodeDown,
        ] {
            assert_eq!(RpcError::from_term(&err.to_term()), Some(err));
        }
    }

    #[test]
    fn reply_value_ok_roundtrips() {
        let term = ReplyValue::Ok(Term::Int(42)).to_term();
        match ReplyValue::from_term(term) {
            Ok(ReplyValue::Ok(Term::Int(42))) => {}
            _ => panic!("expected Ok(Int(42))"),
        }
    }

    #[test]
    fn reply_value_error_roundtrips() {
        let term = ReplyValue::Err(RpcError::NotAllowed).to_term();
        assert_eq!(ReplyValue::from_term(term), Err(RpcError::NotAllowed));
    }
}
