//! The request/reply/control packet shapes carried inside a [`Term`], and
//! their conversions to and from the wire format.

use crate::{Error, Term};

/// A peer's opaque, globally-unique name. Two peers with the same name are
/// the same peer (I1 depends on this).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(pub String);

impl Node {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally-unique, unforgeable token identifying one in-flight call
/// within a single client actor (I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref(pub u128);

/// Identifies the waiter a reply must be delivered to. In this
/// implementation the reply always travels back on the originating data
/// socket, so `WaiterHandle` carries the same value as the `Ref` it was
/// minted alongside — it is kept as a distinct wire field because the
/// protocol contract (§6) specifies it independently of `Ref`, and a future
/// multi-hop return path would need the two decoupled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterHandle(pub u128);

fn u128_to_binary(v: u128) -> Term {
    Term::Binary(v.to_be_bytes().to_vec())
}

fn binary_to_u128(term: &Term) -> Result<u128, Error> {
    let bytes = term.as_binary().ok_or(Error::Truncated)?;
    let arr: [u8; 16] = bytes.try_into().map_err(|_| Error::Truncated)?;
    Ok(u128::from_be_bytes(arr))
}

fn node_to_term(node: &Node) -> Term {
    Term::atom(node.0.clone())
}

fn term_to_node(term: &Term) -> Result<Node, Error> {
    Ok(Node(term.as_atom().ok_or(Error::Truncated)?.to_string()))
}

/// A module/function/argument-list invocation request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPacket {
    /// `{sender_node, waiter_handle, ref, {call, M, F, Args}}`
    Call {
        sender: Node,
        waiter: WaiterHandle,
        r#ref: Ref,
        module: String,
        function: String,
        args: Term,
    },
    /// `{sender_node, {cast, M, F, Args}}`
    Cast {
        sender: Node,
        module: String,
        function: String,
        args: Term,
    },
}

impl RequestPacket {
    pub fn sender(&self) -> &Node {
        match self {
            Self::Call { sender, .. } | Self::Cast { sender, .. } => sender,
        }
    }

    pub fn module(&self) -> &str {
        match self {
            Self::Call { module, .. } | Self::Cast { module, .. } => module,
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            Self::Call {
                sender,
                waiter,
                r#ref,
                module,
                function,
                args,
            } => Term::Tuple(vec![
                node_to_term(sender),
                u128_to_binary(waiter.0),
                u128_to_binary(r#ref.0),
                Term::Tuple(vec![
                    Term::atom("call"),
                    Term::atom(module.clone()),
                    Term::atom(function.clone()),
                    args.clone(),
                ]),
            ]),
            Self::Cast {
                sender,
                module,
                function,
                args,
            } => Term::Tuple(vec![
                node_to_term(sender),
                Term::Tuple(vec![
                    Term::atom("cast"),
                    Term::atom(module.clone()),
                    Term::atom(function.clone()),
                    args.clone(),
                ]),
            ]),
        }
    }

    pub fn from_term(term: Term) -> Result<Self, Error> {
        let mut fields = term.into_tuple()?;

        match fields.len() {
            4 => {
                let body = fields.pop().unwrap().into_tuple()?;
                let r#ref = binary_to_u128(&fields.pop().unwrap())?;
                let waiter = binary_to_u128(&fields.pop().unwrap())?;
                let sender = term_to_node(&fields.pop().unwrap())?;
                decode_call_body(sender, WaiterHandle(waiter), Ref(r#ref), body)
            }
            2 => {
                let body = fields.pop().unwrap().into_tuple()?;
                let sender = term_to_node(&fields.pop().unwrap())?;
                decode_cast_body(sender, body)
            }
            _ => Err(Error::Truncated),
        }
    }
}

fn decode_call_body(
    sender: Node,
    waiter: WaiterHandle,
    r#ref: Ref,
    mut body: Vec<Term>,
) -> Result<RequestPacket, Error> {
    if body.len() != 4 {
        return Err(Error::Truncated);
    }
    let args = body.pop().unwrap();
    let function = body.pop().unwrap().as_atom().ok_or(Error::Truncated)?.to_string();
    let module = body.pop().unwrap().as_atom().ok_or(Error::Truncated)?.to_string();
    let tag = body.pop().unwrap();
    if tag.as_atom() != Some("call") {
        return Err(Error::Truncated);
    }
    Ok(RequestPacket::Call {
        sender,
        waiter,
        r#ref,
        module,
        function,
        args,
    })
}

fn decode_cast_body(sender: Node, mut body: Vec<Term>) -> Result<RequestPacket, Error> {
    if body.len() != 4 {
        return Err(Error::Truncated);
    }
    let args = body.pop().unwrap();
    let function = body.pop().unwrap().as_atom().ok_or(Error::Truncated)?.to_string();
    let module = body.pop().unwrap().as_atom().ok_or(Error::Truncated)?.to_string();
    let tag = body.pop().unwrap();
    if tag.as_atom() != Some("cast") {
        return Err(Error::Truncated);
    }
    Ok(RequestPacket::Cast {
        sender,
        module,
        function,
        args,
    })
}

/// `{waiter_handle, ref, value}`
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPacket {
    pub waiter: WaiterHandle,
    pub r#ref: Ref,
    pub value: Term,
}

impl ReplyPacket {
    pub fn to_term(&self) -> Term {
        Term::Tuple(vec![
            u128_to_binary(self.waiter.0),
            u128_to_binary(self.r#ref.0),
            self.value.clone(),
        ])
    }

    pub fn from_term(term: Term) -> Result<Self, Error> {
        let mut fields = term.into_tuple()?;
        if fields.len() != 3 {
            return Err(Error::Truncated);
        }
        let value = fields.pop().unwrap();
        let r#ref = binary_to_u128(&fields.pop().unwrap())?;
        let waiter = binary_to_u128(&fields.pop().unwrap())?;
        Ok(Self {
            waiter: WaiterHandle(waiter),
            r#ref: Ref(r#ref),
            value,
        })
    }
}

/// The control channel's handshake vocabulary (§4.3). Deliberately tiny:
/// the control connection exists only to allocate a data port and is
/// released immediately after.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// A client naming itself, requesting a fresh acceptor + ephemeral port.
    Hello { node: Node },
}

impl ControlRequest {
    pub fn to_term(&self) -> Term {
        match self {
            Self::Hello { node } => Term::Tuple(vec![Term::atom("hello"), node_to_term(node)]),
        }
    }

    pub fn from_term(term: Term) -> Result<Self, Error> {
        let mut fields = term.into_tuple()?;
        if fields.len() != 2 {
            return Err(Error::Truncated);
        }
        let node = term_to_node(&fields.pop().unwrap())?;
        let tag = fields.pop().unwrap();
        if tag.as_atom() != Some("hello") {
            return Err(Error::Truncated);
        }
        Ok(Self::Hello { node })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    Port(u16),
    Error(String),
}

impl ControlResponse {
    pub fn to_term(&self) -> Term {
        match self {
            Self::Port(port) => Term::Tuple(vec![Term::atom("port"), Term::Int(*port as i64)]),
            Self::Error(reason) => {
                Term::Tuple(vec![Term::atom("error"), Term::atom(reason.clone())])
            }
        }
    }

    pub fn from_term(term: Term) -> Result<Self, Error> {
        let mut fields = term.into_tuple()?;
        if fields.len() != 2 {
            return Err(Error::Truncated);
        }
        let value = fields.pop().unwrap();
        let tag = fields.pop().unwrap();
        match tag.as_atom() {
            Some("port") => Ok(Self::Port(value.as_int().ok_or(Error::Truncated)? as u16)),
            Some("error") => Ok(Self::Error(
                value.as_atom().ok_or(Error::Truncated)?.to_string(),
            )),
            _ => Err(Error::Truncated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_roundtrips() {
        let packet = RequestPacket::Call {
            sender: Node::from("nodeA"),
            waiter: WaiterHandle(11),
            r#ref: Ref(22),
            module: "math".to_string(),
            function: "add".to_string(),
            args: Term::List(vec![Term::Int(2), Term::Int(3)]),
        };
        let decoded = RequestPacket::from_term(packet.to_term()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn cast_roundtrips() {
        let packet = RequestPacket::Cast {
            sender: Node::from("nodeA"),
            module: "logger".to_string(),
            function: "info".to_string(),
            args: Term::List(vec![Term::atom("hi")]),
        };
        let decoded = RequestPacket::from_term(packet.to_term()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn reply_roundtrips() {
        let packet = ReplyPacket {
            waiter: WaiterHandle(1),
            r#ref: Ref(1),
            value: Term::Int(5),
        };
        let decoded = ReplyPacket::from_term(packet.to_term()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn control_messages_roundtrip() {
        let req = ControlRequest::Hello {
            node: Node::from("nodeA"),
        };
        assert_eq!(ControlRequest::from_term(req.to_term()).unwrap(), req);

        let resp = ControlResponse::Port(54321);
        assert_eq!(ControlResponse::from_term(resp.to_term()).unwrap(), resp);

        let err = ControlResponse::Error("handshake_failed".to_string());
        assert_eq!(ControlResponse::from_term(err.to_term()).unwrap(), err);
    }
}
