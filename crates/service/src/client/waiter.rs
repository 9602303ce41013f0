//! The call-waiter (§4.6): a short-lived task that races a single reply
//! against its receive timeout, decoupling the caller's future from the
//! client actor's event loop.

use std::time::Duration;

use codec::Term;
use tokio::sync::oneshot;

use crate::error::{CallError, ReplyValue, RpcError, TransportError};

/// Spawns the waiter for one outstanding call. `reply_rx` resolves with the
/// reply's raw value term if the actor delivers one, or is dropped (closing
/// the channel) if the actor terminates first. `respond` carries the final
/// result back to the original caller of `Engine::call`.
pub fn spawn(
    reply_rx: oneshot::Receiver<Term>,
    recv_timeout: Duration,
    respond: oneshot::Sender<Result<Term, CallError>>,
) {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            reply = reply_rx => match reply {
                Ok(value) => decode_reply(value),
                Err(_) => Err(CallError::Transport(TransportError::Closed)),
            },
            _ = tokio::time::sleep(recv_timeout) => Err(CallError::Rpc(RpcError::Timeout)),
        };
        // The caller may have dropped its receiver (e.g. cancelled the
        // awaiting future); nothing to do if so.
        let _ = respond.send(outcome);
    });
}

fn decode_reply(value: Term) -> Result<Term, CallError> {
    match ReplyValue::from_term(value) {
        Ok(ReplyValue::Ok(value)) => Ok(value),
        Ok(ReplyValue::Err(err)) => Err(CallError::Rpc(err)),
        Err(_) => Err(CallError::Rpc(RpcError::Malformed)),
    }
}
