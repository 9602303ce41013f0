//! Wire framing and the tagged-term payload encoding shared by the client
//! actor and the server acceptor.
//!
//! Every message on the wire — control handshake or data frame — uses the
//! same envelope: a 4-byte big-endian length prefix followed by that many
//! bytes of payload. The payload itself is a small self-describing term
//! format (tuples, atoms, integers, binaries, lists) good enough to carry
//! an RPC call and its result without committing either side to a specific
//! application-level schema.

pub mod packet;

use bytes::{Buf, BufMut, BytesMut};

/// Frames are not individually recoverable: once the length prefix and the
/// payload disagree, the stream is desynchronized and the only sound move
/// is to close the socket. Every caller of `decode_frame`/`decode_term`
/// MUST treat any `Error` as fatal to the connection.
#[derive(Debug)]
pub enum Error {
    /// The buffer ended before the term it promised was fully read.
    Truncated,
    /// A tag byte did not match any known term kind.
    InvalidTag(u8),
    /// An atom or binary was not valid UTF-8 where UTF-8 was required.
    InvalidUtf8,
    /// The declared frame length exceeds `MAX_FRAME_LEN`.
    FrameTooLarge(u32),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated term"),
            Self::InvalidTag(tag) => write!(f, "invalid term tag: {tag}"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8 in atom or binary"),
            Self::FrameTooLarge(len) => write!(f, "frame too large: {len} bytes"),
        }
    }
}

/// Upper bound on a single frame's payload size. Guards against a corrupt
/// length prefix causing an unbounded allocation before the frame can even
/// be rejected.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const TAG_INT: u8 = 0;
const TAG_ATOM: u8 = 1;
const TAG_BINARY: u8 = 2;
const TAG_TUPLE: u8 = 3;
const TAG_LIST: u8 = 4;

/// A self-describing term: the payload model for every request, reply, and
/// control message this system exchanges.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Int(i64),
    /// A short interned string. Peer node names, module names, and function
    /// names all travel as atoms — the set of distinct values is small and
    /// bounded by cluster membership, so there is no need for a general
    /// string type here.
    Atom(String),
    Binary(Vec<u8>),
    Tuple(Vec<Term>),
    List(Vec<Term>),
}

impl Term {
    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Term>, Error> {
        match self {
            Self::Tuple(t) => Ok(t),
            _ => Err(Error::Truncated),
        }
    }
}

/// Encodes `term` to its wire representation, appended to `out`.
pub fn encode_term(term: &Term, out: &mut BytesMut) {
    match term {
        Term::Int(v) => {
            out.put_u8(TAG_INT);
            out.put_i64(*v);
        }
        Term::Atom(s) => {
            out.put_u8(TAG_ATOM);
            out.put_u16(s.len() as u16);
            out.put_slice(s.as_bytes());
        }
        Term::Binary(b) => {
            out.put_u8(TAG_BINARY);
            out.put_u32(b.len() as u32);
            out.put_slice(b);
        }
        Term::Tuple(items) => {
            out.put_u8(TAG_TUPLE);
            out.put_u16(items.len() as u16);
            for item in items {
                encode_term(item, out);
            }
        }
        Term::List(items) => {
            out.put_u8(TAG_LIST);
            out.put_u32(items.len() as u32);
            for item in items {
                encode_term(item, out);
            }
        }
    }
}

/// Decodes one term from the front of `buf`, advancing it past the bytes
/// consumed. Any error leaves `buf` in an indeterminate state — the caller
/// must not attempt to resynchronize, only close the connection.
pub fn decode_term(buf: &mut impl Buf) -> Result<Term, Error> {
    if !buf.has_remaining() {
        return Err(Error::Truncated);
    }

    let tag = buf.get_u8();
    Ok(match tag {
        TAG_INT => {
            if buf.remaining() < 8 {
                return Err(Error::Truncated);
            }
            Term::Int(buf.get_i64())
        }
        TAG_ATOM => {
            if buf.remaining() < 2 {
                return Err(Error::Truncated);
            }
            let len = buf.get_u16() as usize;
            if buf.remaining() < len {
                return Err(Error::Truncated);
            }
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            Term::Atom(String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?)
        }
        TAG_BINARY => {
            if buf.remaining() < 4 {
                return Err(Error::Truncated);
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(Error::Truncated);
            }
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            Term::Binary(bytes)
        }
        TAG_TUPLE => {
            if buf.remaining() < 2 {
                return Err(Error::Truncated);
            }
            let len = buf.get_u16() as usize;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_term(buf)?);
            }
            Term::Tuple(items)
        }
        TAG_LIST => {
            if buf.remaining() < 4 {
                return Err(Error::Truncated);
            }
            let len = buf.get_u32() as usize;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_term(buf)?);
            }
            Term::List(items)
        }
        other => return Err(Error::InvalidTag(other)),
    })
}

/// Encodes `term` as a complete length-prefixed frame.
pub fn encode_frame(term: &Term) -> BytesMut {
    let mut payload = BytesMut::new();
    encode_term(term, &mut payload);

    let mut frame = BytesMut::with_capacity(payload.len() + 4);
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(&payload);
    frame
}

/// Reads the 4-byte big-endian length prefix, validating it against
/// `MAX_FRAME_LEN` before the caller allocates a buffer to read the payload
/// into.
pub fn decode_frame_len(prefix: [u8; 4]) -> Result<u32, Error> {
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    Ok(len)
}

/// Decodes a complete payload (the bytes following the length prefix) into
/// a single term. Trailing bytes after a fully-decoded term are treated as
/// corruption, not as a second message — one frame carries exactly one
/// term.
pub fn decode_frame(payload: &[u8]) -> Result<Term, Error> {
    let mut cursor = payload;
    let term = decode_term(&mut cursor)?;
    if cursor.has_remaining() {
        return Err(Error::Truncated);
    }
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(term: Term) {
        let frame = encode_frame(&term);
        let len = decode_frame_len(frame[0..4].try_into().unwrap()).unwrap();
        assert_eq!(len as usize, frame.len() - 4);
        let decoded = decode_frame(&frame[4..]).unwrap();
        assert_eq!(decoded, term);
    }

    #[test]
    fn roundtrips_every_term_kind() {
        roundtrip(Term::Int(-42));
        roundtrip(Term::atom("math"));
        roundtrip(Term::Binary(vec![1, 2, 3, 4]));
        roundtrip(Term::List(vec![Term::Int(1), Term::Int(2), Term::Int(3)]));
        roundtrip(Term::Tuple(vec![
            Term::atom("peerB"),
            Term::Int(7),
            Term::List(vec![Term::atom("ok")]),
        ]));
    }

    #[test]
    fn rejects_invalid_tag() {
        let mut buf: &[u8] = &[0xff];
        assert!(matches!(decode_term(&mut buf), Err(Error::InvalidTag(0xff))));
    }

    #[test]
    fn rejects_truncated_atom() {
        // tag + declared length 10, but no bytes follow.
        let mut buf: &[u8] = &[TAG_ATOM, 0x00, 0x0a];
        assert!(matches!(decode_term(&mut buf), Err(Error::Truncated)));
    }

    #[test]
    fn rejects_oversized_frame_length() {
        let prefix = (MAX_FRAME_LEN + 1).to_be_bytes();
        assert!(matches!(
            decode_frame_len(prefix),
            Err(Error::FrameTooLarge(_))
        ));
    }

    #[test]
    fn rejects_trailing_garbage_after_term() {
        let mut payload = BytesMut::new();
        encode_term(&Term::Int(1), &mut payload);
        payload.put_u8(0xaa);
        assert!(matches!(decode_frame(&payload), Err(Error::Truncated)));
    }
}
