//! Reading and writing length-prefixed term frames over an async socket.
//! `codec` defines the wire format itself; this glues it to tokio's I/O
//! traits, which `codec` deliberately doesn't depend on.

use codec::Term;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug)]
pub enum FrameError {
    /// The peer closed the connection cleanly between frames.
    Eof,
    Io(std::io::Error),
    Codec(codec::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "connection closed"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<codec::Error> for FrameError {
    fn from(e: codec::Error) -> Self {
        Self::Codec(e)
    }
}

pub async fn write_frame(socket: &mut (impl AsyncWrite + Unpin), term: &Term) -> Result<(), FrameError> {
    let frame = codec::encode_frame(term);
    socket.write_all(&frame).await?;
    Ok(())
}

/// Reads exactly one frame, returning `Err(FrameError::Eof)` if the peer
/// closed the connection before (or between) frames rather than mid-frame.
pub async fn read_frame(socket: &mut (impl AsyncRead + Unpin)) -> Result<Term, FrameError> {
    let mut prefix = [0u8; 4];
    match socket.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Eof),
        Err(e) => return Err(e.into()),
    }

    let len = codec::decode_frame_len(prefix)?;
    let mut payload = vec![0u8; len as usize];
    socket.read_exact(&mut payload).await?;
    Ok(codec::decode_frame(&payload)?)
}
