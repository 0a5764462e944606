use std::io::{self, Read, Write};

use crate::buffered_io::{HashReader, HashWriter};
use crate::{Envelope, DIGEST_LEN};


/// Upper bound on a control frame's body length. Control messages carry at
/// most a file name and a digest; a declared length beyond this means the
/// stream is desynchronized (e.g. raw payload bytes parsed as a prefix).
pub const MAX_FRAME_LEN: u32 = 1 << 16;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Clean end-of-stream at a frame boundary. The dispatch side treats
    /// this like receiving [`Envelope::Empty`].
    #[error("connection closed by peer")]
    Disconnected,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Malformed frame body. Fatal for the connection, no resync attempt.
    #[error("malformed frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("declared frame length {0} exceeds limit, stream desynchronized")]
    Oversize(u32),

    #[error("payload ended after {got} of {want} bytes")]
    ShortPayload { want: u64, got: u64 },
}

impl WireError {
    /// Whether the peer simply went away at a frame boundary.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, WireError::Disconnected)
    }
}


/// Both halves of the wire protocol on one stream: length-prefixed
/// [`Envelope`] frames and unframed raw payload runs.
///
/// A frame is a `u32` big-endian body length followed by the MessagePack
/// encoding of the envelope. Raw payload bytes follow an accepting
/// response with no framing at all; the byte count was agreed in that
/// response, and nothing on the wire marks where payload ends and the
/// next frame begins. Callers must therefore finish any outstanding
/// payload transfer before calling [`receive`](Self::receive) again.
/// The state machines in [`client`](crate::client) and
/// [`server`](crate::server) are the only callers and uphold this by
/// construction.
#[derive(Debug)]
pub struct Messenger<S> {
    stream: S,
}

impl<S: Read + Write> Messenger<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Serialize and send one envelope as a length-prefixed frame.
    pub fn send(&mut self, envelope: &Envelope) -> Result<(), WireError> {
        let body = rmp_serde::to_vec(envelope)?;
        // encoded control messages are tiny, the cast cannot truncate
        self.stream.write_all(&(body.len() as u32).to_be_bytes())?;
        self.stream.write_all(&body)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until one full frame arrives and decode it.
    ///
    /// A stream that closes cleanly before the first prefix byte yields
    /// [`WireError::Disconnected`]; anything else that prevents a full,
    /// well-formed frame is a fatal error for this connection.
    pub fn receive(&mut self) -> Result<Envelope, WireError> {
        let len = self.read_frame_len()?;
        if len > MAX_FRAME_LEN {
            return Err(WireError::Oversize(len));
        }

        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body)?;
        Ok(rmp_serde::from_slice(&body)?)
    }

    /// Read the 4-byte length prefix, distinguishing a clean close (zero
    /// bytes read) from a prefix truncated mid-way.
    fn read_frame_len(&mut self) -> Result<u32, WireError> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.stream.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Err(WireError::Disconnected),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed inside a frame prefix",
                    )
                    .into())
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(u32::from_be_bytes(prefix))
    }

    /// Copy exactly `size` raw bytes from `src` onto the stream, digesting
    /// them in the same pass. Never buffers more than one chunk.
    pub fn send_payload(
        &mut self,
        src: impl Read,
        size: u64,
    ) -> Result<[u8; DIGEST_LEN], WireError> {
        let mut writer = HashWriter::new(&mut self.stream);
        let copied = io::copy(&mut src.take(size), &mut writer)?;
        let (_, digest) = writer.finalize();
        if copied < size {
            // the source ran dry, the peer still expects more bytes
            return Err(WireError::ShortPayload { want: size, got: copied });
        }
        self.stream.flush()?;
        Ok(digest)
    }

    /// Copy exactly `size` raw bytes from the stream into `sink`,
    /// digesting them in the same pass.
    pub fn recv_payload(
        &mut self,
        mut sink: impl Write,
        size: u64,
    ) -> Result<[u8; DIGEST_LEN], WireError> {
        let mut reader = HashReader::new(&mut self.stream);
        let copied = io::copy(&mut (&mut reader).take(size), &mut sink)?;
        let (_, digest) = reader.finalize();
        if copied < size {
            return Err(WireError::ShortPayload { want: size, got: copied });
        }
        Ok(digest)
    }
}
