use std::fs::{self, File, OpenOptions};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use bytesize::ByteSize;
use tracing::{error, info, warn};

use crate::codec::{Messenger, WireError};
use crate::{base_name, Envelope};


/// Whether the dispatch loop may keep serving requests on a connection.
enum Flow {
    Continue,
    Close,
}

pub struct Server {
    listener: TcpListener,
    root: PathBuf,
}

impl Server {
    /// Bind `addr` and make sure the storage root exists.
    pub fn bind(addr: SocketAddr, root: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("cannot create storage directory {root:?}"))?;
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("cannot bind to {addr}"))?;
        Ok(Self { listener, root })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one handler thread each. Handlers share
    /// nothing but the storage directory; exclusive file creation is the
    /// only arbiter for same-name races.
    pub fn run(self) -> anyhow::Result<()> {
        info!(
            "listening on {}, storing files in {:?}",
            self.listener.local_addr()?,
            self.root
        );

        for stream in self.listener.incoming() {
            let stream = stream?;
            let root = self.root.clone();
            std::thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(e) = handle_client(stream, &root) {
                    error!("connection to {peer:?} failed: {e}");
                }
            });
        }

        Ok(())
    }
}

/// Per-connection dispatch loop. Serves any number of sequential requests
/// until the client says `Empty` or goes away; any framing or decode
/// failure ends the connection rather than trying to resync the stream.
fn handle_client(stream: TcpStream, root: &Path) -> Result<(), WireError> {
    let peer = stream.peer_addr()?;
    info!("client connected: {peer}");
    let mut messenger = Messenger::new(stream);

    loop {
        let envelope = match messenger.receive() {
            Ok(envelope) => envelope,
            Err(e) if e.is_disconnect() => break,
            Err(e) => return Err(e),
        };

        let flow = match envelope {
            Envelope::StorageRequest { file_name, size } => {
                handle_storage(&mut messenger, root, &file_name, size)?
            }
            Envelope::RetrievalRequest { file_name } => {
                handle_retrieval(&mut messenger, root, &file_name)?
            }
            Envelope::Empty => break,
            other => {
                warn!("unexpected message from {peer}: {other:?}");
                Flow::Continue
            }
        };

        if let Flow::Close = flow {
            break;
        }
    }

    info!("client done: {peer}");
    Ok(())
}

fn handle_storage(
    messenger: &mut Messenger<TcpStream>,
    root: &Path,
    requested: &str,
    size: u64,
) -> Result<Flow, WireError> {
    let Some(name) = base_name(requested) else {
        messenger.send(&reject_storage(format!("Invalid file name {requested:?}")))?;
        return Ok(Flow::Close);
    };
    let path = root.join(name);
    info!("storing {name:?} ({})", ByteSize(size));

    // exclusive create doubles as the same-name race arbiter
    let sink = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!("refusing to overwrite {path:?}");
            messenger.send(&reject_storage("File already exists".to_owned()))?;
            return Ok(Flow::Close);
        }
        Err(e) => {
            warn!("cannot create {path:?}: {e}");
            messenger.send(&reject_storage(e.to_string()))?;
            return Ok(Flow::Close);
        }
    };

    messenger.send(&Envelope::StorageResponse {
        ok: true,
        message: "Ready for data".to_owned(),
    })?;

    let start = Instant::now();
    let local = match messenger.recv_payload(&sink, size) {
        Ok(digest) => digest,
        Err(e) => {
            // the transfer died mid-payload, don't keep the torso
            drop(sink);
            let _ = fs::remove_file(&path);
            return Err(e);
        }
    };
    drop(sink);

    // the client's digest arrives on the generic framed path
    let verdict = match messenger.receive() {
        Ok(Envelope::Checksum { digest }) if digest == local => {
            info!(
                "stored {path:?}: {} in {:.3}s",
                ByteSize(size),
                start.elapsed().as_secs_f64()
            );
            Envelope::StorageResponse {
                ok: true,
                message: "File stored successfully".to_owned(),
            }
        }
        Ok(Envelope::Checksum { .. }) => {
            warn!("checksum mismatch for {path:?}, removing it");
            let _ = fs::remove_file(&path);
            reject_storage("Checksum verification failed".to_owned())
        }
        Ok(other) => {
            warn!("expected a checksum for {path:?}, received {other:?}");
            let _ = fs::remove_file(&path);
            messenger.send(&reject_storage("Failed to receive checksum".to_owned()))?;
            return Ok(Flow::Close);
        }
        Err(e) => {
            let _ = fs::remove_file(&path);
            if !e.is_disconnect() {
                // best effort, the connection is closing either way
                let _ =
                    messenger.send(&reject_storage("Failed to receive checksum".to_owned()));
            }
            return Err(e);
        }
    };

    messenger.send(&verdict)?;
    Ok(Flow::Continue)
}

fn handle_retrieval(
    messenger: &mut Messenger<TcpStream>,
    root: &Path,
    requested: &str,
) -> Result<Flow, WireError> {
    let Some(name) = base_name(requested) else {
        messenger.send(&reject_retrieval(format!("Invalid file name {requested:?}")))?;
        return Ok(Flow::Close);
    };
    let path = root.join(name);
    info!("retrieving {name:?}");

    let source = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            messenger.send(&reject_retrieval("File does not exist".to_owned()))?;
            return Ok(Flow::Close);
        }
        Err(e) => {
            messenger.send(&reject_retrieval(e.to_string()))?;
            return Ok(Flow::Close);
        }
    };
    let metadata = source.metadata()?;
    if !metadata.is_file() {
        messenger.send(&reject_retrieval("File does not exist".to_owned()))?;
        return Ok(Flow::Close);
    }
    let size = metadata.len();

    messenger.send(&Envelope::RetrievalResponse {
        ok: true,
        message: "Ready to send".to_owned(),
        size,
    })?;

    let start = Instant::now();
    let digest = messenger.send_payload(source, size)?;
    messenger.send(&Envelope::Checksum { digest })?;

    info!(
        "sent {path:?}: {} in {:.3}s",
        ByteSize(size),
        start.elapsed().as_secs_f64()
    );
    Ok(Flow::Continue)
}

fn reject_storage(message: String) -> Envelope {
    Envelope::StorageResponse { ok: false, message }
}

fn reject_retrieval(message: String) -> Envelope {
    Envelope::RetrievalResponse { ok: false, message, size: 0 }
}
