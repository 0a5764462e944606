use std::fs::{File, OpenOptions};
use std::net::TcpStream;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context};
use bytesize::ByteSize;
use tracing::info;

use crate::codec::Messenger;
use crate::Envelope;


/// Store a local file on the server at `address`.
///
/// Sends only the file's base name; the server never sees a path. No
/// payload byte is written unless the server accepts the request first.
pub fn put(address: &str, file: &Path) -> anyhow::Result<()> {
    // fail fast before touching the network
    let metadata = std::fs::metadata(file)
        .with_context(|| format!("cannot stat {file:?}"))?;
    if !metadata.is_file() {
        bail!("{file:?} is not a regular file");
    }
    let size = metadata.len();
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{file:?} has no usable file name"))?;

    let mut messenger = connect(address)?;
    messenger.send(&Envelope::StorageRequest { file_name: name.to_owned(), size })?;

    match messenger.receive()? {
        Envelope::StorageResponse { ok: true, .. } => {}
        Envelope::StorageResponse { ok: false, message } => {
            bail!("server rejected storage request: {message}")
        }
        other => bail!("expected a storage response, received {other:?}"),
    }

    let source = File::open(file)?;
    let start = Instant::now();
    let digest = messenger.send_payload(source, size)?;
    messenger.send(&Envelope::Checksum { digest })?;

    match messenger.receive()? {
        Envelope::StorageResponse { ok: true, .. } => {}
        Envelope::StorageResponse { ok: false, message } => bail!("storage failed: {message}"),
        other => bail!("expected a storage response, received {other:?}"),
    }

    info!(
        "stored {name:?}: {} in {:.3}s ({}/s)",
        ByteSize(size),
        start.elapsed().as_secs_f64(),
        ByteSize(rate(size, start)),
    );
    goodbye(messenger)
}

/// Fetch a file by name from the server at `address` into `dest`.
///
/// The destination directory is created if absent; the output file is
/// created exclusively and never overwrites an existing one. On a digest
/// mismatch the downloaded file is left in place for inspection.
pub fn get(address: &str, file: &Path, dest: &Path) -> anyhow::Result<()> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{file:?} has no usable file name"))?;

    if !dest.is_dir() {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("cannot create destination directory {dest:?}"))?;
        info!("created {dest:?}");
    }
    let target = dest.join(name);

    let mut messenger = connect(address)?;
    messenger.send(&Envelope::RetrievalRequest { file_name: name.to_owned() })?;

    let size = match messenger.receive()? {
        Envelope::RetrievalResponse { ok: true, size, .. } => size,
        Envelope::RetrievalResponse { ok: false, message, .. } => {
            bail!("server rejected retrieval request: {message}")
        }
        other => bail!("expected a retrieval response, received {other:?}"),
    };

    // refuse to clobber a local file of the same name
    let sink = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .with_context(|| format!("cannot create {target:?}"))?;

    let start = Instant::now();
    let local = messenger.recv_payload(&sink, size)?;
    drop(sink);

    let remote = match messenger.receive()? {
        Envelope::Checksum { digest } => digest,
        other => bail!("expected a checksum, received {other:?}"),
    };
    if remote != local {
        bail!("checksum mismatch for {target:?}, file kept on disk");
    }

    info!(
        "retrieved {name:?}: {} in {:.3}s ({}/s)",
        ByteSize(size),
        start.elapsed().as_secs_f64(),
        ByteSize(rate(size, start)),
    );
    goodbye(messenger)
}

fn connect(address: &str) -> anyhow::Result<Messenger<TcpStream>> {
    let stream = TcpStream::connect(address)
        .with_context(|| format!("cannot connect to {address}"))?;
    info!("connected to {}", stream.peer_addr()?);
    Ok(Messenger::new(stream))
}

/// Tell the server we are done before dropping the connection.
fn goodbye(mut messenger: Messenger<TcpStream>) -> anyhow::Result<()> {
    messenger.send(&Envelope::Empty)?;
    Ok(())
}

fn rate(size: u64, start: Instant) -> u64 {
    (size as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON)) as u64
}
