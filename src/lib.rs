use serde::{Serialize, Deserialize};

pub mod buffered_io;
pub mod codec;
pub mod client;
pub mod server;

/// Length of the payload digest in bytes (MD5).
pub const DIGEST_LEN: usize = 16;

/// One framed control message. Exactly one variant per frame; raw file
/// bytes are never wrapped in an `Envelope` but flow directly on the
/// stream between two of these (see [`codec`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Envelope {
    /// Client asks to store a file. `size` is the exact byte count that
    /// will follow an accepting `StorageResponse`.
    StorageRequest {
        file_name: String,
        size: u64,
    },
    /// Accept/reject for a storage request, reused for the post-checksum
    /// verdict.
    StorageResponse {
        ok: bool,
        message: String,
    },
    /// Client asks to fetch a file by name.
    RetrievalRequest {
        file_name: String,
    },
    /// Accept/reject for a retrieval request. `size` is only meaningful
    /// when `ok`; exactly that many raw bytes follow immediately.
    RetrievalResponse {
        ok: bool,
        message: String,
        size: u64,
    },
    /// Digest of the payload that was just transferred.
    Checksum {
        digest: [u8; DIGEST_LEN],
    },
    /// Orderly "no further requests" sentinel.
    Empty,
}

/// Strip any directory components from a requested name.
///
/// The wire carries bare names only; a request for `a/b/c.txt` stores or
/// fetches `c.txt`. Returns `None` for names with no final component
/// (empty strings, `/`, `..`).
pub fn base_name(file_name: &str) -> Option<&str> {
    std::path::Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::base_name;

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("data.bin"), Some("data.bin"));
        assert_eq!(base_name("some/dir/data.bin"), Some("data.bin"));
        assert_eq!(base_name("/etc/passwd"), Some("passwd"));
        assert_eq!(base_name("../../escape.txt"), Some("escape.txt"));
    }

    #[test]
    fn base_name_rejects_pathological_names() {
        assert_eq!(base_name(""), None);
        assert_eq!(base_name("/"), None);
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("dir/.."), None);
    }
}
