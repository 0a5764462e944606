pub mod hash_io;

pub use hash_io::{HashReader, HashWriter};
