use std::io::{Read, Write};
use md5::{Digest, Md5};

use crate::DIGEST_LEN;


#[derive(Debug)]
pub struct HashReader<R: Read> {
    reader: R,
    hasher: Md5,
    /// total bytes digested
    pub digested: u64,
}

impl<R: Read> HashReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Md5::new(),
            digested: 0,
        }
    }

    pub fn finalize(self) -> (R, [u8; DIGEST_LEN]) {
        (self.reader, self.hasher.finalize().into())
    }
}

impl<R: Read> Read for HashReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf);
        if let Ok(br) = bytes_read {
            self.hasher.update(&buf[..br]);
            self.digested += br as u64;
        }
        bytes_read
    }
}


#[derive(Debug)]
pub struct HashWriter<W: Write> {
    writer: W,
    hasher: Md5,
    /// total bytes digested
    pub digested: u64,
}

impl<W: Write> HashWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Md5::new(),
            digested: 0,
        }
    }

    pub fn finalize(self) -> (W, [u8; DIGEST_LEN]) {
        (self.writer, self.hasher.finalize().into())
    }
}

impl<W: Write> Write for HashWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf);
        if let Ok(bw) = written {
            self.hasher.update(&buf[0..bw]);
            self.digested += bw as u64;
        }
        written
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn md5_of(data: &[u8]) -> [u8; DIGEST_LEN] {
        let mut hasher = Md5::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    #[test]
    fn reader_digests_what_it_reads() {
        let data = b"some payload bytes".to_vec();
        let mut reader = HashReader::new(data.as_slice());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.digested, data.len() as u64);

        let (_, digest) = reader.finalize();
        assert_eq!(digest, md5_of(&data));
    }

    #[test]
    fn writer_digests_what_it_writes() {
        let data: Vec<u8> = (0..=255).cycle().take(70_000).collect();
        let mut writer = HashWriter::new(Vec::new());

        writer.write_all(&data).unwrap();
        assert_eq!(writer.digested, data.len() as u64);

        let (inner, digest) = writer.finalize();
        assert_eq!(inner, data);
        assert_eq!(digest, md5_of(&data));
    }

    #[test]
    fn reader_and_writer_agree() {
        let data = b"the same bytes on both ends".to_vec();

        let mut writer = HashWriter::new(Vec::new());
        writer.write_all(&data).unwrap();
        let (_, sent) = writer.finalize();

        let mut reader = HashReader::new(data.as_slice());
        std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        let (_, received) = reader.finalize();

        assert_eq!(sent, received);
    }

    #[test]
    fn single_bit_flip_changes_digest() {
        let mut data = vec![0u8; 4096];
        let clean = md5_of(&data);
        data[2048] ^= 0x01;
        assert_ne!(md5_of(&data), clean);
    }
}
