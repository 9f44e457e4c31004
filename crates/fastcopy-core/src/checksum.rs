//! MD5 content digests used for copy verification.

use eyre::{Context, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Hash a whole file.
pub fn hash_file(path: &Path) -> Result<md5::Digest> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(ctx.compute())
}

pub fn hash_bytes(data: &[u8]) -> md5::Digest {
    md5::compute(data)
}

/// Lowercase hex rendering (32 chars).
pub fn to_hex(digest: &md5::Digest) -> String {
    format!("{digest:x}")
}

/// Reader that feeds everything it yields into a running digest.
pub struct DigestReader<R> {
    inner: R,
    ctx: md5::Context,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            ctx: md5::Context::new(),
        }
    }

    pub fn finish(self) -> md5::Digest {
        self.ctx.compute()
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.ctx.consume(&buf[..n]);
        Ok(n)
    }
}

/// Writer that feeds every accepted byte into a running digest.
pub struct DigestWriter<W> {
    inner: W,
    ctx: md5::Context,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            ctx: md5::Context::new(),
        }
    }

    /// Flush the inner writer and return it together with the digest.
    pub fn finish(mut self) -> io::Result<(W, md5::Digest)> {
        self.inner.flush()?;
        Ok((self.inner, self.ctx.compute()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.ctx.consume(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn known_vector() {
        let digest = hash_bytes(b"abc");
        assert_eq!(to_hex(&digest), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn file_hash_matches_buffer_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&payload));
    }

    #[test]
    fn reader_and_writer_agree() {
        let payload = b"the quick brown fox".repeat(1000);
        let mut reader = DigestReader::new(Cursor::new(payload.clone()));
        let mut writer = DigestWriter::new(Vec::new());
        io::copy(&mut reader, &mut writer).unwrap();

        let (written, out_digest) = writer.finish().unwrap();
        assert_eq!(written, payload);
        assert_eq!(reader.finish(), out_digest);
        assert_eq!(out_digest, hash_bytes(&payload));
    }
}
