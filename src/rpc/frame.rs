//! RPC record marking (RFC 5531 §11): reassembles the stream's length-prefixed
//! fragments into complete message payloads, and emits replies as a single
//! final fragment.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

const LAST_FRAGMENT_BIT: u32 = 0x8000_0000;
const LENGTH_MASK: u32 = 0x7FFF_FFFF;

#[derive(Debug)]
pub enum Error {
    Eof,
    FragmentTooLarge { len: u32, max: u32 },
    RecordTooLarge { len: usize, max: usize },
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Eof
        } else {
            Error::Io(e)
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Eof => write!(f, "connection closed"),
            Error::FragmentTooLarge { len, max } => {
                write!(f, "fragment length {len} exceeds configured max {max}")
            }
            Error::RecordTooLarge { len, max } => {
                write!(f, "reassembled record length {len} exceeds configured max {max}")
            }
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Reads whole records (one or more fragments) from an async stream, applying
/// the bounds in `max_fragment_len`/`max_record_len` to cap allocation before
/// any fragment payload is read.
pub struct RecordReader<R> {
    inner: R,
    max_fragment_len: u32,
    max_record_len: usize,
}

impl<R: tokio::io::AsyncRead + Unpin> RecordReader<R> {
    pub fn new(inner: R, max_fragment_len: u32, max_record_len: usize) -> Self {
        RecordReader { inner, max_fragment_len, max_record_len }
    }

    /// Reads one complete RPC record, concatenating fragments until the
    /// last-fragment bit is observed. Returns `Err(Error::Eof)` if the peer
    /// closed the connection before any bytes of a new record arrived.
    pub async fn read_record(&mut self) -> Result<Vec<u8>, Error> {
        let mut record = Vec::new();
        loop {
            let header = self.inner.read_u32().await?;
            let is_last = header & LAST_FRAGMENT_BIT != 0;
            let len = header & LENGTH_MASK;
            if len > self.max_fragment_len {
                return Err(Error::FragmentTooLarge { len, max: self.max_fragment_len });
            }
            let start = record.len();
            record.resize(start + len as usize, 0);
            self.inner.read_exact(&mut record[start..]).await?;
            if record.len() > self.max_record_len {
                return Err(Error::RecordTooLarge { len: record.len(), max: self.max_record_len });
            }
            if is_last {
                return Ok(record);
            }
        }
    }
}

/// Writes a reply payload as a single, final fragment.
pub async fn write_record<W: tokio::io::AsyncWrite + Unpin>(
    out: &mut W,
    payload: &[u8],
) -> Result<(), Error> {
    let header = LAST_FRAGMENT_BIT | (payload.len() as u32 & LENGTH_MASK);
    out.write_u32(header).await?;
    out.write_all(payload).await?;
    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reassembles_two_fragments() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(3u32).to_be_bytes());
        raw.extend_from_slice(b"abc");
        raw.extend_from_slice(&(LAST_FRAGMENT_BIT | 2).to_be_bytes());
        raw.extend_from_slice(b"de");
        let mut reader = RecordReader::new(Cursor::new(raw), 1 << 20, 1 << 20);
        let record = reader.read_record().await.unwrap();
        assert_eq!(record, b"abcde");
    }

    #[tokio::test]
    async fn rejects_oversized_fragment() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(LAST_FRAGMENT_BIT | 100).to_be_bytes());
        let mut reader = RecordReader::new(Cursor::new(raw), 10, 1 << 20);
        assert!(matches!(reader.read_record().await, Err(Error::FragmentTooLarge { .. })));
    }

    #[tokio::test]
    async fn write_record_sets_last_fragment_bit() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"hi").await.unwrap();
        let header = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        assert_eq!(header & LAST_FRAGMENT_BIT, LAST_FRAGMENT_BIT);
        assert_eq!(header & LENGTH_MASK, 2);
        assert_eq!(&buf[4..], b"hi");
    }
}
