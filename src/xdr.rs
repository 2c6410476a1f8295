//! Primitive XDR (RFC 4506) encoding and decoding helpers.
//!
//! All integers are big-endian. Variable-length opaque data and strings are
//! encoded as a `u32` length followed by the bytes followed by zero-padding
//! up to the next 4-byte boundary.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

pub const ALIGNMENT: usize = 4;

#[derive(Debug)]
pub enum Error {
    UnexpectedEof,
    Io(io::Error),
    BadBool(u32),
    BadDiscriminant(u32),
    StringTooLong(usize),
    NotUtf8,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEof => write!(f, "unexpected end of XDR stream"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::BadBool(v) => write!(f, "invalid xdr bool discriminant: {v}"),
            Error::BadDiscriminant(v) => write!(f, "invalid union discriminant: {v}"),
            Error::StringTooLong(n) => write!(f, "string/opaque exceeds limit: {n} bytes"),
            Error::NotUtf8 => write!(f, "name is not valid utf-8"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

pub fn pad_len(n: usize) -> usize {
    (ALIGNMENT - (n % ALIGNMENT)) % ALIGNMENT
}

/// A cursor-backed decoder over an owned, fully-buffered record payload.
pub struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { cursor: Cursor::new(buf) }
    }

    pub fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        self.cursor.get_ref().len().saturating_sub(pos)
    }

    /// Copies out everything from the current position to the end of the
    /// buffer, without advancing the cursor. Used to hand a procedure's
    /// remaining argument bytes to a spawned task that needs an owned copy.
    pub fn remaining_bytes(&self) -> Vec<u8> {
        let pos = self.cursor.position() as usize;
        self.cursor.get_ref()[pos..].to_vec()
    }

    fn skip_padding(&mut self, n: usize) -> Result<()> {
        let pad = pad_len(n);
        if pad > 0 {
            let mut buf = [0u8; 4];
            self.cursor.read_exact(&mut buf[..pad])?;
        }
        Ok(())
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(self.cursor.read_u64::<BigEndian>()?)
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.cursor.read_i32::<BigEndian>()?)
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::BadBool(other)),
        }
    }

    pub fn u32_as_usize(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    /// A length-prefixed opaque blob with a maximum acceptable length.
    pub fn opaque(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let len = self.u32_as_usize()?;
        if len > max_len {
            return Err(Error::StringTooLong(len));
        }
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf)?;
        self.skip_padding(len)?;
        Ok(buf)
    }

    /// Fixed-size opaque array (e.g. an 8-byte verifier), no length prefix.
    pub fn fixed_opaque<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.cursor.read_exact(&mut buf)?;
        self.skip_padding(N)?;
        Ok(buf)
    }

    pub fn string(&mut self, max_len: usize) -> Result<String> {
        let bytes = self.opaque(max_len)?;
        String::from_utf8(bytes).map_err(|_| Error::NotUtf8)
    }

    pub fn option<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        if self.bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }

    /// Reads a u32 discriminant without interpreting it, for manual union dispatch.
    pub fn discriminant(&mut self) -> Result<u32> {
        self.u32()
    }
}

/// A growable, owned byte buffer encoder.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn write_padding(&mut self, n: usize) {
        let pad = pad_len(n);
        self.buf.extend(std::iter::repeat(0u8).take(pad));
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.write_u32::<BigEndian>(v).expect("Vec<u8> write cannot fail");
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.write_u64::<BigEndian>(v).expect("Vec<u8> write cannot fail");
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.write_i32::<BigEndian>(v).expect("Vec<u8> write cannot fail");
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u32(if v { 1 } else { 0 })
    }

    pub fn opaque(&mut self, data: &[u8]) -> &mut Self {
        self.u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self.write_padding(data.len());
        self
    }

    pub fn fixed_opaque(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self.write_padding(data.len());
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.opaque(s.as_bytes())
    }

    pub fn option<T>(&mut self, v: &Option<T>, write: impl FnOnce(&mut Self, &T)) -> &mut Self {
        match v {
            Some(inner) => {
                self.bool(true);
                write(self, inner);
            }
            None => {
                self.bool(false);
            }
        }
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }
}

pub fn write_all(w: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    w.write_all(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_opaque() {
        let mut enc = Encoder::new();
        enc.opaque(b"hello");
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 4 + 5 + 3);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.opaque(1024).unwrap(), b"hello");
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn roundtrip_option() -> Result<()> {
        let mut enc = Encoder::new();
        enc.option(&Some(42u32), |e, v| {
            e.u32(*v);
        });
        enc.option(&None::<u32>, |e, v| {
            e.u32(*v);
        });
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.option(|d| d.u32())?, Some(42));
        assert_eq!(dec.option(|d| d.u32())?, None);
        Ok(())
    }

    #[test]
    fn bool_rejects_bad_discriminant() {
        let mut enc = Encoder::new();
        enc.u32(7);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.bool(), Err(Error::BadBool(7))));
    }

    #[test]
    fn padding_is_exactly_zero() {
        let mut enc = Encoder::new();
        enc.opaque(b"abc");
        let bytes = enc.into_bytes();
        assert_eq!(&bytes[4 + 3..], &[0, 0, 0]);
    }
}
