//! A user-space NFSv3 (RFC 1813) and MOUNTv3 server: RPC framing and XDR
//! codec, a file handle service, an abstract [`fsal::Fsal`] contract with a
//! host-filesystem-backed reference implementation, and the 22 NFSv3 plus 6
//! MOUNT procedure handlers. See `SPEC_FULL.md` for the full design.

pub mod config;
pub mod dispatcher;
pub mod fsal;
pub mod handle;
pub mod logging;
pub mod mount;
pub mod nfs3;
pub mod rpc;
pub mod server;
pub mod xdr;

use std::time::{SystemTime, UNIX_EPOCH};

/// Derives a fresh write-verifier cookie from the current time and process
/// id, per `SPEC_FULL.md` §4.5: it must be stable within a process lifetime
/// and change on every restart.
pub fn fresh_write_verifier() -> [u8; 8] {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let mut v = [0u8; 8];
    v[0..4].copy_from_slice(&(now.as_secs() as u32).to_be_bytes());
    v[4..8].copy_from_slice(&std::process::id().to_be_bytes());
    v
}
