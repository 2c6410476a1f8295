//! MOUNT v3 (RFC 1813 appendix I, program 100005): NULL, MNT, DUMP, UMNT,
//! UMNTALL, EXPORT. Grounded on the teacher's `mount/mod.rs` data types
//! (`MountEntry`, `ExportEntry`) and `mount/mnt.rs`'s MNT result shape,
//! generalized to variable-length handles from the File Handle Service
//! instead of the teacher's fixed `[u8; 8]`.

use crate::handle::HandleService;
use crate::xdr::{Decoder, Encoder};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const NULL: u32 = 0;
pub const MNT: u32 = 1;
pub const DUMP: u32 = 2;
pub const UMNT: u32 = 3;
pub const UMNTALL: u32 = 4;
pub const EXPORT: u32 = 5;
pub const PROC_COUNT: u32 = 6;

const MAX_DIRPATH_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MountStat {
    Ok = 0,
    Perm = 1,
    NoEnt = 2,
    Io = 5,
    Access = 13,
    NotDir = 20,
    Inval = 22,
    NameTooLong = 63,
    NotSupp = 10004,
    ServerFault = 10006,
}

#[derive(Debug, Clone)]
struct MountEntry {
    hostname: String,
    directory: String,
}

/// MOUNT-side state: the single exported path, and the list of currently
/// "mounted" clients (consumed by DUMP/UMNTALL).
pub struct MountState {
    export_root: PathBuf,
    export_path: String,
    mounted: Mutex<Vec<MountEntry>>,
}

impl MountState {
    pub fn new(export_root: PathBuf, export_path: String) -> Self {
        MountState { export_root, export_path, mounted: Mutex::new(Vec::new()) }
    }

    fn normalize(path: &str) -> String {
        path.trim_end_matches('/').to_string()
    }

    fn matches_export(&self, requested: &str) -> bool {
        Self::normalize(requested) == Self::normalize(&self.export_path)
    }

    pub fn root_path(&self) -> &Path {
        &self.export_root
    }
}

pub async fn null(_dec: &mut Decoder<'_>) -> crate::xdr::Result<Vec<u8>> {
    Ok(Vec::new())
}

pub async fn mnt(
    dec: &mut Decoder<'_>,
    state: &MountState,
    handles: &HandleService,
    peer: SocketAddr,
) -> crate::xdr::Result<Vec<u8>> {
    let dirpath = dec.string(MAX_DIRPATH_LEN)?;
    let mut enc = Encoder::new();
    if state.matches_export(&dirpath) {
        let handle = handles.handle_for(state.root_path(), true);
        enc.u32(MountStat::Ok as u32);
        enc.opaque(handle.as_bytes());
        enc.u32(1); // one accepted auth flavor follows
        enc.u32(crate::rpc::AuthFlavor::AuthNone as u32);
        state.mounted.lock().unwrap().push(MountEntry {
            hostname: peer.ip().to_string(),
            directory: dirpath,
        });
    } else {
        enc.u32(MountStat::NoEnt as u32);
    }
    Ok(enc.into_bytes())
}

pub async fn dump(_dec: &mut Decoder<'_>, state: &MountState) -> crate::xdr::Result<Vec<u8>> {
    let mut enc = Encoder::new();
    for entry in state.mounted.lock().unwrap().iter() {
        enc.bool(true);
        enc.string(&entry.hostname);
        enc.string(&entry.directory);
    }
    enc.bool(false);
    Ok(enc.into_bytes())
}

pub async fn umnt(dec: &mut Decoder<'_>, state: &MountState, peer: SocketAddr) -> crate::xdr::Result<Vec<u8>> {
    let dirpath = dec.string(MAX_DIRPATH_LEN)?;
    let host = peer.ip().to_string();
    state.mounted.lock().unwrap().retain(|e| !(e.hostname == host && e.directory == dirpath));
    Ok(Vec::new())
}

pub async fn umntall(_dec: &mut Decoder<'_>, state: &MountState, peer: SocketAddr) -> crate::xdr::Result<Vec<u8>> {
    let host = peer.ip().to_string();
    state.mounted.lock().unwrap().retain(|e| e.hostname != host);
    Ok(Vec::new())
}

pub async fn export(_dec: &mut Decoder<'_>, state: &MountState) -> crate::xdr::Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.bool(true);
    enc.string(&state.export_path);
    enc.bool(false); // no group restriction: open to any host
    enc.bool(false); // no further export entries
    Ok(enc.into_bytes())
}

/// Routes a MOUNT procedure number. See [`crate::nfs3::handlers::dispatch`]
/// for the analogous NFSv3 contract.
pub async fn dispatch(
    procedure: u32,
    dec: &mut Decoder<'_>,
    state: &MountState,
    handles: &HandleService,
    peer: SocketAddr,
) -> crate::xdr::Result<Option<Vec<u8>>> {
    let body = match procedure {
        NULL => null(dec).await?,
        MNT => mnt(dec, state, handles, peer).await?,
        DUMP => dump(dec, state).await?,
        UMNT => umnt(dec, state, peer).await?,
        UMNTALL => umntall(dec, state, peer).await?,
        EXPORT => export(dec, state).await?,
        _ => return Ok(None),
    };
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdr::Encoder;

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[tokio::test]
    async fn mnt_matching_export_succeeds() {
        let state = MountState::new(PathBuf::from("/srv/export"), "/export".into());
        let handles = HandleService::new();
        let mut enc = Encoder::new();
        enc.string("/export");
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let reply = mnt(&mut dec, &state, &handles, addr()).await.unwrap();
        let mut rdec = Decoder::new(&reply);
        assert_eq!(rdec.u32().unwrap(), MountStat::Ok as u32);
    }

    #[tokio::test]
    async fn mnt_wrong_path_fails() {
        let state = MountState::new(PathBuf::from("/srv/export"), "/export".into());
        let handles = HandleService::new();
        let mut enc = Encoder::new();
        enc.string("/other");
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        let reply = mnt(&mut dec, &state, &handles, addr()).await.unwrap();
        let mut rdec = Decoder::new(&reply);
        assert_eq!(rdec.u32().unwrap(), MountStat::NoEnt as u32);
    }
}
