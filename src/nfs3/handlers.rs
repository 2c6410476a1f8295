//! The 22 NFSv3 procedure implementations and their `(program, procedure)`
//! dispatch table.

use super::*;
use crate::fsal::{CreateMode, Fsal, SpecialNode, WccData};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

type Node = PathBuf;

/// Looks a handle up to a live path, or writes a bare `NFS3ERR_STALE` result
/// and returns `None` so the caller can stop early.
fn resolve_or_stale(handles: &HandleService, handle: &Handle, enc: &mut Encoder) -> Option<PathBuf> {
    match handles.resolve(handle) {
        Some(p) => Some(p),
        None => {
            enc.u32(Stat::Stale as u32);
            None
        }
    }
}

pub async fn null(_dec: &mut Decoder<'_>) -> DecodeResult<Vec<u8>> {
    Ok(Vec::new())
}

pub async fn getattr<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.getattr(&path).await {
            Ok(attr) => {
                enc.u32(Stat::Ok as u32);
                encode_fattr3(&mut enc, attr);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn setattr<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let attr = decode_sattr3(dec)?;
    let guard = dec.option(decode_filetime)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.setattr(&path, attr, guard).await {
            Ok((before, after)) => {
                enc.u32(Stat::Ok as u32);
                encode_wcc_data(&mut enc, WccData::new(before, Some(after)));
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_wcc_data(&mut enc, WccData::default());
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn lookup<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        match fsal.lookup(&dir, &name).await {
            Ok(obj) => {
                let obj_attr = fsal.getattr(&obj).await.ok();
                let is_dir = matches!(obj_attr.map(|a| a.file_type), Some(fsal::FileType::Directory));
                let obj_handle = handles.handle_for(fsal.node_path(&obj), is_dir);
                let dir_attr = fsal.getattr(&dir).await.ok();
                enc.u32(Stat::Ok as u32);
                enc.opaque(obj_handle.as_bytes());
                encode_post_op_attr(&mut enc, obj_attr);
                encode_post_op_attr(&mut enc, dir_attr);
            }
            Err(e) => {
                let dir_attr = fsal.getattr(&dir).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, dir_attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn access<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let requested = dec.u32()?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.access(&path, requested).await {
            Ok((granted, attr)) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, Some(attr));
                enc.u32(granted);
            }
            Err(e) => {
                let attr = fsal.getattr(&path).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn readlink<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.readlink(&path).await {
            Ok((target, attr)) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, attr);
                enc.string(&target);
            }
            Err(e) => {
                let attr = fsal.getattr(&path).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn read<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let offset = dec.u64()?;
    let count = dec.u32()?.min(MAX_READ_WRITE);
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.read(&path, offset, count).await {
            Ok(outcome) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, outcome.attr);
                enc.u32(outcome.data.len() as u32);
                enc.bool(outcome.eof);
                enc.opaque(&outcome.data);
            }
            Err(e) => {
                let attr = fsal.getattr(&path).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

fn decode_write_mode(dec: &mut Decoder) -> DecodeResult<fsal::WriteMode> {
    match dec.discriminant()? {
        0 => Ok(fsal::WriteMode::Unstable),
        1 => Ok(fsal::WriteMode::DataSync),
        2 => Ok(fsal::WriteMode::FileSync),
        other => Err(crate::xdr::Error::BadDiscriminant(other)),
    }
}

fn encode_committed(enc: &mut Encoder, c: fsal::Committed) {
    enc.u32(match c {
        fsal::Committed::Unstable => 0,
        fsal::Committed::DataSync => 1,
        fsal::Committed::FileSync => 2,
    });
}

pub async fn write<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
    write_verifier: [u8; 8],
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let offset = dec.u64()?;
    let count = dec.u32_as_usize()?;
    let stable = decode_write_mode(dec)?;
    let data = dec.opaque(MAX_READ_WRITE as usize)?;
    let data = &data[..data.len().min(count)];
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.write(&path, offset, data, stable).await {
            Ok(outcome) => {
                enc.u32(Stat::Ok as u32);
                encode_wcc_data(&mut enc, WccData::new(outcome.before, outcome.after));
                enc.u32(outcome.count);
                encode_committed(&mut enc, outcome.committed);
                enc.fixed_opaque(&write_verifier);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_wcc_data(&mut enc, WccData::default());
            }
        }
    }
    Ok(enc.into_bytes())
}

fn decode_createhow3(dec: &mut Decoder) -> DecodeResult<CreateMode> {
    match dec.discriminant()? {
        0 => Ok(CreateMode::Unchecked(decode_sattr3(dec)?)),
        1 => Ok(CreateMode::Guarded(decode_sattr3(dec)?)),
        2 => Ok(CreateMode::Exclusive(dec.fixed_opaque::<8>()?)),
        other => Err(crate::xdr::Error::BadDiscriminant(other)),
    }
}

async fn encode_create_like<F: Fsal<Node = Node>>(
    enc: &mut Encoder,
    fsal: &F,
    handles: &HandleService,
    result: fsal::FsalResult<fsal::MutationOutcome<Node>>,
) {
    match result {
        Ok(outcome) => {
            let is_dir = matches!(outcome.attr.map(|a| a.file_type), Some(fsal::FileType::Directory));
            let handle = handles.handle_for(fsal.node_path(&outcome.node), is_dir);
            enc.u32(Stat::Ok as u32);
            encode_post_op_fh3(enc, Some(&handle));
            encode_post_op_attr(enc, outcome.attr);
            encode_wcc_data(enc, WccData::new(outcome.dir_before, outcome.dir_after));
        }
        Err(e) => {
            enc.u32(Stat::from(e) as u32);
            encode_wcc_data(enc, WccData::default());
        }
    }
}

pub async fn create<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let how = decode_createhow3(dec)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        if let CreateMode::Exclusive(verifier) = &how {
            let existed = fsal.lookup(&dir, &name).await.is_ok();
            let verifier_ok = handles.check_exclusive(&dir, name.as_bytes(), *verifier);
            if existed && !verifier_ok {
                let result: fsal::FsalResult<fsal::MutationOutcome<Node>> =
                    Err(fsal::Error::AlreadyExists);
                encode_create_like(&mut enc, fsal, handles, result).await;
                return Ok(enc.into_bytes());
            }
        }
        let result = fsal.create(&dir, &name, how).await;
        if result.is_ok() {
            handles.forget_exclusive(&dir, name.as_bytes());
        }
        encode_create_like(&mut enc, fsal, handles, result).await;
    }
    Ok(enc.into_bytes())
}

pub async fn mkdir<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let attr = decode_sattr3(dec)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        let result = fsal.mkdir(&dir, &name, attr).await;
        encode_create_like(&mut enc, fsal, handles, result).await;
    }
    Ok(enc.into_bytes())
}

pub async fn symlink<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let attr = decode_sattr3(dec)?;
    let target = dec.string(fsal::MAX_PATH_LEN)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        let result = fsal.symlink(&dir, &name, &target, attr).await;
        encode_create_like(&mut enc, fsal, handles, result).await;
    }
    Ok(enc.into_bytes())
}

fn decode_mknod_body(dec: &mut Decoder) -> DecodeResult<(SpecialNode, fsal::SetAttr)> {
    match dec.discriminant()? {
        3 => {
            let attr = decode_sattr3(dec)?;
            let major = dec.u32()?;
            let minor = dec.u32()?;
            Ok((SpecialNode::Block(fsal::DeviceId { major, minor }), attr))
        }
        4 => {
            let attr = decode_sattr3(dec)?;
            let major = dec.u32()?;
            let minor = dec.u32()?;
            Ok((SpecialNode::Character(fsal::DeviceId { major, minor }), attr))
        }
        6 => Ok((SpecialNode::Socket, decode_sattr3(dec)?)),
        7 => Ok((SpecialNode::Fifo, decode_sattr3(dec)?)),
        other => Err(crate::xdr::Error::BadDiscriminant(other)),
    }
}

pub async fn mknod<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let (special, attr) = decode_mknod_body(dec)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        let result = fsal.mknod(&dir, &name, special, attr).await;
        encode_create_like(&mut enc, fsal, handles, result).await;
    }
    Ok(enc.into_bytes())
}

pub async fn remove<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        match fsal.remove(&dir, &name).await {
            Ok((before, after)) => {
                handles.invalidate(&dir.join(&name));
                handles.forget_exclusive(&dir, name.as_bytes());
                enc.u32(Stat::Ok as u32);
                encode_wcc_data(&mut enc, WccData::new(before, after));
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_wcc_data(&mut enc, WccData::default());
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn rmdir<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        match fsal.rmdir(&dir, &name).await {
            Ok((before, after)) => {
                handles.invalidate(&dir.join(&name));
                enc.u32(Stat::Ok as u32);
                encode_wcc_data(&mut enc, WccData::new(before, after));
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_wcc_data(&mut enc, WccData::default());
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn rename<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let from_dir_handle = decode_handle(dec)?;
    let from_name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let to_dir_handle = decode_handle(dec)?;
    let to_name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let mut enc = Encoder::new();
    let from_dir = match handles.resolve(&from_dir_handle) {
        Some(p) => p,
        None => {
            enc.u32(Stat::Stale as u32);
            return Ok(enc.into_bytes());
        }
    };
    let to_dir = match handles.resolve(&to_dir_handle) {
        Some(p) => p,
        None => {
            enc.u32(Stat::Stale as u32);
            return Ok(enc.into_bytes());
        }
    };
    match fsal.rename(&from_dir, &from_name, &to_dir, &to_name).await {
        Ok((fb, fa, tb, ta)) => {
            handles.rebind(&from_dir.join(&from_name), &to_dir.join(&to_name));
            enc.u32(Stat::Ok as u32);
            encode_wcc_data(&mut enc, WccData::new(fb, fa));
            encode_wcc_data(&mut enc, WccData::new(tb, ta));
        }
        Err(e) => {
            enc.u32(Stat::from(e) as u32);
            encode_wcc_data(&mut enc, WccData::default());
            encode_wcc_data(&mut enc, WccData::default());
        }
    }
    Ok(enc.into_bytes())
}

pub async fn link<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let handle = decode_handle(dec)?;
    let dir_handle = decode_handle(dec)?;
    let name = decode_name(dec, fsal::MAX_NAME_LEN)?;
    let mut enc = Encoder::new();
    let node = match handles.resolve(&handle) {
        Some(p) => p,
        None => {
            enc.u32(Stat::Stale as u32);
            return Ok(enc.into_bytes());
        }
    };
    let dir = match handles.resolve(&dir_handle) {
        Some(p) => p,
        None => {
            enc.u32(Stat::Stale as u32);
            return Ok(enc.into_bytes());
        }
    };
    if !handles.is_directory(&dir_handle) {
        enc.u32(Stat::NotDir as u32);
        encode_post_op_attr(&mut enc, None);
        encode_wcc_data(&mut enc, WccData::default());
        return Ok(enc.into_bytes());
    }
    if handles.is_directory(&handle) {
        enc.u32(Stat::IsDir as u32);
        encode_post_op_attr(&mut enc, None);
        encode_wcc_data(&mut enc, WccData::default());
        return Ok(enc.into_bytes());
    }
    match fsal.link(&node, &dir, &name).await {
        Ok((attr, dir_before, dir_after)) => {
            enc.u32(Stat::Ok as u32);
            encode_post_op_attr(&mut enc, attr);
            encode_wcc_data(&mut enc, WccData::new(dir_before, dir_after));
        }
        Err(e) => {
            enc.u32(Stat::from(e) as u32);
            encode_post_op_attr(&mut enc, None);
            encode_wcc_data(&mut enc, WccData::default());
        }
    }
    Ok(enc.into_bytes())
}

pub async fn readdir<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let cookie = dec.u64()?;
    let cookie_verf = dec.fixed_opaque::<8>()?;
    let count = dec.u32_as_usize()?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        match fsal.readdir(&dir, cookie, cookie_verf, count, false).await {
            Ok(outcome) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, outcome.dir_attr);
                enc.fixed_opaque(&outcome.cookie_verifier);
                for entry in &outcome.entries {
                    enc.bool(true);
                    enc.u64(entry.fileid);
                    enc.opaque(entry.name.as_bytes());
                    enc.u64(entry.cookie);
                }
                enc.bool(false);
                enc.bool(outcome.eof);
            }
            Err(e) => {
                let attr = fsal.getattr(&dir).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn readdirplus<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let dir_handle = decode_handle(dec)?;
    let cookie = dec.u64()?;
    let cookie_verf = dec.fixed_opaque::<8>()?;
    let dircount = dec.u32_as_usize()?;
    let maxcount = dec.u32_as_usize()?;
    let mut enc = Encoder::new();
    if let Some(dir) = resolve_or_stale(handles, &dir_handle, &mut enc) {
        match fsal.readdir(&dir, cookie, cookie_verf, maxcount, true).await {
            Ok(mut outcome) => {
                // dircount bounds only the fileid+name+cookie portion of the
                // reply; maxcount (already applied by the FSAL) bounds the
                // whole reply including attributes and handles.
                let mut used = 0usize;
                let mut truncated = false;
                let mut kept = Vec::with_capacity(outcome.entries.len());
                for entry in outcome.entries.drain(..) {
                    let approx = 8 + 4 + entry.name.as_bytes().len() + 8;
                    if !kept.is_empty() && used + approx > dircount {
                        truncated = true;
                        break;
                    }
                    used += approx;
                    kept.push(entry);
                }
                outcome.entries = kept;
                if truncated {
                    outcome.eof = false;
                }
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, outcome.dir_attr);
                enc.fixed_opaque(&outcome.cookie_verifier);
                for entry in &outcome.entries {
                    enc.bool(true);
                    enc.u64(entry.fileid);
                    enc.opaque(entry.name.as_bytes());
                    enc.u64(entry.cookie);
                    encode_post_op_attr(&mut enc, entry.attr);
                    let child_handle = handles.handle_for(&dir.join(&entry.name), entry.is_dir);
                    encode_post_op_fh3(&mut enc, Some(&child_handle));
                }
                enc.bool(false);
                enc.bool(outcome.eof);
            }
            Err(e) => {
                let attr = fsal.getattr(&dir).await.ok();
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn fsstat<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        let attr = fsal.getattr(&path).await.ok();
        match fsal.statfs(&path).await {
            Ok(stat) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, attr);
                enc.u64(stat.total_bytes);
                enc.u64(stat.free_bytes);
                enc.u64(stat.avail_bytes);
                enc.u64(stat.total_files);
                enc.u64(stat.free_files);
                enc.u64(stat.avail_files);
                enc.u32(stat.invarsec);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn fsinfo<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        let attr = fsal.getattr(&path).await.ok();
        match fsal.fsinfo(&path).await {
            Ok(info) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, attr);
                enc.u32(info.rtmax);
                enc.u32(info.rtpref);
                enc.u32(info.rtmult);
                enc.u32(info.wtmax);
                enc.u32(info.wtpref);
                enc.u32(info.wtmult);
                enc.u32(info.dtpref);
                enc.u64(info.max_filesize);
                encode_filetime(&mut enc, info.time_delta);
                enc.u32(info.properties);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn pathconf<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        let attr = fsal.getattr(&path).await.ok();
        match fsal.pathconf(&path).await {
            Ok(conf) => {
                enc.u32(Stat::Ok as u32);
                encode_post_op_attr(&mut enc, attr);
                enc.u32(conf.link_max);
                enc.u32(conf.name_max);
                enc.bool(conf.no_trunc);
                enc.bool(conf.chown_restricted);
                enc.bool(conf.case_insensitive);
                enc.bool(conf.case_preserving);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_post_op_attr(&mut enc, attr);
            }
        }
    }
    Ok(enc.into_bytes())
}

pub async fn commit<F: Fsal<Node = Node>>(
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
    write_verifier: [u8; 8],
) -> DecodeResult<Vec<u8>> {
    let h = decode_handle(dec)?;
    let offset = dec.u64()?;
    let count = dec.u32()?;
    let mut enc = Encoder::new();
    if let Some(path) = resolve_or_stale(handles, &h, &mut enc) {
        match fsal.commit(&path, offset, count).await {
            Ok((before, after)) => {
                enc.u32(Stat::Ok as u32);
                encode_wcc_data(&mut enc, WccData::new(before, after));
                enc.fixed_opaque(&write_verifier);
            }
            Err(e) => {
                enc.u32(Stat::from(e) as u32);
                encode_wcc_data(&mut enc, WccData::default());
            }
        }
    }
    Ok(enc.into_bytes())
}

/// Routes a decoded NFSv3 procedure number to its handler. `Ok(None)` means
/// the procedure number is out of range (`PROC_UNAVAIL`); `Ok(Some(body))` is
/// a complete success-reply body; `Err` signals a malformed argument stream
/// (`GARBAGE_ARGS`).
pub async fn dispatch<F: Fsal<Node = Node>>(
    procedure: u32,
    dec: &mut Decoder<'_>,
    fsal: &F,
    handles: &HandleService,
    write_verifier: [u8; 8],
) -> DecodeResult<Option<Vec<u8>>> {
    let body = match procedure {
        NULL => null(dec).await?,
        GETATTR => getattr(dec, fsal, handles).await?,
        SETATTR => setattr(dec, fsal, handles).await?,
        LOOKUP => lookup(dec, fsal, handles).await?,
        ACCESS => access(dec, fsal, handles).await?,
        READLINK => readlink(dec, fsal, handles).await?,
        READ => read(dec, fsal, handles).await?,
        WRITE => write(dec, fsal, handles, write_verifier).await?,
        CREATE => create(dec, fsal, handles).await?,
        MKDIR => mkdir(dec, fsal, handles).await?,
        SYMLINK => symlink(dec, fsal, handles).await?,
        MKNOD => mknod(dec, fsal, handles).await?,
        REMOVE => remove(dec, fsal, handles).await?,
        RMDIR => rmdir(dec, fsal, handles).await?,
        RENAME => rename(dec, fsal, handles).await?,
        LINK => link(dec, fsal, handles).await?,
        READDIR => readdir(dec, fsal, handles).await?,
        READDIRPLUS => readdirplus(dec, fsal, handles).await?,
        FSSTAT => fsstat(dec, fsal, handles).await?,
        FSINFO => fsinfo(dec, fsal, handles).await?,
        PATHCONF => pathconf(dec, fsal, handles).await?,
        COMMIT => commit(dec, fsal, handles, write_verifier).await?,
        _ => return Ok(None),
    };
    Ok(Some(body))
}
