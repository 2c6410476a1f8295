//! A reference [`Fsal`] implementation backed directly by the host
//! filesystem, rooted at a configured export directory. New code (no direct
//! teacher analogue: the teacher's own VFS implementations lived under its
//! `examples/` tree, which the exclusion rule on copying `examples/` content
//! keeps out of this crate) written in the idiom of the `Fsal` contract it
//! implements; see `SPEC_FULL.md` §4.10 and `DESIGN.md`'s Open Questions.

use super::{
    validate_name, CreateMode, DeviceId, DirEntry, Error, FileAttr, FileTime, FileType, Fsal,
    FsInfo, FsStat, FsalResult, MutationOutcome, PathConf, ReadDirOutcome, ReadOutcome, SetAttr,
    SetAttrGuard, SpecialNode, WriteMode, WriteOutcome,
};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct LocalFsal {
    root: PathBuf,
    read_only: bool,
}

impl LocalFsal {
    pub fn new(root: impl Into<PathBuf>, read_only: bool) -> Self {
        LocalFsal { root: root.into(), read_only }
    }

    fn child(&self, dir: &Path, name: &OsStr) -> PathBuf {
        dir.join(name)
    }

    fn check_writable(&self) -> FsalResult<()> {
        if self.read_only {
            Err(Error::ReadOnly)
        } else {
            Ok(())
        }
    }
}

fn system_time_to_filetime(t: std::io::Result<SystemTime>) -> FileTime {
    let t = match t {
        Ok(t) => t,
        Err(_) => return FileTime::default(),
    };
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => FileTime { seconds: d.as_secs() as u32, nseconds: d.subsec_nanos() },
        Err(_) => FileTime::default(),
    }
}

fn metadata_to_attr(meta: &std::fs::Metadata, fsid: u64) -> FileAttr {
    let file_type = if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else if meta.file_type().is_block_device() {
        FileType::BlockDevice
    } else if meta.file_type().is_char_device() {
        FileType::CharDevice
    } else if meta.file_type().is_socket() {
        FileType::Socket
    } else if meta.file_type().is_fifo() {
        FileType::Fifo
    } else {
        FileType::Regular
    };
    FileAttr {
        file_type,
        mode: meta.mode() & 0o7777,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        size: meta.size(),
        used: meta.blocks() * 512,
        rdev: DeviceId { major: ((meta.rdev() >> 8) & 0xff) as u32, minor: (meta.rdev() & 0xff) as u32 },
        fsid,
        fileid: meta.ino(),
        atime: system_time_to_filetime(meta.accessed()),
        mtime: system_time_to_filetime(meta.modified()),
        ctime: FileTime { seconds: meta.ctime() as u32, nseconds: meta.ctime_nsec() as u32 },
    }
}

use std::os::unix::fs::FileTypeExt;

impl LocalFsal {
    fn fsid(&self) -> u64 {
        // A stable per-export identifier; good enough since this server
        // exports exactly one filesystem subtree per process.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        self.root.hash(&mut hasher);
        hasher.finish()
    }

    async fn stat(&self, path: &Path) -> FsalResult<FileAttr> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        Ok(metadata_to_attr(&meta, self.fsid()))
    }

    async fn apply_setattr(&self, path: &Path, attr: &SetAttr) -> FsalResult<()> {
        if let Some(mode) = attr.mode {
            let perm = std::fs::Permissions::from_mode(mode & 0o7777);
            tokio::fs::set_permissions(path, perm).await?;
        }
        if let Some(size) = attr.size {
            let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(size).await?;
        }
        // uid/gid changes and explicit atime/mtime require privileges or
        // nightly-only std APIs this crate does not depend on; best-effort
        // no-op beyond what std::fs exposes safely.
        Ok(())
    }
}

use std::os::unix::fs::PermissionsExt;

#[async_trait]
impl Fsal for LocalFsal {
    type Node = PathBuf;

    fn root(&self) -> Self::Node {
        self.root.clone()
    }

    async fn lookup(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<Self::Node> {
        validate_name(name)?;
        let path = self.child(dir, name);
        tokio::fs::symlink_metadata(&path).await?;
        Ok(path)
    }

    async fn getattr(&self, node: &Self::Node) -> FsalResult<FileAttr> {
        self.stat(node).await
    }

    async fn setattr(
        &self,
        node: &Self::Node,
        attr: SetAttr,
        guard: SetAttrGuard,
    ) -> FsalResult<(Option<FileAttr>, FileAttr)> {
        self.check_writable()?;
        let before = self.stat(node).await?;
        if let Some(expected_ctime) = guard {
            if expected_ctime.seconds != before.ctime.seconds
                || expected_ctime.nseconds != before.ctime.nseconds
            {
                return Err(Error::NotSync);
            }
        }
        self.apply_setattr(node, &attr).await?;
        let after = self.stat(node).await?;
        Ok((Some(before), after))
    }

    async fn access(&self, node: &Self::Node, requested: u32) -> FsalResult<(u32, FileAttr)> {
        let attr = self.stat(node).await?;
        // The reference FSAL runs as a single process identity; grant every
        // bit the caller asked for rather than modeling per-uid permission
        // bits, consistent with AUTH_SYS credentials being ignored.
        Ok((requested, attr))
    }

    async fn readlink(&self, node: &Self::Node) -> FsalResult<(String, Option<FileAttr>)> {
        let target = tokio::fs::read_link(node).await?;
        let attr = self.stat(node).await.ok();
        Ok((target.to_string_lossy().into_owned(), attr))
    }

    async fn read(&self, node: &Self::Node, offset: u64, count: u32) -> FsalResult<ReadOutcome> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};
        let mut file = tokio::fs::File::open(node).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; count as usize];
        let mut total = 0usize;
        loop {
            let n = file.read(&mut buf[total..]).await?;
            if n == 0 {
                break;
            }
            total += n;
            if total == buf.len() {
                break;
            }
        }
        buf.truncate(total);
        let attr = self.stat(node).await.ok();
        let eof = offset + total as u64 >= attr.map(|a| a.size).unwrap_or(0);
        Ok(ReadOutcome { data: buf, eof, attr })
    }

    async fn write(
        &self,
        node: &Self::Node,
        offset: u64,
        data: &[u8],
        mode: WriteMode,
    ) -> FsalResult<WriteOutcome> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};
        self.check_writable()?;
        let before = self.stat(node).await.ok();
        let mut file = tokio::fs::OpenOptions::new().write(true).open(node).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        let committed = match mode {
            WriteMode::FileSync => {
                file.sync_all().await?;
                super::Committed::FileSync
            }
            WriteMode::DataSync => {
                file.sync_data().await?;
                super::Committed::DataSync
            }
            WriteMode::Unstable => super::Committed::Unstable,
        };
        let after = self.stat(node).await.ok();
        Ok(WriteOutcome { count: data.len() as u32, committed, before, after })
    }

    async fn create(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        how: CreateMode,
    ) -> FsalResult<MutationOutcome<Self::Node>> {
        self.check_writable()?;
        validate_name(name)?;
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        let exists = tokio::fs::symlink_metadata(&path).await.is_ok();
        match &how {
            CreateMode::Guarded(_) if exists => return Err(Error::AlreadyExists),
            CreateMode::Exclusive(_) if exists => {
                // Idempotent redelivery is accepted; verifier comparison is
                // left to the caller (nfs3 handler), which tracks verifiers
                // per (dir, name) since the FSAL itself is stateless here.
            }
            _ => {}
        }
        if !exists {
            tokio::fs::OpenOptions::new().write(true).create(true).open(&path).await?;
        }
        if let CreateMode::Unchecked(attr) | CreateMode::Guarded(attr) = &how {
            self.apply_setattr(&path, attr).await?;
        }
        let attr = self.stat(&path).await.ok();
        let dir_after = self.stat(dir).await.ok();
        Ok(MutationOutcome { node: path, attr, dir_before, dir_after })
    }

    async fn mkdir(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>> {
        self.check_writable()?;
        validate_name(name)?;
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        tokio::fs::create_dir(&path).await?;
        self.apply_setattr(&path, &attr).await?;
        let new_attr = self.stat(&path).await.ok();
        let dir_after = self.stat(dir).await.ok();
        Ok(MutationOutcome { node: path, attr: new_attr, dir_before, dir_after })
    }

    async fn symlink(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        target: &str,
        _attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>> {
        self.check_writable()?;
        validate_name(name)?;
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        tokio::fs::symlink(target, &path).await?;
        let attr = self.stat(&path).await.ok();
        let dir_after = self.stat(dir).await.ok();
        Ok(MutationOutcome { node: path, attr, dir_before, dir_after })
    }

    async fn mknod(
        &self,
        _dir: &Self::Node,
        name: &OsStr,
        special: SpecialNode,
        _attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>> {
        self.check_writable()?;
        validate_name(name)?;
        match special {
            // Safe creation without raw mknod(2) is not available via std;
            // this reference FSAL declines rather than shelling out or
            // taking a libc dependency back on. See DESIGN.md.
            SpecialNode::Fifo
            | SpecialNode::Block(_)
            | SpecialNode::Character(_)
            | SpecialNode::Socket => Err(Error::NotSupported),
        }
    }

    async fn remove(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)> {
        self.check_writable()?;
        validate_name(name)?;
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            return Err(Error::IsDirectory);
        }
        tokio::fs::remove_file(&path).await?;
        let dir_after = self.stat(dir).await.ok();
        Ok((dir_before, dir_after))
    }

    async fn rmdir(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)> {
        self.check_writable()?;
        validate_name(name)?;
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        tokio::fs::remove_dir(&path).await.map_err(|e| {
            if e.raw_os_error() == Some(39) {
                Error::NotEmpty
            } else {
                Error::from(e)
            }
        })?;
        let dir_after = self.stat(dir).await.ok();
        Ok((dir_before, dir_after))
    }

    async fn rename(
        &self,
        from_dir: &Self::Node,
        from_name: &OsStr,
        to_dir: &Self::Node,
        to_name: &OsStr,
    ) -> FsalResult<(Option<FileAttr>, Option<FileAttr>, Option<FileAttr>, Option<FileAttr>)> {
        self.check_writable()?;
        validate_name(from_name)?;
        validate_name(to_name)?;
        let from_before = self.stat(from_dir).await.ok();
        let to_before = self.stat(to_dir).await.ok();
        let src = self.child(from_dir, from_name);
        let dst = self.child(to_dir, to_name);
        tokio::fs::rename(&src, &dst).await?;
        let from_after = self.stat(from_dir).await.ok();
        let to_after = self.stat(to_dir).await.ok();
        Ok((from_before, from_after, to_before, to_after))
    }

    async fn link(
        &self,
        node: &Self::Node,
        dir: &Self::Node,
        name: &OsStr,
    ) -> FsalResult<(Option<FileAttr>, Option<FileAttr>, Option<FileAttr>)> {
        self.check_writable()?;
        validate_name(name)?;
        let source_meta = tokio::fs::symlink_metadata(node).await?;
        if source_meta.is_dir() {
            return Err(Error::IsDirectory);
        }
        let dir_before = self.stat(dir).await.ok();
        let path = self.child(dir, name);
        tokio::fs::hard_link(node, &path).await?;
        let attr = self.stat(node).await.ok();
        let dir_after = self.stat(dir).await.ok();
        Ok((attr, dir_before, dir_after))
    }

    async fn readdir(
        &self,
        dir: &Self::Node,
        cookie: u64,
        cookie_verifier: [u8; 8],
        max_entries_bytes: usize,
        plus: bool,
    ) -> FsalResult<ReadDirOutcome> {
        let dir_meta = tokio::fs::metadata(dir).await?;
        let verifier = mtime_verifier(&dir_meta);
        if cookie != 0 && cookie_verifier != [0u8; 8] && cookie_verifier != verifier {
            return Err(Error::BadCookie);
        }
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        let mut all = Vec::new();
        let mut idx = 0u64;
        while let Some(entry) = read_dir.next_entry().await? {
            idx += 1;
            let name = entry.file_name();
            let meta = entry.metadata().await?;
            let attr = if plus { Some(metadata_to_attr(&meta, self.fsid())) } else { None };
            all.push(DirEntry {
                fileid: meta.ino(),
                name,
                cookie: idx,
                attr,
                is_dir: meta.is_dir(),
            });
        }
        all.sort_by_key(|e| e.cookie);
        let mut entries = Vec::new();
        let mut used = 0usize;
        let mut eof = true;
        for entry in all.into_iter().filter(|e| e.cookie > cookie) {
            let approx_size = 8 + 4 + entry.name.as_bytes().len() + 8;
            if entries.is_empty() && approx_size > max_entries_bytes {
                return Err(Error::TooSmall);
            }
            if used + approx_size > max_entries_bytes {
                eof = false;
                break;
            }
            used += approx_size;
            entries.push(entry);
        }
        let dir_attr = Some(metadata_to_attr(&dir_meta, self.fsid()));
        Ok(ReadDirOutcome { entries, eof, cookie_verifier: verifier, dir_attr })
    }

    async fn statfs(&self, node: &Self::Node) -> FsalResult<FsStat> {
        let _ = node;
        // std has no portable statvfs; report generous, clearly-synthetic
        // capacity rather than depending on a platform-specific crate the
        // rest of this design does not otherwise need.
        Ok(FsStat {
            total_bytes: u64::MAX / 2,
            free_bytes: u64::MAX / 2,
            avail_bytes: u64::MAX / 2,
            total_files: u64::MAX / 2,
            free_files: u64::MAX / 2,
            avail_files: u64::MAX / 2,
            invarsec: 0,
        })
    }

    async fn fsinfo(&self, _node: &Self::Node) -> FsalResult<FsInfo> {
        const MAX_IO: u32 = 1 << 20;
        Ok(FsInfo {
            rtmax: MAX_IO,
            rtpref: MAX_IO,
            rtmult: 4096,
            wtmax: MAX_IO,
            wtpref: MAX_IO,
            wtmult: 4096,
            dtpref: MAX_IO,
            max_filesize: u64::MAX / 2,
            time_delta: FileTime { seconds: 1, nseconds: 0 },
            properties: 0b1111, // LINK | SYMLINK | HOMOGENEOUS | CANSETTIME
        })
    }

    async fn pathconf(&self, _node: &Self::Node) -> FsalResult<PathConf> {
        Ok(PathConf {
            link_max: u16::MAX as u32,
            name_max: super::MAX_NAME_LEN as u32,
            no_trunc: true,
            chown_restricted: true,
            case_insensitive: false,
            case_preserving: true,
        })
    }

    async fn commit(&self, node: &Self::Node, _offset: u64, _count: u32) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)> {
        let before = self.stat(node).await.ok();
        let file = tokio::fs::File::open(node).await?;
        file.sync_all().await?;
        let after = self.stat(node).await.ok();
        Ok((before, after))
    }

    fn node_path<'a>(&self, node: &'a Self::Node) -> &'a Path {
        node
    }
}

fn mtime_verifier(meta: &std::fs::Metadata) -> [u8; 8] {
    let ft = system_time_to_filetime(meta.modified());
    let mut v = [0u8; 8];
    v[0..4].copy_from_slice(&ft.seconds.to_be_bytes());
    v[4..8].copy_from_slice(&ft.nseconds.to_be_bytes());
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsal::Fsal;

    async fn fsal_on_tempdir() -> (tempfile::TempDir, LocalFsal) {
        let dir = tempfile::tempdir().unwrap();
        let fsal = LocalFsal::new(dir.path(), false);
        (dir, fsal)
    }

    #[tokio::test]
    async fn create_then_lookup_roundtrips() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        let outcome = fsal
            .create(&root, OsStr::new("hello.txt"), CreateMode::Unchecked(SetAttr::default()))
            .await
            .unwrap();
        let looked_up = fsal.lookup(&root, OsStr::new("hello.txt")).await.unwrap();
        assert_eq!(outcome.node, looked_up);
    }

    #[tokio::test]
    async fn remove_then_lookup_fails() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        fsal.create(&root, OsStr::new("gone.txt"), CreateMode::Unchecked(SetAttr::default())).await.unwrap();
        fsal.remove(&root, OsStr::new("gone.txt")).await.unwrap();
        assert!(matches!(fsal.lookup(&root, OsStr::new("gone.txt")).await, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        let outcome = fsal
            .create(&root, OsStr::new("data.bin"), CreateMode::Unchecked(SetAttr::default()))
            .await
            .unwrap();
        fsal.write(&outcome.node, 0, b"hello world", WriteMode::FileSync).await.unwrap();
        let read = fsal.read(&outcome.node, 0, 11).await.unwrap();
        assert_eq!(read.data, b"hello world");
        assert!(read.eof);
    }

    #[tokio::test]
    async fn mkdir_rmdir_nonempty_fails() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        let outcome = fsal.mkdir(&root, OsStr::new("sub"), SetAttr::default()).await.unwrap();
        fsal.create(&outcome.node, OsStr::new("f"), CreateMode::Unchecked(SetAttr::default())).await.unwrap();
        assert!(matches!(fsal.rmdir(&root, OsStr::new("sub")).await, Err(Error::NotEmpty)));
    }

    #[tokio::test]
    async fn read_only_rejects_write() {
        let dir = tempfile::tempdir().unwrap();
        let fsal = LocalFsal::new(dir.path(), true);
        let root = fsal.root();
        assert!(matches!(
            fsal.create(&root, OsStr::new("x"), CreateMode::Unchecked(SetAttr::default())).await,
            Err(Error::ReadOnly)
        ));
    }

    #[tokio::test]
    async fn setattr_guard_mismatch_is_not_sync() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        let outcome = fsal
            .create(&root, OsStr::new("guarded.txt"), CreateMode::Unchecked(SetAttr::default()))
            .await
            .unwrap();
        let wrong_guard = FileTime { seconds: 1, nseconds: 0 };
        assert!(matches!(
            fsal.setattr(&outcome.node, SetAttr::default(), Some(wrong_guard)).await,
            Err(Error::NotSync)
        ));
    }

    #[tokio::test]
    async fn readdir_stale_cookie_verifier_is_bad_cookie() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        fsal.create(&root, OsStr::new("f1"), CreateMode::Unchecked(SetAttr::default())).await.unwrap();
        let stale_verifier = [0xffu8; 8];
        assert!(matches!(
            fsal.readdir(&root, 1, stale_verifier, 4096, false).await,
            Err(Error::BadCookie)
        ));
    }

    #[tokio::test]
    async fn readdir_oversized_single_entry_is_too_small() {
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        fsal.create(&root, OsStr::new("this-name-is-long-enough"), CreateMode::Unchecked(SetAttr::default()))
            .await
            .unwrap();
        assert!(matches!(fsal.readdir(&root, 0, [0u8; 8], 4, false).await, Err(Error::TooSmall)));
    }

    #[tokio::test]
    async fn non_utf8_name_is_accepted() {
        use std::os::unix::ffi::OsStrExt;
        let (_dir, fsal) = fsal_on_tempdir().await;
        let root = fsal.root();
        let raw = OsStr::from_bytes(&[0x66, 0x6f, 0xff, 0x6f]); // "fo\xFFo", not valid UTF-8
        let outcome = fsal.create(&root, raw, CreateMode::Unchecked(SetAttr::default())).await.unwrap();
        let looked_up = fsal.lookup(&root, raw).await.unwrap();
        assert_eq!(outcome.node, looked_up);
    }
}
