//! The File System Abstraction Layer contract: the narrow interface the
//! NFSv3/MOUNT handlers call into. Grounded on the teacher's `Vfs` trait
//! (`examples/RMamonts-nfs-mamont/src/vfs.rs`), renamed and reshaped to this
//! crate's error/result vocabulary (see `SPEC_FULL.md` §6).

pub mod local;

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_PATH_LEN: usize = 1024;

pub type FsalResult<T> = Result<T, Error>;

/// The FSAL-side error vocabulary; handlers translate these into `nfsstat3`
/// per the fixed table in `SPEC_FULL.md` §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    IsDirectory,
    NotDirectory,
    InvalidArgument,
    NoSpace,
    ReadOnly,
    NotEmpty,
    NameTooLong,
    Io,
    NotSupported,
    ServerFault,
    /// SETATTR's compare-and-swap guard didn't match the object's current ctime.
    NotSync,
    /// A READDIR cookie was presented against a directory whose contents
    /// changed since the cookie verifier was issued.
    BadCookie,
    /// A READDIR/READDIRPLUS page's byte budget is too small to hold even a
    /// single directory entry.
    TooSmall,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound,
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists,
            _ => match e.raw_os_error() {
                Some(libc_enotdir) if libc_enotdir == 20 => Error::NotDirectory,
                Some(libc_eisdir) if libc_eisdir == 21 => Error::IsDirectory,
                Some(libc_enotempty) if libc_enotempty == 39 => Error::NotEmpty,
                Some(libc_enospc) if libc_enospc == 28 => Error::NoSpace,
                Some(libc_erofs) if libc_erofs == 30 => Error::ReadOnly,
                _ => Error::Io,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    BlockDevice,
    CharDevice,
    Symlink,
    Socket,
    Fifo,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileTime {
    pub seconds: u32,
    pub nseconds: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

/// Mirrors the wire `fattr3` record field-for-field (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy)]
pub struct FileAttr {
    pub file_type: FileType,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub rdev: DeviceId,
    pub fsid: u64,
    pub fileid: u64,
    pub atime: FileTime,
    pub mtime: FileTime,
    pub ctime: FileTime,
}

/// The pre-operation snapshot used for `wcc_attr`.
#[derive(Debug, Clone, Copy)]
pub struct AttrDigest {
    pub size: u64,
    pub mtime: FileTime,
    pub ctime: FileTime,
}

impl From<FileAttr> for AttrDigest {
    fn from(a: FileAttr) -> Self {
        AttrDigest { size: a.size, mtime: a.mtime, ctime: a.ctime }
    }
}

/// Weak cache consistency data returned by every mutating procedure.
#[derive(Debug, Clone, Copy, Default)]
pub struct WccData {
    pub before: Option<AttrDigest>,
    pub after: Option<FileAttr>,
}

impl WccData {
    pub fn new(before: Option<FileAttr>, after: Option<FileAttr>) -> Self {
        WccData { before: before.map(AttrDigest::from), after }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SetTime {
    DontChange,
    ServerTime,
    ClientTime(FileTime),
}

#[derive(Debug, Clone, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
}

/// Optional compare-and-swap guard for SETATTR (`sattrguard3`).
pub type SetAttrGuard = Option<FileTime>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Unstable,
    DataSync,
    FileSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    Unstable,
    DataSync,
    FileSync,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub count: u32,
    pub committed: Committed,
    pub before: Option<FileAttr>,
    pub after: Option<FileAttr>,
}

#[derive(Debug)]
pub struct ReadOutcome {
    pub data: Vec<u8>,
    pub eof: bool,
    pub attr: Option<FileAttr>,
}

#[derive(Debug, Clone)]
pub enum CreateMode {
    Unchecked(SetAttr),
    Guarded(SetAttr),
    Exclusive([u8; 8]),
}

#[derive(Debug)]
pub struct MutationOutcome<T> {
    pub node: T,
    pub attr: Option<FileAttr>,
    pub dir_before: Option<FileAttr>,
    pub dir_after: Option<FileAttr>,
}

#[derive(Debug, Clone, Copy)]
pub enum SpecialNode {
    Block(DeviceId),
    Character(DeviceId),
    Socket,
    Fifo,
}

#[derive(Debug)]
pub struct DirEntry {
    pub fileid: u64,
    pub name: std::ffi::OsString,
    pub cookie: u64,
    pub attr: Option<FileAttr>,
    pub is_dir: bool,
}

#[derive(Debug)]
pub struct ReadDirOutcome {
    pub entries: Vec<DirEntry>,
    pub eof: bool,
    pub cookie_verifier: [u8; 8],
    pub dir_attr: Option<FileAttr>,
}

#[derive(Debug, Clone, Copy)]
pub struct FsStat {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub avail_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
    pub avail_files: u64,
    pub invarsec: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    pub rtmax: u32,
    pub rtpref: u32,
    pub rtmult: u32,
    pub wtmax: u32,
    pub wtpref: u32,
    pub wtmult: u32,
    pub dtpref: u32,
    pub max_filesize: u64,
    pub time_delta: FileTime,
    pub properties: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PathConf {
    pub link_max: u32,
    pub name_max: u32,
    pub no_trunc: bool,
    pub chown_restricted: bool,
    pub case_insensitive: bool,
    pub case_preserving: bool,
}

/// A handle to an object the FSAL knows about, opaque to callers above this
/// layer beyond equality and use as a lookup key. The reference implementation
/// in [`local`] identifies objects by their canonical host path.
pub trait FsalNode: Clone + Send + Sync {}
impl<T: Clone + Send + Sync> FsalNode for T {}

/// The FSAL contract. `Node` is whatever the implementation uses to identify
/// a filesystem object internally (the reference implementation in
/// [`local::LocalFsal`] uses `std::path::PathBuf`).
#[async_trait]
pub trait Fsal: Send + Sync {
    type Node: FsalNode + std::fmt::Debug;

    fn root(&self) -> Self::Node;

    async fn lookup(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<Self::Node>;
    async fn getattr(&self, node: &Self::Node) -> FsalResult<FileAttr>;
    async fn setattr(
        &self,
        node: &Self::Node,
        attr: SetAttr,
        guard: SetAttrGuard,
    ) -> FsalResult<(Option<FileAttr>, FileAttr)>;

    async fn access(&self, node: &Self::Node, requested: u32) -> FsalResult<(u32, FileAttr)>;
    async fn readlink(&self, node: &Self::Node) -> FsalResult<(String, Option<FileAttr>)>;
    async fn read(&self, node: &Self::Node, offset: u64, count: u32) -> FsalResult<ReadOutcome>;
    async fn write(
        &self,
        node: &Self::Node,
        offset: u64,
        data: &[u8],
        mode: WriteMode,
    ) -> FsalResult<WriteOutcome>;

    async fn create(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        how: CreateMode,
    ) -> FsalResult<MutationOutcome<Self::Node>>;
    async fn mkdir(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>>;
    async fn symlink(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        target: &str,
        attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>>;
    async fn mknod(
        &self,
        dir: &Self::Node,
        name: &OsStr,
        special: SpecialNode,
        attr: SetAttr,
    ) -> FsalResult<MutationOutcome<Self::Node>>;

    async fn remove(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)>;
    async fn rmdir(&self, dir: &Self::Node, name: &OsStr) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)>;
    async fn rename(
        &self,
        from_dir: &Self::Node,
        from_name: &OsStr,
        to_dir: &Self::Node,
        to_name: &OsStr,
    ) -> FsalResult<(
        Option<FileAttr>,
        Option<FileAttr>,
        Option<FileAttr>,
        Option<FileAttr>,
    )>;
    async fn link(
        &self,
        node: &Self::Node,
        dir: &Self::Node,
        name: &OsStr,
    ) -> FsalResult<(Option<FileAttr>, Option<FileAttr>, Option<FileAttr>)>;

    async fn readdir(
        &self,
        dir: &Self::Node,
        cookie: u64,
        cookie_verifier: [u8; 8],
        max_entries_bytes: usize,
        plus: bool,
    ) -> FsalResult<ReadDirOutcome>;

    async fn statfs(&self, node: &Self::Node) -> FsalResult<FsStat>;
    async fn fsinfo(&self, node: &Self::Node) -> FsalResult<FsInfo>;
    async fn pathconf(&self, node: &Self::Node) -> FsalResult<PathConf>;
    async fn commit(&self, node: &Self::Node, offset: u64, count: u32) -> FsalResult<(Option<FileAttr>, Option<FileAttr>)>;

    /// A stable path-like rendering of `node`, used by the File Handle
    /// Service to mint/resolve opaque handles.
    fn node_path<'a>(&self, node: &'a Self::Node) -> &'a Path;
}

/// Validates a single path component. Per the wire protocol's "8-bit clean"
/// contract, the bytes themselves are never required to be valid UTF-8 here —
/// only the two structurally significant bytes (`NUL` and `/`) and the two
/// reserved names are rejected.
pub fn validate_name(name: &OsStr) -> FsalResult<()> {
    use std::os::unix::ffi::OsStrExt;
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong);
    }
    if bytes.contains(&b'/') || bytes.contains(&0u8) || bytes == b"." || bytes == b".." {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}
