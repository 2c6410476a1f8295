//! In-process client/server round-trip tests standing in for the real-client
//! integration coverage out of scope per `SPEC_FULL.md` (a real NFSv3 client
//! handshake). Each test drives the wire protocol with raw bytes the same
//! way `examples/original_source/tests/test_rpc_null.py` and
//! `test_nfs_create.py` do, confirming this crate's byte-for-byte framing.

use nfs_mamont::dispatcher::Dispatcher;
use nfs_mamont::fresh_write_verifier;
use nfs_mamont::fsal::local::LocalFsal;
use nfs_mamont::handle::HandleService;
use nfs_mamont::mount::MountState;
use nfs_mamont::rpc;
use nfs_mamont::xdr::{Decoder, Encoder};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server() -> (std::net::SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let fsal = LocalFsal::new(dir.path().to_path_buf(), false);
    let handles = HandleService::new();
    let mount = MountState::new(dir.path().to_path_buf(), dir.path().to_string_lossy().into_owned());
    let dispatcher = Dispatcher::new(fsal, handles, mount, fresh_write_verifier());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let server = nfs_mamont::server::Server::new(dispatcher, Duration::from_secs(5), 1 << 20);
        let _ = server.serve(listener).await;
    });
    (addr, dir)
}

fn encode_call(xid: u32, program: u32, version: u32, procedure: u32, args: &[u8]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(0); // CALL
    enc.u32(rpc::RPC_VERSION);
    enc.u32(program);
    enc.u32(version);
    enc.u32(procedure);
    enc.u32(rpc::AuthFlavor::AuthNone as u32);
    enc.opaque(&[]);
    enc.u32(rpc::AuthFlavor::AuthNone as u32);
    enc.opaque(&[]);
    enc.raw(args);
    enc.into_bytes()
}

async fn send_call(stream: &mut TcpStream, call: &[u8]) -> Vec<u8> {
    let header = 0x8000_0000u32 | call.len() as u32;
    stream.write_u32(header).await.unwrap();
    stream.write_all(call).await.unwrap();
    let reply_header = stream.read_u32().await.unwrap();
    let len = (reply_header & 0x7FFF_FFFF) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

fn skip_rpc_envelope(dec: &mut Decoder) -> u32 {
    dec.u32().unwrap(); // xid
    dec.u32().unwrap(); // msg_type = REPLY
    dec.u32().unwrap(); // reply_stat = MSG_ACCEPTED
    dec.u32().unwrap(); // verf flavor
    dec.opaque(16).unwrap(); // verf body
    dec.u32().unwrap() // accept_stat
}

#[tokio::test]
async fn rpc_null_succeeds() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let call = encode_call(12345, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::NULL, &[]);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    let accept_stat = skip_rpc_envelope(&mut dec);
    assert_eq!(accept_stat, 0);
}

#[tokio::test]
async fn mount_then_create_then_lookup() {
    let (addr, dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let export_path = dir.path().to_string_lossy().into_owned();

    let mut mount_args = Encoder::new();
    mount_args.string(&export_path);
    let mount_call = encode_call(1, rpc::PROGRAM_MOUNT, rpc::VERSION_MOUNT, nfs_mamont::mount::MNT, &mount_args.into_bytes());
    let reply = send_call(&mut stream, &mount_call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    let mount_stat = dec.u32().unwrap();
    assert_eq!(mount_stat, 0);
    let root_handle = dec.opaque(64).unwrap();

    let mut create_args = Encoder::new();
    create_args.opaque(&root_handle);
    create_args.string("hello.txt");
    create_args.u32(0); // UNCHECKED
    create_args.u32(0); // mode: DONT_SET_MODE... actually no, 0=don't set
    create_args.u32(0); // uid
    create_args.u32(0); // gid
    create_args.u32(0); // size
    create_args.u32(0); // atime: DONT_CHANGE
    create_args.u32(0); // mtime: DONT_CHANGE
    let create_call = encode_call(2, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &create_args.into_bytes());
    let reply = send_call(&mut stream, &create_call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    let nfs_stat = dec.u32().unwrap();
    assert_eq!(nfs_stat, 0, "CREATE should succeed");
    let has_handle = dec.bool().unwrap();
    assert!(has_handle);
    let created_handle = dec.opaque(64).unwrap();

    let mut lookup_args = Encoder::new();
    lookup_args.opaque(&root_handle);
    lookup_args.string("hello.txt");
    let lookup_call = encode_call(3, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::LOOKUP, &lookup_args.into_bytes());
    let reply = send_call(&mut stream, &lookup_call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    let nfs_stat = dec.u32().unwrap();
    assert_eq!(nfs_stat, 0, "LOOKUP should succeed");
    let looked_up_handle = dec.opaque(64).unwrap();
    assert_eq!(looked_up_handle, created_handle);
}

/// Mounts the fixture export over `stream` and returns the root handle bytes.
async fn mount_root(stream: &mut TcpStream, export_path: &str) -> Vec<u8> {
    let mut mount_args = Encoder::new();
    mount_args.string(export_path);
    let mount_call = encode_call(1, rpc::PROGRAM_MOUNT, rpc::VERSION_MOUNT, nfs_mamont::mount::MNT, &mount_args.into_bytes());
    let reply = send_call(stream, &mount_call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 0, "MNT should succeed");
    dec.opaque(64).unwrap()
}

fn sattr3_all_unset(enc: &mut Encoder) {
    enc.u32(0); // mode: don't set
    enc.u32(0); // uid: don't set
    enc.u32(0); // gid: don't set
    enc.u32(0); // size: don't set
    enc.u32(0); // atime: DONT_CHANGE
    enc.u32(0); // mtime: DONT_CHANGE
}

fn skip_post_op_attr(dec: &mut Decoder) {
    let _ = dec.option(|d| {
        d.u32()?; // type
        d.u32()?; // mode
        d.u32()?; // nlink
        d.u32()?; // uid
        d.u32()?; // gid
        d.u64()?; // size
        d.u64()?; // used
        d.u32()?; // rdev major
        d.u32()?; // rdev minor
        d.u64()?; // fsid
        d.u64()?; // fileid
        d.u32()?; // atime seconds
        d.u32()?; // atime nseconds
        d.u32()?; // mtime seconds
        d.u32()?; // mtime nseconds
        d.u32()?; // ctime seconds
        d.u32()?; // ctime nseconds
        Ok::<(), nfs_mamont::xdr::Error>(())
    })
    .unwrap();
}

fn encode_create(root_handle: &[u8], name: &str, how: impl FnOnce(&mut Encoder)) -> Vec<u8> {
    let mut args = Encoder::new();
    args.opaque(root_handle);
    args.string(name);
    how(&mut args);
    args.into_bytes()
}

#[tokio::test]
async fn guarded_create_collision_fails() {
    let (addr, dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let export_path = dir.path().to_string_lossy().into_owned();
    let root_handle = mount_root(&mut stream, &export_path).await;

    let args = encode_create(&root_handle, "dup.txt", |e| {
        e.u32(0); // UNCHECKED
        sattr3_all_unset(e);
    });
    let call = encode_call(10, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 0, "first UNCHECKED create should succeed");

    let args = encode_create(&root_handle, "dup.txt", |e| {
        e.u32(1); // GUARDED
        sattr3_all_unset(e);
    });
    let call = encode_call(11, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 17, "GUARDED create of an existing name should be NFS3ERR_EXIST");
}

#[tokio::test]
async fn exclusive_create_verifier_mismatch_fails() {
    let (addr, dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let export_path = dir.path().to_string_lossy().into_owned();
    let root_handle = mount_root(&mut stream, &export_path).await;

    let verifier_a = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let verifier_b = [8u8, 7, 6, 5, 4, 3, 2, 1];

    let args = encode_create(&root_handle, "excl.txt", |e| {
        e.u32(2); // EXCLUSIVE
        e.fixed_opaque(&verifier_a);
    });
    let call = encode_call(20, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 0, "first EXCLUSIVE create should succeed");

    let args = encode_create(&root_handle, "excl.txt", |e| {
        e.u32(2); // EXCLUSIVE
        e.fixed_opaque(&verifier_a);
    });
    let call = encode_call(21, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 0, "retry with the same verifier is idempotent success");

    let args = encode_create(&root_handle, "excl.txt", |e| {
        e.u32(2); // EXCLUSIVE
        e.fixed_opaque(&verifier_b);
    });
    let call = encode_call(22, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    skip_rpc_envelope(&mut dec);
    assert_eq!(dec.u32().unwrap(), 17, "a different verifier against an existing name should be NFS3ERR_EXIST");
}

#[tokio::test]
async fn readdir_pagination_reports_cookie_verifier() {
    let (addr, dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let export_path = dir.path().to_string_lossy().into_owned();
    let root_handle = mount_root(&mut stream, &export_path).await;

    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        let args = encode_create(&root_handle, name, |e| {
            e.u32(0); // UNCHECKED
            sattr3_all_unset(e);
        });
        let call = encode_call(30 + i as u32, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::CREATE, &args);
        let reply = send_call(&mut stream, &call).await;
        let mut dec = Decoder::new(&reply);
        skip_rpc_envelope(&mut dec);
        assert_eq!(dec.u32().unwrap(), 0, "fixture create should succeed");
    }

    let mut names = Vec::new();
    let mut cookie = 0u64;
    let mut cookie_verf = [0u8; 8];
    let mut pages = 0;
    loop {
        pages += 1;
        assert!(pages <= 10, "pagination did not converge to eof");
        let mut args = Encoder::new();
        args.opaque(&root_handle);
        args.u64(cookie);
        args.fixed_opaque(&cookie_verf);
        args.u32(45); // small per-page byte budget to force multiple pages
        let call = encode_call(100 + pages, rpc::PROGRAM_NFS, rpc::VERSION_NFS, nfs_mamont::nfs3::READDIR, &args.into_bytes());
        let reply = send_call(&mut stream, &call).await;
        let mut dec = Decoder::new(&reply);
        skip_rpc_envelope(&mut dec);
        assert_eq!(dec.u32().unwrap(), 0, "READDIR should succeed");
        skip_post_op_attr(&mut dec);
        let page_verf = dec.fixed_opaque::<8>().unwrap();
        if cookie != 0 {
            assert_eq!(page_verf, cookie_verf, "cookie verifier must stay stable across pages of an unchanged directory");
        }
        cookie_verf = page_verf;
        let mut last_cookie = cookie;
        while dec.bool().unwrap() {
            dec.u64().unwrap(); // fileid
            let name = dec.opaque(255).unwrap();
            names.push(String::from_utf8(name).unwrap());
            last_cookie = dec.u64().unwrap();
        }
        let eof = dec.bool().unwrap();
        cookie = last_cookie;
        if eof {
            break;
        }
    }
    assert!(pages > 1, "small count should have forced more than one page");
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]);
}

#[tokio::test]
async fn unknown_program_is_prog_unavail() {
    let (addr, _dir) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let call = encode_call(99, 7_777_777, 1, 0, &[]);
    let reply = send_call(&mut stream, &call).await;
    let mut dec = Decoder::new(&reply);
    let accept_stat = skip_rpc_envelope(&mut dec);
    assert_eq!(accept_stat, rpc::AcceptStat::ProgUnavail as u32);
}
