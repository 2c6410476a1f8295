//! Routes a decoded RPC CALL to the MOUNT or NFSv3 procedure tables and maps
//! whatever comes back (or whatever went wrong) onto the RPC-level
//! `accept_stat` vocabulary. Grounded on the teacher's
//! `serializer/serialize_struct.rs::form_reply`/`parser/parser_struct.rs::parse_proc`
//! error-to-status mapping (`SPEC_FULL.md` §7).

use crate::fsal::Fsal;
use crate::handle::HandleService;
use crate::mount::MountState;
use crate::nfs3;
use crate::rpc::{self, AcceptStat, CallHeader, HeaderDecodeError};
use crate::xdr::Decoder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a connection needs to answer any CALL: the two program
/// handlers' shared state. Cheap to clone (wraps `Arc`s internally).
pub struct Dispatcher<F: Fsal<Node = PathBuf>> {
    pub fsal: F,
    pub handles: HandleService,
    pub mount: Arc<MountState>,
    pub write_verifier: [u8; 8],
}

impl<F: Fsal<Node = PathBuf>> Clone for Dispatcher<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Dispatcher {
            fsal: self.fsal.clone(),
            handles: self.handles.clone(),
            mount: self.mount.clone(),
            write_verifier: self.write_verifier,
        }
    }
}

impl<F: Fsal<Node = PathBuf> + Clone + 'static> Dispatcher<F> {
    pub fn new(fsal: F, handles: HandleService, mount: MountState, write_verifier: [u8; 8]) -> Self {
        Dispatcher { fsal, handles, mount: Arc::new(mount), write_verifier }
    }

    /// Decodes and answers one complete RPC record, returning the bytes of
    /// exactly one reply record (never more, never fewer).
    pub async fn handle_record(&self, record: &[u8], peer: SocketAddr) -> Vec<u8> {
        let mut dec = Decoder::new(record);
        let header = match rpc::decode_call_header(&mut dec) {
            Ok(h) => h,
            Err(HeaderDecodeError::Garbage) => {
                // No xid could be trusted; best effort using whatever the
                // first 4 bytes were, matching the teacher's own stream
                // realignment posture of never hanging the connection.
                let mut probe = Decoder::new(record);
                let xid = probe.u32().unwrap_or(0);
                return rpc::encode_accept_failure(xid, AcceptStat::GarbageArgs, None);
            }
            Err(other @ (HeaderDecodeError::RpcMismatch { .. } | HeaderDecodeError::AuthError(_))) => {
                let mut probe = Decoder::new(record);
                let xid = probe.u32().unwrap_or(0);
                return rpc::encode_denied_reply(xid, &other);
            }
        };
        self.dispatch(&header, &mut dec, peer).await
    }

    async fn dispatch(&self, header: &CallHeader, dec: &mut Decoder<'_>, peer: SocketAddr) -> Vec<u8> {
        match (header.program, header.version) {
            (rpc::PROGRAM_NFS, rpc::VERSION_NFS) => {
                if header.procedure >= nfs3::PROC_COUNT {
                    return rpc::encode_accept_failure(header.xid, AcceptStat::ProcUnavail, None);
                }
                let xid = header.xid;
                let procedure = header.procedure;
                let args = dec.remaining_bytes();
                let fsal = self.fsal.clone();
                let handles = self.handles.clone();
                let write_verifier = self.write_verifier;
                let outcome = tokio::spawn(async move {
                    let mut dec = Decoder::new(&args);
                    nfs3::handlers::dispatch(procedure, &mut dec, &fsal, &handles, write_verifier).await
                })
                .await;
                match outcome {
                    Ok(Ok(Some(body))) => rpc::encode_success_reply(xid, |enc| { enc.raw(&body); }),
                    Ok(Ok(None)) => rpc::encode_accept_failure(xid, AcceptStat::ProcUnavail, None),
                    Ok(Err(_)) => rpc::encode_accept_failure(xid, AcceptStat::GarbageArgs, None),
                    Err(join_err) => {
                        tracing::error!(error = %join_err, procedure, "nfs3 handler panicked");
                        rpc::encode_accept_failure(xid, AcceptStat::SystemErr, None)
                    }
                }
            }
            (rpc::PROGRAM_MOUNT, rpc::VERSION_MOUNT) => {
                if header.procedure >= crate::mount::PROC_COUNT {
                    return rpc::encode_accept_failure(header.xid, AcceptStat::ProcUnavail, None);
                }
                let xid = header.xid;
                let procedure = header.procedure;
                let args = dec.remaining_bytes();
                let mount = self.mount.clone();
                let handles = self.handles.clone();
                let outcome = tokio::spawn(async move {
                    let mut dec = Decoder::new(&args);
                    crate::mount::dispatch(procedure, &mut dec, &mount, &handles, peer).await
                })
                .await;
                match outcome {
                    Ok(Ok(Some(body))) => rpc::encode_success_reply(xid, |enc| { enc.raw(&body); }),
                    Ok(Ok(None)) => rpc::encode_accept_failure(xid, AcceptStat::ProcUnavail, None),
                    Ok(Err(_)) => rpc::encode_accept_failure(xid, AcceptStat::GarbageArgs, None),
                    Err(join_err) => {
                        tracing::error!(error = %join_err, procedure, "mount handler panicked");
                        rpc::encode_accept_failure(xid, AcceptStat::SystemErr, None)
                    }
                }
            }
            (rpc::PROGRAM_NFS, _) => {
                rpc::encode_accept_failure(header.xid, AcceptStat::ProgMismatch, Some((rpc::VERSION_NFS, rpc::VERSION_NFS)))
            }
            (rpc::PROGRAM_MOUNT, _) => {
                rpc::encode_accept_failure(header.xid, AcceptStat::ProgMismatch, Some((rpc::VERSION_MOUNT, rpc::VERSION_MOUNT)))
            }
            _ => rpc::encode_accept_failure(header.xid, AcceptStat::ProgUnavail, None),
        }
    }
}
