//! ONC-RPC (RFC 5531) CALL/REPLY envelope: message header, `opaque_auth`,
//! and the accept/reject status vocabulary. Procedure-specific argument and
//! result bodies live in [`crate::nfs3`] and [`crate::mount`].

pub mod frame;

use crate::xdr::{Decoder, Encoder};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub const RPC_VERSION: u32 = 2;
const MAX_AUTH_BODY_LEN: usize = 400;

pub const PROGRAM_MOUNT: u32 = 100_005;
pub const PROGRAM_NFS: u32 = 100_003;
pub const VERSION_MOUNT: u32 = 3;
pub const VERSION_NFS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum MsgType {
    Call = 0,
    Reply = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AuthFlavor {
    AuthNone = 0,
    AuthSys = 1,
    AuthShort = 2,
    AuthDh = 3,
    RpcSecGss = 6,
}

#[derive(Debug, Clone)]
pub struct OpaqueAuth {
    pub flavor: AuthFlavor,
    pub body: Vec<u8>,
}

impl OpaqueAuth {
    pub fn none() -> Self {
        OpaqueAuth { flavor: AuthFlavor::AuthNone, body: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AcceptStat {
    Success = 0,
    ProgUnavail = 1,
    ProgMismatch = 2,
    ProcUnavail = 3,
    GarbageArgs = 4,
    SystemErr = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum AuthStat {
    AuthOk = 0,
    AuthBadCred = 1,
    AuthRejectedCred = 2,
    AuthBadVerf = 3,
    AuthRejectedVerf = 4,
    AuthTooWeak = 5,
    AuthInvalidResp = 6,
    AuthFailed = 7,
}

/// The parsed CALL header, credential and verifier. Procedure arguments
/// follow immediately in the same decoder.
#[derive(Debug, Clone)]
pub struct CallHeader {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub credential: OpaqueAuth,
    pub verifier: OpaqueAuth,
}

/// Outcome of decoding a CALL header: either a complete header ready for
/// dispatch, or an RPC-level rejection that must be mirrored to the client
/// without ever reaching procedure-specific argument decoding.
#[derive(Debug)]
pub enum HeaderDecodeError {
    /// Not an RPC CALL, or an unsupported RPC version; MSG_DENIED / RPC_MISMATCH.
    RpcMismatch { low: u32, high: u32 },
    /// Auth flavor understood but credential is unacceptable.
    AuthError(AuthStat),
    /// Malformed header bytes.
    Garbage,
}

fn decode_opaque_auth(dec: &mut Decoder) -> Result<OpaqueAuth, HeaderDecodeError> {
    let flavor_raw = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    let flavor = AuthFlavor::from_u32(flavor_raw).ok_or(HeaderDecodeError::AuthError(AuthStat::AuthBadCred))?;
    let body = dec.opaque(MAX_AUTH_BODY_LEN).map_err(|_| HeaderDecodeError::Garbage)?;
    Ok(OpaqueAuth { flavor, body })
}

/// Decodes the fixed CALL envelope (xid through verifier). The caller must
/// still validate `(program, version, procedure)` against the dispatch table.
pub fn decode_call_header(dec: &mut Decoder) -> Result<CallHeader, HeaderDecodeError> {
    let xid = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    let msg_type = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    if msg_type != MsgType::Call as u32 {
        return Err(HeaderDecodeError::Garbage);
    }
    let rpcvers = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    if rpcvers != RPC_VERSION {
        return Err(HeaderDecodeError::RpcMismatch { low: RPC_VERSION, high: RPC_VERSION });
    }
    let program = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    let version = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    let procedure = dec.u32().map_err(|_| HeaderDecodeError::Garbage)?;
    let credential = decode_opaque_auth(dec)?;
    let verifier = match credential.flavor {
        AuthFlavor::AuthNone | AuthFlavor::AuthSys => decode_opaque_auth(dec)?,
        _ => return Err(HeaderDecodeError::AuthError(AuthStat::AuthRejectedCred)),
    };
    Ok(CallHeader { xid, program, version, procedure, credential, verifier })
}

/// Encodes a fully successful reply: accept_stat SUCCESS followed by
/// `write_body`'s procedure-specific result bytes.
pub fn encode_success_reply(xid: u32, write_body: impl FnOnce(&mut Encoder)) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(MsgType::Reply as u32);
    enc.u32(0); // reply_stat = MSG_ACCEPTED
    encode_opaque_auth(&mut enc, &OpaqueAuth::none());
    enc.u32(AcceptStat::Success as u32);
    write_body(&mut enc);
    enc.into_bytes()
}

/// Encodes an accepted-but-failed reply (PROG_UNAVAIL, PROG_MISMATCH,
/// PROC_UNAVAIL, GARBAGE_ARGS, SYSTEM_ERR). `PROG_MISMATCH` carries the
/// supported version range inline; the others have no payload.
pub fn encode_accept_failure(xid: u32, stat: AcceptStat, mismatch: Option<(u32, u32)>) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(MsgType::Reply as u32);
    enc.u32(0); // MSG_ACCEPTED
    encode_opaque_auth(&mut enc, &OpaqueAuth::none());
    enc.u32(stat as u32);
    if stat == AcceptStat::ProgMismatch {
        let (low, high) = mismatch.unwrap_or((VERSION_NFS, VERSION_NFS));
        enc.u32(low);
        enc.u32(high);
    }
    enc.into_bytes()
}

/// Encodes a denied reply: either an RPC version mismatch or an auth failure.
pub fn encode_denied_reply(xid: u32, reason: &HeaderDecodeError) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(xid);
    enc.u32(MsgType::Reply as u32);
    enc.u32(1); // reply_stat = MSG_DENIED
    match reason {
        HeaderDecodeError::RpcMismatch { low, high } => {
            enc.u32(0); // RPC_MISMATCH
            enc.u32(*low);
            enc.u32(*high);
        }
        HeaderDecodeError::AuthError(stat) => {
            enc.u32(1); // AUTH_ERROR
            enc.u32(*stat as u32);
        }
        HeaderDecodeError::Garbage => {
            // No xid could be trusted here in principle, but we already read one;
            // treat as an auth rejection since we cannot tell what was intended.
            enc.u32(1);
            enc.u32(AuthStat::AuthBadCred as u32);
        }
    }
    enc.into_bytes()
}

fn encode_opaque_auth(enc: &mut Encoder, auth: &OpaqueAuth) {
    enc.u32(auth.flavor as u32);
    enc.opaque(&auth.body);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_null_call(xid: u32, program: u32, version: u32, procedure: u32) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u32(xid);
        enc.u32(MsgType::Call as u32);
        enc.u32(RPC_VERSION);
        enc.u32(program);
        enc.u32(version);
        enc.u32(procedure);
        encode_opaque_auth(&mut enc, &OpaqueAuth::none());
        encode_opaque_auth(&mut enc, &OpaqueAuth::none());
        enc.into_bytes()
    }

    #[test]
    fn decodes_null_call_header() {
        let bytes = encode_null_call(42, PROGRAM_NFS, VERSION_NFS, 0);
        let mut dec = Decoder::new(&bytes);
        let header = decode_call_header(&mut dec).unwrap();
        assert_eq!(header.xid, 42);
        assert_eq!(header.program, PROGRAM_NFS);
        assert_eq!(header.procedure, 0);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn rejects_bad_rpc_version() {
        let mut enc = Encoder::new();
        enc.u32(1);
        enc.u32(MsgType::Call as u32);
        enc.u32(99);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            decode_call_header(&mut dec),
            Err(HeaderDecodeError::RpcMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_auth_flavor() {
        let mut enc = Encoder::new();
        enc.u32(1);
        enc.u32(MsgType::Call as u32);
        enc.u32(RPC_VERSION);
        enc.u32(PROGRAM_NFS);
        enc.u32(VERSION_NFS);
        enc.u32(0);
        enc.u32(AuthFlavor::RpcSecGss as u32);
        enc.opaque(&[]);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            decode_call_header(&mut dec),
            Err(HeaderDecodeError::AuthError(AuthStat::AuthRejectedCred))
        ));
    }
}
