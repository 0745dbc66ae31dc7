use std::sync::Arc;

use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::Mutex,
};

/// Hard cap on a single payload. Bounds per-message memory on both ends
/// and doubles as the chunk size for file transfers.
pub const BUFFER_SIZE: usize = 4096;

/// Every message type understood by the protocol. The wire encoding is the
/// `u32` ordinal, so the declaration order is part of the protocol.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    // System & status
    Connect = 0,
    Disconnect,
    Success,
    Error,

    // Authentication
    Register,
    Login,
    Logout,
    ChangePass,
    DeleteAccount,

    // Group management
    CreateGroup,
    ListGroups,
    JoinGroup,
    LeaveGroup,
    ListMembers,
    KickMember,
    InviteMember,
    ApproveMember,
    DeleteGroup,

    // File system
    CreateFolder,
    DeleteItem,
    RenameItem,
    MoveItem,
    CopyItem,

    // File transfer
    UploadReq,
    DownloadReq,
    FileData,
    FileEnd,
    FileError,

    // Directory listing
    ListFiles,
    ListResponse,
}

impl TryFrom<u32> for MessageType {
    type Error = NetError;

    fn try_from(value: u32) -> Result<Self, NetError> {
        use MessageType::*;
        let kind = match value {
            0 => Connect,
            1 => Disconnect,
            2 => Success,
            3 => Error,
            4 => Register,
            5 => Login,
            6 => Logout,
            7 => ChangePass,
            8 => DeleteAccount,
            9 => CreateGroup,
            10 => ListGroups,
            11 => JoinGroup,
            12 => LeaveGroup,
            13 => ListMembers,
            14 => KickMember,
            15 => InviteMember,
            16 => ApproveMember,
            17 => DeleteGroup,
            18 => CreateFolder,
            19 => DeleteItem,
            20 => RenameItem,
            21 => MoveItem,
            22 => CopyItem,
            23 => UploadReq,
            24 => DownloadReq,
            25 => FileData,
            26 => FileEnd,
            27 => FileError,
            28 => ListFiles,
            29 => ListResponse,
            other => return Err(NetError::UnknownType(other)),
        };
        Ok(kind)
    }
}

/// One framed unit of the wire protocol: a fixed header (type ordinal and
/// payload length, both little-endian) followed by the raw payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: MessageType, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    pub fn text(kind: MessageType, msg: impl Into<String>) -> Self {
        Self {
            kind,
            payload: msg.into().into_bytes(),
        }
    }

    pub fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }

    /// The payload interpreted as text. Most payloads are space-separated
    /// token lists; FILE_DATA chunks are the exception and should not go
    /// through here.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Failures of the framing layer. A clean close by the peer while waiting
/// for the next header is its own variant so callers can tell an orderly
/// disconnect apart from a broken frame.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("connection closed by peer")]
    Closed,

    #[error("unknown message type ordinal {0}")]
    UnknownType(u32),

    #[error("payload length {0} outside [0, {BUFFER_SIZE}]")]
    PayloadTooLarge(i32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StreamReader = Arc<Mutex<OwnedReadHalf>>;
pub type StreamWriter = Arc<Mutex<OwnedWriteHalf>>;
