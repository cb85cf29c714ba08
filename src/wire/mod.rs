//! The radio host's UDP datagram protocol: a fixed header, a length
//! prefixed "qstring" for every text field, and a per-packet-type
//! payload. Every multi-byte field is big-endian network order.

mod cursor;
mod inbound;
mod outbound;

pub use inbound::InboundPacket;
pub use outbound::OutboundPacket;

use snafu::Snafu;

pub const MAGIC: u32 = 0xADBC_CBDA;
pub const SCHEMA: u32 = 2;
pub const CLIENT_ID: &str = "EBLINK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Heartbeat = 0,
    Status = 1,
    Decode = 2,
    Clear = 3,
    Reply = 4,
    QsoLogged = 5,
    Close = 6,
    Replay = 7,
    HaltTx = 8,
    FreeText = 9,
    WsprDecode = 10,
    Location = 11,
    LoggedAdif = 12,
    HighlightCallsign = 13,
    SwitchConfiguration = 14,
    Configure = 15,
    EnableTx = 16,
    EnqueueDecode = 17,
}

impl PacketType {
    fn from_u32(v: u32) -> Option<Self> {
        use PacketType::*;
        Some(match v {
            0 => Heartbeat,
            1 => Status,
            2 => Decode,
            3 => Clear,
            4 => Reply,
            5 => QsoLogged,
            6 => Close,
            7 => Replay,
            8 => HaltTx,
            9 => FreeText,
            10 => WsprDecode,
            11 => Location,
            12 => LoggedAdif,
            13 => HighlightCallsign,
            14 => SwitchConfiguration,
            15 => Configure,
            16 => EnableTx,
            17 => EnqueueDecode,
            _ => return None,
        })
    }
}

/// A `Clear` packet's target window, mirrored from `wsjtx.Window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClearWindow {
    Band = 0,
    Rx = 1,
    Both = 2,
}

#[derive(Debug, Snafu)]
pub enum WireError {
    #[snafu(display("packet too short: need {need} bytes, have {have}"))]
    Truncated { need: usize, have: usize },
    #[snafu(display("bad magic number: {found:#x}"))]
    BadMagic { found: u32 },
    #[snafu(display("unknown packet type {value}"))]
    UnknownPacketType { value: u32 },
    #[snafu(display("qstring was not valid utf-8"))]
    InvalidUtf8,
    #[snafu(display("unsupported packet type for this direction: {type_name}"))]
    WrongDirection { type_name: &'static str },
}

pub(crate) use cursor::{Reader, Writer};
