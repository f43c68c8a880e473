//! Live-room wire packets.
//!
//! Every frame on the upstream socket is one or more packets, each with a
//! 16-byte big-endian header:
//!
//! | bytes | field       |
//! |-------|-------------|
//! | 0..4  | packet len  |
//! | 4..6  | header len  |
//! | 6..8  | protover    |
//! | 8..12 | operation   |
//! | 12..16| sequence    |
//!
//! A protover-2 command packet carries a zlib stream holding further packets.
use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use serde::Serialize;

pub const HEADER_LEN: usize = 16;

pub mod op {
    pub const HEARTBEAT:       u32 = 2;
    pub const HEARTBEAT_REPLY: u32 = 3;
    pub const COMMAND:         u32 = 5;
    pub const AUTH:            u32 = 7;
    pub const AUTH_REPLY:      u32 = 8;
}

pub mod protover {
    pub const JSON:   u16 = 0;
    pub const PLAIN:  u16 = 1;
    pub const ZLIB:   u16 = 2;
    pub const BROTLI: u16 = 3;
}

#[derive(thiserror::Error, Debug)]
pub enum PacketError {
    #[error("truncated packet: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("bad header length {0}")]
    BadHeader(u16),

    #[error("unsupported protover {0}")]
    Unsupported(u16),

    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub protover: u16,
    pub op:       u32,
    pub seq:      u32,
    pub body:     Bytes,
}

/// Auth handshake body, sent once right after the socket opens.
#[derive(Debug, Serialize)]
pub struct AuthBody {
    pub uid:      u64,
    pub roomid:   u32,
    pub protover: u16,
    pub platform: &'static str,
    #[serde(rename = "type")]
    pub kind:     u8,
    pub key:      String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub buvid:    String,
}

impl Packet {
    pub fn new(op: u32, body: impl Into<Bytes>) -> Self {
        Self { protover: protover::PLAIN, op, seq: 1, body: body.into() }
    }

    pub fn heartbeat() -> Self {
        Self::new(op::HEARTBEAT, Bytes::new())
    }

    pub fn auth(body: &AuthBody) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op::AUTH, serde_json::to_vec(body)?))
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        buf.put_u32((HEADER_LEN + self.body.len()) as u32);
        buf.put_u16(HEADER_LEN as u16);
        buf.put_u16(self.protover);
        buf.put_u32(self.op);
        buf.put_u32(self.seq);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Popularity counter carried by a heartbeat reply.
    pub fn popularity(&self) -> Option<u32> {
        (self.op == op::HEARTBEAT_REPLY && self.body.len() >= 4)
            .then(|| (&self.body[..4]).get_u32())
    }
}

/// Decode every packet in `frame`, expanding compressed command packets.
pub fn decode(frame: &[u8]) -> Result<Vec<Packet>, PacketError> {
    let mut out = Vec::new();
    decode_into(frame, &mut out)?;
    Ok(out)
}

fn decode_into(mut cur: &[u8], out: &mut Vec<Packet>) -> Result<(), PacketError> {
    while !cur.is_empty() {
        if cur.len() < HEADER_LEN {
            return Err(PacketError::Truncated { need: HEADER_LEN, have: cur.len() });
        }
        let mut hdr = &cur[..HEADER_LEN];
        let packet_len = hdr.get_u32() as usize;
        let header_len = hdr.get_u16();
        let ver        = hdr.get_u16();
        let op         = hdr.get_u32();
        let seq        = hdr.get_u32();

        if (header_len as usize) < HEADER_LEN || header_len as usize > packet_len {
            return Err(PacketError::BadHeader(header_len));
        }
        if packet_len > cur.len() {
            return Err(PacketError::Truncated { need: packet_len, have: cur.len() });
        }
        let body = &cur[header_len as usize..packet_len];

        match (op, ver) {
            (op::COMMAND, protover::ZLIB) => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(body).read_to_end(&mut inflated)?;
                decode_into(&inflated, out)?;
            }
            (op::COMMAND, protover::BROTLI) => return Err(PacketError::Unsupported(ver)),
            _ => out.push(Packet {
                protover: ver,
                op,
                seq,
                body: Bytes::copy_from_slice(body),
            }),
        }
        cur.advance(packet_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    fn command(json: &str) -> Packet {
        Packet { protover: protover::JSON, op: op::COMMAND, seq: 0, body: Bytes::from(json.to_owned()) }
    }

    #[test]
    fn heartbeat_is_a_bare_header() {
        let raw = Packet::heartbeat().encode();
        assert_eq!(
            raw.as_ref(),
            &[0, 0, 0, 16, 0, 16, 0, 1, 0, 0, 0, 2, 0, 0, 0, 1]
        );
    }

    #[test]
    fn auth_body_uses_wire_field_names() {
        let body = AuthBody {
            uid: 0, roomid: 7, protover: 2, platform: "web", kind: 2,
            key: "tok".into(), buvid: String::new(),
        };
        let p = Packet::auth(&body).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
        assert_eq!(v["type"], 2);
        assert_eq!(v["roomid"], 7);
        assert!(v.get("buvid").is_none());
        assert_eq!(p.op, op::AUTH);
    }

    #[test]
    fn splits_concatenated_packets() {
        let mut frame = BytesMut::new();
        frame.extend_from_slice(&command(r#"{"cmd":"A"}"#).encode());
        frame.extend_from_slice(&command(r#"{"cmd":"B"}"#).encode());

        let packets = decode(&frame).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].body.as_ref(), br#"{"cmd":"A"}"#);
        assert_eq!(packets[1].body.as_ref(), br#"{"cmd":"B"}"#);
    }

    #[test]
    fn inflates_zlib_command_packets() {
        let mut inner = BytesMut::new();
        inner.extend_from_slice(&command(r#"{"cmd":"X"}"#).encode());
        inner.extend_from_slice(&command(r#"{"cmd":"Y"}"#).encode());

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&inner).unwrap();
        let outer = Packet {
            protover: protover::ZLIB,
            op: op::COMMAND,
            seq: 0,
            body: Bytes::from(enc.finish().unwrap()),
        };

        let packets = decode(&outer.encode()).unwrap();
        let bodies: Vec<_> = packets.iter().map(|p| p.body.clone()).collect();
        assert_eq!(bodies, vec![Bytes::from_static(br#"{"cmd":"X"}"#), Bytes::from_static(br#"{"cmd":"Y"}"#)]);
    }

    #[test]
    fn reads_popularity_from_heartbeat_reply() {
        let reply = Packet::new(op::HEARTBEAT_REPLY, Bytes::from_static(&[0, 0, 1, 0]));
        let decoded = decode(&reply.encode()).unwrap();
        assert_eq!(decoded[0].popularity(), Some(256));
        assert_eq!(Packet::heartbeat().popularity(), None);
    }

    #[test]
    fn rejects_truncated_frames() {
        let raw = command(r#"{"cmd":"A"}"#).encode();
        let err = decode(&raw[..raw.len() - 1]).unwrap_err();
        assert!(matches!(err, PacketError::Truncated { .. }));
        assert!(matches!(decode(&raw[..4]).unwrap_err(), PacketError::Truncated { need: 16, have: 4 }));
    }
}
