//! The Heymac command codec (spec.md refers to this informally as "HeymacCmd").
//!
//! Every command begins with a prefix byte whose top two bits are `10` and whose low six bits are
//! the CMD_ID (`0x80 | CMD_ID`). [`Command::parse`] and [`Command::to_bytes`] are exact inverses
//! of one another.

pub mod associate;

use crate::{
    bytes::{ByteReader, ByteWriter, ToBytes},
    link_address::LinkAddress,
    net::NetIdentifier,
    Error,
};
use heapless::{consts::*, Vec};

pub use associate::Associate;

const PREFIX_BITS: u8 = 0x80;
const PREFIX_MASK: u8 = 0xc0;
const CMD_ID_MASK: u8 = 0x3f;

const CMD_TEXT: u8 = 3;
const CMD_CSMA_BEACON: u8 = 4;
const CMD_ASSOCIATE: u8 = 5;

/// Capability bit: node has surplus power (mains-powered or similar).
pub const CAP_SURPLUS_POWER: u16 = 0x0001;
/// Capability bit: node can receive continuously (is not duty-cycled).
pub const CAP_CONTINUOUS_RX: u16 = 0x0002;
/// Capability bit: node supports link-layer cryptographic operations.
pub const CAP_CRYPTO: u16 = 0x0004;

/// Maximum number of `(net_id, net_root)` entries a single beacon can advertise.
///
/// This bounds the codec's own on-stack storage; it is independent of any particular
/// [`crate::config::Config::MAX_NEIGHBORS`], which bounds the neighbor table instead.
pub type MaxBeaconNets = U8;
/// Maximum number of neighbor addresses a single beacon can advertise.
pub type MaxBeaconNeighbors = U32;

/// An advertised `(net_id, net_root)` pair inside a [`CsmaBeacon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetEntry {
    pub net_id: NetIdentifier,
    pub net_root: LinkAddress,
}

/// Body of the `CsmaBeacon` command (CMD_ID 4): a periodic broadcast advertising this node's
/// capabilities, status, known nets, and known neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsmaBeacon {
    pub caps: u16,
    pub status: u16,
    pub nets: Vec<NetEntry, MaxBeaconNets>,
    pub neighbors: Vec<LinkAddress, MaxBeaconNeighbors>,
}

impl CsmaBeacon {
    fn parse_body(reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let caps = reader.read_u16_be()?;
        let status = reader.read_u16_be()?;

        let nets_count = reader.read_u8()?;
        let mut nets = Vec::new();
        for _ in 0..nets_count {
            let net_id = NetIdentifier(reader.read_u16_be()?);
            let net_root = LinkAddress::new(reader.read_array()?);
            nets.push(NetEntry { net_id, net_root })
                .map_err(|_| Error::IncorrectSize)?;
        }

        let ngbrs_count = reader.read_u8()?;
        let mut neighbors = Vec::new();
        for _ in 0..ngbrs_count {
            let addr = LinkAddress::new(reader.read_array()?);
            neighbors.push(addr).map_err(|_| Error::IncorrectSize)?;
        }

        if !reader.is_empty() {
            return Err(Error::IncorrectSize);
        }

        Ok(CsmaBeacon {
            caps,
            status,
            nets,
            neighbors,
        })
    }

    fn body_to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_be(self.caps)?;
        writer.write_u16_be(self.status)?;

        writer.write_u8(self.nets.len() as u8)?;
        for net in &self.nets {
            writer.write_u16_be(net.net_id.0)?;
            writer.write_slice(net.net_root.raw())?;
        }

        writer.write_u8(self.neighbors.len() as u8)?;
        for addr in &self.neighbors {
            writer.write_slice(addr.raw())?;
        }

        Ok(())
    }
}

/// A named field of a [`Command`], for the by-name field access and construction surface
/// described in spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    /// `Text`'s message bytes.
    Msg,
    /// `CsmaBeacon`'s capability bitfield.
    Caps,
    /// `CsmaBeacon`'s status bitfield.
    Status,
    /// An `Associate` sub-command's `net_id`.
    NetId,
    /// An `Associate` sub-command's `net_addr`.
    NetAddr,
}

/// Names a [`Command`] variant, for the by-name construction contract of spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Text,
    CsmaBeacon,
    Associate(associate::Kind),
}

/// A parsed Heymac command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Free-form text, for diagnostics (CMD_ID 3).
    Text(&'a [u8]),
    /// A periodic capability/neighbor broadcast (CMD_ID 4).
    CsmaBeacon(CsmaBeacon),
    /// One step of the association handshake (CMD_ID 5).
    Associate(Associate),
}

impl<'a> Command<'a> {
    /// Parses a command from `bytes`, including its leading prefix byte.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let prefix = reader.read_u8()?;
        if prefix & PREFIX_MASK != PREFIX_BITS {
            return Err(Error::UnknownCommand);
        }

        match prefix & CMD_ID_MASK {
            CMD_TEXT => Ok(Command::Text(reader.read_rest())),
            CMD_CSMA_BEACON => Ok(Command::CsmaBeacon(CsmaBeacon::parse_body(&mut reader)?)),
            CMD_ASSOCIATE => {
                let sub_id = reader.read_u8()?;
                Ok(Command::Associate(Associate::parse_body(
                    sub_id,
                    &mut reader,
                )?))
            }
            _ => Err(Error::UnknownCommand),
        }
    }

    fn cmd_id(&self) -> u8 {
        match self {
            Command::Text(_) => CMD_TEXT,
            Command::CsmaBeacon(_) => CMD_CSMA_BEACON,
            Command::Associate(_) => CMD_ASSOCIATE,
        }
    }

    /// Reads a named field of `self`. Returns `Error::UnknownField` if `name` does not apply to
    /// this variant.
    pub fn field(&self, name: FieldName) -> Result<FieldValue<'a>, Error> {
        match (self, name) {
            (Command::Text(msg), FieldName::Msg) => Ok(FieldValue::Bytes(msg)),
            (Command::CsmaBeacon(b), FieldName::Caps) => Ok(FieldValue::U16(b.caps)),
            (Command::CsmaBeacon(b), FieldName::Status) => Ok(FieldValue::U16(b.status)),
            (Command::Associate(a), FieldName::NetId) => {
                Ok(FieldValue::U16(a.field(associate::FieldName::NetId)?))
            }
            (Command::Associate(a), FieldName::NetAddr) => {
                Ok(FieldValue::U16(a.field(associate::FieldName::NetAddr)?))
            }
            _ => Err(Error::UnknownField),
        }
    }

    /// Builds a variant of `kind` from its named fields.
    ///
    /// A field name `kind` doesn't carry (or, for a no-body `Associate` sub-command, any field
    /// at all) is `Error::UnknownField`; a required field missing from `fields` is the same
    /// error. `CsmaBeacon`'s `nets` and `neighbors` are not addressable by name and always come
    /// back empty; build the struct directly if you need to populate them.
    pub fn build(kind: Kind, fields: &[(FieldName, FieldValue<'a>)]) -> Result<Self, Error> {
        match kind {
            Kind::Text => {
                let mut msg = None;
                for (name, value) in fields {
                    match (name, value) {
                        (FieldName::Msg, FieldValue::Bytes(b)) => msg = Some(*b),
                        _ => return Err(Error::UnknownField),
                    }
                }
                Ok(Command::Text(msg.ok_or(Error::UnknownField)?))
            }
            Kind::CsmaBeacon => {
                let mut caps = None;
                let mut status = None;
                for (name, value) in fields {
                    match (name, value) {
                        (FieldName::Caps, FieldValue::U16(v)) => caps = Some(*v),
                        (FieldName::Status, FieldValue::U16(v)) => status = Some(*v),
                        _ => return Err(Error::UnknownField),
                    }
                }
                Ok(Command::CsmaBeacon(CsmaBeacon {
                    caps: caps.ok_or(Error::UnknownField)?,
                    status: status.ok_or(Error::UnknownField)?,
                    nets: Vec::new(),
                    neighbors: Vec::new(),
                }))
            }
            Kind::Associate(sub) => {
                let mut assoc_fields: Vec<(associate::FieldName, u16), U4> = Vec::new();
                for (name, value) in fields {
                    let assoc_name = match name {
                        FieldName::NetId => associate::FieldName::NetId,
                        FieldName::NetAddr => associate::FieldName::NetAddr,
                        _ => return Err(Error::UnknownField),
                    };
                    let v = match value {
                        FieldValue::U16(v) => *v,
                        FieldValue::Bytes(_) => return Err(Error::UnknownField),
                    };
                    assoc_fields
                        .push((assoc_name, v))
                        .map_err(|_| Error::UnknownField)?;
                }
                Ok(Command::Associate(Associate::build(sub, &assoc_fields)?))
            }
        }
    }
}

/// The value of a field read through [`Command::field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Bytes(&'a [u8]),
    U16(u16),
}

impl<'a> ToBytes for Command<'a> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(PREFIX_BITS | self.cmd_id())?;
        match self {
            Command::Text(msg) => writer.write_slice(msg),
            Command::CsmaBeacon(beacon) => beacon.body_to_bytes(writer),
            Command::Associate(assoc) => assoc.body_to_bytes(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NetIdentifier;

    fn encode(cmd: &Command<'_>) -> (usize, [u8; 64]) {
        let mut buf = [0u8; 64];
        let len = {
            let mut writer = ByteWriter::new(&mut buf);
            cmd.to_bytes(&mut writer).unwrap();
            64 - writer.space_left()
        };
        (len, buf)
    }

    #[test]
    fn text_round_trip() {
        let cmd = Command::Text(b"Hello world");
        let (len, buf) = encode(&cmd);
        assert_eq!(
            &buf[..len],
            &[0x83, 0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x20, 0x77, 0x6f, 0x72, 0x6c, 0x64]
        );
        assert_eq!(Command::parse(&buf[..len]).unwrap(), cmd);
    }

    #[test]
    fn beacon_round_trip() {
        let mut nets = Vec::new();
        nets.push(NetEntry {
            net_id: NetIdentifier(0x0001),
            net_root: LinkAddress::new(*b"\xfdnetroot"),
        })
        .unwrap();
        let mut neighbors = Vec::new();
        neighbors.push(LinkAddress::new(*b"\xfd2345678")).unwrap();

        let cmd = Command::CsmaBeacon(CsmaBeacon {
            caps: 0x0102,
            status: 0x0304,
            nets,
            neighbors,
        });
        let (len, buf) = encode(&cmd);

        let mut expected = Vec::<u8, U64>::new();
        expected
            .extend_from_slice(&[0x84, 0x01, 0x02, 0x03, 0x04, 0x01, 0x00, 0x01])
            .unwrap();
        expected.extend_from_slice(b"\xfdnetroot").unwrap();
        expected.extend_from_slice(&[0x01]).unwrap();
        expected.extend_from_slice(b"\xfd2345678").unwrap();

        assert_eq!(&buf[..len], expected.as_slice());
        assert_eq!(Command::parse(&buf[..len]).unwrap(), cmd);
    }

    #[test]
    fn assoc_request_round_trip() {
        let cmd = Command::Associate(Associate::Request {
            net_id: NetIdentifier(0x0102),
        });
        let (len, buf) = encode(&cmd);
        assert_eq!(&buf[..len], &[0x85, 0x01, 0x01, 0x02]);
        assert_eq!(Command::parse(&buf[..len]).unwrap(), cmd);
    }

    #[test]
    fn assoc_accept_round_trip() {
        let cmd = Command::Associate(Associate::Accept {
            net_id: NetIdentifier(0x0102),
            net_addr: crate::net::NetAddress(0x0123),
        });
        let (len, buf) = encode(&cmd);
        assert_eq!(&buf[..len], &[0x85, 0x02, 0x01, 0x02, 0x01, 0x23]);
        assert_eq!(Command::parse(&buf[..len]).unwrap(), cmd);
    }

    #[test]
    fn wrong_cmd_id_rejected() {
        let bytes = [0xff, 0x01, 0x01, 0x02];
        assert_eq!(Command::parse(&bytes), Err(Error::UnknownCommand));
    }

    #[test]
    fn assoc_buffer_too_short() {
        let bytes = [0x85];
        assert_eq!(Command::parse(&bytes), Err(Error::InsufficientData));
    }

    #[test]
    fn assoc_accept_trailing_bytes_rejected() {
        let bytes = [0x85, 0x02, 0x01, 0x02, 0x01, 0x23, 0xff];
        assert_eq!(Command::parse(&bytes), Err(Error::IncorrectSize));
    }

    #[test]
    fn build_text() {
        assert_eq!(
            Command::build(Kind::Text, &[(FieldName::Msg, FieldValue::Bytes(b"hi"))]),
            Ok(Command::Text(b"hi"))
        );
    }

    #[test]
    fn build_text_rejects_unknown_field() {
        assert_eq!(
            Command::build(Kind::Text, &[(FieldName::Caps, FieldValue::U16(1))]),
            Err(Error::UnknownField)
        );
    }

    #[test]
    fn build_text_rejects_missing_field() {
        assert_eq!(Command::build(Kind::Text, &[]), Err(Error::UnknownField));
    }

    #[test]
    fn build_csma_beacon() {
        assert_eq!(
            Command::build(
                Kind::CsmaBeacon,
                &[
                    (FieldName::Caps, FieldValue::U16(0x0102)),
                    (FieldName::Status, FieldValue::U16(0x0304)),
                ]
            ),
            Ok(Command::CsmaBeacon(CsmaBeacon {
                caps: 0x0102,
                status: 0x0304,
                nets: Vec::new(),
                neighbors: Vec::new(),
            }))
        );
    }

    #[test]
    fn build_associate_delegates_to_sub_builder() {
        assert_eq!(
            Command::build(
                Kind::Associate(associate::Kind::Request),
                &[(FieldName::NetId, FieldValue::U16(0x0102))]
            ),
            Ok(Command::Associate(Associate::Request {
                net_id: NetIdentifier(0x0102)
            }))
        );
    }

    #[test]
    fn build_associate_no_body_variant_rejects_any_field() {
        assert_eq!(
            Command::build(Kind::Associate(associate::Kind::Leave), &[]),
            Ok(Command::Associate(Associate::Leave))
        );
        assert_eq!(
            Command::build(
                Kind::Associate(associate::Kind::Leave),
                &[(FieldName::NetId, FieldValue::U16(0x0102))]
            ),
            Err(Error::UnknownField)
        );
    }

    #[test]
    fn build_associate_rejects_wrong_value_kind() {
        assert_eq!(
            Command::build(
                Kind::Associate(associate::Kind::Request),
                &[(FieldName::NetId, FieldValue::Bytes(b"no"))]
            ),
            Err(Error::UnknownField)
        );
    }
}
