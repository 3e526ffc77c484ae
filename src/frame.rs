//! The Heymac frame codec: the envelope that carries a [`Command`](crate::command::Command)
//! payload (or, for a relayed multi-hop frame, an opaque payload this node never parses).
//!
//! Frame layout is flags-driven. The protocol-id byte identifies the Heymac family and subtype;
//! the frame-control byte says which address fields are present, whether those addresses are
//! long (8-octet [`LinkAddress`]) or short (2-octet [`NetAddress`]) form, and whether the frame is
//! multi-hop.

use crate::{bytes::{ByteReader, ByteWriter, ToBytes}, link_address::LinkAddress, net::NetAddress, time::Instant, Error};
use bitflags::bitflags;

/// High 3 bits of the protocol-id byte: identifies the Heymac protocol family.
pub const PID_IDENT_HEYMAC: u8 = 0xe0;
const PID_IDENT_MASK: u8 = 0xe0;
const PID_TYPE_MASK: u8 = 0x1f;

/// Low 5 bits of the protocol-id byte: this is the CSMA subtype (the only one this crate
/// implements; a future TDMA or other MAC could claim another value in the same family).
pub const PID_TYPE_CSMA: u8 = 0x01;

bitflags! {
    /// The frame-control byte: which address fields follow the header, in what form, and whether
    /// the frame is multi-hop.
    pub struct FrameControl: u8 {
        /// Addresses present in this frame (source/destination/retransmitter, whichever are
        /// present) are long (8-octet [`LinkAddress`]) form rather than short (2-octet
        /// [`NetAddress`]) form.
        const LONG_ADDRS = 0b0000_0001;
        /// A source address is present.
        const HAS_SRC = 0b0000_0010;
        /// A destination address is present. When absent, the frame is a broadcast.
        const HAS_DST = 0b0000_0100;
        /// A retransmitter address is present.
        const HAS_RETX = 0b0000_1000;
        /// The frame carries a hop-count and may be relayed.
        const MULTI_HOP = 0b0001_0000;
    }
}

/// An address carried in a frame: long form before association, short form after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Long(LinkAddress),
    Short(NetAddress),
}

impl Address {
    fn is_long(&self) -> bool {
        matches!(self, Address::Long(_))
    }

    fn parse(reader: &mut ByteReader<'_>, long: bool) -> Result<Self, Error> {
        if long {
            Ok(Address::Long(LinkAddress::new(
                reader.read_array().map_err(|_| Error::InvalidFrame)?,
            )))
        } else {
            let raw = reader.read_array::<[u8; 2]>().map_err(|_| Error::InvalidFrame)?;
            Ok(Address::Short(NetAddress(u16::from_be_bytes(raw))))
        }
    }

    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        match self {
            Address::Long(addr) => writer.write_slice(addr.raw()),
            Address::Short(addr) => writer.write_u16_be(addr.0),
        }
    }
}

/// Radio-supplied metadata attached to a frame that was received, never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMetadata {
    pub rx_time: Instant,
    pub rssi: i16,
    pub snr: i8,
}

/// A named field of a [`Frame`], for the by-name field access surface described in spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Source,
    Destination,
    Retransmitter,
    HopCount,
}

/// The value of a field read or written through [`Frame::get_field`]/[`Frame::set_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Address(Address),
    HopCount(u8),
}

/// A parsed (or about-to-be-serialized) Heymac frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    frame_control: FrameControl,
    source: Option<Address>,
    destination: Option<Address>,
    retransmitter: Option<Address>,
    hop_count: Option<u8>,
    payload: &'a [u8],
    rx_metadata: Option<RxMetadata>,
}

impl<'a> Frame<'a> {
    /// Creates a minimal frame (no addresses, not multi-hop) carrying `payload`.
    pub fn new(payload: &'a [u8]) -> Self {
        Frame {
            frame_control: FrameControl::empty(),
            source: None,
            destination: None,
            retransmitter: None,
            hop_count: None,
            payload,
            rx_metadata: None,
        }
    }

    /// Attaches receive metadata (only meaningful for a frame obtained from [`Frame::parse`]).
    pub fn with_rx_metadata(mut self, meta: RxMetadata) -> Self {
        self.rx_metadata = Some(meta);
        self
    }

    /// Returns the receive metadata, if this frame was received rather than constructed locally.
    pub fn rx_metadata(&self) -> Option<RxMetadata> {
        self.rx_metadata
    }

    /// Sets the source address, updating `LONG_ADDRS` to match.
    pub fn set_source(&mut self, addr: Address) {
        self.sync_long_addrs(&addr);
        self.frame_control.insert(FrameControl::HAS_SRC);
        self.source = Some(addr);
    }

    /// Sets the destination address, updating `LONG_ADDRS` to match.
    pub fn set_destination(&mut self, addr: Address) {
        self.sync_long_addrs(&addr);
        self.frame_control.insert(FrameControl::HAS_DST);
        self.destination = Some(addr);
    }

    /// Sets the retransmitter address, updating `LONG_ADDRS` to match.
    pub fn set_retransmitter(&mut self, addr: Address) {
        self.sync_long_addrs(&addr);
        self.frame_control.insert(FrameControl::HAS_RETX);
        self.retransmitter = Some(addr);
    }

    /// Clears the retransmitter address.
    pub fn clear_retransmitter(&mut self) {
        self.frame_control.remove(FrameControl::HAS_RETX);
        self.retransmitter = None;
    }

    /// Sets the hop-count and marks the frame as multi-hop.
    pub fn set_hop_count(&mut self, hops: u8) {
        self.frame_control.insert(FrameControl::MULTI_HOP);
        self.hop_count = Some(hops);
    }

    fn sync_long_addrs(&mut self, addr: &Address) {
        if addr.is_long() {
            self.frame_control.insert(FrameControl::LONG_ADDRS);
        } else {
            self.frame_control.remove(FrameControl::LONG_ADDRS);
        }
    }

    /// Returns whether the multi-hop flag is set.
    pub fn is_mhop(&self) -> bool {
        self.frame_control.contains(FrameControl::MULTI_HOP)
    }

    /// Returns whether this frame is addressed to `addr`, or is a broadcast (no destination
    /// present).
    pub fn is_meant_for(&self, addr: Address) -> bool {
        match self.destination {
            None => true,
            Some(dst) => dst == addr,
        }
    }

    /// Returns the source address, if present and in long form.
    pub fn get_sender(&self) -> Option<LinkAddress> {
        match self.source {
            Some(Address::Long(addr)) => Some(addr),
            _ => None,
        }
    }

    /// The frame's payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The frame's hop count, if the multi-hop flag is set.
    pub fn hop_count(&self) -> Option<u8> {
        self.hop_count
    }

    /// Reads a named field of `self`.
    pub fn get_field(&self, name: FieldName) -> Result<FieldValue, Error> {
        match name {
            FieldName::Source => self.source.map(FieldValue::Address).ok_or(Error::UnknownField),
            FieldName::Destination => self
                .destination
                .map(FieldValue::Address)
                .ok_or(Error::UnknownField),
            FieldName::Retransmitter => self
                .retransmitter
                .map(FieldValue::Address)
                .ok_or(Error::UnknownField),
            FieldName::HopCount => self.hop_count.map(FieldValue::HopCount).ok_or(Error::UnknownField),
        }
    }

    /// Writes a named field of `self`.
    pub fn set_field(&mut self, name: FieldName, value: FieldValue) -> Result<(), Error> {
        match (name, value) {
            (FieldName::Source, FieldValue::Address(addr)) => self.set_source(addr),
            (FieldName::Destination, FieldValue::Address(addr)) => self.set_destination(addr),
            (FieldName::Retransmitter, FieldValue::Address(addr)) => self.set_retransmitter(addr),
            (FieldName::HopCount, FieldValue::HopCount(hops)) => self.set_hop_count(hops),
            _ => return Err(Error::UnknownField),
        }
        Ok(())
    }

    /// Parses a frame from `bytes`, including its protocol-id and frame-control header bytes.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(bytes);
        let protocol_id = reader.read_u8().map_err(|_| Error::InvalidFrame)?;
        if protocol_id & PID_IDENT_MASK != PID_IDENT_HEYMAC {
            return Err(Error::InvalidFrame);
        }
        if protocol_id & PID_TYPE_MASK != PID_TYPE_CSMA {
            return Err(Error::InvalidFrame);
        }

        let raw_fctl = reader.read_u8().map_err(|_| Error::InvalidFrame)?;
        let frame_control = FrameControl::from_bits(raw_fctl).ok_or(Error::InvalidFrame)?;
        let long = frame_control.contains(FrameControl::LONG_ADDRS);

        let source = if frame_control.contains(FrameControl::HAS_SRC) {
            Some(Address::parse(&mut reader, long)?)
        } else {
            None
        };
        let destination = if frame_control.contains(FrameControl::HAS_DST) {
            Some(Address::parse(&mut reader, long)?)
        } else {
            None
        };
        let retransmitter = if frame_control.contains(FrameControl::HAS_RETX) {
            Some(Address::parse(&mut reader, long)?)
        } else {
            None
        };
        let hop_count = if frame_control.contains(FrameControl::MULTI_HOP) {
            Some(reader.read_u8().map_err(|_| Error::InvalidFrame)?)
        } else {
            None
        };

        Ok(Frame {
            frame_control,
            source,
            destination,
            retransmitter,
            hop_count,
            payload: reader.read_rest(),
            rx_metadata: None,
        })
    }
}

impl<'a> ToBytes for Frame<'a> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(PID_IDENT_HEYMAC | PID_TYPE_CSMA)?;
        writer.write_u8(self.frame_control.bits())?;
        if let Some(addr) = &self.source {
            addr.to_bytes(writer)?;
        }
        if let Some(addr) = &self.destination {
            addr.to_bytes(writer)?;
        }
        if let Some(addr) = &self.retransmitter {
            addr.to_bytes(writer)?;
        }
        if let Some(hops) = self.hop_count {
            writer.write_u8(hops)?;
        }
        writer.write_slice(self.payload)
    }
}
