//! The `Associate` command family: the four-step neighbor association handshake.

use crate::{
    bytes::{ByteReader, ByteWriter, ToBytes},
    net::{NetAddress, NetIdentifier},
    Error,
};

const SUB_REQUEST: u8 = 1;
const SUB_ACCEPT: u8 = 2;
const SUB_CONFIRM: u8 = 3;
const SUB_REJECT: u8 = 4;
const SUB_LEAVE: u8 = 5;

/// A named field of an [`Associate`] command, for the by-name field access surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    NetId,
    NetAddr,
}

/// One of the five sub-commands that make up the association handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associate {
    /// Sent by a node wishing to join a net, to its prospective parent.
    Request { net_id: NetIdentifier },
    /// Sent by the parent, offering the node a net address.
    Accept {
        net_id: NetIdentifier,
        net_addr: NetAddress,
    },
    /// Sent by the joining node, confirming it accepts the offered address.
    Confirm {
        net_id: NetIdentifier,
        net_addr: NetAddress,
    },
    /// Sent by the parent, declining the request.
    Reject,
    /// Sent by either side, terminating an existing association.
    Leave,
}

/// Names an [`Associate`] variant, for the by-name construction contract of spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Accept,
    Confirm,
    Reject,
    Leave,
}

impl Associate {
    /// Builds a variant of `kind` from its named fields.
    ///
    /// A field name absent from `kind`'s set (or, for `Reject`/`Leave`, any field at all) is
    /// `Error::UnknownField`; a required field missing from `fields` is the same error.
    pub fn build(kind: Kind, fields: &[(FieldName, u16)]) -> Result<Self, Error> {
        match kind {
            Kind::Request => {
                Self::reject_extra(fields, &[FieldName::NetId])?;
                Ok(Associate::Request {
                    net_id: NetIdentifier(Self::required(fields, FieldName::NetId)?),
                })
            }
            Kind::Accept => {
                Self::reject_extra(fields, &[FieldName::NetId, FieldName::NetAddr])?;
                Ok(Associate::Accept {
                    net_id: NetIdentifier(Self::required(fields, FieldName::NetId)?),
                    net_addr: NetAddress(Self::required(fields, FieldName::NetAddr)?),
                })
            }
            Kind::Confirm => {
                Self::reject_extra(fields, &[FieldName::NetId, FieldName::NetAddr])?;
                Ok(Associate::Confirm {
                    net_id: NetIdentifier(Self::required(fields, FieldName::NetId)?),
                    net_addr: NetAddress(Self::required(fields, FieldName::NetAddr)?),
                })
            }
            Kind::Reject => {
                Self::reject_extra(fields, &[])?;
                Ok(Associate::Reject)
            }
            Kind::Leave => {
                Self::reject_extra(fields, &[])?;
                Ok(Associate::Leave)
            }
        }
    }

    fn required(fields: &[(FieldName, u16)], name: FieldName) -> Result<u16, Error> {
        fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or(Error::UnknownField)
    }

    fn reject_extra(fields: &[(FieldName, u16)], allowed: &[FieldName]) -> Result<(), Error> {
        for (name, _) in fields {
            if !allowed.contains(name) {
                return Err(Error::UnknownField);
            }
        }
        Ok(())
    }

    pub(crate) fn sub_id(&self) -> u8 {
        match self {
            Associate::Request { .. } => SUB_REQUEST,
            Associate::Accept { .. } => SUB_ACCEPT,
            Associate::Confirm { .. } => SUB_CONFIRM,
            Associate::Reject => SUB_REJECT,
            Associate::Leave => SUB_LEAVE,
        }
    }

    pub(crate) fn parse_body(sub_id: u8, reader: &mut ByteReader<'_>) -> Result<Self, Error> {
        let cmd = match sub_id {
            SUB_REQUEST => {
                let net_id = reader.read_u16_be()?;
                Associate::Request {
                    net_id: NetIdentifier(net_id),
                }
            }
            SUB_ACCEPT => {
                let net_id = reader.read_u16_be()?;
                let net_addr = reader.read_u16_be()?;
                Associate::Accept {
                    net_id: NetIdentifier(net_id),
                    net_addr: NetAddress(net_addr),
                }
            }
            SUB_CONFIRM => {
                let net_id = reader.read_u16_be()?;
                let net_addr = reader.read_u16_be()?;
                Associate::Confirm {
                    net_id: NetIdentifier(net_id),
                    net_addr: NetAddress(net_addr),
                }
            }
            SUB_REJECT => Associate::Reject,
            SUB_LEAVE => Associate::Leave,
            _ => return Err(Error::UnknownSubcommand),
        };

        if !reader.is_empty() {
            return Err(Error::IncorrectSize);
        }

        Ok(cmd)
    }

    pub(crate) fn body_to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.sub_id())?;
        match self {
            Associate::Request { net_id } => writer.write_u16_be(net_id.0),
            Associate::Accept { net_id, net_addr } => {
                writer.write_u16_be(net_id.0)?;
                writer.write_u16_be(net_addr.0)
            }
            Associate::Confirm { net_id, net_addr } => {
                writer.write_u16_be(net_id.0)?;
                writer.write_u16_be(net_addr.0)
            }
            Associate::Reject | Associate::Leave => Ok(()),
        }
    }

    /// Reads a named field of `self`.
    ///
    /// Returns `Error::UnknownField` if the field doesn't exist on this variant (e.g. `NetAddr`
    /// on a `Request`).
    pub fn field(&self, name: FieldName) -> Result<u16, Error> {
        match (self, name) {
            (Associate::Request { net_id }, FieldName::NetId) => Ok(net_id.0),
            (Associate::Accept { net_id, .. }, FieldName::NetId)
            | (Associate::Confirm { net_id, .. }, FieldName::NetId) => Ok(net_id.0),
            (Associate::Accept { net_addr, .. }, FieldName::NetAddr)
            | (Associate::Confirm { net_addr, .. }, FieldName::NetAddr) => Ok(net_addr.0),
            _ => Err(Error::UnknownField),
        }
    }
}
