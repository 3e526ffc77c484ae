//! Network-layer identifiers carried (but not interpreted) by the link layer.

use core::fmt;

/// A 16-bit network ID.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetIdentifier(pub u16);

impl fmt::Debug for NetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetIdentifier({:#06x})", self.0)
    }
}

/// A 16-bit short network-layer address, assigned to a node by a network during association.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetAddress(pub u16);

impl fmt::Debug for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddress({:#06x})", self.0)
    }
}
