//! An implementation of the Heymac CSMA radio mesh protocol's Data Link Layer (LNK).
//!
//! Heymac LNK sits atop a LoRa-class single-channel PHY and below an optional network layer. It
//! is responsible for:
//! * encoding and decoding Heymac commands and frames (the [`command`]/[`frame`] wire codecs),
//! * running the hierarchical Lurking → Beaconing → Linking state machine ([`lnk`]),
//! * maintaining a neighbor table built up from observed beacons ([`neighbor`]),
//! * relaying multi-hop commands, and
//! * driving a per-neighbor association dialog, initiator or responder ([`dialog`]).
//!
//! This crate is runtime and hardware-agnostic: it does not need an RTOS, and the only
//! hardware-specific services it needs are a microsecond-precision [`Timer`] and a [`Phy`] that
//! can transmit frames and report received ones. The PHY itself (SX127x register programming and
//! the like), process entry points, and any network layer above this one are out of scope; see
//! [`phy`] for the boundary this crate expects.
//!
//! [`Timer`]: time::Timer
//! [`Phy`]: phy::Phy

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
pub mod bytes;
pub mod command;
pub mod config;
pub mod dialog;
mod error;
pub mod frame;
pub mod link_address;
pub mod lnk;
pub mod net;
pub mod neighbor;
pub mod phy;
pub mod scheduler;
pub mod time;

pub use self::error::Error;
pub use self::link_address::LinkAddress;
