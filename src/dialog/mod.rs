//! Per-neighbor Associate dialogs.
//!
//! For each neighbor link address, at most one dialog state machine is active at a time: either
//! an [`initiator::InitiatorState`] (we started the handshake) or a
//! [`responder::ResponderState`] (the peer did). [`DialogSlot`] unifies the two behind a single
//! type so the LNK machine can keep one `LinkAddress -> DialogSlot` map instead of the two
//! partially-overlapping tables the command handler used to juggle.

pub mod initiator;
pub mod responder;

use crate::{
    bytes::{ByteWriter, ToBytes},
    command::{Associate, Command},
    frame::{Address, Frame},
    link_address::LinkAddress,
    net::NetAddress,
    phy::{Phy, TxTime},
    time::Duration,
};

pub use initiator::InitiatorState;
pub use responder::ResponderState;

/// How a completed (or abandoned) Associate dialog is reported to the next-layer-higher
/// callback registered with [`crate::lnk::LinkLayer::start_cmd_dlg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocOutcome {
    /// The peer accepted the association and we now own `net_addr`.
    Associated { net_addr: NetAddress },
    /// The peer rejected the request.
    Rejected,
    /// The peer (or we) ended an existing or in-progress association via `Leave`.
    Left,
    /// No response was received within `MAX_RETRIES` attempts.
    TimedOut,
}

/// Invoked with the neighbor the dialog was with and its outcome, once the dialog reaches its
/// terminal state. A non-capturing function pointer, in keeping with [`crate::phy::RxCallback`]:
/// the dialog slot map is a fixed, homogeneous `heapless` collection, which rules out a boxed
/// closure in a `no_std` crate without an allocator.
pub type AssocCallback = fn(LinkAddress, AssocOutcome);

/// An event delivered to a dialog state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogEvent {
    /// An `Associate` sub-command addressed to this dialog, already decoded by the command
    /// handler.
    Frame(Associate),
    /// The dialog's response timer expired.
    Timeout,
}

/// Result of delivering an event (or an entry action) to a dialog state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogCmd {
    /// When this dialog's `Timeout` event should next be delivered, if at all. `None` means the
    /// dialog does not need a timer armed right now (for example, immediately after reaching
    /// `done`).
    pub next_timeout: Option<Duration>,
    /// Whether the dialog has reached a terminal state. The LNK machine removes a slot from its
    /// map as soon as this is `true`.
    pub done: bool,
}

impl DialogCmd {
    fn done() -> Self {
        DialogCmd {
            next_timeout: None,
            done: true,
        }
    }

    fn waiting(timeout: Duration) -> Self {
        DialogCmd {
            next_timeout: Some(timeout),
            done: false,
        }
    }
}

/// The state machine occupying one neighbor's dialog slot.
#[derive(Debug, Clone)]
pub enum DialogSlot {
    Initiator(InitiatorState),
    Responder(ResponderState),
}

impl DialogSlot {
    /// The neighbor this dialog concerns.
    pub fn peer(&self) -> LinkAddress {
        match self {
            DialogSlot::Initiator(s) => s.peer(),
            DialogSlot::Responder(s) => s.peer(),
        }
    }

    /// Whether this slot has reached a terminal state and should be dropped from the map.
    pub fn is_done(&self) -> bool {
        match self {
            DialogSlot::Initiator(s) => s.is_done(),
            DialogSlot::Responder(s) => s.is_done(),
        }
    }

    /// Delivers `event` to whichever state machine occupies this slot.
    pub fn handle_event<P: Phy>(
        &mut self,
        event: DialogEvent,
        own: LinkAddress,
        phy: &mut P,
    ) -> DialogCmd {
        match self {
            DialogSlot::Initiator(s) => s.handle_event(event, own, phy),
            DialogSlot::Responder(s) => s.handle_event(event, own, phy),
        }
    }
}

/// Serializes `assoc` into an Associate command, wraps it in a unicast long-address frame from
/// `own` to `peer`, and hands it to the PHY for immediate transmission.
///
/// Associate handshakes always happen before (or are renegotiating) association, so frames here
/// are always long-addressed, same as [`crate::command::mod`]'s beacon frames.
pub(crate) fn send_associate<P: Phy>(phy: &mut P, own: LinkAddress, peer: LinkAddress, assoc: Associate) {
    let mut cmd_buf = [0u8; 16];
    let cmd_len = {
        let mut writer = ByteWriter::new(&mut cmd_buf);
        if Command::Associate(assoc).to_bytes(&mut writer).is_err() {
            return;
        }
        cmd_buf.len() - writer.space_left()
    };

    let mut frame_buf = [0u8; 32];
    let frame_len = {
        let mut frame = Frame::new(&cmd_buf[..cmd_len]);
        frame.set_source(Address::Long(own));
        frame.set_destination(Address::Long(peer));
        let mut writer = ByteWriter::new(&mut frame_buf);
        if frame.to_bytes(&mut writer).is_err() {
            return;
        }
        frame_buf.len() - writer.space_left()
    };

    phy.post_tx_action(TxTime::Now, &[], &frame_buf[..frame_len]);
}
