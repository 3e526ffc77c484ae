//! The Associate responder: the node replying to a handshake the peer started.

use super::{send_associate, AssocCallback, AssocOutcome, DialogCmd, DialogEvent};
use crate::{
    command::Associate,
    link_address::LinkAddress,
    net::{NetAddress, NetIdentifier},
    phy::Phy,
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Offered,
    Done,
}

/// Decides whether to admit an `AssocRequest`. Kept as a plain function pointer for the same
/// reason [`AssocCallback`] is: dialog slots live in a fixed, homogeneous `heapless` map, which
/// rules out a per-dialog boxed trait object in a `no_std` crate without an allocator.
///
/// Called with the requester and the net it asked to join; returns whether to admit it.
pub type AdmissionPolicy = fn(LinkAddress, NetIdentifier) -> bool;

/// The default admission policy spec.md recommends: admit any request whose `net_id` this node
/// doesn't already have an opinion about.
pub fn accept_unknown_net_id(_requester: LinkAddress, _net_id: NetIdentifier) -> bool {
    true
}

/// Assigns a net address to a newly-admitted neighbor. Supplied by the caller (typically the LNK
/// machine, backed by whatever address-pool scheme the network layer above it uses); this crate
/// has no address-allocation policy of its own.
pub type NetAddressAllocator = fn(LinkAddress) -> NetAddress;

/// Drives one neighbor through the four-step Associate handshake as the responding side.
#[derive(Debug, Clone)]
pub struct ResponderState {
    peer: LinkAddress,
    state: State,
    offer_timeout: Duration,
    admit: AdmissionPolicy,
    allocate: NetAddressAllocator,
    callback: AssocCallback,
}

impl ResponderState {
    /// Creates a responder dialog for `peer`, idle until its first [`DialogEvent::Frame`].
    pub fn new(
        peer: LinkAddress,
        offer_timeout: Duration,
        admit: AdmissionPolicy,
        allocate: NetAddressAllocator,
        callback: AssocCallback,
    ) -> Self {
        ResponderState {
            peer,
            state: State::Idle,
            offer_timeout,
            admit,
            allocate,
            callback,
        }
    }

    pub fn peer(&self) -> LinkAddress {
        self.peer
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn finish(&mut self, outcome: AssocOutcome) -> DialogCmd {
        self.state = State::Done;
        (self.callback)(self.peer, outcome);
        DialogCmd::done()
    }

    pub fn handle_event<P: Phy>(
        &mut self,
        event: DialogEvent,
        own: LinkAddress,
        phy: &mut P,
    ) -> DialogCmd {
        match (self.state, event) {
            (State::Idle, DialogEvent::Frame(Associate::Request { net_id })) => {
                if (self.admit)(self.peer, net_id) {
                    let net_addr = (self.allocate)(self.peer);
                    send_associate(phy, own, self.peer, Associate::Accept { net_id, net_addr });
                    self.state = State::Offered;
                    DialogCmd::waiting(self.offer_timeout)
                } else {
                    send_associate(phy, own, self.peer, Associate::Reject);
                    self.finish(AssocOutcome::Rejected)
                }
            }
            // AssocConfirm acknowledges the offer; there's no further reply to send, so
            // `confirmed` and `done` collapse the same way the initiator's
            // `awaiting_confirm_ack` does.
            (State::Offered, DialogEvent::Frame(Associate::Confirm { net_addr, .. })) => {
                self.finish(AssocOutcome::Associated { net_addr })
            }
            (State::Offered, DialogEvent::Timeout) => self.finish(AssocOutcome::TimedOut),
            (_, DialogEvent::Frame(Associate::Leave)) => self.finish(AssocOutcome::Left),
            _ => DialogCmd {
                next_timeout: None,
                done: self.is_done(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{Phy, PhySetting, RxCallback, TxTime};
    use core::cell::RefCell;

    struct RecordingPhy {
        sent: RefCell<heapless::Vec<heapless::Vec<u8, heapless::consts::U32>, heapless::consts::U8>>,
    }

    impl RecordingPhy {
        fn new() -> Self {
            RecordingPhy {
                sent: RefCell::new(heapless::Vec::new()),
            }
        }
    }

    impl Phy for RecordingPhy {
        fn set_default_settings(&mut self, _settings: &[PhySetting]) {}
        fn set_default_rx_callback(&mut self, _callback: RxCallback) {}
        fn post_tx_action(&mut self, _when: TxTime, _settings_override: &[PhySetting], bytes: &[u8]) {
            let mut buf = heapless::Vec::new();
            let _ = buf.extend_from_slice(bytes);
            let _ = self.sent.borrow_mut().push(buf);
        }
        fn start_stack(&mut self, _priority: crate::phy::Priority) {}
    }

    std::thread_local! {
        static LAST_OUTCOME: RefCell<Option<(LinkAddress, AssocOutcome)>> = RefCell::new(None);
    }

    fn record_outcome(addr: LinkAddress, outcome: AssocOutcome) {
        LAST_OUTCOME.with(|cell| *cell.borrow_mut() = Some((addr, outcome)));
    }

    fn last_outcome() -> Option<(LinkAddress, AssocOutcome)> {
        LAST_OUTCOME.with(|cell| *cell.borrow())
    }

    fn allocate(_requester: LinkAddress) -> NetAddress {
        NetAddress(0x00aa)
    }

    fn reject_all(_requester: LinkAddress, _net_id: NetIdentifier) -> bool {
        false
    }

    #[test]
    fn admits_and_confirms() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut responder = ResponderState::new(
            peer,
            Duration::from_secs(4),
            accept_unknown_net_id,
            allocate,
            record_outcome,
        );

        let cmd = responder.handle_event(
            DialogEvent::Frame(Associate::Request {
                net_id: NetIdentifier(0x0102),
            }),
            own,
            &mut phy,
        );
        assert!(!cmd.done);
        assert_eq!(phy.sent.borrow().len(), 1);

        let cmd = responder.handle_event(
            DialogEvent::Frame(Associate::Confirm {
                net_id: NetIdentifier(0x0102),
                net_addr: NetAddress(0x00aa),
            }),
            own,
            &mut phy,
        );
        assert!(cmd.done);
        assert_eq!(
            last_outcome(),
            Some((peer, AssocOutcome::Associated { net_addr: NetAddress(0x00aa) }))
        );
    }

    #[test]
    fn declines_when_policy_rejects() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut responder = ResponderState::new(
            peer,
            Duration::from_secs(4),
            reject_all,
            allocate,
            record_outcome,
        );

        let cmd = responder.handle_event(
            DialogEvent::Frame(Associate::Request {
                net_id: NetIdentifier(0x0102),
            }),
            own,
            &mut phy,
        );
        assert!(cmd.done);
        assert_eq!(last_outcome(), Some((peer, AssocOutcome::Rejected)));
    }

    #[test]
    fn offer_timeout_frees_slot() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut responder = ResponderState::new(
            peer,
            Duration::from_secs(4),
            accept_unknown_net_id,
            allocate,
            record_outcome,
        );
        responder.handle_event(
            DialogEvent::Frame(Associate::Request {
                net_id: NetIdentifier(0x0102),
            }),
            own,
            &mut phy,
        );

        let cmd = responder.handle_event(DialogEvent::Timeout, own, &mut phy);
        assert!(cmd.done);
        assert_eq!(last_outcome(), Some((peer, AssocOutcome::TimedOut)));
    }

    #[test]
    fn leave_tears_down_an_existing_association() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut responder = ResponderState::new(
            peer,
            Duration::from_secs(4),
            accept_unknown_net_id,
            allocate,
            record_outcome,
        );
        responder.handle_event(
            DialogEvent::Frame(Associate::Request {
                net_id: NetIdentifier(0x0102),
            }),
            own,
            &mut phy,
        );

        let cmd = responder.handle_event(DialogEvent::Frame(Associate::Leave), own, &mut phy);
        assert!(cmd.done);
    }
}
