//! The Associate initiator: the node that starts the handshake.

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
    /// Entered but the first `AssocRequest` hasn't been sent yet (momentary; `new` + `enter`
    /// collapse this in practice, kept as a named state to mirror spec.md's state list).
    Initializing,
    AwaitingAccept,
    Done,
}

/// Drives one neighbor through the four-step Associate handshake as the initiating side.
#[derive(Debug, Clone)]
pub struct InitiatorState {
    peer: LinkAddress,
    net_id: NetIdentifier,
    state: State,
    retries: u8,
    max_retries: u8,
    response_timeout: Duration,
    callback: AssocCallback,
}

impl InitiatorState {
    /// Creates an initiator dialog for `peer`, not yet started. Call [`InitiatorState::enter`]
    /// to send the first `AssocRequest` and arm the response timer.
    pub fn new(
        peer: LinkAddress,
        net_id: NetIdentifier,
        max_retries: u8,
        response_timeout: Duration,
        callback: AssocCallback,
    ) -> Self {
        InitiatorState {
            peer,
            net_id,
            state: State::Initializing,
            retries: 0,
            max_retries,
            response_timeout,
            callback,
        }
    }

    pub fn peer(&self) -> LinkAddress {
        self.peer
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Sends the initial `AssocRequest` and arms the response timer. Must be called once, right
    /// after the slot is created.
    pub fn enter<P: Phy>(&mut self, own: LinkAddress, phy: &mut P) -> DialogCmd {
        self.send_request(own, phy);
        self.state = State::AwaitingAccept;
        DialogCmd::waiting(self.response_timeout)
    }

    fn send_request<P: Phy>(&self, own: LinkAddress, phy: &mut P) {
        send_associate(
            phy,
            own,
            self.peer,
            Associate::Request {
                net_id: self.net_id,
            },
        );
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
            (State::AwaitingAccept, DialogEvent::Frame(Associate::Accept { net_addr, .. })) => {
                // Emit AssocConfirm. The wire protocol has no acknowledgment of Confirm itself,
                // so the "awaiting_confirm_ack" state spec.md names has nothing left to wait for
                // and collapses into `done` in the same step.
                send_associate(phy, own, self.peer, Associate::Confirm {
                    net_id: self.net_id,
                    net_addr,
                });
                self.finish(AssocOutcome::Associated { net_addr })
            }
            (State::AwaitingAccept, DialogEvent::Frame(Associate::Reject)) => {
                self.finish(AssocOutcome::Rejected)
            }
            // A synthetic or peer-sent Leave cancels the dialog outright (spec.md §5's
            // cancellation contract), distinct from an explicit Reject.
            (_, DialogEvent::Frame(Associate::Leave)) => self.finish(AssocOutcome::Left),
            (State::AwaitingAccept, DialogEvent::Timeout) => {
                if self.retries < self.max_retries {
                    self.retries += 1;
                    self.send_request(own, phy);
                    DialogCmd::waiting(self.response_timeout)
                } else {
                    self.finish(AssocOutcome::TimedOut)
                }
            }
            // Any other combination (e.g. a stray Request/Leave/Confirm while awaiting a
            // response, or any event once done) is ignored: the responder dispatch table is
            // what screens commands before they reach a slot at all.
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

    #[test]
    fn successful_handshake_confirms_and_reports_net_addr() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut initiator = InitiatorState::new(
            peer,
            NetIdentifier(0x0102),
            3,
            Duration::from_secs(4),
            record_outcome,
        );

        let cmd = initiator.enter(own, &mut phy);
        assert!(!cmd.done);
        assert_eq!(phy.sent.borrow().len(), 1);

        let cmd = initiator.handle_event(
            DialogEvent::Frame(Associate::Accept {
                net_id: NetIdentifier(0x0102),
                net_addr: NetAddress(0x00aa),
            }),
            own,
            &mut phy,
        );
        assert!(cmd.done);
        assert!(initiator.is_done());
        assert_eq!(phy.sent.borrow().len(), 2);
        assert_eq!(
            last_outcome(),
            Some((peer, AssocOutcome::Associated { net_addr: NetAddress(0x00aa) }))
        );
    }

    #[test]
    fn reject_reports_failure_without_confirm() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut initiator = InitiatorState::new(
            peer,
            NetIdentifier(0x0102),
            3,
            Duration::from_secs(4),
            record_outcome,
        );
        initiator.enter(own, &mut phy);

        let cmd = initiator.handle_event(DialogEvent::Frame(Associate::Reject), own, &mut phy);
        assert!(cmd.done);
        assert_eq!(phy.sent.borrow().len(), 1);
        assert_eq!(last_outcome(), Some((peer, AssocOutcome::Rejected)));
    }

    #[test]
    fn exhausting_retries_times_out() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut initiator =
            InitiatorState::new(peer, NetIdentifier(0x0102), 2, Duration::from_secs(4), record_outcome);
        initiator.enter(own, &mut phy);

        let cmd = initiator.handle_event(DialogEvent::Timeout, own, &mut phy);
        assert!(!cmd.done);
        let cmd = initiator.handle_event(DialogEvent::Timeout, own, &mut phy);
        assert!(!cmd.done);
        let cmd = initiator.handle_event(DialogEvent::Timeout, own, &mut phy);
        assert!(cmd.done);
        assert_eq!(last_outcome(), Some((peer, AssocOutcome::TimedOut)));
        assert_eq!(phy.sent.borrow().len(), 3);
    }

    #[test]
    fn leave_cancels_a_pending_request() {
        let own = LinkAddress::new([1; 8]);
        let peer = LinkAddress::new([2; 8]);
        let mut phy = RecordingPhy::new();
        let mut initiator = InitiatorState::new(
            peer,
            NetIdentifier(0x0102),
            3,
            Duration::from_secs(4),
            record_outcome,
        );
        initiator.enter(own, &mut phy);

        let cmd = initiator.handle_event(DialogEvent::Frame(Associate::Leave), own, &mut phy);
        assert!(cmd.done);
        assert!(initiator.is_done());
        assert_eq!(last_outcome(), Some((peer, AssocOutcome::Left)));
    }
}
