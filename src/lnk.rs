//! The hierarchical LNK state machine: lurking → beaconing → linking.
//!
//! Unlike the flat `Standby`/`Advertising`/`Connection` states of a BLE link layer, Heymac's
//! three states nest: beaconing is a child of lurking, and linking is a child of beaconing. A
//! child state does not replace its ancestor's behavior, it adds to it — `linking` still runs the
//! receive pipeline and still re-emits beacons on schedule, on top of its own link-update timer.
//! [`LinkLayer`] models this with an explicit `State` enum and delegation helper methods rather
//! than a generic nested-state framework, since three fixed levels don't need one.

use crate::{
    command::{Associate, Command, CsmaBeacon},
    config::Config,
    dialog::{
        responder::{self, AdmissionPolicy, NetAddressAllocator},
        AssocCallback, DialogEvent, DialogSlot, InitiatorState, ResponderState,
    },
    frame::{Address, Frame, RxMetadata},
    link_address::LinkAddress,
    net::NetIdentifier,
    phy::{Phy, TxTime},
    scheduler::{RxFrame, Signal, MAX_FRAME_LEN},
    time::{Instant, Timer},
};
use heapless::{LinearMap, Vec};

/// This node's current place in the lurk/beacon/link hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Lurking,
    Beaconing,
    Linking,
}

/// What the caller should do after [`LinkLayer::dispatch`] returns: which timers, if any, need
/// to be (re)armed.
///
/// Both timers can be live simultaneously while linking, since linking is beaconing's child and
/// doesn't disarm the beacon timer it inherited — this is the hierarchy's one real consequence
/// for the embedding harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmd {
    pub next_beacon_deadline: Option<Instant>,
    pub next_link_update_deadline: Option<Instant>,
}

/// The Heymac LNK state machine: neighbor table, dialog slots, and the lurk/beacon/link
/// hierarchy built on top of them.
pub struct LinkLayer<C: Config> {
    own: LinkAddress,
    caps: u16,
    timer: C::Timer,
    phy: C::Phy,
    state: State,
    beacon_deadline: Option<Instant>,
    link_update_deadline: Option<Instant>,
    neighbors: crate::neighbor::NeighborTable<C::MaxNeighbors>,
    dialogs: LinearMap<LinkAddress, DialogSlot, C::MaxDialogs>,
    admit: AdmissionPolicy,
    allocate_net_addr: NetAddressAllocator,
}

impl<C: Config> LinkLayer<C> {
    /// Creates a new LNK machine, in the `Lurking` state. Call [`LinkLayer::start`] once to arm
    /// the initial beacon timer.
    pub fn new(
        own: LinkAddress,
        caps: u16,
        timer: C::Timer,
        phy: C::Phy,
        allocate_net_addr: NetAddressAllocator,
    ) -> Self {
        LinkLayer {
            own,
            caps,
            timer,
            phy,
            state: State::Lurking,
            beacon_deadline: None,
            link_update_deadline: None,
            neighbors: crate::neighbor::NeighborTable::new(),
            dialogs: LinearMap::new(),
            admit: responder::accept_unknown_net_id,
            allocate_net_addr,
        }
    }

    /// Overrides the default ("admit any unrecognized net_id") Associate admission policy.
    pub fn set_admission_policy(&mut self, admit: AdmissionPolicy) {
        self.admit = admit;
    }

    /// Applies the recommended default PHY settings and arms the initial lurk timer. Must be
    /// called once before any signal is dispatched.
    pub fn start(&mut self) -> Cmd {
        self.phy.set_default_settings(crate::phy::DEFAULT_SETTINGS);
        self.enter_lurking();
        self.cmd()
    }

    pub fn own_address(&self) -> LinkAddress {
        self.own
    }

    pub fn state_is_linking(&self) -> bool {
        self.state == State::Linking
    }

    fn now(&self) -> Instant {
        self.timer.now()
    }

    fn cmd(&self) -> Cmd {
        Cmd {
            next_beacon_deadline: self.beacon_deadline,
            next_link_update_deadline: self.link_update_deadline,
        }
    }

    fn enter_lurking(&mut self) {
        self.state = State::Lurking;
        self.beacon_deadline = Some(self.now() + C::LURK_PERIOD);
        self.link_update_deadline = None;
    }

    fn enter_beaconing(&mut self) {
        self.state = State::Beaconing;
        self.link_update_deadline = None;
        self.emit_beacon();
        self.beacon_deadline = Some(self.now() + C::BEACON_PERIOD);
    }

    fn enter_linking(&mut self) {
        self.state = State::Linking;
        self.link_update_deadline = Some(self.now() + C::LINK_UPDATE_PERIOD);
    }

    /// Delivers one signal to the machine and returns the timer state the caller should now
    /// maintain.
    pub fn dispatch(&mut self, signal: Signal) -> Cmd {
        match signal {
            Signal::BeaconTimeout => self.on_beacon_timeout(),
            Signal::LinkUpdateTimeout => self.on_link_update_timeout(),
            Signal::RxFromPhy(rx) => self.on_rx_from_phy(rx),
        }
        self.cmd()
    }

    fn on_beacon_timeout(&mut self) {
        match self.state {
            State::Lurking => self.enter_beaconing(),
            State::Beaconing | State::Linking => {
                self.emit_beacon();
                self.beacon_deadline = Some(self.now() + C::BEACON_PERIOD);
            }
        }
    }

    fn on_link_update_timeout(&mut self) {
        if self.state != State::Linking {
            return;
        }
        self.neighbors.update(self.now(), C::NEIGHBOR_STALE);
        if self.neighbors.ngbr_hears_me(self.own) {
            self.link_update_deadline = Some(self.now() + C::LINK_UPDATE_PERIOD);
        } else {
            self.enter_beaconing();
        }
    }

    fn on_rx_from_phy(&mut self, rx: RxFrame) {
        self.receive_pipeline(&rx);

        if self.state == State::Beaconing && self.neighbors.ngbr_hears_me(self.own) {
            self.enter_linking();
        }
    }

    /// Shared across all three states: parse, feed the neighbor table, relay if warranted, and
    /// dispatch to the command handler if this frame is ours.
    fn receive_pipeline(&mut self, rx: &RxFrame) {
        let frame = match Frame::parse(rx.as_slice()) {
            Ok(f) => f.with_rx_metadata(RxMetadata {
                rx_time: rx.rx_time,
                rssi: rx.rssi,
                snr: rx.snr,
            }),
            Err(_) => {
                info!("dropped frame: codec error");
                return;
            }
        };

        self.neighbors.process_frame(&frame, rx.rx_time);
        self.relay_if_needed(&frame);

        if frame.is_meant_for(Address::Long(self.own)) {
            self.command_handler(&frame);
        }
    }

    fn relay_if_needed(&mut self, frame: &Frame<'_>) {
        if !frame.is_mhop() {
            return;
        }
        let hops = match frame.hop_count() {
            Some(h) if h > 1 => h,
            _ => return,
        };
        // Relaying re-stamps the retransmitter with this node's full link address, which only
        // makes sense while the frame's other addresses are in the same (long) form; a
        // short-addressed multi-hop frame would need this node's own net address to relay, which
        // is network-layer state this crate doesn't track.
        if !matches!(
            frame.get_field(crate::frame::FieldName::Source),
            Ok(crate::frame::FieldValue::Address(Address::Long(_)))
        ) {
            info!("dropped multi-hop relay: short-addressed frame");
            return;
        }

        let mut relay = frame.clone();
        relay.set_hop_count(hops - 1);
        relay.set_retransmitter(Address::Long(self.own));

        let mut buf = [0u8; MAX_FRAME_LEN + 8];
        let len = {
            use crate::bytes::{ByteWriter, ToBytes};
            let mut writer = ByteWriter::new(&mut buf);
            if relay.to_bytes(&mut writer).is_err() {
                return;
            }
            buf.len() - writer.space_left()
        };
        self.phy.post_tx_action(TxTime::Now, &[], &buf[..len]);
    }

    fn command_handler(&mut self, frame: &Frame<'_>) {
        let sender = match frame.get_sender() {
            Some(addr) => addr,
            None => return,
        };
        match Command::parse(frame.payload()) {
            // Already folded into the neighbor table by `receive_pipeline`.
            Ok(Command::CsmaBeacon(_)) => {}
            Ok(Command::Associate(assoc)) => self.dispatch_associate(sender, assoc),
            Ok(Command::Text(_)) => {}
            Err(_) => info!("dropped command: codec error"),
        }
    }

    fn dispatch_associate(&mut self, sender: LinkAddress, assoc: Associate) {
        if let Some(slot) = self.dialogs.get_mut(&sender) {
            let cmd = slot.handle_event(DialogEvent::Frame(assoc), self.own, &mut self.phy);
            if cmd.done {
                self.dialogs.remove(&sender);
            }
            return;
        }

        // No slot yet: only a fresh Request is allowed to create one. A stray Accept/Confirm/
        // Reject/Leave with no matching slot is outside the responder dispatch table and is
        // ignored at this layer (spec.md §4.5's dialog lifecycle invariants).
        if let Associate::Request { net_id } = assoc {
            self.start_responder(sender, net_id, assoc);
        }
    }

    fn start_responder(&mut self, sender: LinkAddress, _net_id: NetIdentifier, assoc: Associate) {
        let mut responder = ResponderState::new(
            sender,
            C::ASSOC_RESPONSE_TIMEOUT,
            self.admit,
            self.allocate_net_addr,
            noop_callback,
        );
        let cmd = responder.handle_event(DialogEvent::Frame(assoc), self.own, &mut self.phy);
        if !cmd.done {
            let _ = self.dialogs.insert(sender, DialogSlot::Responder(responder));
        }
    }

    /// Initiates an Associate dialog with `neighbor`, as the next-layer-higher interface
    /// described in spec.md §6. `callback` is invoked exactly once, with the dialog's outcome.
    ///
    /// Associate is the only command family this crate associates a dialog with, so unlike
    /// spec.md's illustrative `start_cmd_dlg(cmd_id, ...)` signature there is no `cmd_id`
    /// parameter to select among dialog kinds.
    pub fn start_cmd_dlg(&mut self, neighbor: LinkAddress, net_id: NetIdentifier, callback: AssocCallback) {
        if self.dialogs.get(&neighbor).is_some() {
            return;
        }
        let mut initiator = InitiatorState::new(
            neighbor,
            net_id,
            C::MAX_RETRIES,
            C::ASSOC_RESPONSE_TIMEOUT,
            callback,
        );
        let cmd = initiator.enter(self.own, &mut self.phy);
        if !cmd.done {
            let _ = self.dialogs.insert(neighbor, DialogSlot::Initiator(initiator));
        }
    }

    fn emit_beacon(&mut self) {
        let mut advertised = Vec::new();
        for addr in self.neighbors.get_ngbrs_lnk_addrs() {
            if advertised.push(addr).is_err() {
                break;
            }
        }
        let beacon = CsmaBeacon {
            caps: self.caps,
            status: 0,
            nets: Vec::new(),
            neighbors: advertised,
        };

        let mut cmd_buf = [0u8; MAX_FRAME_LEN];
        let cmd_len = {
            use crate::bytes::{ByteWriter, ToBytes};
            let mut writer = ByteWriter::new(&mut cmd_buf);
            if Command::CsmaBeacon(beacon).to_bytes(&mut writer).is_err() {
                return;
            }
            cmd_buf.len() - writer.space_left()
        };

        let mut frame = Frame::new(&cmd_buf[..cmd_len]);
        frame.set_source(Address::Long(self.own));

        let mut frame_buf = [0u8; MAX_FRAME_LEN + 16];
        let frame_len = {
            use crate::bytes::{ByteWriter, ToBytes};
            let mut writer = ByteWriter::new(&mut frame_buf);
            if frame.to_bytes(&mut writer).is_err() {
                return;
            }
            frame_buf.len() - writer.space_left()
        };
        self.phy.post_tx_action(TxTime::Now, &[], &frame_buf[..frame_len]);
    }
}

/// Dialog outcome callback used for responder-initiated dialogs, which have no external caller
/// to notify: spec.md's next-layer-higher callback is only meaningful for dialogs *we* started
/// via [`LinkLayer::start_cmd_dlg`].
fn noop_callback(_peer: LinkAddress, _outcome: crate::dialog::AssocOutcome) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytes::{ByteWriter, ToBytes},
        command::Command,
        dialog::AssocOutcome,
        net::NetAddress,
        phy::{PhySetting, RxCallback},
        time::Duration,
    };
    use core::cell::{Cell, RefCell};
    use heapless::consts::{U4, U8};

    struct ManualTimer {
        now: Cell<Instant>,
    }

    impl ManualTimer {
        fn new() -> Self {
            ManualTimer {
                now: Cell::new(Instant::from_raw_micros(0)),
            }
        }

        fn advance(&self, d: Duration) {
            self.now.set(self.now.get() + d);
        }
    }

    impl Timer for ManualTimer {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }

    type U64 = heapless::consts::U64;

    struct RecordingPhy {
        sent: RefCell<Vec<Vec<u8, U64>, U8>>,
    }

    impl RecordingPhy {
        fn new() -> Self {
            RecordingPhy {
                sent: RefCell::new(Vec::new()),
            }
        }

        fn last(&self) -> Vec<u8, U64> {
            self.sent.borrow().last().cloned().unwrap()
        }

        fn count(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl Phy for RecordingPhy {
        fn set_default_settings(&mut self, _settings: &[PhySetting]) {}
        fn set_default_rx_callback(&mut self, _callback: RxCallback) {}
        fn post_tx_action(&mut self, _when: TxTime, _settings_override: &[PhySetting], bytes: &[u8]) {
            let mut buf = Vec::new();
            let _ = buf.extend_from_slice(bytes);
            let _ = self.sent.borrow_mut().push(buf);
        }
        fn start_stack(&mut self, _priority: crate::phy::Priority) {}
    }

    struct TestConfig;

    impl Config for TestConfig {
        type Timer = ManualTimer;
        type Phy = RecordingPhy;
        type MaxNeighbors = U4;
        type MaxDialogs = U4;
    }

    fn no_alloc(_requester: LinkAddress) -> NetAddress {
        NetAddress(0)
    }

    fn new_layer() -> LinkLayer<TestConfig> {
        LinkLayer::new(
            LinkAddress::new([1; 8]),
            0,
            ManualTimer::new(),
            RecordingPhy::new(),
            no_alloc,
        )
    }

    fn beacon_frame_bytes(buf: &mut [u8], from: LinkAddress, neighbors: &[LinkAddress]) -> usize {
        let mut ngbrs = Vec::new();
        for addr in neighbors {
            ngbrs.push(*addr).unwrap();
        }
        let beacon = CsmaBeacon {
            caps: 0,
            status: 0,
            nets: Vec::new(),
            neighbors: ngbrs,
        };
        let mut cmd_buf = [0u8; 64];
        let cmd_len = {
            let mut w = ByteWriter::new(&mut cmd_buf);
            Command::CsmaBeacon(beacon).to_bytes(&mut w).unwrap();
            64 - w.space_left()
        };
        let mut frame = Frame::new(&cmd_buf[..cmd_len]);
        frame.set_source(Address::Long(from));
        let mut w = ByteWriter::new(buf);
        frame.to_bytes(&mut w).unwrap();
        buf.len() - w.space_left()
    }

    #[test]
    fn lurking_arms_timer_then_beacons_on_timeout() {
        let mut layer = new_layer();
        let cmd = layer.start();
        assert!(cmd.next_beacon_deadline.is_some());
        assert!(cmd.next_link_update_deadline.is_none());
        assert_eq!(layer.phy.count(), 0);

        let cmd = layer.dispatch(Signal::BeaconTimeout);
        // Entering Beaconing emits a beacon immediately.
        assert_eq!(layer.phy.count(), 1);
        assert!(cmd.next_beacon_deadline.is_some());
        assert!(!layer.state_is_linking());
    }

    #[test]
    fn beaconing_to_linking_when_neighbor_hears_us() {
        let mut layer = new_layer();
        layer.start();
        layer.dispatch(Signal::BeaconTimeout); // now Beaconing

        let own = layer.own_address();
        let neighbor = LinkAddress::new([2; 8]);
        let mut buf = [0u8; 128];
        let len = beacon_frame_bytes(&mut buf, neighbor, &[own]);

        let rx = RxFrame::new(Instant::from_raw_micros(0), &buf[..len], -42, 7);
        layer.dispatch(Signal::RxFromPhy(rx));

        assert!(layer.state_is_linking());
    }

    #[test]
    fn linking_falls_back_to_beaconing_once_neighbor_goes_stale() {
        let mut layer = new_layer();
        layer.start();
        layer.dispatch(Signal::BeaconTimeout);

        let own = layer.own_address();
        let neighbor = LinkAddress::new([2; 8]);
        let mut buf = [0u8; 128];
        let len = beacon_frame_bytes(&mut buf, neighbor, &[own]);
        let rx = RxFrame::new(Instant::from_raw_micros(0), &buf[..len], -42, 7);
        layer.dispatch(Signal::RxFromPhy(rx));
        assert!(layer.state_is_linking());

        layer.timer.advance(TestConfig::NEIGHBOR_STALE + Duration::from_secs(1));
        layer.dispatch(Signal::LinkUpdateTimeout);

        assert!(!layer.state_is_linking());
    }

    #[test]
    fn multi_hop_frame_is_relayed_with_decremented_hop_count() {
        let mut layer = new_layer();
        layer.start();

        let sender = LinkAddress::new([9; 8]);
        let payload = [0xaau8, 0xbb];
        let mut frame = Frame::new(&payload);
        frame.set_source(Address::Long(sender));
        frame.set_hop_count(3);

        let mut buf = [0u8; 64];
        let len = {
            let mut w = ByteWriter::new(&mut buf);
            frame.to_bytes(&mut w).unwrap();
            64 - w.space_left()
        };

        let rx = RxFrame::new(Instant::from_raw_micros(0), &buf[..len], -10, 5);
        layer.dispatch(Signal::RxFromPhy(rx));

        assert_eq!(layer.phy.count(), 1);
        let relayed = layer.phy.last();
        let parsed = Frame::parse(&relayed).unwrap();
        assert_eq!(parsed.hop_count(), Some(2));
        assert_eq!(parsed.get_field(crate::frame::FieldName::Retransmitter), Ok(
            crate::frame::FieldValue::Address(Address::Long(layer.own_address()))
        ));
    }

    #[test]
    fn incoming_associate_request_gets_a_responder_slot_and_is_accepted() {
        let mut layer = new_layer();
        layer.start();

        let sender = LinkAddress::new([3; 8]);
        let mut cmd_buf = [0u8; 16];
        let cmd_len = {
            let mut w = ByteWriter::new(&mut cmd_buf);
            Command::Associate(Associate::Request {
                net_id: NetIdentifier(0x0102),
            })
            .to_bytes(&mut w)
            .unwrap();
            16 - w.space_left()
        };
        let mut frame = Frame::new(&cmd_buf[..cmd_len]);
        frame.set_source(Address::Long(sender));
        frame.set_destination(Address::Long(layer.own_address()));

        let mut buf = [0u8; 32];
        let len = {
            let mut w = ByteWriter::new(&mut buf);
            frame.to_bytes(&mut w).unwrap();
            32 - w.space_left()
        };

        let rx = RxFrame::new(Instant::from_raw_micros(0), &buf[..len], -5, 3);
        layer.dispatch(Signal::RxFromPhy(rx));

        assert_eq!(layer.dialogs.len(), 1);
        assert_eq!(layer.phy.count(), 1);
        let sent = layer.phy.last();
        let reply = Frame::parse(&sent).unwrap();
        let accept = Command::parse(reply.payload()).unwrap();
        assert!(matches!(accept, Command::Associate(Associate::Accept { .. })));
    }

    #[test]
    fn start_cmd_dlg_reports_outcome_through_callback() {
        std::thread_local! {
            static OUTCOME: RefCell<Option<(LinkAddress, AssocOutcome)>> = RefCell::new(None);
        }
        fn record(addr: LinkAddress, outcome: AssocOutcome) {
            OUTCOME.with(|cell| *cell.borrow_mut() = Some((addr, outcome)));
        }

        let mut layer = new_layer();
        layer.start();

        let neighbor = LinkAddress::new([4; 8]);
        layer.start_cmd_dlg(neighbor, NetIdentifier(0x0001), record);
        assert_eq!(layer.dialogs.len(), 1);
        assert_eq!(layer.phy.count(), 1); // AssocRequest sent

        layer.dispatch_associate(
            neighbor,
            Associate::Accept {
                net_id: NetIdentifier(0x0001),
                net_addr: NetAddress(0x00bb),
            },
        );

        assert_eq!(layer.dialogs.len(), 0);
        assert_eq!(
            OUTCOME.with(|cell| *cell.borrow()),
            Some((neighbor, AssocOutcome::Associated { net_addr: NetAddress(0x00bb) }))
        );
    }
}
