//! The neighbor table: a record of every node heard directly on the link.

use crate::{
    command::{Command, CsmaBeacon},
    frame::Frame,
    link_address::LinkAddress,
    time::{Duration, Instant},
};
use heapless::{ArrayLength, LinearMap, Vec};

/// Maximum number of neighbors a single entry's beacon may advertise as *its* neighbors.
///
/// Bounds the codec-independent copy kept in [`NeighborEntry::advertised_neighbors`]; unrelated to
/// [`crate::command::MaxBeaconNeighbors`], which bounds a single wire beacon.
pub type MaxAdvertisedNeighbors = heapless::consts::U32;

/// What is known about one neighbor, built up from the frames it has sent.
///
/// Created on the first valid frame received from a previously unknown source; updated on every
/// subsequent frame from that source; pruned by [`NeighborTable::update`] after
/// [`crate::config::Config::NEIGHBOR_STALE`] of silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub link_address: LinkAddress,
    pub capabilities: u16,
    pub status: u16,
    pub last_heard: Instant,
    pub last_rssi: i16,
    pub last_snr: i8,
    pub advertised_neighbors: Vec<LinkAddress, MaxAdvertisedNeighbors>,
}

impl NeighborEntry {
    fn touch(&mut self, now: Instant, rssi: i16, snr: i8) {
        self.last_heard = now;
        self.last_rssi = rssi;
        self.last_snr = snr;
    }
}

/// The set of neighbors this node has directly heard, keyed by link address.
///
/// Backed by `heapless::LinearMap` (an O(n) linear-scan map with no hashing requirement),
/// appropriate given the small table sizes (tens of entries at most) this protocol targets.
pub struct NeighborTable<N: ArrayLength<(LinkAddress, NeighborEntry)>> {
    entries: LinearMap<LinkAddress, NeighborEntry, N>,
}

impl<N: ArrayLength<(LinkAddress, NeighborEntry)>> NeighborTable<N> {
    /// Creates an empty neighbor table.
    pub fn new() -> Self {
        NeighborTable {
            entries: LinearMap::new(),
        }
    }

    /// Updates the source's entry (creating it if absent) from a received frame: stamps
    /// last-heard time, RSSI, and SNR; if the frame carried a `CsmaBeacon`, also replaces the
    /// advertised-neighbors set and capabilities/status.
    ///
    /// Does nothing if the frame has no (long-form) source address, or if the table is full and
    /// the source is unknown.
    pub fn process_frame(&mut self, frame: &Frame<'_>, now: Instant) {
        let source = match frame.get_sender() {
            Some(addr) => addr,
            None => return,
        };
        let meta = frame.rx_metadata();
        let (rssi, snr) = meta.map(|m| (m.rssi, m.snr)).unwrap_or((0, 0));

        if let Some(entry) = self.entries.get_mut(&source) {
            entry.touch(now, rssi, snr);
            if let Ok(Command::CsmaBeacon(beacon)) = Command::parse(frame.payload()) {
                Self::apply_beacon(entry, &beacon);
            }
            return;
        }

        let mut entry = NeighborEntry {
            link_address: source,
            capabilities: 0,
            status: 0,
            last_heard: now,
            last_rssi: rssi,
            last_snr: snr,
            advertised_neighbors: Vec::new(),
        };
        if let Ok(Command::CsmaBeacon(beacon)) = Command::parse(frame.payload()) {
            Self::apply_beacon(&mut entry, &beacon);
        }
        // A full table silently ignores new neighbors rather than evicting an existing one;
        // `update()` is what makes room, by pruning stale entries.
        let _ = self.entries.insert(source, entry);
    }

    fn apply_beacon(entry: &mut NeighborEntry, beacon: &CsmaBeacon) {
        entry.capabilities = beacon.caps;
        entry.status = beacon.status;
        entry.advertised_neighbors.clear();
        for addr in &beacon.neighbors {
            let _ = entry.advertised_neighbors.push(*addr);
        }
    }

    /// Returns whether any neighbor has advertised `me` among its neighbors — i.e. whether this
    /// node is known to be heard by at least one neighbor.
    pub fn ngbr_hears_me(&self, me: LinkAddress) -> bool {
        self.entries
            .values()
            .any(|entry| entry.advertised_neighbors.iter().any(|addr| *addr == me))
    }

    /// Returns the current neighbor link addresses, for inclusion in an outbound beacon.
    pub fn get_ngbrs_lnk_addrs(&self) -> impl Iterator<Item = LinkAddress> + '_ {
        self.entries.keys().copied()
    }

    /// Prunes entries that have been silent for longer than `stale_interval`. Idempotent.
    pub fn update(&mut self, now: Instant, stale_interval: Duration) {
        let stale: Vec<LinkAddress, N> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_heard) > stale_interval)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in stale {
            self.entries.remove(&addr);
        }
    }

    /// Returns the entry for `addr`, if known.
    pub fn get(&self, addr: LinkAddress) -> Option<&NeighborEntry> {
        self.entries.get(&addr)
    }

    /// Returns the number of neighbors currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Address;
    use heapless::consts::U4;

    fn frame_from<'a>(addr: LinkAddress, payload: &'a [u8]) -> Frame<'a> {
        let mut frame = Frame::new(payload);
        frame.set_source(Address::Long(addr));
        frame
    }

    #[test]
    fn process_frame_creates_and_touches_entry() {
        let mut table: NeighborTable<U4> = NeighborTable::new();
        let a = LinkAddress::new([1; 8]);
        let frame = frame_from(a, &[]);
        table.process_frame(&frame, Instant::from_raw_micros(0));
        assert_eq!(table.len(), 1);
        assert!(table.get(a).is_some());

        table.process_frame(&frame, Instant::from_raw_micros(5_000_000));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(a).unwrap().last_heard.raw_micros(),
            5_000_000
        );
    }

    #[test]
    fn ngbr_hears_me_reflects_advertised_set() {
        let mut table: NeighborTable<U4> = NeighborTable::new();
        let me = LinkAddress::new([1; 8]);
        let neighbor = LinkAddress::new([2; 8]);

        let mut neighbors = Vec::new();
        neighbors.push(me).unwrap();
        let beacon = crate::command::CsmaBeacon {
            caps: 0,
            status: 0,
            nets: Vec::new(),
            neighbors,
        };
        let mut buf = [0u8; 32];
        let len = {
            use crate::bytes::ByteWriter;
            let mut w = ByteWriter::new(&mut buf);
            crate::bytes::ToBytes::to_bytes(&Command::CsmaBeacon(beacon), &mut w).unwrap();
            32 - w.space_left()
        };
        let frame = frame_from(neighbor, &buf[..len]);

        assert!(!table.ngbr_hears_me(me));
        table.process_frame(&frame, Instant::from_raw_micros(0));
        assert!(table.ngbr_hears_me(me));
    }

    #[test]
    fn update_prunes_stale_entries() {
        let mut table: NeighborTable<U4> = NeighborTable::new();
        let a = LinkAddress::new([1; 8]);
        let frame = frame_from(a, &[]);
        table.process_frame(&frame, Instant::from_raw_micros(0));

        table.update(Instant::from_raw_micros(1_000_000), Duration::from_secs(128));
        assert_eq!(table.len(), 1);

        table.update(
            Instant::from_raw_micros(200_000_000),
            Duration::from_secs(128),
        );
        assert_eq!(table.len(), 0);
    }
}
