//! Link layer configuration trait.

use crate::{
    dialog::DialogSlot,
    neighbor::NeighborEntry,
    phy::Phy,
    time::{Duration, Timer},
};
use heapless::ArrayLength;

/// Trait for Heymac LNK stack configurations.
///
/// This trait ties together the hardware-facing types ([`Timer`], [`Phy`]) and the protocol's
/// tunable periods and table capacities. An application supplies one type implementing `Config`
/// and hands it to [`crate::lnk::LinkLayer`].
///
/// Table capacities are associated types rather than plain `usize` consts, following the same
/// `heapless`-backed, compile-time-sized pattern used by [`crate::command::CsmaBeacon`]'s net and
/// neighbor lists; [`Config::max_neighbors`]/[`Config::max_dialogs`] recover the plain number for
/// logging and assertions.
///
/// All other associated consts have defaults matching the recommended values for the 432 MHz ISM
/// band deployment this protocol targets; override them only if a different regulatory
/// environment or traffic pattern demands it.
pub trait Config {
    /// A time source with microsecond resolution.
    type Timer: Timer;

    /// The radio PHY in use.
    type Phy: Phy;

    /// Capacity of the neighbor table. Recommended default: 16.
    type MaxNeighbors: ArrayLength<(crate::link_address::LinkAddress, NeighborEntry)>;

    /// Capacity of the dialog slot map. Recommended default: 8.
    type MaxDialogs: ArrayLength<(crate::link_address::LinkAddress, DialogSlot)>;

    /// How often a node in the Beaconing state emits a beacon.
    const BEACON_PERIOD: Duration = Duration::from_secs(32);

    /// How long a node stays in the Lurking state, listening for beacons before starting to emit
    /// its own.
    const LURK_PERIOD: Duration = Duration::from_secs(64);

    /// How often a node in the Linking state re-evaluates its neighbor table and dialogs.
    const LINK_UPDATE_PERIOD: Duration = Duration::from_secs(4);

    /// How long a neighbor table entry may go without being refreshed before it is considered
    /// stale and evicted.
    const NEIGHBOR_STALE: Duration = Duration::from_secs(128);

    /// Maximum number of retransmissions attempted by a dialog initiator before giving up.
    const MAX_RETRIES: u8 = 3;

    /// How long an Associate initiator waits for a response before retrying (or, after
    /// `MAX_RETRIES`, failing).
    const ASSOC_RESPONSE_TIMEOUT: Duration = Duration::from_secs(4);

    /// Returns `Self::MaxNeighbors` as a plain number, for logging and assertions.
    fn max_neighbors() -> usize {
        <Self::MaxNeighbors as typenum::Unsigned>::to_usize()
    }

    /// Returns `Self::MaxDialogs` as a plain number, for logging and assertions.
    fn max_dialogs() -> usize {
        <Self::MaxDialogs as typenum::Unsigned>::to_usize()
    }
}
