//! PHY boundary: the interface the link layer expects from the radio driver.
//!
//! The PHY itself (SX127x register programming and the like) is out of scope here; this module
//! only defines the trait boundary and the settings/callback types that cross it.

use crate::time::Instant;

/// A single named radio setting.
///
/// This is the Rust-idiomatic tightening of a `(field_name, value)` pair: the fields below are
/// exactly the ones a LoRa-class PHY needs for CSMA operation, so they're a closed enum rather
/// than an open string-keyed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhySetting {
    /// Center frequency, in Hz.
    FrequencyHz(u32),
    /// PA output power, in dBm.
    PowerDbm(i8),
    /// LoRa coding rate denominator (e.g. `6` for 4/6).
    CodingRateDenom(u8),
    /// Channel bandwidth, in Hz.
    BandwidthHz(u32),
    /// LoRa spreading factor (6-12).
    SpreadingFactor(u8),
    /// Whether the hardware CRC is appended to transmitted frames and checked on receive.
    CrcOn(bool),
    /// The sync word used to filter out frames not belonging to this protocol family.
    SyncWord(u8),
    /// Whether the PHY uses explicit (`true`) or implicit header mode.
    ExplicitHeader(bool),
}

/// The recommended default PHY settings for Heymac CSMA operation: 432.550 MHz, 7 dBm via
/// PA_BOOST, explicit header, coding rate 4/6, 250 kHz bandwidth, spreading factor 7, CRC on,
/// sync word `0x48` (ASCII `'H'`).
pub const DEFAULT_SETTINGS: &[PhySetting] = &[
    PhySetting::FrequencyHz(432_550_000),
    PhySetting::PowerDbm(7),
    PhySetting::ExplicitHeader(true),
    PhySetting::CodingRateDenom(6),
    PhySetting::BandwidthHz(250_000),
    PhySetting::SpreadingFactor(7),
    PhySetting::CrcOn(true),
    PhySetting::SyncWord(0x48),
];

/// When a transmit should happen.
///
/// Heymac's CSMA scheme only ever transmits as soon as the channel is clear, so this is currently
/// a single-variant enum rather than a timestamp; it is kept as an enum (instead of inlining `Now`
/// as a unit argument) so a future scheduled-transmit mode doesn't change the `Phy` trait's
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxTime {
    /// Transmit as soon as possible.
    Now,
}

/// Receive callback invoked by the PHY for each valid radio frame: `(rx_time, rx_bytes, rx_rssi,
/// rx_snr)`.
pub type RxCallback = fn(Instant, &[u8], i16, i8);

/// A scheduling priority. Numerically lower means higher priority; priorities must be strictly
/// positive.
pub type Priority = u8;

/// Trait for the radio PHY the link layer drives.
///
/// The PHY is treated as an opaque service: it receives a default-settings vector and a receive
/// callback, accepts transmit requests with per-transmit settings overrides, and invokes the
/// receive callback on each valid radio frame.
pub trait Phy {
    /// Applies the given settings as the PHY's default (non-transmit-specific) configuration.
    fn set_default_settings(&mut self, settings: &[PhySetting]);

    /// Registers the callback invoked whenever the PHY receives a valid frame.
    fn set_default_rx_callback(&mut self, callback: RxCallback);

    /// Requests a transmit of `bytes`, applying `settings_override` just before sending.
    fn post_tx_action(&mut self, when: TxTime, settings_override: &[PhySetting], bytes: &[u8]);

    /// Starts PHY operation at the given scheduling priority.
    fn start_stack(&mut self, priority: Priority);
}
