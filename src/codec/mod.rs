//! ## Wire codec
//!
//! Pure pack/unpack functions over byte buffers (§4.1, §4.7). Nothing in
//! this module touches the transport; it only knows how to turn structured
//! values into double-word-aligned, little-endian byte buffers and back.

pub mod address_change;
pub mod capability;
pub mod device_table;
pub mod notification;
pub mod request;
pub mod response;
pub mod target_config;

/// `pad(x) = (4 - x mod 4) mod 4` (§4.1, §8 invariant 4).
pub(crate) fn pad(len: usize) -> usize {
    (4 - (len % 4)) % 4
}
