#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]

// Needed on every target: the logging macros below format through
// `alloc::format!` regardless of which target's items `prelude` re-exports.
extern crate alloc;

pub mod config;
pub mod constant;
pub mod crc;
pub mod error;
pub mod installer;
pub mod ota;
pub mod transport;
pub mod wire;

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod uploader;

pub mod prelude;
