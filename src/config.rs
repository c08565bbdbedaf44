//! Runtime-overridable configuration knobs. Defaults match the documented
//! values; callers may override any subset from an INI-style file using the same
//! `ini_core` parser this codebase already depends on for structured file
//! parsing (there repurposed from object-dictionary descriptions to this
//! flat key/value form).

use ini_core as ini;

use crate::prelude::*;

pub const DEFAULT_MAX_IMAGE_BYTES: u32 = 512 * 1024;
pub const DEFAULT_MAX_CHUNK_BYTES: u32 = 256;
/// Interactive-testing default; see `sdo_timeout_us_conservative` for the
/// slow-flash-write alternative.
pub const DEFAULT_SDO_TIMEOUT_US: u32 = 60_000;
pub const SDO_TIMEOUT_US_CONSERVATIVE: u32 = 1_000_000;
pub const DEFAULT_SDO_POLL_US: u32 = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_image_bytes: u32,
    pub max_chunk_bytes: u32,
    pub sdo_timeout_us: u32,
    pub sdo_poll_us: u32,
    pub bitrate_kbps: u32,
    pub own_node_id: u8,
    pub target_node_id: u8,
    pub target_bank: u8,
    pub firmware_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            sdo_timeout_us: DEFAULT_SDO_TIMEOUT_US,
            sdo_poll_us: DEFAULT_SDO_POLL_US,
            bitrate_kbps: 500,
            own_node_id: 1,
            target_node_id: 2,
            target_bank: 0,
            firmware_path: String::new(),
        }
    }
}

impl Config {
    /// Parses an INI file with a single `[transfer]` section; unrecognized
    /// keys are ignored, missing keys keep their `Default` value.
    pub fn load_from_content(content: &str) -> Self {
        let mut cfg = Config::default();
        let mut in_transfer_section = false;

        for item in ini::Parser::new(content) {
            match item {
                ini::Item::Section(name) => {
                    in_transfer_section = name.eq_ignore_ascii_case("transfer");
                }
                ini::Item::Property(key, maybe_value) => {
                    if !in_transfer_section {
                        continue;
                    }
                    let Some(value) = maybe_value else { continue };
                    cfg.apply(key, value);
                }
                _ => {}
            }
        }
        cfg
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "max_image_bytes" => self.max_image_bytes = value.parse().unwrap_or(self.max_image_bytes),
            "max_chunk_bytes" => self.max_chunk_bytes = value.parse().unwrap_or(self.max_chunk_bytes),
            "sdo_timeout_us" => self.sdo_timeout_us = value.parse().unwrap_or(self.sdo_timeout_us),
            "sdo_poll_us" => self.sdo_poll_us = value.parse().unwrap_or(self.sdo_poll_us),
            "bitrate_kbps" => self.bitrate_kbps = value.parse().unwrap_or(self.bitrate_kbps),
            "own_node_id" => self.own_node_id = value.parse().unwrap_or(self.own_node_id),
            "target_node_id" => self.target_node_id = value.parse().unwrap_or(self.target_node_id),
            "target_bank" => self.target_bank = value.parse().unwrap_or(self.target_bank),
            "firmware_path" => self.firmware_path = value.to_string(),
            _ => {}
        }
    }

    /// Switches this config to the conservative (slow-flash-safe) timeout.
    pub fn with_conservative_timeout(mut self) -> Self {
        self.sdo_timeout_us = SDO_TIMEOUT_US_CONSERVATIVE;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.max_image_bytes, 512 * 1024);
        assert_eq!(cfg.max_chunk_bytes, 256);
        assert_eq!(cfg.sdo_timeout_us, 60_000);
        assert_eq!(cfg.sdo_poll_us, 1_000);
    }

    #[test]
    fn overrides_from_ini_content() {
        let cfg = Config::load_from_content(
            "[transfer]\nmax_chunk_bytes=64\ntarget_node_id=5\nfirmware_path=/tmp/app.bin\n",
        );
        assert_eq!(cfg.max_chunk_bytes, 64);
        assert_eq!(cfg.target_node_id, 5);
        assert_eq!(cfg.firmware_path, "/tmp/app.bin");
        // Untouched keys keep their defaults.
        assert_eq!(cfg.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }

    #[test]
    fn properties_outside_transfer_section_are_ignored() {
        let cfg = Config::load_from_content("[other]\nmax_chunk_bytes=1\n");
        assert_eq!(cfg.max_chunk_bytes, DEFAULT_MAX_CHUNK_BYTES);
    }

    #[test]
    fn conservative_timeout_override() {
        let cfg = Config::default().with_conservative_timeout();
        assert_eq!(cfg.sdo_timeout_us, SDO_TIMEOUT_US_CONSERVATIVE);
    }
}
