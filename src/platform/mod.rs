// LogSift - platform/mod.rs
//
// Platform layer: config.toml loading, platform directories and the
// file-backed document store.
// Dependencies: core, app settings types, directories crate.

pub mod config;
pub mod json_store;
