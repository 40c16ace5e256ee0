// LogSift - core/mod.rs
//
// Core business logic layer: data model, grok matching, derived fields,
// pattern registry, and the document store abstraction.
// Must NOT depend on: app or platform, and must not touch the filesystem.

pub mod derive;
pub mod export;
pub mod grok;
pub mod memory_store;
pub mod model;
pub mod pattern;
pub mod store;
