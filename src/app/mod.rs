// LogSift - app/mod.rs
//
// Application layer: collection, checkpointing, per-file processing and
// group/run orchestration.
// Dependencies: core layer, util.
// Must NOT depend on: platform specifics.

pub mod checkpoint;
pub mod collect;
pub mod file_processor;
pub mod group;
pub mod pattern_mgr;
pub mod run;
