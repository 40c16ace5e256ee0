// LogSift - lib.rs
//
// Library entry point. The CLI in `main.rs` is a thin layer over these
// modules; integration tests and embedders use them directly.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
