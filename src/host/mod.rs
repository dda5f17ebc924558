//! Host-facing bridges for driving the runtime from another process.

pub mod stdio;

pub use stdio::{run_bridge, run_stdio_bridge};
