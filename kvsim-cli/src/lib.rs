// Ambient front-end for the simulator: turns transcript text into a typed
// directive stream, drives a `kvsim_core::Simulator` with it, and renders
// the deterministic textual report the binary writes to stdout.

pub mod directive;
pub mod driver;

pub use driver::run;
