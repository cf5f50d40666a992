//! Process sandbox: supervised execution with resource caps
//!
//! The supervisor launches one child command as its own process group, pumps
//! its standard streams on helper threads, samples the memory of the whole
//! descendant tree, and classifies how the child terminated.

pub mod memory;
pub mod process;

pub use process::Supervisor;
