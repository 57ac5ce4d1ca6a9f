//! Simulated SAS backend: ports, enclosures and drives a storage stack can
//! be tested against without hardware.
//!
//! [Terminator] ties the device registry to the component tree and adds
//! per-port logout queues, I/O dispatch and device resets on top.

pub mod logging;
pub mod error;
pub mod io;
pub mod port;
mod terminator;

pub use error::TerminatorError;
pub use io::{IoOpcode, IoStatus, TerminatorIo};
pub use port::Port;
pub use terminator::Terminator;
