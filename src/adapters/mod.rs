// Adapters layer: concrete links that carry the ASCII protocols (serial, TCP,
// GPIB bridge) plus the scripted stand-in used by tests.

pub mod ascii;
pub mod mock;
pub mod prologix;
pub mod serial;
pub mod tcp;

pub use ascii::{AsciiLink, Framing};
pub use mock::MockLink;
pub use prologix::PrologixLink;
pub use serial::{open_serial, open_serial_stream};
pub use tcp::{connect_tcp, connect_tcp_stream};
