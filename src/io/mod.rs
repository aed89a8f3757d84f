//! The I/O substrate: buffers, readers, writers, connections, channels.
//!
//! Everything here follows one lifecycle ([`OpenState`]) and one suspension
//! discipline: a blocking call parks the current routine, and closing the
//! resource — from any routine or thread — unblocks pending reads with
//! [`crate::Error::EndOfFile`] and fails pending writes. Type-erased boxes
//! let heterogeneous implementations flow through the same accept loops and
//! adapters.

pub mod buffer;
pub mod channel;
pub mod connection;
pub mod local;
pub mod open_state;
pub mod pipe;
pub mod reader;
pub mod server;
pub mod size_declarative;
pub mod writer;

pub use buffer::{BufferSlice, BufferView, Extract, SharedBuffer};
pub use channel::{Channel, ChannelBox, ChannelIdentifier, ChannelIdentifierBox};
pub use connection::{Connection, ConnectionBox};
pub use local::{LocalChannel, LocalServerConnection};
pub use open_state::OpenState;
pub use pipe::{pipe, PipedReader, PipedWriter};
pub use reader::{read_exactly, Reader, ReaderBox};
pub use server::{ChannelServer, ServerConnection, ServerConnectionBox};
pub use size_declarative::{frame_channel, SizeDeclarativeReader, SizeDeclarativeWriter};
pub use writer::{Writer, WriterBox};
