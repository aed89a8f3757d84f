//! Socket transports over the readiness reactor.

pub mod reactor;
pub mod tcp;

pub use reactor::Reactor;
pub use tcp::{
    connect, SocketIdentifier, TcpServerSocket, TcpSocketChannel, TcpSocketOptions,
};
