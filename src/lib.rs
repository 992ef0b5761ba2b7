pub mod cdn;
pub mod client;
pub mod manager;
pub mod relay;
pub mod socks5;
pub mod transport;
pub mod utils;

pub use client::{Client, ClientConfig};
pub use transport::{BoxedStream, Transport, TransportConfig, TransportFactory};
