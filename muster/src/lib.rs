pub mod client;
pub mod error;
pub mod net;
pub mod probe;

pub use client::DirectoryClient;
pub use error::QueryError;

/// The environment variable naming the default directory-service pool used
/// when a client is constructed without an explicit pool.
pub const POOL_ENV: &str = "MUSTER_POOL";

/// The port a pool listens on when the pool name does not carry one.
pub const DEFAULT_PORT: u16 = 5525;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    Udp,
    Tcp,
}
