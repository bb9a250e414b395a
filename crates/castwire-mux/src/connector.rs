use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;

/// Default TCP port of a cast receiver.
pub const DEFAULT_PORT: u16 = 8009;

/// Connect to a receiver over plain TCP with default configuration.
pub async fn connect(addr: impl ToSocketAddrs) -> Result<Connection> {
    connect_with_config(addr, ConnectionConfig::default()).await
}

/// Connect with explicit configuration.
///
/// TLS is left to the caller: wrap the stream yourself and hand it to
/// [`Connection::spawn`].
pub async fn connect_with_config(
    addr: impl ToSocketAddrs,
    config: ConnectionConfig,
) -> Result<Connection> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(castwire_frame::FrameError::from)?;
    stream
        .set_nodelay(true)
        .map_err(castwire_frame::FrameError::from)?;
    if let Ok(peer) = stream.peer_addr() {
        debug!(%peer, "tcp connection established");
    }
    Ok(Connection::spawn(stream, config))
}
