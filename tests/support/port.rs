use std::net::{SocketAddr, TcpListener};

/// Loopback address with a port nobody listens on at the time of the call.
pub fn free_local_addr() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    listener.local_addr()
}
