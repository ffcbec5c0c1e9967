//! TCP dialing.

use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Open a TCP connection to `addr`.
///
/// `TCP_NODELAY` is set so the ClientHello goes out as soon as it is written
/// and the post-ClientHello delay starts from an actual transmission.
pub async fn dial(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::connection(addr, e))?;
    stream
        .set_nodelay(true)
        .map_err(|e| Error::connection(addr, e))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let stream = dial(addr).await.unwrap();
        assert!(stream.nodelay().unwrap());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match dial(addr).await {
            Err(Error::Connection { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
