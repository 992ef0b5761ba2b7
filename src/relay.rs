use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::try_join;
use tokio::io::{copy, split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::pin;

use crate::manager::TransportManager;
use crate::socks5;

/// Connect two streams. Each direction shuts down its destination once the
/// source reaches end-of-stream, so closure propagates to the other side;
/// both pumps are joined before either endpoint is released.
pub async fn connect_tcp(
    t1: impl AsyncRead + AsyncWrite,
    t2: impl AsyncRead + AsyncWrite,
) -> io::Result<()> {
    let (mut read_1, mut write_1) = split(t1);
    let (mut read_2, mut write_2) = split(t2);

    let fut1 = async {
        let r = copy(&mut read_1, &mut write_2).await;
        write_2.shutdown().await?;
        r
    };
    let fut2 = async {
        let r = copy(&mut read_2, &mut write_1).await;
        write_1.shutdown().await?;
        r
    };

    pin!(fut1, fut2);

    try_join(fut1, fut2).await?;

    Ok(())
}

/// Serves one accepted connection: SOCKS5 handshake, dial the rendezvous
/// transport, then pump bytes both ways until either side closes. A failed
/// dial counts toward CDN rotation; the connection itself is not retried.
pub async fn handle(mut local: TcpStream, manager: Arc<TransportManager>) -> Result<()> {
    socks5::handshake(&mut local).await?;

    let transport = manager.current()?;
    let remote = match transport.dial().await {
        Ok(remote) => remote,
        Err(e) => {
            manager.record_failure();
            return Err(e.context("rendezvous dial"));
        }
    };
    manager.record_success();

    connect_tcp(local, remote)
        .await
        .context("connection reset by peer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn pumps_both_directions() {
        let (mut a_near, a_far) = duplex(64);
        let (mut b_near, b_far) = duplex(64);
        let pump = tokio::spawn(connect_tcp(a_far, b_far));

        a_near.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b_near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        b_near.write_all(b"pong").await.unwrap();
        a_near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(a_near);
        drop(b_near);
        pump.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closing_one_side_closes_the_other() {
        let (a_near, a_far) = duplex(64);
        let (mut b_near, b_far) = duplex(64);
        let pump = tokio::spawn(connect_tcp(a_far, b_far));

        drop(a_near);
        let mut buf = Vec::new();
        b_near.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
        drop(b_near);
        pump.await.unwrap().unwrap();
    }
}
