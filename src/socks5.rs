//! Server side of the SOCKS5 negotiation (RFC 1928), reduced to the subset
//! a local cooperative caller needs. The destination address is read and
//! discarded because the relay always dials the fixed rendezvous target, and
//! the command byte is accepted as-is for the same reason.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NOAUTH: u8 = 0x00;

/// Success reply with a zeroed IPv4 bind address and port.
const SUCCESS_REPLY: [u8; 10] = [SOCKS_VERSION, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrType {
    V4,
    Domain,
    V6,
    Unsupported(u8),
}

impl From<u8> for AddrType {
    fn from(b: u8) -> Self {
        match b {
            0x01 => AddrType::V4,
            0x03 => AddrType::Domain,
            0x04 => AddrType::V6,
            other => AddrType::Unsupported(other),
        }
    }
}

/// Runs the whole greeting/request exchange on an accepted connection.
/// Any failure aborts only this connection; a bad version aborts before a
/// single reply byte is written.
pub async fn handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: [VER, NMETHODS, METHODS...]
    let mut head = [0u8; 2];
    stream
        .read_exact(&mut head)
        .await
        .context("socks5 greeting")?;
    if head[0] != SOCKS_VERSION {
        bail!("unsupported socks version {}", head[0]);
    }
    let mut methods = vec![0u8; head[1] as usize];
    stream
        .read_exact(&mut methods)
        .await
        .context("socks5 methods")?;
    stream
        .write_all(&[SOCKS_VERSION, METHOD_NOAUTH])
        .await
        .context("socks5 greeting reply")?;
    stream.flush().await?;

    // Request: [VER, CMD, RSV, ATYP, DST.ADDR, DST.PORT]
    let mut request = [0u8; 4];
    stream
        .read_exact(&mut request)
        .await
        .context("socks5 request header")?;

    let mut skip = [0u8; 18];
    match AddrType::from(request[3]) {
        AddrType::V4 => {
            stream
                .read_exact(&mut skip[..6])
                .await
                .context("socks5 ipv4 addr")?;
        }
        AddrType::Domain => {
            stream
                .read_exact(&mut skip[..1])
                .await
                .context("socks5 domain len")?;
            let mut domain = vec![0u8; skip[0] as usize + 2];
            stream
                .read_exact(&mut domain)
                .await
                .context("socks5 domain addr")?;
        }
        AddrType::V6 => {
            stream
                .read_exact(&mut skip[..18])
                .await
                .context("socks5 ipv6 addr")?;
        }
        AddrType::Unsupported(other) => bail!("unsupported address type {}", other),
    }

    stream
        .write_all(&SUCCESS_REPLY)
        .await
        .context("socks5 connect reply")?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn read_available(client: &mut (impl AsyncRead + Unpin)) -> Vec<u8> {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn accepts_ipv4_connect() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();

        handshake(&mut server).await.unwrap();
        drop(server);

        assert_eq!(
            read_available(&mut client).await,
            vec![0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn accepts_domain_address() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05, 0x02, 0x00, 0x01]).await.unwrap();
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 0x0b];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&[0x01, 0xbb]);
        client.write_all(&request).await.unwrap();

        handshake(&mut server).await.unwrap();
        drop(server);

        assert_eq!(
            read_available(&mut client).await,
            vec![0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn accepts_ipv6_address() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut request = vec![0x05, 0x01, 0x00, 0x04];
        request.extend_from_slice(&[0u8; 18]);
        client.write_all(&request).await.unwrap();

        handshake(&mut server).await.unwrap();
        drop(server);

        assert_eq!(read_available(&mut client).await.len(), 12);
    }

    #[tokio::test]
    async fn command_byte_is_not_validated() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        // CMD 0x02 (BIND) still succeeds since the destination is ignored.
        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();

        handshake(&mut server).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_wrong_version_before_replying() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        assert!(handshake(&mut server).await.is_err());
        drop(server);

        assert!(read_available(&mut client).await.is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_address_type() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00, 0x7f]).await.unwrap();

        assert!(handshake(&mut server).await.is_err());
        drop(server);

        // The method reply went out before the bad address type arrived,
        // but no connect reply follows it.
        assert_eq!(read_available(&mut client).await, vec![0x05, 0x00]);
    }

    #[tokio::test]
    async fn truncated_greeting_fails() {
        let (mut client, mut server) = duplex(256);
        client.write_all(&[0x05]).await.unwrap();
        drop(client);

        assert!(handshake(&mut server).await.is_err());
    }
}
