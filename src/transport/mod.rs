// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory byte-stream transport for the local backend (spec §4.4).
//!
//! The local backend must not hairpin through the kernel: a `listen`
//! hands out a nominal address, and a paired `dial` returns a connected
//! duplex whose reads/writes never touch a socket. The nominal address
//! carries a pass-through marker so tonic's resolver never attempts DNS
//! on it, the same trick a custom `tower::service_fn` connector uses to
//! defeat name resolution when the destination is already decided.

use std::pin::Pin;
use std::task::{Context, Poll};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;

/// Buffer size for each direction of the in-memory duplex.
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// The scheme tonic's resolver is told to never attempt to look up.
pub const PASSTHROUGH_SCHEME: &str = "talos-local";

/// The nominal address local backends dial. Never resolved over DNS;
/// `LocalListener::accept` pairs it with an in-memory duplex instead.
pub fn nominal_address() -> Uri {
    format!("{PASSTHROUGH_SCHEME}://gateway.local").parse().expect("static uri")
}

/// One accepted local connection: readable/writable, `Unpin`, nothing
/// else. Wrapping in `TokioIo` is what makes it satisfy hyper's/tonic's
/// `Connection` bounds, the same `TokioIo::new(..)` wrap used around a
/// `tokio_rustls` client stream.
pub struct LocalStream(DuplexStream);

impl AsyncRead for LocalStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// Hands out one half of a fresh duplex pair per `accept` call; the
/// frontdoor's hyper server loop polls this the same way it would poll
/// a `TcpListener`.
pub struct LocalListener {
    incoming: tokio::sync::mpsc::Receiver<LocalStream>,
}

/// The dialer side; cloned freely, handed to every `Endpoint` built for
/// the local backend via [`local_endpoint`].
#[derive(Clone)]
pub struct LocalDialer {
    outgoing: tokio::sync::mpsc::Sender<LocalStream>,
}

/// Build a connected listener/dialer pair.
pub fn pair() -> (LocalListener, LocalDialer) {
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    (LocalListener { incoming: rx }, LocalDialer { outgoing: tx })
}

impl LocalListener {
    /// Waits for the next dial, returning its server-side half.
    pub async fn accept(&mut self) -> Option<LocalStream> {
        self.incoming.recv().await
    }
}

impl LocalDialer {
    /// Opens a new in-memory connection, returning the client-side half
    /// and handing the server-side half to whatever is polling
    /// [`LocalListener::accept`].
    pub async fn connect(&self) -> std::io::Result<LocalStream> {
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.outgoing
            .send(LocalStream(server))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "listener dropped"))?;
        Ok(LocalStream(client))
    }

    /// Connect a tonic `Channel` through this dialer. The endpoint's
    /// nominal address is never resolved; the connector below ignores
    /// whatever URI tonic passes it and always returns a fresh pair
    /// from this dialer, the same `connect_with_connector` shape used to
    /// substitute a fixed destination for the one tonic resolved.
    pub async fn connect_channel(&self) -> Result<tonic::transport::Channel, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(nominal_address().to_string())?;
        let dialer = self.clone();
        endpoint
            .connect_with_connector(service_fn(move |_: Uri| {
                let dialer = dialer.clone();
                async move {
                    dialer
                        .connect()
                        .await
                        .map(TokioIo::new)
                }
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn dialer_and_listener_exchange_bytes() {
        let (mut listener, dialer) = pair();

        let server = tokio::spawn(async move {
            let mut stream = listener.accept().await.expect("accepted");
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"world").await.unwrap();
        });

        let mut client = dialer.connect().await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"world");

        server.await.unwrap();
    }

    #[test]
    fn nominal_address_uses_the_passthrough_scheme() {
        assert_eq!(nominal_address().scheme_str(), Some(PASSTHROUGH_SCHEME));
    }
}
