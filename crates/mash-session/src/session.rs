// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An authenticated, mutually-TLS-authenticated bidirectional channel to
//! one peer (§4.5). Wraps a `tokio_rustls` stream; the interaction layer
//! frames `mash-codec` envelopes over it directly.

use std::sync::Arc;

use mash_core::ZoneType;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream as ClientTlsStream, server::TlsStream as ServerTlsStream};

use crate::error::{Result, SessionError};

enum Inner {
    Client(ClientTlsStream<TcpStream>),
    Server(ServerTlsStream<TcpStream>),
}

/// One established, authenticated session. Carries the peer's zone
/// identity (extracted from its operational cert at handshake time) for
/// §9's "attach caller zone id/type to the request context" ambient state.
pub struct Session {
    inner: Inner,
    pub peer_zone_id: String,
    pub peer_zone_type: ZoneType,
}

impl Session {
    pub async fn connect(
        addr: &str,
        server_name: &str,
        config: Arc<rustls::ClientConfig>,
        peer_zone_id: String,
        peer_zone_type: ZoneType,
    ) -> Result<Self> {
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
        let connector = tokio_rustls::TlsConnector::from(config);
        let name = rustls::pki_types::ServerName::try_from(server_name.to_string())
            .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
        let stream = connector
            .connect(name, tcp)
            .await
            .map_err(|e| SessionError::AuthFailure(e.to_string()))?;
        Ok(Self {
            inner: Inner::Client(stream),
            peer_zone_id,
            peer_zone_type,
        })
    }

    pub async fn accept(
        tcp: TcpStream,
        config: Arc<rustls::ServerConfig>,
        peer_zone_id: String,
        peer_zone_type: ZoneType,
    ) -> Result<Self> {
        let acceptor = tokio_rustls::TlsAcceptor::from(config);
        let stream = acceptor
            .accept(tcp)
            .await
            .map_err(|e| SessionError::AuthFailure(e.to_string()))?;
        Ok(Self {
            inner: Inner::Server(stream),
            peer_zone_id,
            peer_zone_type,
        })
    }

    pub fn split(
        &mut self,
    ) -> (
        tokio::io::ReadHalf<&mut Self>,
        tokio::io::WriteHalf<&mut Self>,
    ) {
        tokio::io::split(self)
    }
}

impl tokio::io::AsyncRead for Session {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Inner::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for Session {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Inner::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
            Inner::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Inner::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}
