// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server

use std::{
    collections::HashSet,
    future::{self, Future},
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::codec::Framed;

use crate::{
    codec::{serial::SerialFraming, tcp::TcpFraming, ServerCodec},
    ExceptionCode, Request, Response,
};

use super::{process, ServerOptions, Service, Terminated};

/// Peers with an open session.
#[derive(Debug, Clone, Default)]
pub struct Sessions(Arc<Mutex<HashSet<SocketAddr>>>);

impl Sessions {
    fn lock(&self) -> MutexGuard<'_, HashSet<SocketAddr>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.lock().contains(peer)
    }

    fn open(&self, peer: SocketAddr) -> SessionGuard {
        self.lock().insert(peer);
        SessionGuard {
            sessions: self.clone(),
            peer,
        }
    }
}

/// Removes the peer from [`Sessions`] when the session task ends,
/// including when it is aborted.
struct SessionGuard {
    sessions: Sessions,
    peer: SocketAddr,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.peer);
    }
}

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    options: ServerOptions,
    sessions: Sessions,
}

impl Server {
    /// Attach the Modbus server to a TCP socket server.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            options: ServerOptions::default(),
            sessions: Sessions::default(),
        }
    }

    /// Bind a listener with address reuse enabled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn bind(socket_addr: SocketAddr) -> io::Result<Self> {
        listener(socket_addr).map(Self::new)
    }

    #[must_use]
    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for observing the open sessions while the server is running.
    #[must_use]
    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    /// Serve connections until the listener fails.
    pub async fn serve<S>(self, service: S) -> io::Result<Terminated>
    where
        S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>
            + Clone
            + Send
            + Sync
            + 'static,
    {
        self.serve_until(service, future::pending()).await
    }

    /// Serve connections until the listener fails or `abort_signal`
    /// resolves.
    ///
    /// Each connection is handled by its own task. Aborting the server
    /// closes all open connections.
    pub async fn serve_until<S, X>(self, service: S, abort_signal: X) -> io::Result<Terminated>
    where
        S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>
            + Clone
            + Send
            + Sync
            + 'static,
        X: Future<Output = ()>,
    {
        let Self {
            listener,
            options,
            sessions,
        } = self;
        let options = Arc::new(options);
        let mut tasks = JoinSet::new();
        tokio::pin!(abort_signal);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    log::debug!("Accepted connection from {peer}");
                    let guard = sessions.open(peer);
                    let service = service.clone();
                    let options = Arc::clone(&options);
                    tasks.spawn(async move {
                        let _guard = guard;
                        match serve_connection(stream, service, &options).await {
                            Ok(()) => log::debug!("Session with {peer} finished"),
                            Err(err) => log::error!("Session with {peer} failed: {err}"),
                        }
                    });
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(err) = joined {
                        log::error!("Session task failed: {err}");
                    }
                }
                () = &mut abort_signal => {
                    log::debug!("Aborting server with {} open session(s)", tasks.len());
                    tasks.shutdown().await;
                    return Ok(Terminated::Aborted);
                }
            }
        }
    }
}

async fn serve_connection<S>(stream: TcpStream, service: S, options: &ServerOptions) -> io::Result<()>
where
    S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>,
{
    if let Err(err) = stream.set_nodelay(true) {
        log::warn!("Failed to disable Nagle's algorithm: {err}");
    }
    let tolerance = options.framing_error_tolerance;
    if options.serial_over_tcp {
        let framed = Framed::new(stream, ServerCodec::new(SerialFraming, tolerance));
        process(framed, service, options, true).await
    } else {
        let framed = Framed::new(stream, ServerCodec::new(TcpFraming, tolerance));
        process(framed, service, options, false).await
    }
}

/// Start TCP listener - configure and open TCP socket
fn listener(socket_addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(
        Domain::for_address(socket_addr),
        Type::STREAM,
        Some(Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
