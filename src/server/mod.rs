// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus server skeletons and the virtual PLC.
//!
//! Every accepted connection runs its own session loop:
//! wait for a complete frame, dispatch the request to a [`Service`],
//! send the response or exception, and wait again. A session ends when the
//! peer closes the connection, on transport errors, on idle timeout, on a
//! truncated or undecodable PDU, or when more consecutive corrupted frames arrive than
//! [`ServerOptions::framing_error_tolerance`] allows.

mod service;
pub use self::service::Service;

pub mod plc;
pub mod serial;
pub mod store;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::{io, time::Duration};

use bytes::BytesMut;
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    codec::{self, Framing, ServerCodec},
    frame::{Adu, Header as _},
    ExceptionCode, ExceptionResponse, FramingError, Request, Response, Slave,
};

/// Cause for termination of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    /// The transport was closed by the peer.
    Finished,
    /// The abort signal resolved.
    Aborted,
}

/// Runtime settings shared by all sessions of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Only answer frames addressed to this station.
    ///
    /// Applies to serial framing only. Modbus TCP frames are answered
    /// regardless of their unit identifier.
    pub station: Option<Slave>,

    /// Fixed pause before each response.
    pub request_delay: Option<Duration>,

    /// Close sessions that do not receive a frame in time.
    pub idle_timeout: Option<Duration>,

    /// Consecutive corrupted frames that are skipped before the
    /// session is closed.
    pub framing_error_tolerance: usize,

    /// Expect RTU or ASCII frames instead of MBAP frames on TCP connections.
    pub serial_over_tcp: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            station: None,
            request_delay: None,
            idle_timeout: None,
            framing_error_tolerance: 3,
            serial_over_tcp: false,
        }
    }
}

/// The request/response loop of a single session.
pub(crate) async fn process<T, F, S>(
    mut framed: Framed<T, ServerCodec<F>>,
    service: S,
    options: &ServerOptions,
    filter_station: bool,
) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: Framing,
    S: Service<Request = Request<'static>, Response = Response, Exception = ExceptionCode>,
{
    loop {
        let next = match options.idle_timeout {
            Some(idle_timeout) => tokio::time::timeout(idle_timeout, framed.next())
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no request within {idle_timeout:?}"),
                    )
                })?,
            None => framed.next().await,
        };
        let Some(adu) = next else {
            log::debug!("Session closed by peer");
            return Ok(());
        };
        let Adu { hdr, pdu } = adu?;

        if filter_station {
            if let Some(station) = options.station {
                if hdr.slave() != station {
                    log::warn!(
                        "Dropping frame addressed to {}, expected {station}",
                        hdr.slave()
                    );
                    continue;
                }
            }
        }

        let result = match Request::try_from(pdu) {
            Ok(request) => {
                log::debug!("Received {request:?} for {}", hdr.slave());
                let function = request.function_code();
                service
                    .call(request)
                    .await
                    .map_err(|exception| ExceptionResponse {
                        function,
                        exception,
                    })
            }
            Err(FramingError::InvalidValue { function, message }) => {
                log::warn!("Rejecting request from {}: {message}", hdr.slave());
                Err(ExceptionResponse {
                    function,
                    exception: ExceptionCode::IllegalDataValue,
                })
            }
            Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        };

        let mut rsp_pdu = BytesMut::new();
        match result {
            Ok(response) => codec::encode_response_pdu(&mut rsp_pdu, &response),
            Err(rsp) => {
                log::debug!("Answering with exception: {rsp}");
                codec::encode_exception_response_pdu(&mut rsp_pdu, rsp);
            }
        }

        if let Some(request_delay) = options.request_delay {
            tokio::time::sleep(request_delay).await;
        }
        framed
            .send(Adu {
                hdr,
                pdu: rsp_pdu.freeze(),
            })
            .await?;
    }
}
