// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client sessions over framed byte streams.

use std::{fmt, io};

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio_util::codec::Framed;

use crate::{
    codec::{self, FramedCodec, Framing},
    extract::extract_payload,
    frame::{tcp::TransactionId, verify_response_header, Adu},
    slave::Slave,
    ProtocolError, Request, Result,
};

const INITIAL_TRANSACTION_ID: TransactionId = 0;

/// Transaction ids of a single session, wrapping around after 65,535.
#[derive(Debug)]
pub(crate) struct TransactionCounter(TransactionId);

impl Default for TransactionCounter {
    fn default() -> Self {
        Self(INITIAL_TRANSACTION_ID)
    }
}

impl TransactionCounter {
    pub(crate) fn next(&mut self) -> TransactionId {
        let transaction_id = self.0;
        self.0 = transaction_id.wrapping_add(1);
        transaction_id
    }
}

/// A request/response session with a single device.
pub(crate) struct Client<T, F: Framing> {
    framed: Framed<T, FramedCodec<F>>,
    transaction_ids: TransactionCounter,
}

impl<T, F: Framing> fmt::Debug for Client<T, F>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", self.framed.get_ref())
            .field("framing", &F::default())
            .field("transaction_ids", &self.transaction_ids)
            .finish()
    }
}

impl<T, F> Client<T, F>
where
    T: AsyncRead + AsyncWrite + Unpin,
    F: Framing,
{
    pub(crate) fn new(transport: T, framing: F) -> Self {
        let framed = Framed::new(transport, FramedCodec::new(framing));
        Self {
            framed,
            transaction_ids: TransactionCounter::default(),
        }
    }

    pub(crate) async fn call(&mut self, slave: Slave, req: Request<'_>) -> Result<Bytes> {
        log::debug!("Call {req:?} on {slave}");
        let function = req.function_code();
        let hdr = F::request_header(self.transaction_ids.next(), slave);
        let mut pdu = BytesMut::new();
        codec::encode_request_pdu(&mut pdu, &req);

        // Stale bytes of a previous exchange must not be taken for the response.
        self.framed.read_buffer_mut().clear();

        self.framed
            .send(Adu {
                hdr,
                pdu: pdu.freeze(),
            })
            .await?;
        let res_adu = self
            .framed
            .next()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))??;
        let res_adu = res_adu?;

        verify_response_header(&hdr, &res_adu.hdr)
            .map_err(|message| ProtocolError::HeaderMismatch { message })?;
        extract_payload(function, res_adu.pdu)
    }

    pub(crate) async fn disconnect(&mut self) -> io::Result<()> {
        self.framed.get_mut().shutdown().await
    }
}

#[async_trait::async_trait]
impl<T, F> crate::client::Client for Client<T, F>
where
    T: fmt::Debug + AsyncRead + AsyncWrite + Send + Unpin,
    F: Framing,
{
    async fn call(&mut self, slave: Slave, req: Request<'_>) -> Result<Bytes> {
        Client::call(self, slave, req).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        Client::disconnect(self).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt as _};

    use super::*;
    use crate::{
        codec::{rtu::RtuFraming, tcp::TcpFraming},
        Error, ExceptionCode,
    };

    #[test]
    fn transaction_ids_wrap_around() {
        let mut counter = TransactionCounter(u16::MAX - 1);
        assert_eq!(counter.next(), u16::MAX - 1);
        assert_eq!(counter.next(), u16::MAX);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[tokio::test]
    async fn tcp_read_holding_registers() {
        let (client_io, mut device) = duplex(1024);
        let mut client = Client::new(client_io, TcpFraming);

        let device = tokio::spawn(async move {
            let mut req = [0u8; 12];
            device.read_exact(&mut req).await.unwrap();
            assert_eq!(
                req,
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x10, 0x00, 0x02]
            );
            device
                .write_all(&[
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x12, 0x34, 0x56, 0x78,
                ])
                .await
                .unwrap();
            device
        });

        let payload = client
            .call(Slave(1), Request::ReadHoldingRegisters(0x10, 2))
            .await
            .unwrap();
        assert_eq!(&payload[..], &[0x12, 0x34, 0x56, 0x78]);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_transaction_id_mismatch() {
        let (client_io, mut device) = duplex(1024);
        let mut client = Client::new(client_io, TcpFraming);

        let device = tokio::spawn(async move {
            let mut req = [0u8; 12];
            device.read_exact(&mut req).await.unwrap();
            device
                .write_all(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x06, 0x00])
                .await
                .unwrap();
            device
        });

        let err = client
            .call(Slave(1), Request::ReadHoldingRegisters(0, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::HeaderMismatch { .. })
        ));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn rtu_exception_response() {
        let (client_io, mut device) = duplex(1024);
        let mut client = Client::new(client_io, RtuFraming);

        let device = tokio::spawn(async move {
            let mut req = [0u8; 8];
            device.read_exact(&mut req).await.unwrap();
            let mut rsp = BytesMut::new();
            RtuFraming.encode(
                crate::frame::rtu::Header { slave: Slave(1) },
                &[0x83, 0x02],
                &mut rsp,
            );
            device.write_all(&rsp).await.unwrap();
            device
        });

        let err = client
            .call(Slave(1), Request::ReadHoldingRegisters(0, 1))
            .await
            .unwrap_err();
        assert_eq!(err.exception_code(), Some(ExceptionCode::IllegalDataAddress));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn rtu_crc_error() {
        let (client_io, mut device) = duplex(1024);
        let mut client = Client::new(client_io, RtuFraming);

        let device = tokio::spawn(async move {
            let mut req = [0u8; 8];
            device.read_exact(&mut req).await.unwrap();
            device
                .write_all(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00])
                .await
                .unwrap();
            device
        });

        let err = client
            .call(Slave(1), Request::WriteSingleRegister(1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn closed_connection() {
        let (client_io, device) = duplex(1024);
        let mut client = Client::new(client_io, TcpFraming);
        drop(device);

        let err = client
            .call(Slave(1), Request::ReadCoils(0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
