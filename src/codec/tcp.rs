// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP framing with the 7 byte MBAP header.

use byteorder::{BigEndian, ByteOrder as _};
use bytes::{BufMut as _, Bytes, BytesMut};

use crate::{
    frame::tcp::{Header, TransactionId},
    FramingError, Slave,
};

use super::{u16_len, Framing, Role, MAX_FRAME_PDU_SIZE};

/// Transaction id, protocol id, length and unit id.
pub(crate) const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000; // TCP

/// Offset of the unit id, which is counted by the length field.
const LENGTH_OFFSET: usize = 6;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TcpFraming;

impl Framing for TcpFraming {
    type Header = Header;

    fn request_header(transaction_id: TransactionId, slave: Slave) -> Header {
        Header {
            transaction_id,
            unit_id: slave.into(),
        }
    }

    fn encode(&self, hdr: Header, pdu: &[u8], buf: &mut BytesMut) {
        buf.reserve(pdu.len() + HEADER_LEN);
        buf.put_u16(hdr.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(u16_len(pdu.len() + 1));
        buf.put_u8(hdr.unit_id);
        buf.put_slice(pdu);
    }

    fn frame_len(&self, buf: &[u8], _role: Role) -> Result<Option<usize>, FramingError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        // len = bytes of PDU + one byte (unit ID)
        let len = usize::from(BigEndian::read_u16(&buf[4..6]));
        if len < 2 {
            return Err(FramingError::Length {
                declared: len,
                received: buf.len() - LENGTH_OFFSET,
            });
        }
        if len > MAX_FRAME_PDU_SIZE + 1 {
            return Err(FramingError::Oversized(LENGTH_OFFSET + MAX_FRAME_PDU_SIZE + 1));
        }
        Ok(Some(LENGTH_OFFSET + len))
    }

    fn decode(&self, frame: &[u8]) -> Result<(Header, Bytes), FramingError> {
        if frame.len() <= HEADER_LEN {
            return Err(FramingError::Truncated(frame.len()));
        }
        let protocol_id = BigEndian::read_u16(&frame[2..4]);
        if protocol_id != PROTOCOL_ID {
            return Err(FramingError::ProtocolId(protocol_id));
        }
        let declared = usize::from(BigEndian::read_u16(&frame[4..6]));
        let received = frame.len() - LENGTH_OFFSET;
        if declared != received {
            return Err(FramingError::Length { declared, received });
        }
        let hdr = Header {
            transaction_id: BigEndian::read_u16(&frame[0..2]),
            unit_id: frame[6],
        };
        Ok((hdr, Bytes::copy_from_slice(&frame[HEADER_LEN..])))
    }
}
