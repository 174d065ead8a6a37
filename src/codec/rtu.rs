// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU framing: `slave | PDU | CRC16` with the CRC low byte first.

use bytes::{BufMut as _, Bytes, BytesMut};

use crate::{
    frame::{rtu::Header, tcp::TransactionId},
    FramingError, Slave,
};

use super::{Framing, Role, MAX_FRAME_PDU_SIZE};

/// slave + function + CRC
const MIN_FRAME_LEN: usize = 1 + 1 + 2;

const MAX_FRAME_LEN: usize = 1 + MAX_FRAME_PDU_SIZE + 2;

/// CRC-16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Payload length after slave and function code, excluding the CRC.
#[derive(Debug, PartialEq, Eq)]
enum PayloadLen {
    Known(usize),
    Incomplete,
    Unknown,
}

fn request_payload_len(buf: &[u8]) -> PayloadLen {
    if buf.len() < 2 {
        return PayloadLen::Incomplete;
    }
    match buf[1] {
        0x01..=0x06 => PayloadLen::Known(4),
        0x0F | 0x10 => match buf.get(6) {
            Some(byte_count) => PayloadLen::Known(5 + usize::from(*byte_count)),
            None => PayloadLen::Incomplete,
        },
        0x16 => PayloadLen::Known(6),
        _ => PayloadLen::Unknown,
    }
}

fn response_payload_len(buf: &[u8]) -> PayloadLen {
    if buf.len() < 2 {
        return PayloadLen::Incomplete;
    }
    match buf[1] {
        0x01..=0x04 => match buf.get(2) {
            Some(byte_count) => PayloadLen::Known(1 + usize::from(*byte_count)),
            None => PayloadLen::Incomplete,
        },
        0x05 | 0x06 | 0x0F | 0x10 => PayloadLen::Known(4),
        0x16 => PayloadLen::Known(6),
        0x81..=0xFF => PayloadLen::Known(1),
        _ => PayloadLen::Unknown,
    }
}

fn has_valid_crc(frame: &[u8]) -> bool {
    let Some(split) = frame.len().checked_sub(2) else {
        return false;
    };
    let (data, crc) = frame.split_at(split);
    crc16(data) == u16::from_le_bytes([crc[0], crc[1]])
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RtuFraming;

impl Framing for RtuFraming {
    type Header = Header;

    fn request_header(_transaction_id: TransactionId, slave: Slave) -> Header {
        Header { slave }
    }

    fn encode(&self, hdr: Header, pdu: &[u8], buf: &mut BytesMut) {
        buf.reserve(pdu.len() + 3);
        let start = buf.len();
        buf.put_u8(hdr.slave.into());
        buf.put_slice(pdu);
        let crc = crc16(&buf[start..]);
        buf.put_u16_le(crc);
    }

    fn frame_len(&self, buf: &[u8], role: Role) -> Result<Option<usize>, FramingError> {
        let payload_len = match role {
            Role::Client => response_payload_len(buf),
            Role::Server => request_payload_len(buf),
        };
        match payload_len {
            PayloadLen::Known(len) => Ok(Some(MIN_FRAME_LEN + len)),
            PayloadLen::Incomplete => Ok(None),
            // Without a length rule the frame ends at the first matching CRC.
            PayloadLen::Unknown => {
                let end = buf.len().min(MAX_FRAME_LEN);
                if let Some(len) =
                    (MIN_FRAME_LEN..=end).find(|len| has_valid_crc(&buf[..*len]))
                {
                    Ok(Some(len))
                } else if buf.len() > MAX_FRAME_LEN {
                    Err(FramingError::Oversized(MAX_FRAME_LEN))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<(Header, Bytes), FramingError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(FramingError::Truncated(frame.len()));
        }
        let (data, crc) = frame.split_at(frame.len() - 2);
        let calculated = crc16(data);
        let received = u16::from_le_bytes([crc[0], crc[1]]);
        if calculated != received {
            return Err(FramingError::Crc {
                calculated,
                received,
            });
        }
        let hdr = Header {
            slave: Slave(data[0]),
        };
        Ok((hdr, Bytes::copy_from_slice(&data[1..])))
    }
}
