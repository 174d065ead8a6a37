// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII framing: `':' hex(slave | PDU | LRC) CR LF` with uppercase hex digits.

use bytes::{BufMut as _, Bytes, BytesMut};

use crate::{
    frame::{rtu::Header, tcp::TransactionId},
    FramingError, Slave,
};

use super::{Framing, Role, MAX_FRAME_PDU_SIZE};

const START: u8 = b':';
const END: &[u8] = b"\r\n";

const MAX_FRAME_LEN: usize = 1 + 2 * (1 + MAX_FRAME_PDU_SIZE + 1) + 2;

/// Two's complement of the byte sum.
#[must_use]
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AsciiFraming;

impl Framing for AsciiFraming {
    type Header = Header;

    fn request_header(_transaction_id: TransactionId, slave: Slave) -> Header {
        Header { slave }
    }

    fn encode(&self, hdr: Header, pdu: &[u8], buf: &mut BytesMut) {
        let mut raw = Vec::with_capacity(pdu.len() + 2);
        raw.push(hdr.slave.into());
        raw.extend_from_slice(pdu);
        raw.push(lrc(&raw));
        buf.reserve(raw.len() * 2 + 3);
        buf.put_u8(START);
        buf.put_slice(hex::encode_upper(raw).as_bytes());
        buf.put_slice(END);
    }

    fn frame_len(&self, buf: &[u8], _role: Role) -> Result<Option<usize>, FramingError> {
        let Some(first) = buf.first() else {
            return Ok(None);
        };
        if *first != START {
            return Err(FramingError::Delimiter("frame must start with ':'"));
        }
        if let Some(pos) = buf.windows(END.len()).position(|w| w == END) {
            return Ok(Some(pos + END.len()));
        }
        if buf.len() > MAX_FRAME_LEN {
            return Err(FramingError::Oversized(MAX_FRAME_LEN));
        }
        Ok(None)
    }

    fn decode(&self, frame: &[u8]) -> Result<(Header, Bytes), FramingError> {
        if frame.first() != Some(&START) {
            return Err(FramingError::Delimiter("frame must start with ':'"));
        }
        if !frame.ends_with(END) {
            return Err(FramingError::Delimiter("frame must end with CR LF"));
        }
        let body = &frame[1..frame.len() - END.len()];
        let raw = hex::decode(body).map_err(|_| FramingError::Hex)?;
        // slave + function + LRC
        if raw.len() < 3 {
            return Err(FramingError::Truncated(raw.len()));
        }
        let (data, received) = raw.split_at(raw.len() - 1);
        let calculated = lrc(data);
        if calculated != received[0] {
            return Err(FramingError::Lrc {
                calculated,
                received: received[0],
            });
        }
        let hdr = Header {
            slave: Slave(data[0]),
        };
        Ok((hdr, Bytes::copy_from_slice(&data[1..])))
    }
}
