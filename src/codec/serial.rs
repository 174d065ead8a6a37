// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line framing that accepts both RTU and ASCII frames.
//!
//! The leading byte of each frame selects the parser: `':'` starts an ASCII
//! frame, anything else is treated as RTU. The detected mode is carried in
//! the header so that the reply uses the framing of the request.

use bytes::{Bytes, BytesMut};

use crate::{
    frame::{self, tcp::TransactionId},
    FramingError, Slave,
};

use super::{ascii::AsciiFraming, rtu::RtuFraming, Framing, Role};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerialMode {
    #[default]
    Rtu,
    Ascii,
}

impl SerialMode {
    /// Detect the framing of the frame starting at `buf`.
    #[must_use]
    pub fn detect(buf: &[u8]) -> Option<Self> {
        buf.first().map(|first| match first {
            b':' => Self::Ascii,
            _ => Self::Rtu,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub mode: SerialMode,
    pub slave: Slave,
}

impl frame::Header for Header {
    fn slave(&self) -> Slave {
        self.slave
    }
}

impl From<Header> for frame::rtu::Header {
    fn from(from: Header) -> Self {
        Self { slave: from.slave }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SerialFraming;

impl Framing for SerialFraming {
    type Header = Header;

    fn request_header(_transaction_id: TransactionId, slave: Slave) -> Header {
        Header {
            mode: SerialMode::Rtu,
            slave,
        }
    }

    fn encode(&self, hdr: Header, pdu: &[u8], buf: &mut BytesMut) {
        match hdr.mode {
            SerialMode::Rtu => RtuFraming.encode(hdr.into(), pdu, buf),
            SerialMode::Ascii => AsciiFraming.encode(hdr.into(), pdu, buf),
        }
    }

    fn frame_len(&self, buf: &[u8], role: Role) -> Result<Option<usize>, FramingError> {
        match SerialMode::detect(buf) {
            None => Ok(None),
            Some(SerialMode::Rtu) => RtuFraming.frame_len(buf, role),
            Some(SerialMode::Ascii) => AsciiFraming.frame_len(buf, role),
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<(Header, Bytes), FramingError> {
        let mode = SerialMode::detect(frame).ok_or(FramingError::Truncated(0))?;
        let (hdr, pdu) = match mode {
            SerialMode::Rtu => RtuFraming.decode(frame)?,
            SerialMode::Ascii => AsciiFraming.decode(frame)?,
        };
        Ok((
            Header {
                mode,
                slave: hdr.slave,
            },
            pdu,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_mode_from_leading_byte() {
        assert_eq!(SerialMode::detect(b""), None);
        assert_eq!(SerialMode::detect(b":01"), Some(SerialMode::Ascii));
        assert_eq!(SerialMode::detect(&[0x01, 0x03]), Some(SerialMode::Rtu));
    }

    #[test]
    fn decode_both_framings() {
        let (hdr, pdu) = SerialFraming.decode(b":010300000001FB\r\n").unwrap();
        assert_eq!(hdr.mode, SerialMode::Ascii);
        assert_eq!(hdr.slave, Slave(1));
        assert_eq!(&pdu[..], &[0x03, 0x00, 0x00, 0x00, 0x01]);

        let rtu = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0xB6, 0x63];
        let (hdr, pdu) = SerialFraming.decode(&rtu).unwrap();
        assert_eq!(hdr.mode, SerialMode::Rtu);
        assert_eq!(&pdu[..], &rtu[1..6]);
    }

    #[test]
    fn reply_in_request_framing() {
        let mut buf = BytesMut::new();
        let hdr = Header {
            mode: SerialMode::Ascii,
            slave: Slave(1),
        };
        SerialFraming.encode(hdr, &[0x03, 0x00, 0x00, 0x00, 0x01], &mut buf);
        assert_eq!(&buf[..], b":010300000001FB\r\n");
    }

    #[test]
    fn frame_len_follows_detected_mode() {
        assert_eq!(
            SerialFraming.frame_len(b":010300000001FB\r\n", Role::Server),
            Ok(Some(17))
        );
        assert_eq!(
            SerialFraming.frame_len(&[0x01, 0x03], Role::Server),
            Ok(Some(8))
        );
    }
}
