// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{frame::Adu, FramingError};

use super::{Framing, Role};

/// Client side adapter between a [`Framing`] and a byte stream.
///
/// Corrupted frames are reported as items, not as stream errors, so the
/// session stays usable for the next request.
#[derive(Debug, Default)]
pub struct FramedCodec<F> {
    framing: F,
}

impl<F: Framing> FramedCodec<F> {
    pub fn new(framing: F) -> Self {
        Self { framing }
    }
}

impl<F: Framing> Decoder for FramedCodec<F> {
    type Item = Result<Adu<F::Header>, FramingError>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        let len = match self.framing.frame_len(buf, Role::Client) {
            Ok(Some(len)) if buf.len() >= len => len,
            Ok(_) => return Ok(None),
            Err(err) => {
                buf.clear();
                return Ok(Some(Err(err)));
            }
        };
        let frame = buf.split_to(len);
        let adu = self
            .framing
            .decode(&frame)
            .map(|(hdr, pdu)| Adu { hdr, pdu });
        Ok(Some(adu))
    }
}

impl<F: Framing> Encoder<Adu<F::Header>> for FramedCodec<F> {
    type Error = io::Error;

    fn encode(&mut self, adu: Adu<F::Header>, buf: &mut BytesMut) -> io::Result<()> {
        let Adu { hdr, pdu } = adu;
        self.framing.encode(hdr, &pdu, buf);
        Ok(())
    }
}

/// Server side adapter between a [`Framing`] and a byte stream.
///
/// Up to `tolerance` consecutive corrupted frames are logged and skipped.
/// One more terminates the stream.
#[derive(Debug, Default)]
pub struct ServerCodec<F> {
    framing: F,
    tolerance: usize,
    errors: usize,
}

impl<F: Framing> ServerCodec<F> {
    pub fn new(framing: F, tolerance: usize) -> Self {
        Self {
            framing,
            tolerance,
            errors: 0,
        }
    }

    fn reject(&mut self, err: FramingError) -> io::Result<()> {
        self.errors += 1;
        if self.errors > self.tolerance {
            log::error!("Giving up after {} corrupted frame(s): {err}", self.errors);
            return Err(io::Error::new(io::ErrorKind::InvalidData, err));
        }
        log::warn!("Skipping corrupted frame: {err}");
        Ok(())
    }
}

impl<F: Framing> Decoder for ServerCodec<F> {
    type Item = Adu<F::Header>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        loop {
            let len = match self.framing.frame_len(buf, Role::Server) {
                Ok(Some(len)) if buf.len() >= len => len,
                Ok(_) => return Ok(None),
                Err(err) => {
                    // No frame boundary to resynchronize on.
                    self.reject(err)?;
                    buf.clear();
                    return Ok(None);
                }
            };
            let frame = buf.split_to(len);
            match self.framing.decode(&frame) {
                Ok((hdr, pdu)) => {
                    self.errors = 0;
                    return Ok(Some(Adu { hdr, pdu }));
                }
                Err(err) => self.reject(err)?,
            }
        }
    }
}

impl<F: Framing> Encoder<Adu<F::Header>> for ServerCodec<F> {
    type Error = io::Error;

    fn encode(&mut self, adu: Adu<F::Header>, buf: &mut BytesMut) -> io::Result<()> {
        let Adu { hdr, pdu } = adu;
        self.framing.encode(hdr, &pdu, buf);
        Ok(())
    }
}
