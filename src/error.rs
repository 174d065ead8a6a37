// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::{address::AddressError, capability::Capability, ExceptionResponse, FunctionCode};

/// Malformed or corrupted frames on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("CRC mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    Crc { calculated: u16, received: u16 },

    #[error("LRC mismatch: calculated 0x{calculated:02X}, received 0x{received:02X}")]
    Lrc { calculated: u8, received: u8 },

    #[error("missing frame delimiter: {0}")]
    Delimiter(&'static str),

    #[error("truncated frame: {0} byte(s)")]
    Truncated(usize),

    #[error("invalid protocol id: 0x{0:04X}")]
    ProtocolId(u16),

    #[error("length mismatch: header declares {declared} byte(s), received {received}")]
    Length { declared: usize, received: usize },

    #[error("invalid hex encoding")]
    Hex,

    #[error("frame exceeds {0} bytes")]
    Oversized(usize),

    #[error("malformed PDU: {0}")]
    Pdu(String),

    /// A complete request carrying a value the protocol does not allow.
    #[error("invalid value in function {function}: {message}")]
    InvalidValue {
        function: FunctionCode,
        message: String,
    },
}

/// Responses that do not belong to the request they answer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The response header doesn't match the request header.
    #[error("invalid response header: {message}")]
    HeaderMismatch { message: String },

    /// The function codes of the request and response do not match.
    #[error("function code mismatch: request = {request}, response = {response}")]
    FunctionCodeMismatch {
        request: FunctionCode,
        response: FunctionCode,
    },

    /// The response payload is inconsistent with its own byte count
    /// or with the request.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Error type of all fallible operations of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or serial failure, including timeouts.
    #[error(transparent)]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The device answered with an exception PDU.
    #[error("exception: {0}")]
    Exception(#[from] ExceptionResponse),

    #[error(transparent)]
    Address(#[from] AddressError),

    /// The requested length exceeds the per-request cap and the caller
    /// is not entitled to automatic splitting.
    #[error("{requested} item(s) requested, exceeds the per-request limit of {limit}")]
    Capacity { requested: usize, limit: usize },

    /// Arguments that cannot be turned into a request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The capability check refused the operation.
    #[error("not permitted: {0}")]
    NotPermitted(Capability),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Error {
    /// The exception code if the device answered with an exception.
    #[must_use]
    pub fn exception_code(&self) -> Option<crate::ExceptionCode> {
        match self {
            Self::Exception(rsp) => Some(rsp.exception),
            _ => None,
        }
    }
}
