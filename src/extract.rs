// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interpret response PDUs on the client side.

use bytes::Bytes;

use crate::{
    frame::{Coil, Word},
    ExceptionCode, ExceptionResponse, FunctionCode, ProtocolError, Result,
};

fn invalid_response(message: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidResponse(message.into())
}

/// Extract the payload of the response to a request with `function`.
///
/// Reads yield the data bytes without function code and byte count.
/// Write acknowledgements yield an empty payload. Custom functions yield
/// everything after the function code.
pub fn extract_payload(function: FunctionCode, pdu: Bytes) -> Result<Bytes> {
    let Some(&code) = pdu.first() else {
        return Err(invalid_response("empty response PDU").into());
    };
    if code & 0x80 != 0 {
        let Some(&exception) = pdu.get(1) else {
            return Err(invalid_response("exception response without code").into());
        };
        let rsp = ExceptionResponse {
            function: FunctionCode::new(code & 0x7F),
            exception: ExceptionCode::new(exception),
        };
        if rsp.function != function {
            return Err(ProtocolError::FunctionCodeMismatch {
                request: function,
                response: rsp.function,
            }
            .into());
        }
        return Err(rsp.into());
    }
    let response = FunctionCode::new(code);
    if response != function {
        return Err(ProtocolError::FunctionCodeMismatch {
            request: function,
            response,
        }
        .into());
    }
    let expected_len = match function {
        FunctionCode::ReadCoils
        | FunctionCode::ReadDiscreteInputs
        | FunctionCode::ReadHoldingRegisters
        | FunctionCode::ReadInputRegisters => {
            let Some(&byte_count) = pdu.get(1) else {
                return Err(invalid_response("missing byte count").into());
            };
            let expected_len = 2 + usize::from(byte_count);
            if pdu.len() != expected_len {
                return Err(invalid_response(format!(
                    "byte count {byte_count} does not match {} data byte(s)",
                    pdu.len().saturating_sub(2)
                ))
                .into());
            }
            return Ok(pdu.slice(2..));
        }
        FunctionCode::WriteSingleCoil
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleCoils
        | FunctionCode::WriteMultipleRegisters => 5,
        FunctionCode::MaskWriteRegister => 7,
        FunctionCode::Custom(_) => return Ok(pdu.slice(1..)),
    };
    if pdu.len() != expected_len {
        return Err(invalid_response(format!(
            "acknowledgement of function {function} has {} byte(s)",
            pdu.len()
        ))
        .into());
    }
    Ok(Bytes::new())
}

/// Unpack `quantity` bits, least significant bit of the first byte first.
#[must_use]
pub fn unpack_bits(payload: &[u8], quantity: usize) -> Vec<Coil> {
    (0..quantity)
        .map(|i| payload.get(i / 8).map_or(false, |b| (b >> (i % 8)) & 0b1 > 0))
        .collect()
}

/// Big-endian register values.
#[must_use]
pub fn unpack_words(payload: &[u8]) -> Vec<Word> {
    payload
        .chunks_exact(2)
        .map(|pair| Word::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
