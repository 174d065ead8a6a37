// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::slave::Slave;

/// Header of serial line frames. Shared by the RTU and the ASCII framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub slave: Slave,
}

impl super::Header for Header {
    fn slave(&self) -> Slave {
        self.slave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::verify_response_header;

    #[test]
    fn validate_same_headers() {
        // Given
        let req_hdr = Header { slave: Slave(0) };
        let rsp_hdr = Header { slave: Slave(0) };

        // When
        let result = verify_response_header(&req_hdr, &rsp_hdr);

        // Then
        assert!(result.is_ok());
    }

    #[test]
    fn invalid_validate_not_same_slave_id() {
        // Given
        let req_hdr = Header { slave: Slave(0) };
        let rsp_hdr = Header { slave: Slave(5) };

        // When
        let result = verify_response_header(&req_hdr, &rsp_hdr);

        // Then
        assert!(result.is_err());
    }
}
