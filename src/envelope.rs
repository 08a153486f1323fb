//! FINS envelope codec
//!
//! The envelope is the FINS application message carried inside a TCP frame
//! with command [`TcpCommand::FinsFrame`](crate::frame::TcpCommand::FinsFrame):
//!
//! | Byte | Field | Request value |
//! |------|-------|---------------|
//! | 0 | ICF | 0x80 (response required) |
//! | 1 | RSV | 0x00 |
//! | 2 | GCT | 0x02 |
//! | 3 | DNA | 0x00 (local network) |
//! | 4 | DA1 | remote node id |
//! | 5 | DA2 | 0x00 (CPU unit) |
//! | 6 | SNA | 0x00 (local network) |
//! | 7 | SA1 | local node id |
//! | 8 | SA2 | 0x00 |
//! | 9 | SID | service id |
//! | 10 | MRC | main function code |
//! | 11 | SRC | sub function code |
//! | 12.. | | body (requests) / end code + data (responses) |
//!
//! Requests are plain data ([`FinsRequest`]); addressing and the service id
//! are applied by [`encode_request`] at send time.

use bytes::{BufMut, Bytes, BytesMut};

use crate::classify::EndCode;
use crate::constants::{
    FINS_COMMAND_LEN, FINS_END_CODE_LEN, FINS_HEADER_LEN, GATEWAY_COUNT, ICF_COMMAND,
    ICF_RESPONSES,
};
use crate::error::{FinsError, FinsResult, FramingError};

/// Validated pair of FINS node ids negotiated for a TCP connection
///
/// Both ids are within 1-254 and never equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIds {
    local: u8,
    remote: u8,
}

impl NodeIds {
    /// Validate and pair a local (client) and remote (PLC) node id
    pub fn new(local: u8, remote: u8) -> FinsResult<Self> {
        check_node_id("local", local)?;
        check_node_id("remote", remote)?;
        if local == remote {
            return Err(FinsError::InvalidNodeId {
                role: "local",
                value: local,
                reason: "local and remote node ids must differ",
            });
        }
        Ok(Self { local, remote })
    }

    /// Node id of this client
    pub fn local(&self) -> u8 {
        self.local
    }

    /// Node id of the PLC
    pub fn remote(&self) -> u8 {
        self.remote
    }
}

fn check_node_id(role: &'static str, value: u8) -> FinsResult<()> {
    match value {
        0 => Err(FinsError::InvalidNodeId {
            role,
            value,
            reason: "0 is reserved for the local unit",
        }),
        255 => Err(FinsError::InvalidNodeId {
            role,
            value,
            reason: "255 is the broadcast address",
        }),
        _ => Ok(()),
    }
}

/// FINS header (10 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinsHeader {
    /// Information Control Field
    pub icf: u8,
    /// Reserved
    pub rsv: u8,
    /// Gateway count
    pub gct: u8,
    /// Destination network
    pub dna: u8,
    /// Destination node
    pub da1: u8,
    /// Destination unit
    pub da2: u8,
    /// Source network
    pub sna: u8,
    /// Source node
    pub sa1: u8,
    /// Source unit
    pub sa2: u8,
    /// Service id
    pub sid: u8,
}

impl FinsHeader {
    /// Header for a command sent from the local node to the remote CPU unit
    pub fn command(nodes: NodeIds, sid: u8) -> Self {
        Self {
            icf: ICF_COMMAND,
            rsv: 0x00,
            gct: GATEWAY_COUNT,
            dna: 0x00,
            da1: nodes.remote(),
            da2: 0x00,
            sna: 0x00,
            sa1: nodes.local(),
            sa2: 0x00,
            sid,
        }
    }

    pub fn to_bytes(self) -> [u8; FINS_HEADER_LEN] {
        [
            self.icf, self.rsv, self.gct, self.dna, self.da1, self.da2, self.sna, self.sa1,
            self.sa2, self.sid,
        ]
    }

    pub fn from_bytes(data: &[u8]) -> FinsResult<Self> {
        if data.len() < FINS_HEADER_LEN {
            return Err(FinsError::invalid_data(format!(
                "FINS header too short: expected {} bytes, got {}",
                FINS_HEADER_LEN,
                data.len()
            )));
        }

        Ok(Self {
            icf: data[0],
            rsv: data[1],
            gct: data[2],
            dna: data[3],
            da1: data[4],
            da2: data[5],
            sna: data[6],
            sa1: data[7],
            sa2: data[8],
            sid: data[9],
        })
    }

    /// ICF bit 6 set
    pub fn is_response(self) -> bool {
        self.icf & 0x40 != 0
    }
}

/// A FINS request as supplied by a command collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinsRequest {
    pub function_code: u8,
    pub sub_function_code: u8,
    pub body: Vec<u8>,
}

impl FinsRequest {
    pub fn new(function_code: u8, sub_function_code: u8, body: impl Into<Vec<u8>>) -> Self {
        Self {
            function_code,
            sub_function_code,
            body: body.into(),
        }
    }

    /// Encoded envelope length
    pub fn encoded_len(&self) -> usize {
        FINS_HEADER_LEN + FINS_COMMAND_LEN + self.body.len()
    }
}

/// Wrap a request body in a FINS header addressed to `nodes` with `service_id`
pub fn encode_request(request: &FinsRequest, nodes: NodeIds, service_id: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(request.encoded_len());
    buf.put_slice(&FinsHeader::command(nodes, service_id).to_bytes());
    buf.put_u8(request.function_code);
    buf.put_u8(request.sub_function_code);
    buf.put_slice(&request.body);
    buf.freeze()
}

/// A decoded envelope: header, function codes and the remaining bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinsEnvelope {
    pub header: FinsHeader,
    pub function_code: u8,
    pub sub_function_code: u8,
    pub body: Bytes,
}

impl FinsEnvelope {
    /// Split raw envelope bytes into header, function codes and body
    pub fn decode(data: &[u8]) -> FinsResult<Self> {
        let min = FINS_HEADER_LEN + FINS_COMMAND_LEN;
        if data.len() < min {
            return Err(FinsError::invalid_data(format!(
                "FINS envelope too short: expected at least {} bytes, got {}",
                min,
                data.len()
            )));
        }

        Ok(Self {
            header: FinsHeader::from_bytes(&data[..FINS_HEADER_LEN])?,
            function_code: data[FINS_HEADER_LEN],
            sub_function_code: data[FINS_HEADER_LEN + 1],
            body: Bytes::copy_from_slice(&data[min..]),
        })
    }
}

/// A FINS response: echoed header and function codes, end code, and data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinsResponse {
    pub header: FinsHeader,
    pub function_code: u8,
    pub sub_function_code: u8,
    pub end_code: EndCode,
    pub data: Bytes,
}

impl FinsResponse {
    /// Parse a response envelope as returned by the frame codec
    pub fn parse(data: &[u8]) -> FinsResult<Self> {
        if let Some(&icf) = data.first() {
            if !ICF_RESPONSES.contains(&icf) {
                return Err(FramingError::InvalidResponseMarker(icf).into());
            }
        }

        let envelope = FinsEnvelope::decode(data)?;
        if envelope.body.len() < FINS_END_CODE_LEN {
            return Err(FramingError::TooShortForFins(data.len()).into());
        }

        Ok(Self {
            header: envelope.header,
            function_code: envelope.function_code,
            sub_function_code: envelope.sub_function_code,
            end_code: EndCode::new(envelope.body[0], envelope.body[1]),
            data: envelope.body.slice(FINS_END_CODE_LEN..),
        })
    }

    /// Service id echoed by the PLC
    pub fn service_id(&self) -> u8 {
        self.header.sid
    }

    /// Whether the end code is 0x0000
    pub fn is_success(&self) -> bool {
        self.end_code.is_success()
    }

    /// Fail with [`FinsError::ServiceIdMismatch`] unless the echoed id matches
    pub fn check_service_id(&self, expected: u8) -> FinsResult<()> {
        if self.header.sid == expected {
            Ok(())
        } else {
            Err(FinsError::ServiceIdMismatch {
                expected,
                received: self.header.sid,
            })
        }
    }

    /// Fail with [`FinsError::Application`] on a non-zero end code
    pub fn check_end_code(&self) -> FinsResult<()> {
        crate::classify::classify_end_code(self.end_code, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> NodeIds {
        NodeIds::new(0x22, 0x0A).unwrap()
    }

    #[test]
    fn test_node_ids_validation() {
        assert!(NodeIds::new(1, 254).is_ok());
        assert!(matches!(
            NodeIds::new(0, 10),
            Err(FinsError::InvalidNodeId { role: "local", .. })
        ));
        assert!(matches!(
            NodeIds::new(10, 255),
            Err(FinsError::InvalidNodeId { role: "remote", .. })
        ));
        assert!(NodeIds::new(255, 10).is_err());
        assert!(NodeIds::new(10, 0).is_err());
        assert!(NodeIds::new(7, 7).is_err());
    }

    #[test]
    fn test_encode_request_layout() {
        let request = FinsRequest::new(0x01, 0x01, vec![0x82, 0x00, 0x64, 0x00, 0x00, 0x0A]);
        let bytes = encode_request(&request, nodes(), 0x05);

        assert_eq!(
            &bytes[..],
            &[
                0x80, 0x00, 0x02, 0x00, 0x0A, 0x00, 0x00, 0x22, 0x00, 0x05, // header
                0x01, 0x01, // function codes
                0x82, 0x00, 0x64, 0x00, 0x00, 0x0A, // body
            ]
        );
        assert_eq!(bytes.len(), request.encoded_len());
    }

    #[test]
    fn test_envelope_decode_returns_body() {
        let request = FinsRequest::new(0x07, 0x02, vec![0x24, 0x01, 0x31]);
        let bytes = encode_request(&request, nodes(), 0xFF);
        let envelope = FinsEnvelope::decode(&bytes).unwrap();

        assert_eq!(envelope.header, FinsHeader::command(nodes(), 0xFF));
        assert_eq!(envelope.function_code, 0x07);
        assert_eq!(envelope.sub_function_code, 0x02);
        assert_eq!(&envelope.body[..], &[0x24, 0x01, 0x31]);
        assert!(!envelope.header.is_response());
    }

    #[test]
    fn test_envelope_decode_too_short() {
        assert!(FinsEnvelope::decode(&[0xC0, 0x00, 0x02]).is_err());
    }

    #[test]
    fn test_response_parse() {
        let bytes = [
            0xC0, 0x00, 0x02, 0x00, 0x22, 0x00, 0x00, 0x0A, 0x00, 0x05, // header
            0x01, 0x01, // function codes
            0x00, 0x00, // end code
            0x12, 0x34, // data
        ];
        let response = FinsResponse::parse(&bytes).unwrap();

        assert!(response.header.is_response());
        assert!(response.is_success());
        assert_eq!(response.service_id(), 0x05);
        assert_eq!(&response.data[..], &[0x12, 0x34]);
        assert!(response.check_service_id(0x05).is_ok());
        assert!(matches!(
            response.check_service_id(0x06),
            Err(FinsError::ServiceIdMismatch {
                expected: 0x06,
                received: 0x05
            })
        ));
    }

    #[test]
    fn test_response_with_end_code_error() {
        let bytes = [
            0xC1, 0x00, 0x02, 0x00, 0x22, 0x00, 0x00, 0x0A, 0x00, 0x01, 0x04, 0x01, 0x22, 0x01,
        ];
        let response = FinsResponse::parse(&bytes).unwrap();
        assert!(!response.is_success());
        assert!(matches!(
            response.check_end_code(),
            Err(FinsError::Application {
                main_code: 0x22,
                sub_code: 0x01,
                ..
            })
        ));
    }

    #[test]
    fn test_response_rejects_bad_marker_and_short_end_code() {
        let mut bytes = [
            0xC0, 0x00, 0x02, 0x00, 0x22, 0x00, 0x00, 0x0A, 0x00, 0x01, 0x01, 0x01, 0x00,
        ];
        assert!(matches!(
            FinsResponse::parse(&bytes),
            Err(FinsError::Framing(FramingError::TooShortForFins(13)))
        ));

        bytes[0] = 0x80;
        assert!(matches!(
            FinsResponse::parse(&bytes),
            Err(FinsError::Framing(FramingError::InvalidResponseMarker(0x80)))
        ));
    }
}
