//! Node address negotiation
//!
//! Right after the TCP connect the client announces itself with a
//! node-address-to-PLC frame (4 zero bytes, meaning "assign me an address")
//! and the PLC answers with a node-address-from-PLC frame:
//!
//! ```text
//! [0..4] client node address   (byte 3 = assigned local node id)
//! [4..8] server node address   (byte 7 = remote node id)
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::classify::classify_io_error;
use crate::constants::{HANDSHAKE_REQUEST_LEN, HANDSHAKE_RESPONSE_LEN};
use crate::envelope::NodeIds;
use crate::error::{FinsError, FinsResult};
use crate::frame::{encode_frame, read_frame, TcpCommand};
use crate::utils::Deadline;

/// Outcome of a successful negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub nodes: NodeIds,
    pub bytes_sent: usize,
    pub bytes_received: usize,
}

/// Run the node address exchange on a freshly connected stream
///
/// Every failure is reported as [`FinsError::Handshake`] with the cause
/// attached as its source.
pub async fn negotiate<S>(
    stream: &mut S,
    endpoint: &str,
    deadline: &Deadline,
    min_window: Duration,
) -> FinsResult<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    exchange(stream, deadline, min_window)
        .await
        .map_err(|cause| match cause {
            FinsError::Handshake { .. } => cause,
            other => FinsError::Handshake {
                endpoint: endpoint.to_string(),
                message: handshake_message(&other).to_string(),
                source: Some(Box::new(other)),
            },
        })
}

async fn exchange<S>(
    stream: &mut S,
    deadline: &Deadline,
    min_window: Duration,
) -> FinsResult<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = encode_frame(TcpCommand::NodeAddressToPlc, &[0u8; HANDSHAKE_REQUEST_LEN]);

    deadline
        .run("send node address request", async {
            stream
                .write_all(&request)
                .await
                .map_err(|e| classify_io_error("failed to send node address request", e))
        })
        .await?;

    let frame = read_frame(stream, TcpCommand::NodeAddressFromPlc, deadline, min_window).await?;
    let payload = &frame.payload;

    if payload.len() < HANDSHAKE_RESPONSE_LEN {
        return Err(FinsError::invalid_data(format!(
            "node address response too short: {} of {} bytes",
            payload.len(),
            HANDSHAKE_RESPONSE_LEN
        )));
    }

    let nodes = NodeIds::new(payload[3], payload[7])?;
    debug!(
        "Negotiated node ids: local={} remote={}",
        nodes.local(),
        nodes.remote()
    );

    Ok(Negotiated {
        nodes,
        bytes_sent: request.len(),
        bytes_received: frame.bytes,
    })
}

fn handshake_message(cause: &FinsError) -> &'static str {
    match cause {
        FinsError::InvalidData { .. } => "node address response was too short",
        FinsError::InvalidNodeId { role: "local", .. } => "response contained an invalid local node id",
        FinsError::InvalidNodeId { .. } => "response contained an invalid remote node id",
        FinsError::Protocol(_) => "the PLC rejected the node address request",
        FinsError::Timeout { .. } => "timed out waiting for the node address response",
        _ => "node address exchange failed",
    }
}
