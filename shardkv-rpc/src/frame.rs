//! # Wire Framing
//!
//! Purpose: turn an [`Envelope`] into bytes on the wire and back. One
//! frame is a 4-byte big-endian length prefix followed by a
//! `bincode`-encoded envelope (§4.4).
//!
//! Modeled on the reference client's hand-rolled RESP encoder/parser
//! (length-prefixed, caller-owned buffers) but generalized to an opaque
//! binary envelope instead of a text protocol, since the wire here carries
//! structured records in both directions rather than a fixed command set.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use shardkv_common::wire::Method;

/// Maximum frame body size accepted from a peer. Guards against a
/// corrupted or malicious length prefix causing an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub call_id: u64,
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnvelopeBody {
    Request { method: Method, payload: Vec<u8> },
    Response { result: Result<Vec<u8>, String> },
}

/// Encodes `envelope` as a length-prefixed frame and writes it.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let body = bincode::serialize(envelope)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame and decodes it. Returns `Ok(None)` on a
/// clean EOF between frames (the peer closed the connection).
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Envelope>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_BYTES}"),
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let envelope = bincode::deserialize(&body)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    Ok(Some(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_request_envelope() {
        let envelope = Envelope {
            call_id: 7,
            body: EnvelopeBody::Request {
                method: Method::Get,
                payload: vec![1, 2, 3],
            },
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &envelope).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded.call_id, 7);
        match decoded.body {
            EnvelopeBody::Request { method, payload } => {
                assert_eq!(method, Method::Get);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            _ => panic!("expected request"),
        }
    }

    #[tokio::test]
    async fn empty_stream_is_a_clean_eof() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
