//! Request-response protocol used to fetch and push record envelopes.

#[cfg(test)]
#[path = "tests/record_protocol.rs"]
mod tests;

use std::io;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use futures_util::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::request_response::Codec;
use libp2p::StreamProtocol;

pub const RECORD_PROTOCOL: StreamProtocol = StreamProtocol::new("/iprs/record/1.0.0");

/// Upper bound on an encoded request or response.
pub const MAX_RECORD_MESSAGE_SIZE: u32 = 64 * 1024;

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum RecordRequest {
    /// Ask for the envelope held under `name`.
    Get { name: String },
    /// Offer `envelope` for `name`; the receiver decides whether to keep it.
    Put { name: String, envelope: Vec<u8> },
}

#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum RecordResponse {
    Found { envelope: Vec<u8> },
    NotFound,
    /// A `Put` was received. Says nothing about whether it was stored.
    Accepted,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RecordCodec;

async fn read_message<T, M>(io: &mut T) -> io::Result<M>
where
    T: AsyncRead + Unpin + Send,
    M: BorshDeserialize,
{
    let mut len_buf = [0_u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len > MAX_RECORD_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {len} bytes exceeds limit"),
        ));
    }

    let mut buf = vec![0_u8; len as usize];
    io.read_exact(&mut buf).await?;

    borsh::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_message<T, M>(io: &mut T, message: &M) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: BorshSerialize + Sync,
{
    let buf = borsh::to_vec(message)?;

    let len = u32::try_from(buf.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_MESSAGE_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))?;

    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&buf).await?;
    io.flush().await?;

    Ok(())
}

#[async_trait]
impl Codec for RecordCodec {
    type Protocol = StreamProtocol;
    type Request = RecordRequest;
    type Response = RecordResponse;

    async fn read_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_message(io).await
    }

    async fn read_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
    ) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_message(io).await
    }

    async fn write_request<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        req: Self::Request,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_message(io, &req).await
    }

    async fn write_response<T>(
        &mut self,
        _protocol: &Self::Protocol,
        io: &mut T,
        res: Self::Response,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_message(io, &res).await
    }
}
