//! Buffered framing atop any `AsyncRead + AsyncWrite` byte transport: C2.
//!
//! `read_exact` never returns short — a premature EOF is reported as a
//! transport error rather than a partial read. Writes below the buffer's
//! free space accumulate; larger writes flush what's pending and then stream
//! the payload directly rather than copying it through the buffer. Not safe
//! for concurrent writers; the session layer serializes command-channel
//! writes with its own lock.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use sttp_core::wire;
use sttp_core::{Result, SttpError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Matches the reference implementation's socket buffer size.
pub const BUFFER_SIZE: usize = 1420;

pub struct FramedStream<S> {
    inner: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    scratch: Box<[u8; BUFFER_SIZE]>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S) -> Self {
        FramedStream {
            inner,
            read_buf: BytesMut::with_capacity(BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(BUFFER_SIZE),
            scratch: Box::new([0u8; BUFFER_SIZE]),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Reads exactly `n` bytes, blocking across as many socket reads as
    /// necessary. Fails with a transport error on EOF before `n` bytes
    /// arrive.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        while self.read_buf.len() < n {
            let read = self.inner.read(self.scratch.as_mut_slice()).await.map_err(SttpError::Transport)?;
            if read == 0 {
                return Err(SttpError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of stream before requested bytes arrived",
                )));
            }
            self.read_buf.extend_from_slice(&self.scratch[..read]);
        }
        Ok(self.read_buf.split_to(n).freeze())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.write_buf.capacity() - self.write_buf.len() {
            self.flush().await?;
        }
        if bytes.len() >= BUFFER_SIZE {
            self.inner.write_all(bytes).await.map_err(SttpError::Transport)?;
        } else {
            self.write_buf.extend_from_slice(bytes);
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.inner.write_all(&self.write_buf).await.map_err(SttpError::Transport)?;
            self.write_buf.clear();
        }
        self.inner.flush().await.map_err(SttpError::Transport)
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1).await?[0])
    }

    pub async fn read_u16_be(&mut self) -> Result<u16> {
        wire::read_u16_be(&self.read_exact(2).await?)
    }

    pub async fn read_u32_be(&mut self) -> Result<u32> {
        wire::read_u32_be(&self.read_exact(4).await?)
    }

    pub async fn read_u64_be(&mut self) -> Result<u64> {
        wire::read_u64_be(&self.read_exact(8).await?)
    }

    pub async fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value]).await
    }

    pub async fn write_u16_be(&mut self, value: u16) -> Result<()> {
        let mut out = Vec::with_capacity(2);
        wire::write_u16_be(&mut out, value);
        self.write(&out).await
    }

    pub async fn write_u32_be(&mut self, value: u32) -> Result<()> {
        let mut out = Vec::with_capacity(4);
        wire::write_u32_be(&mut out, value);
        self.write(&out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// An in-memory duplex pipe that feeds reads from a fixed byte vector and
    /// captures writes, chunked to exercise multi-read framing.
    struct MockStream {
        inbound: std::collections::VecDeque<u8>,
        chunk: usize,
        pub outbound: Vec<u8>,
    }

    impl MockStream {
        fn new(inbound: Vec<u8>, chunk: usize) -> Self {
            MockStream {
                inbound: inbound.into(),
                chunk,
                outbound: Vec::new(),
            }
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let take = self.chunk.min(buf.remaining()).min(self.inbound.len());
            for _ in 0..take {
                buf.put_slice(&[self.inbound.pop_front().unwrap()]);
            }
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.outbound.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn read_exact_spans_multiple_short_reads() {
        let stream = MockStream::new(vec![0xDE, 0xAD, 0xBE, 0xEF], 1);
        let mut framed = FramedStream::new(stream);

        let chunk = framed.read_exact(4).await.unwrap();
        assert_eq!(&chunk[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[tokio::test]
    async fn read_exact_fails_on_premature_eof() {
        let stream = MockStream::new(vec![0x01, 0x02], 4);
        let mut framed = FramedStream::new(stream);

        let err = framed.read_exact(5).await.unwrap_err();
        assert!(matches!(err, SttpError::Transport(_)));
    }

    #[tokio::test]
    async fn small_writes_accumulate_until_flush() {
        let stream = MockStream::new(Vec::new(), 1);
        let mut framed = FramedStream::new(stream);

        framed.write_u8(1).await.unwrap();
        framed.write_u8(2).await.unwrap();
        assert!(framed.inner.outbound.is_empty());

        framed.flush().await.unwrap();
        assert_eq!(framed.inner.outbound, vec![1, 2]);
    }

    #[tokio::test]
    async fn oversized_write_flushes_pending_then_streams_directly() {
        let stream = MockStream::new(Vec::new(), 1);
        let mut framed = FramedStream::new(stream);

        framed.write_u8(9).await.unwrap();
        let big = vec![7u8; BUFFER_SIZE + 1];
        framed.write(&big).await.unwrap();

        assert_eq!(framed.inner.outbound[0], 9);
        assert_eq!(framed.inner.outbound.len(), 1 + big.len());
    }
}
