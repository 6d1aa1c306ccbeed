//! Blocking channel over an ordered byte stream

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use fpsi_core::Block;

use crate::constants::MAX_FRAME_BYTES;
use crate::error::{ProtocolError, Result};

/// One end of the protocol's single ordered channel. Every send on one
/// side must be matched by a recv of the same type on the other; the
/// channel keeps cumulative byte counters for the statistics report.
pub struct Channel<S> {
    stream: S,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<S: Read + Write> Channel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    pub fn send_u8(&mut self, value: u8) -> Result<()> {
        self.stream.write_u8(value)?;
        self.bytes_sent += 1;
        Ok(())
    }

    pub fn recv_u8(&mut self) -> Result<u8> {
        let value = self.stream.read_u8()?;
        self.bytes_received += 1;
        Ok(value)
    }

    pub fn send_i32(&mut self, value: i32) -> Result<()> {
        self.stream.write_i32::<LittleEndian>(value)?;
        self.bytes_sent += 4;
        Ok(())
    }

    pub fn recv_i32(&mut self) -> Result<i32> {
        let value = self.stream.read_i32::<LittleEndian>()?;
        self.bytes_received += 4;
        Ok(value)
    }

    pub fn send_u64(&mut self, value: u64) -> Result<()> {
        self.stream.write_u64::<LittleEndian>(value)?;
        self.bytes_sent += 8;
        Ok(())
    }

    pub fn recv_u64(&mut self) -> Result<u64> {
        let value = self.stream.read_u64::<LittleEndian>()?;
        self.bytes_received += 8;
        Ok(value)
    }

    pub fn send_block(&mut self, block: Block) -> Result<()> {
        self.stream.write_all(&block.to_bytes())?;
        self.bytes_sent += 16;
        Ok(())
    }

    pub fn recv_block(&mut self) -> Result<Block> {
        let mut bytes = [0u8; 16];
        self.stream.read_exact(&mut bytes)?;
        self.bytes_received += 16;
        Ok(Block::from_bytes(bytes))
    }

    /// Send a fixed-width payload whose length the peer already knows.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    pub fn recv_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf)?;
        self.bytes_received += buf.len() as u64;
        Ok(())
    }

    /// Send a length-prefixed payload.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_u64(bytes.len() as u64)?;
        self.send_raw(bytes)
    }

    pub fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.recv_u64()?;
        if len > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_BYTES,
            });
        }
        let mut buf = vec![0u8; len as usize];
        self.recv_raw(&mut buf)?;
        Ok(buf)
    }

    /// Send a length-prefixed UTF-8 token.
    pub fn send_token(&mut self, token: &str) -> Result<()> {
        self.send_bytes(token.as_bytes())
    }

    pub fn recv_token(&mut self) -> Result<String> {
        let bytes = self.recv_bytes()?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidToken)
    }
}
