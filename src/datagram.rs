// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Length-prefixed datagram codec.
//!
//! Internal bus body: `u8 recipient_count, recipient_count x u64
//! recipients, u64 sender, u16 message_type, payload`. Control messages
//! use a reserved recipient of `CONTROL_CHANNEL`.
//!
//! Client body: `u16 message_type` followed by type-specific fields;
//! strings are `u16 length` + bytes; integers are little-endian.
//!
//! All multi-byte integers travel little-endian on the wire regardless
//! of host endianness.

pub mod endianness {
    #[cfg(target_endian = "big")]
    pub fn swap_le_16(v: u16) -> u16 {
        (v & 0x00ff) << 8 | (v & 0xff00) >> 8
    }

    #[cfg(target_endian = "big")]
    pub fn swap_le_32(v: u32) -> u32 {
        (v & 0x0000_00ff) << 24
            | (v & 0x0000_ff00) << 8
            | (v & 0x00ff_0000) >> 8
            | (v & 0xff00_0000) >> 24
    }

    #[cfg(target_endian = "big")]
    pub fn swap_le_64(v: u64) -> u64 {
        let mut out: u64 = 0;
        for i in 0..8 {
            out |= ((v >> (i * 8)) & 0xff) << ((7 - i) * 8);
        }
        out
    }

    #[cfg(target_endian = "little")]
    pub fn swap_le_16(v: u16) -> u16 {
        v
    }

    #[cfg(target_endian = "little")]
    pub fn swap_le_32(v: u32) -> u32 {
        v
    }

    #[cfg(target_endian = "little")]
    pub fn swap_le_64(v: u64) -> u64 {
        v
    }
}

use crate::globals::{Channel, DgSize, DoId, Zone, DG_SIZE_MAX};
use crate::results::{DgError, DgResult};

/// An append-only byte buffer with typed field writers.
#[derive(Debug, Clone, Default)]
pub struct Datagram {
    buffer: Vec<u8>,
}

impl Datagram {
    pub fn new() -> Self {
        Datagram { buffer: Vec::new() }
    }

    fn check_add_length(&self, length: usize) -> DgResult {
        if self.buffer.len() + length > DG_SIZE_MAX as usize {
            return Err(DgError::Overflow(DG_SIZE_MAX));
        }
        Ok(())
    }

    pub fn add_bool(&mut self, v: bool) -> DgResult {
        self.add_u8(v as u8)
    }

    pub fn add_u8(&mut self, v: u8) -> DgResult {
        self.check_add_length(1)?;
        self.buffer.push(v);
        Ok(())
    }

    pub fn add_u16(&mut self, v: u16) -> DgResult {
        self.check_add_length(2)?;
        self.buffer.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn add_u32(&mut self, v: u32) -> DgResult {
        self.check_add_length(4)?;
        self.buffer.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn add_u64(&mut self, v: u64) -> DgResult {
        self.check_add_length(8)?;
        self.buffer.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn add_i8(&mut self, v: i8) -> DgResult {
        self.add_u8(v as u8)
    }

    pub fn add_i16(&mut self, v: i16) -> DgResult {
        self.add_u16(v as u16)
    }

    pub fn add_i32(&mut self, v: i32) -> DgResult {
        self.add_u32(v as u32)
    }

    pub fn add_i64(&mut self, v: i64) -> DgResult {
        self.add_u64(v as u64)
    }

    pub fn add_f32(&mut self, v: f32) -> DgResult {
        self.add_u32(v.to_bits())
    }

    pub fn add_f64(&mut self, v: f64) -> DgResult {
        self.add_u64(v.to_bits())
    }

    /// Adds a datagram/field length tag.
    pub fn add_size(&mut self, v: DgSize) -> DgResult {
        self.add_u16(v)
    }

    pub fn add_channel(&mut self, v: Channel) -> DgResult {
        self.add_u64(v)
    }

    pub fn add_doid(&mut self, v: DoId) -> DgResult {
        self.add_u32(v)
    }

    pub fn add_zone(&mut self, v: Zone) -> DgResult {
        self.add_u32(v)
    }

    pub fn add_location(&mut self, parent: DoId, zone: Zone) -> DgResult {
        self.add_u32(parent)?;
        self.add_u32(zone)
    }

    /// Appends raw bytes. Not to be confused with `add_blob`, which
    /// prefixes a length tag.
    pub fn add_data(&mut self, mut v: Vec<u8>) -> DgResult {
        if v.len() > DG_SIZE_MAX as usize {
            return Err(DgError::Overflow(DG_SIZE_MAX));
        }
        self.check_add_length(v.len())?;
        self.buffer.append(&mut v);
        Ok(())
    }

    pub fn add_datagram(&mut self, mut dg: Datagram) -> DgResult {
        self.check_add_length(dg.buffer.len())?;
        self.buffer.append(&mut dg.buffer);
        Ok(())
    }

    /// Adds a length-prefixed UTF-8 string.
    pub fn add_string(&mut self, v: &str) -> DgResult {
        if v.len() > DG_SIZE_MAX as usize {
            return Err(DgError::Overflow(DG_SIZE_MAX));
        }
        self.add_u16(v.len() as u16)?;
        self.check_add_length(v.len())?;
        self.buffer.extend_from_slice(v.as_bytes());
        Ok(())
    }

    /// Adds a length-prefixed binary blob (a dclass "blob" value).
    pub fn add_blob(&mut self, mut v: Vec<u8>) -> DgResult {
        self.add_size(v.len() as DgSize)?;
        self.check_add_length(v.len())?;
        self.buffer.append(&mut v);
        Ok(())
    }

    /// Appends the generic header for internal bus messages addressed
    /// to one or more recipients:
    /// `(recipient_count: u8, recipients: [u64], sender: u64, msg_type: u16)`.
    pub fn add_server_header(&mut self, to: &[Channel], from: Channel, msg_type: u16) -> DgResult {
        self.add_u8(to.len() as u8)?;
        for recipient in to {
            self.add_channel(*recipient)?;
        }
        self.add_channel(from)?;
        self.add_u16(msg_type)
    }

    /// Appends a control header: always one recipient (`CONTROL_CHANNEL`),
    /// no sender.
    pub fn add_control_header(&mut self, msg_type: u16) -> DgResult {
        self.add_u8(1)?;
        self.add_channel(crate::globals::CONTROL_CHANNEL)?;
        self.add_u16(msg_type)
    }

    pub fn size(&self) -> DgSize {
        self.buffer.len() as DgSize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Wraps this datagram's bytes with a `u16` little-endian length
    /// prefix, ready to write to a socket.
    pub fn to_framed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.buffer.len());
        out.extend_from_slice(&(self.buffer.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.buffer);
        out
    }
}

impl From<Vec<u8>> for Datagram {
    fn from(buffer: Vec<u8>) -> Self {
        Datagram { buffer }
    }
}

/// Forward-only reader over a `Datagram`'s buffer.
pub struct DatagramIterator {
    buffer: Vec<u8>,
    offset: usize,
}

impl DatagramIterator {
    pub fn new(dg: Datagram) -> Self {
        DatagramIterator {
            buffer: dg.buffer,
            offset: 0,
        }
    }

    fn check_read_length(&self, bytes: usize) -> DgResult {
        if self.offset + bytes > self.buffer.len() {
            return Err(DgError::Truncated);
        }
        Ok(())
    }

    pub fn tell(&self) -> DgSize {
        self.offset as DgSize
    }

    pub fn seek(&mut self, to: DgSize) {
        self.offset = to as usize;
    }

    pub fn skip(&mut self, bytes: DgSize) -> DgResult {
        self.check_read_length(bytes as usize)?;
        self.offset += bytes as usize;
        Ok(())
    }

    pub fn get_remaining(&self) -> DgSize {
        (self.buffer.len() - self.offset) as DgSize
    }

    pub fn read_data(&mut self, bytes: DgSize) -> DgResult<Vec<u8>> {
        self.check_read_length(bytes as usize)?;
        let slice = self.buffer[self.offset..self.offset + bytes as usize].to_vec();
        self.offset += bytes as usize;
        Ok(slice)
    }

    /// Reads every remaining byte (used to pass through State Server
    /// payloads verbatim).
    pub fn read_remainder(&mut self) -> Vec<u8> {
        let slice = self.buffer[self.offset..].to_vec();
        self.offset = self.buffer.len();
        slice
    }

    pub fn read_u8(&mut self) -> DgResult<u8> {
        self.check_read_length(1)?;
        let v = self.buffer[self.offset];
        self.offset += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> DgResult<u16> {
        self.check_read_length(2)?;
        let v = u16::from_le_bytes(self.buffer[self.offset..self.offset + 2].try_into().unwrap());
        self.offset += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> DgResult<u32> {
        self.check_read_length(4)?;
        let v = u32::from_le_bytes(self.buffer[self.offset..self.offset + 4].try_into().unwrap());
        self.offset += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> DgResult<u64> {
        self.check_read_length(8)?;
        let v = u64::from_le_bytes(self.buffer[self.offset..self.offset + 8].try_into().unwrap());
        self.offset += 8;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> DgResult<i8> {
        self.read_u8().map(|v| v as i8)
    }

    pub fn read_i16(&mut self) -> DgResult<i16> {
        self.read_u16().map(|v| v as i16)
    }

    pub fn read_i32(&mut self) -> DgResult<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_i64(&mut self) -> DgResult<i64> {
        self.read_u64().map(|v| v as i64)
    }

    pub fn read_f32(&mut self) -> DgResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    pub fn read_f64(&mut self) -> DgResult<f64> {
        self.read_u64().map(f64::from_bits)
    }

    pub fn read_bool(&mut self) -> DgResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_size(&mut self) -> DgResult<DgSize> {
        self.read_u16()
    }

    pub fn read_channel(&mut self) -> DgResult<Channel> {
        self.read_u64()
    }

    pub fn read_doid(&mut self) -> DgResult<DoId> {
        self.read_u32()
    }

    pub fn read_zone(&mut self) -> DgResult<Zone> {
        self.read_u32()
    }

    /// Reads a length-prefixed UTF-8 string. Invalid UTF-8 is replaced
    /// lossily rather than failing the read, matching the client
    /// protocol's permissive handling of malformed strings.
    pub fn read_string(&mut self) -> DgResult<String> {
        let len = self.read_u16()?;
        let bytes = self.read_data(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn read_blob(&mut self) -> DgResult<Vec<u8>> {
        let len = self.read_size()?;
        self.read_data(len)
    }
}

/// Attempts to pull exactly one length-prefixed frame off the front of
/// `buf`. Returns `None` if the frame isn't fully buffered yet. This is
/// the TCP read-loop's framing step, shared by the MD and the CA.
pub fn try_extract_frame(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    if buf.len() < 2 {
        return None;
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < 2 + len {
        return None;
    }
    let frame: Vec<u8> = buf[2..2 + len].to_vec();
    buf.drain(0..2 + len);
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars() {
        let mut dg = Datagram::new();
        dg.add_u8(7).unwrap();
        dg.add_u16(1234).unwrap();
        dg.add_u32(0xdead_beef).unwrap();
        dg.add_u64(0x1122_3344_5566_7788).unwrap();
        dg.add_bool(true).unwrap();
        dg.add_string("hello").unwrap();

        let mut dgi = DatagramIterator::new(dg);
        assert_eq!(dgi.read_u8().unwrap(), 7);
        assert_eq!(dgi.read_u16().unwrap(), 1234);
        assert_eq!(dgi.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(dgi.read_u64().unwrap(), 0x1122_3344_5566_7788);
        assert!(dgi.read_bool().unwrap());
        assert_eq!(dgi.read_string().unwrap(), "hello");
        assert_eq!(dgi.get_remaining(), 0);
    }

    #[test]
    fn truncated_read_is_an_error_not_a_panic() {
        let mut dg = Datagram::new();
        dg.add_u8(1).unwrap();
        let mut dgi = DatagramIterator::new(dg);
        assert_eq!(dgi.read_u32(), Err(DgError::Truncated));
    }

    #[test]
    fn server_header_round_trips_recipients() {
        let mut dg = Datagram::new();
        dg.add_server_header(&[10, 20, 30], 99, 4242).unwrap();

        let mut dgi = DatagramIterator::new(dg);
        assert_eq!(dgi.read_u8().unwrap(), 3);
        assert_eq!(dgi.read_channel().unwrap(), 10);
        assert_eq!(dgi.read_channel().unwrap(), 20);
        assert_eq!(dgi.read_channel().unwrap(), 30);
        assert_eq!(dgi.read_channel().unwrap(), 99);
        assert_eq!(dgi.read_u16().unwrap(), 4242);
    }

    #[test]
    fn frame_extraction_waits_for_full_buffer() {
        let mut dg = Datagram::new();
        dg.add_string("partial").unwrap();
        let framed = dg.to_framed_bytes();

        let mut buf = framed[..framed.len() - 1].to_vec();
        assert!(try_extract_frame(&mut buf).is_none());

        buf.push(*framed.last().unwrap());
        let frame = try_extract_frame(&mut buf).unwrap();
        assert!(buf.is_empty());

        let mut dgi = DatagramIterator::new(Datagram::from(frame));
        assert_eq!(dgi.read_string().unwrap(), "partial");
    }
}
