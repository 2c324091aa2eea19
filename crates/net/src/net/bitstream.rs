//! Bit-granular encoder/decoder every wire structure is serialized through.
//!
//! Bits are packed least-significant first within each byte, so byte-aligned
//! integers come out little-endian. Writes only ever extend the stream (or
//! replace it wholesale with [`BitStream::write_buffer`]); reads advance a
//! separate cursor and fail without moving it when the stream is exhausted.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream exhausted: requested {requested} bits, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitStream {
    buffer: Vec<u8>,
    write_bit: usize,
    read_bit: usize,
}

impl BitStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bytes),
            write_bit: 0,
            read_bit: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        let mut stream = Self::new();
        stream.write_buffer(data);
        stream
    }

    /// Replaces the whole content with `data` and rewinds the read cursor.
    pub fn write_buffer(&mut self, data: &[u8]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(data);
        self.write_bit = data.len() * 8;
        self.read_bit = 0;
    }

    /// Appends `data` after the current end of the stream.
    pub fn write_data(&mut self, data: &[u8]) {
        self.write_bytes(data);
    }

    /// Appends exactly the written bits of `other`, ignoring its read cursor.
    pub fn write_stream(&mut self, other: &BitStream) {
        let whole_bytes = other.write_bit / 8;
        self.write_bytes(&other.buffer[..whole_bytes]);
        let tail = other.write_bit % 8;
        if tail > 0 {
            self.write_bits(other.buffer[whole_bytes] as u32, tail as u32);
        }
    }

    pub fn write_bit(&mut self, value: bool) {
        let byte = self.write_bit / 8;
        if byte == self.buffer.len() {
            self.buffer.push(0);
        }
        if value {
            self.buffer[byte] |= 1 << (self.write_bit % 8);
        }
        self.write_bit += 1;
    }

    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        if self.is_write_aligned() && count % 8 == 0 {
            let bytes = value.to_le_bytes();
            self.buffer.extend_from_slice(&bytes[..(count / 8) as usize]);
            self.write_bit += count as usize;
            return;
        }
        for i in 0..count {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.is_write_aligned() {
            self.buffer.extend_from_slice(data);
            self.write_bit += data.len() * 8;
        } else {
            for &byte in data {
                self.write_bits(byte as u32, 8);
            }
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_u32(value as u32);
        self.write_u32((value >> 32) as u32);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn read_bit(&mut self) -> Result<bool, StreamError> {
        self.ensure_remaining(1)?;
        let value = self.buffer[self.read_bit / 8] & (1 << (self.read_bit % 8)) != 0;
        self.read_bit += 1;
        Ok(value)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32, StreamError> {
        debug_assert!(count <= 32);
        self.ensure_remaining(count as usize)?;
        let mut value = 0u32;
        for i in 0..count {
            let bit = self.buffer[self.read_bit / 8] & (1 << (self.read_bit % 8)) != 0;
            value |= (bit as u32) << i;
            self.read_bit += 1;
        }
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        self.read_bit()
    }

    pub fn read_byte(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_bytes(&mut self, output: &mut [u8]) -> Result<(), StreamError> {
        self.ensure_remaining(output.len() * 8)?;
        if self.read_bit % 8 == 0 {
            let start = self.read_bit / 8;
            output.copy_from_slice(&self.buffer[start..start + output.len()]);
            self.read_bit += output.len() * 8;
        } else {
            for byte in output.iter_mut() {
                *byte = self.read_bits(8)? as u8;
            }
        }
        Ok(())
    }

    pub fn read_vec(&mut self, length: usize) -> Result<Vec<u8>, StreamError> {
        let mut output = vec![0u8; length];
        self.read_bytes(&mut output)?;
        Ok(output)
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, StreamError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.read_bits(32)
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        self.ensure_remaining(64)?;
        let low = self.read_u32()? as u64;
        let high = self.read_u32()? as u64;
        Ok(low | (high << 32))
    }

    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<(), StreamError> {
        self.ensure_remaining(count)?;
        self.read_bit += count;
        Ok(())
    }

    /// Copies the unread remainder into a fresh stream, consuming it here.
    pub fn split_remaining(&mut self) -> BitStream {
        let mut rest = BitStream::with_capacity(self.remaining_bits().div_ceil(8));
        while self.remaining_bits() > 0 {
            let chunk = self.remaining_bits().min(32) as u32;
            // Cannot fail: chunk never exceeds what remains.
            if let Ok(bits) = self.read_bits(chunk) {
                rest.write_bits(bits, chunk);
            }
        }
        rest
    }

    /// Byte length of the serialized form (partial trailing byte included).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write_bit == 0
    }

    pub fn bit_len(&self) -> usize {
        self.write_bit
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn read_position(&self) -> usize {
        self.read_bit
    }

    pub fn remaining_bits(&self) -> usize {
        self.write_bit - self.read_bit
    }

    pub fn rewind(&mut self) {
        self.read_bit = 0;
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.write_bit = 0;
        self.read_bit = 0;
    }

    fn is_write_aligned(&self) -> bool {
        self.write_bit % 8 == 0
    }

    fn ensure_remaining(&self, requested: usize) -> Result<(), StreamError> {
        let remaining = self.remaining_bits();
        if requested > remaining {
            return Err(StreamError::Exhausted {
                requested,
                remaining,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_primitives_roundtrip() {
        let mut stream = BitStream::new();
        stream.write_bit(true);
        stream.write_i32(-123_456);
        stream.write_bool(false);
        stream.write_f32(3.25);
        stream.write_bits(0b101, 3);
        stream.write_i16(-2);
        stream.write_u16(65_535);
        stream.write_i64(-9_000_000_000);
        stream.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);
        stream.write_byte(7);

        assert!(stream.read_bit().unwrap());
        assert_eq!(stream.read_i32().unwrap(), -123_456);
        assert!(!stream.read_bool().unwrap());
        assert_eq!(stream.read_f32().unwrap(), 3.25);
        assert_eq!(stream.read_bits(3).unwrap(), 0b101);
        assert_eq!(stream.read_i16().unwrap(), -2);
        assert_eq!(stream.read_u16().unwrap(), 65_535);
        assert_eq!(stream.read_i64().unwrap(), -9_000_000_000);
        assert_eq!(stream.read_vec(4).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(stream.read_byte().unwrap(), 7);
        assert_eq!(stream.remaining_bits(), 0);
    }

    #[test]
    fn test_no_implicit_padding() {
        let mut stream = BitStream::new();
        stream.write_bit(true);
        stream.write_bit(false);
        stream.write_bit(true);
        assert_eq!(stream.bit_len(), 3);
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.as_bytes(), &[0b101]);

        stream.write_u32(u32::MAX);
        assert_eq!(stream.bit_len(), 35);
        assert_eq!(stream.len(), 5);
    }

    #[test]
    fn test_aligned_integers_are_little_endian() {
        let mut stream = BitStream::new();
        stream.write_u32(0x0403_0201);
        assert_eq!(stream.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_exhausted_read_fails_without_moving_cursor() {
        let mut stream = BitStream::new();
        stream.write_u16(42);

        let err = stream.read_u32().unwrap_err();
        assert_eq!(
            err,
            StreamError::Exhausted {
                requested: 32,
                remaining: 16
            }
        );
        assert_eq!(stream.read_position(), 0);
        assert_eq!(stream.read_u16().unwrap(), 42);
        assert!(stream.read_bit().is_err());
    }

    #[test]
    fn test_write_buffer_replaces_and_write_data_appends() {
        let mut stream = BitStream::new();
        stream.write_u32(99);
        stream.write_buffer(&[1, 2]);
        assert_eq!(stream.as_bytes(), &[1, 2]);

        stream.write_data(&[3]);
        assert_eq!(stream.as_bytes(), &[1, 2, 3]);
        assert_eq!(stream.read_vec(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_stream_keeps_exact_bit_length() {
        let mut inner = BitStream::new();
        inner.write_bits(0b11, 2);
        inner.write_f32(-1.5);

        let mut outer = BitStream::new();
        outer.write_bit(false);
        outer.write_stream(&inner);
        outer.write_bit(true);

        assert_eq!(outer.bit_len(), 1 + inner.bit_len() + 1);
        assert!(!outer.read_bit().unwrap());
        assert_eq!(outer.read_bits(2).unwrap(), 0b11);
        assert_eq!(outer.read_f32().unwrap(), -1.5);
        assert!(outer.read_bit().unwrap());
    }

    #[test]
    fn test_split_remaining() {
        let mut stream = BitStream::new();
        stream.write_i32(17);
        stream.write_bits(0b1_0110, 5);
        stream.write_u16(300);

        assert_eq!(stream.read_i32().unwrap(), 17);
        let mut rest = stream.split_remaining();
        assert_eq!(stream.remaining_bits(), 0);
        assert_eq!(rest.bit_len(), 21);
        assert_eq!(rest.read_bits(5).unwrap(), 0b1_0110);
        assert_eq!(rest.read_u16().unwrap(), 300);
    }
}
