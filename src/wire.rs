//! Protobuf wire-format writing: tags, varints, zigzag, fixed-width values and
//! length-delimited payloads.

/// The low three bits of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

/// Encode a signed 32-bit value with zigzag encoding.
#[inline]
pub fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// Encode a signed 64-bit value with zigzag encoding.
#[inline]
pub fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// An append-only byte buffer that knows how to write wire-format primitives.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_tag(&mut self, number: u32, wire_type: WireType) {
        self.write_varint((u64::from(number) << 3) | wire_type as u64);
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// A varint length prefix followed by the bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// A complete length-delimited field: tag, length, payload.
    pub fn write_length_delimited(&mut self, number: u32, payload: &[u8]) {
        self.write_tag(number, WireType::LengthDelimited);
        self.write_bytes(payload);
    }

    /// A complete group field: start tag, payload, end tag.
    pub fn write_group(&mut self, number: u32, payload: &[u8]) {
        self.write_tag(number, WireType::StartGroup);
        self.buf.extend_from_slice(payload);
        self.write_tag(number, WireType::EndGroup);
    }

    /// A message-set item: `group 1 { type_id = 2; message = 3; }`.
    pub fn write_message_set_item(&mut self, type_id: u32, payload: &[u8]) {
        self.write_tag(1, WireType::StartGroup);
        self.write_tag(2, WireType::Varint);
        self.write_varint(u64::from(type_id));
        self.write_length_delimited(3, payload);
        self.write_tag(1, WireType::EndGroup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut WireWriter)) -> Vec<u8> {
        let mut w = WireWriter::new();
        f(&mut w);
        w.into_bytes()
    }

    #[test]
    fn test_varint() {
        assert_eq!(written(|w| w.write_varint(1)), vec![0x01]);
        assert_eq!(written(|w| w.write_varint(300)), vec![0xac, 0x02]);
        assert_eq!(written(|w| w.write_varint(u64::MAX)).len(), 10);
    }

    #[test]
    fn test_negative_int32_is_sign_extended() {
        let bytes = written(|w| w.write_varint(i64::from(-1i32) as u64));
        assert_eq!(bytes, vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag32(i32::MIN), u32::MAX);
        assert_eq!(zigzag64(-2), 3);
    }

    #[test]
    fn test_tags_and_fixed() {
        assert_eq!(written(|w| w.write_tag(1, WireType::Varint)), vec![0x08]);
        assert_eq!(written(|w| w.write_tag(50000, WireType::LengthDelimited)), vec![0x82, 0xb5, 0x18]);
        assert_eq!(written(|w| w.write_fixed32(1)), vec![1, 0, 0, 0]);
        assert_eq!(written(|w| w.write_fixed64(1.0f64.to_bits())), 1.0f64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_framing() {
        assert_eq!(written(|w| w.write_length_delimited(2, b"hi")), vec![0x12, 0x02, b'h', b'i']);
        assert_eq!(written(|w| w.write_group(1, &[0x10, 0x01])), vec![0x0b, 0x10, 0x01, 0x0c]);
        assert_eq!(
            written(|w| w.write_message_set_item(4, &[])),
            vec![0x0b, 0x10, 0x04, 0x1a, 0x00, 0x0c]
        );
    }
}
