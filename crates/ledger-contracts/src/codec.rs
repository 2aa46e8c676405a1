//! Fixed-offset field access for contract buffers
//!
//! Inputs, outputs, locals and state are raw little-endian byte buffers.
//! Reads past the end yield zero and writes past the end are dropped, so
//! contract code never panics on a short buffer.

use ledger_core::Id;

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    if let Some(src) = offset.checked_add(N).and_then(|end| bytes.get(offset..end)) {
        out.copy_from_slice(src);
    }
    out
}

fn put<const N: usize>(bytes: &mut [u8], offset: usize, value: [u8; N]) {
    if let Some(dst) = offset.checked_add(N).and_then(|end| bytes.get_mut(offset..end)) {
        dst.copy_from_slice(&value);
    }
}

/// Read a byte
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    field::<1>(bytes, offset)[0]
}

/// Read a `u16`
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(field(bytes, offset))
}

/// Read a `u32`
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(field(bytes, offset))
}

/// Read a `u64`
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(field(bytes, offset))
}

/// Read an `i64`
pub fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(field(bytes, offset))
}

/// Read a 32-byte id
pub fn read_id(bytes: &[u8], offset: usize) -> Id {
    Id(field(bytes, offset))
}

/// Write a byte
pub fn write_u8(bytes: &mut [u8], offset: usize, value: u8) {
    put(bytes, offset, [value]);
}

/// Write a `u16`
pub fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    put(bytes, offset, value.to_le_bytes());
}

/// Write a `u32`
pub fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    put(bytes, offset, value.to_le_bytes());
}

/// Write a `u64`
pub fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    put(bytes, offset, value.to_le_bytes());
}

/// Write an `i64`
pub fn write_i64(bytes: &mut [u8], offset: usize, value: i64) {
    put(bytes, offset, value.to_le_bytes());
}

/// Write a 32-byte id
pub fn write_id(bytes: &mut [u8], offset: usize, value: &Id) {
    put(bytes, offset, value.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_roundtrip_in_place() {
        let mut buffer = [0u8; 48];
        write_id(&mut buffer, 0, &Id([7; 32]));
        write_i64(&mut buffer, 32, -5);
        write_u16(&mut buffer, 40, 513);
        assert_eq!(read_id(&buffer, 0), Id([7; 32]));
        assert_eq!(read_i64(&buffer, 32), -5);
        assert_eq!(read_u16(&buffer, 40), 513);
    }

    #[test]
    fn test_out_of_range_is_harmless() {
        let mut buffer = [1u8; 4];
        assert_eq!(read_u64(&buffer, 0), 0);
        assert_eq!(read_u8(&buffer, usize::MAX), 0);
        write_i64(&mut buffer, 2, 9);
        assert_eq!(buffer, [1u8; 4]);
        assert_eq!(read_u32(&buffer, 0), 0x0101_0101);
    }
}
