//! Tagged decode of legacy binary blobs.
//!
//! Older releases persisted detection boxes as JVM object-stream blobs
//! holding a primitive `double[]`. Only that one shape is accepted: the
//! decoder walks the stream tags explicitly and anything else comes back as
//! `None`, letting the caller substitute a fixed default instead of carrying
//! a general-purpose deserializer.

const STREAM_MAGIC: [u8; 2] = [0xAC, 0xED];
const STREAM_VERSION: [u8; 2] = [0x00, 0x05];
const TC_ARRAY: u8 = 0x75;
const TC_CLASSDESC: u8 = 0x72;
const TC_ENDBLOCKDATA: u8 = 0x78;
const TC_NULL: u8 = 0x70;
const DOUBLE_ARRAY_CLASS: &[u8] = b"[D";

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn take_u8(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn take_u16(&mut self) -> Option<u16> {
        self.take(2).map(|s| u16::from_be_bytes([s[0], s[1]]))
    }

    fn take_i32(&mut self) -> Option<i32> {
        self.take(4)
            .map(|s| i32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decodes a serialized `double[]` blob, or `None` for any other payload.
pub fn decode_f64_array(bytes: &[u8]) -> Option<Vec<f64>> {
    let mut cur = Cursor::new(bytes);

    if cur.take(2)? != STREAM_MAGIC || cur.take(2)? != STREAM_VERSION {
        return None;
    }
    if cur.take_u8()? != TC_ARRAY || cur.take_u8()? != TC_CLASSDESC {
        return None;
    }

    let name_len = cur.take_u16()? as usize;
    if cur.take(name_len)? != DOUBLE_ARRAY_CLASS {
        return None;
    }

    // serialVersionUID, flags, declared field count (always 0 for arrays)
    cur.take(8)?;
    cur.take_u8()?;
    if cur.take_u16()? != 0 {
        return None;
    }
    if cur.take_u8()? != TC_ENDBLOCKDATA || cur.take_u8()? != TC_NULL {
        return None;
    }

    let len = cur.take_i32()?;
    if len < 0 {
        return None;
    }
    let len = len as usize;
    if cur.remaining() != len * 8 {
        return None;
    }

    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        let chunk = cur.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        values.push(f64::from_be_bytes(raw));
    }
    Some(values)
}
