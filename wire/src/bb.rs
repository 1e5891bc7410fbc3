use crate::error::{DecodeError, EncodeError};
use crate::header::{self, FieldScan, Fields};
use crate::timestamp::{Timestamp, NANOS_PER_SEC};
use crate::DEPTH_MAX;

/// A colf byte buffer meant for reading.
///
/// Reads never go past the size ceiling given at construction, so one
/// top-level decode can not consume more than that many bytes no matter what
/// length prefixes the input declares.
///
/// ```
/// let mut bb = colf_wire::Reader::new(&[0x04, 0xF0, 0x9F, 0x8D, 0x95, 0xC8, 0x01], 64);
/// assert_eq!(bb.read_text(64).as_deref(), Ok("🍕"));
/// assert_eq!(bb.read_u16(), Ok(200));
/// ```
pub struct Reader<'a> {
    data: &'a [u8],
    index: usize,
    size_max: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    /// Create a new Reader over `data` which reads at most `size_max` bytes.
    pub fn new(data: &'a [u8], size_max: usize) -> Reader<'a> {
        Reader { data, index: 0, size_max, depth: 0 }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the number of bytes consumed so far.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes that may still be read before hitting the size ceiling.
    pub fn budget(&self) -> usize {
        self.size_max.saturating_sub(self.index)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.budget() {
            return Err(DecodeError::SizeExceeded { max: self.size_max });
        }
        let end = self.index + len;
        if end > self.data.len() {
            return Err(DecodeError::Truncated);
        }
        let value = &self.data[self.index..end];
        self.index = end;
        Ok(value)
    }

    /// Try to read a byte starting at the current index.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Try to read a list element boolean, which is one byte of 0 or 1.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(DecodeError::Bool(b)),
        }
    }

    /// Read a varint of at most `bits` significant bits. Encodings with more
    /// bytes than the width needs, or with bits beyond it, are rejected.
    fn read_varint(&mut self, bits: u32) -> Result<u64, DecodeError> {
        let max_bytes = (bits + 6) / 7;
        let mut value: u64 = 0;
        for i in 0..max_bytes {
            let byte = self.read_byte()?;
            let shift = 7 * i;
            let payload = u64::from(byte & 0x7F);
            if shift + 7 > bits && payload >> (bits - shift) != 0 {
                return Err(DecodeError::Overflow { bits });
            }
            value |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::Overflow { bits })
    }

    fn read_zigzag(&mut self, bits: u32) -> Result<i64, DecodeError> {
        let value = self.read_varint(bits)?;
        Ok((value >> 1) as i64 ^ -((value & 1) as i64))
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_varint(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(self.read_varint(16)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_varint(32)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.read_varint(64)
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_zigzag(8)? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(self.read_zigzag(16)? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_zigzag(32)? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.read_zigzag(64)
    }

    /// Try to read a little-endian IEEE 754 single.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Try to read a little-endian IEEE 754 double.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_timestamp(&mut self) -> Result<Timestamp, DecodeError> {
        let seconds = self.read_zigzag(64)?;
        let nanos = self.read_varint(32)?;
        if nanos >= u64::from(NANOS_PER_SEC) {
            return Err(DecodeError::Nanos(nanos));
        }
        Ok(Timestamp::new(seconds, nanos as u32))
    }

    /// Read a list element count. Every element takes at least one byte, so
    /// counts beyond the remaining input are rejected before the caller
    /// allocates anything.
    pub fn read_count(&mut self, list_max: usize) -> Result<usize, DecodeError> {
        let count = self.read_varint(64)?;
        if count > list_max as u64 {
            return Err(DecodeError::ListExceeded { count, max: list_max });
        }
        let count = count as usize;
        if count > self.budget() {
            return Err(DecodeError::SizeExceeded { max: self.size_max });
        }
        if count > self.data.len() - self.index {
            return Err(DecodeError::Truncated);
        }
        Ok(count)
    }

    fn read_len(&mut self, max: usize) -> Result<usize, DecodeError> {
        let len = self.read_varint(64)?;
        if len > max as u64 {
            return Err(DecodeError::FieldSizeExceeded { len, max });
        }
        Ok(len as usize)
    }

    /// Try to read length-prefixed binary of at most `max` bytes. This
    /// aliases the underlying memory.
    pub fn read_slice(&mut self, max: usize) -> Result<&'a [u8], DecodeError> {
        let len = self.read_len(max)?;
        self.take(len)
    }

    pub fn read_binary(&mut self, max: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_slice(max)?.to_vec())
    }

    /// Try to read length-prefixed text of at most `max` bytes. Malformed
    /// UTF-8 is replaced rather than rejected.
    pub fn read_text(&mut self, max: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.read_slice(max)?).into_owned())
    }

    /// Number of struct instances being decoded, the innermost included.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Starts the header scan of a struct with `count` fields, one level
    /// below the scans still open.
    pub fn fields(&mut self, count: usize) -> Result<FieldScan, DecodeError> {
        if self.depth >= DEPTH_MAX {
            return Err(DecodeError::DepthExceeded { max: DEPTH_MAX });
        }
        self.depth += 1;
        Ok(FieldScan::new(count))
    }

    /// Reads the next field header of the scan. Returns `None` once the
    /// struct is complete, which also closes its level; the caller must read
    /// the payload of each index returned before asking for the next one.
    pub fn next_field(&mut self, scan: &mut FieldScan) -> Result<Option<usize>, DecodeError> {
        if scan.done {
            self.close(scan);
            return Ok(None);
        }
        let h = self.read_byte()?;
        if h == header::EMPTY && scan.first {
            scan.done = true;
            self.close(scan);
            return Ok(None);
        }
        let (index, last) = header::decode(h).ok_or(DecodeError::Header(h))?;
        if index >= scan.count {
            return Err(DecodeError::FieldIndex { index, count: scan.count });
        }
        if index < scan.next {
            return Err(DecodeError::FieldOrder { index });
        }
        scan.next = index + 1;
        scan.first = false;
        scan.done = last;
        Ok(Some(index))
    }

    fn close(&mut self, scan: &mut FieldScan) {
        if !scan.closed {
            scan.closed = true;
            self.depth = self.depth.saturating_sub(1);
        }
    }
}

/// A colf byte buffer meant for writing.
///
/// ```
/// let mut bb = colf_wire::Writer::new();
/// bb.write_text("🍕", 64).unwrap();
/// bb.write_uint(200);
/// assert_eq!(bb.data(), [0x04, 0xF0, 0x9F, 0x8D, 0x95, 0xC8, 0x01]);
/// ```
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
    depth: usize,
}

impl Writer {
    /// Creates an empty Writer ready for writing.
    pub fn new() -> Writer {
        Writer { data: vec![], depth: 0 }
    }

    /// Returns the bytes written so far.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes this buffer and returns the underlying backing store.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Starts a struct instance. `present` holds one flag per declared field;
    /// an instance without present fields is written as `EMPTY` right away.
    /// Every instance started must be finished with `end`.
    pub fn fields(&mut self, present: &[bool]) -> Result<Fields, EncodeError> {
        if self.depth >= DEPTH_MAX {
            return Err(EncodeError::DepthExceeded { max: DEPTH_MAX });
        }
        self.depth += 1;
        let last = present.iter().rposition(|p| *p);
        if last.is_none() {
            self.write_byte(header::EMPTY);
        }
        Ok(Fields { last })
    }

    /// Finishes the struct instance started with `fields`.
    pub fn end(&mut self, _fields: Fields) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Writes the header of a present field.
    pub fn header(&mut self, fields: &Fields, index: usize) {
        self.write_byte(header::encode(index, fields.last == Some(index)));
    }

    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a list element boolean.
    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    /// Write an unsigned integer of any width as a varint.
    pub fn write_uint(&mut self, mut value: u64) {
        while value > 0x7F {
            self.write_byte(value as u8 | 0x80);
            value >>= 7;
        }
        self.write_byte(value as u8);
    }

    /// Write a signed integer of any width as a zig-zag varint.
    pub fn write_int(&mut self, value: i64) {
        self.write_uint(((value << 1) ^ (value >> 63)) as u64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_timestamp(&mut self, value: &Timestamp) -> Result<(), EncodeError> {
        if value.nanos >= NANOS_PER_SEC {
            return Err(EncodeError::Nanos(value.nanos));
        }
        self.write_int(value.seconds);
        self.write_uint(u64::from(value.nanos));
        Ok(())
    }

    /// Write a list element count, checked against the list ceiling.
    pub fn write_count(&mut self, count: usize, list_max: usize) -> Result<(), EncodeError> {
        if count > list_max {
            return Err(EncodeError::ListExceeded { count, max: list_max });
        }
        self.write_uint(count as u64);
        Ok(())
    }

    /// Write length-prefixed binary of at most `max` bytes.
    pub fn write_binary(&mut self, value: &[u8], max: usize) -> Result<(), EncodeError> {
        if value.len() > max {
            return Err(EncodeError::FieldSizeExceeded { len: value.len(), max });
        }
        self.write_uint(value.len() as u64);
        self.data.extend_from_slice(value);
        Ok(())
    }

    /// Write length-prefixed UTF-8 text of at most `max` bytes.
    pub fn write_text(&mut self, value: &str, max: usize) -> Result<(), EncodeError> {
        self.write_binary(value.as_bytes(), max)
    }
}

#[test]
fn read_byte() {
    let read = |bytes| Reader::new(bytes, 16).read_byte();
    assert_eq!(read(&[]), Err(DecodeError::Truncated));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[255]), Ok(255));
}

#[test]
fn read_bool() {
    let read = |bytes| Reader::new(bytes, 16).read_bool();
    assert_eq!(read(&[]), Err(DecodeError::Truncated));
    assert_eq!(read(&[0]), Ok(false));
    assert_eq!(read(&[1]), Ok(true));
    assert_eq!(read(&[2]), Err(DecodeError::Bool(2)));
}

#[test]
fn read_u8() {
    let read = |bytes| Reader::new(bytes, 16).read_u8();
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[127]), Ok(127));
    assert_eq!(read(&[128, 1]), Ok(128));
    assert_eq!(read(&[255, 1]), Ok(255));
    assert_eq!(read(&[128, 2]), Err(DecodeError::Overflow { bits: 8 }));
    assert_eq!(read(&[128, 128, 0]), Err(DecodeError::Overflow { bits: 8 }));
    assert_eq!(read(&[128]), Err(DecodeError::Truncated));
}

#[test]
fn read_u32() {
    let read = |bytes| Reader::new(bytes, 16).read_u32();
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[128, 0]), Ok(0));
    assert_eq!(read(&[129, 1]), Ok(129));
    assert_eq!(read(&[254, 255, 7]), Ok(131070));
    assert_eq!(read(&[255, 255, 255, 255, 15]), Ok(u32::MAX));
    assert_eq!(read(&[255, 255, 255, 255, 16]), Err(DecodeError::Overflow { bits: 32 }));
    assert_eq!(read(&[255, 255, 255, 255, 0x8F, 0]), Err(DecodeError::Overflow { bits: 32 }));
}

#[test]
fn read_u64() {
    let read = |bytes| Reader::new(bytes, 16).read_u64();
    assert_eq!(
        read(&[0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x08]),
        Ok(0x080E_1828_4060_8080)
    );
    assert_eq!(read(&[255, 255, 255, 255, 255, 255, 255, 255, 255, 1]), Ok(u64::MAX));
    assert_eq!(
        read(&[255, 255, 255, 255, 255, 255, 255, 255, 255, 2]),
        Err(DecodeError::Overflow { bits: 64 })
    );
    assert_eq!(
        read(&[128, 128, 128, 128, 128, 128, 128, 128, 128, 128, 0]),
        Err(DecodeError::Overflow { bits: 64 })
    );
}

#[test]
fn read_i32() {
    let read = |bytes| Reader::new(bytes, 16).read_i32();
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(-1));
    assert_eq!(read(&[2]), Ok(1));
    assert_eq!(read(&[3]), Ok(-2));
    assert_eq!(read(&[127]), Ok(-64));
    assert_eq!(read(&[128, 1]), Ok(64));
    assert_eq!(read(&[253, 255, 7]), Ok(-65535));
    assert_eq!(read(&[254, 255, 255, 255, 15]), Ok(i32::MAX));
    assert_eq!(read(&[255, 255, 255, 255, 15]), Ok(i32::MIN));
}

#[test]
fn read_i8() {
    let read = |bytes| Reader::new(bytes, 16).read_i8();
    assert_eq!(read(&[254, 1]), Ok(i8::MAX));
    assert_eq!(read(&[255, 1]), Ok(i8::MIN));
    assert_eq!(read(&[128, 2]), Err(DecodeError::Overflow { bits: 8 }));
}

#[test]
fn read_floats() {
    let mut bb = Reader::new(&[0, 0, 0x80, 0x3F, 0, 0, 0, 0, 0, 0, 0xF0, 0xBF], 16);
    assert_eq!(bb.read_f32(), Ok(1.0));
    assert_eq!(bb.read_f64(), Ok(-1.0));
    assert_eq!(bb.read_f32(), Err(DecodeError::Truncated));
}

#[test]
fn read_timestamp() {
    let read = |bytes| Reader::new(bytes, 16).read_timestamp();
    assert_eq!(read(&[2, 0]), Ok(Timestamp::new(1, 0)));
    assert_eq!(read(&[1, 1]), Ok(Timestamp::new(-1, 1)));
    assert_eq!(
        read(&[0, 0x80, 0x94, 0xEB, 0xDC, 0x03]),
        Err(DecodeError::Nanos(1_000_000_000))
    );
}

#[test]
fn read_text_and_binary() {
    let mut bb = Reader::new(&[3, 97, 98, 99, 0, 2, 0xFF, 0x00], 16);
    assert_eq!(bb.read_text(16).as_deref(), Ok("abc"));
    assert_eq!(bb.read_binary(16), Ok(vec![]));
    assert_eq!(bb.read_binary(16), Ok(vec![0xFF, 0x00]));

    let read = |bytes, max| Reader::new(bytes, 16).read_text(max);
    assert_eq!(read(&[3, 97], 16), Err(DecodeError::Truncated));
    assert_eq!(read(&[3, 97, 98, 99], 2), Err(DecodeError::FieldSizeExceeded { len: 3, max: 2 }));
    assert_eq!(read(&[2, 97, 0xFF], 16).as_deref(), Ok("a\u{FFFD}"));
}

#[test]
fn read_respects_size_ceiling() {
    // the declared length fits the input but not the ceiling
    let mut bb = Reader::new(&[5, 1, 2, 3, 4, 5], 4);
    assert_eq!(bb.read_binary(usize::MAX), Err(DecodeError::SizeExceeded { max: 4 }));

    // a huge declared length fails before anything is allocated
    let mut bb = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], 1024);
    assert_eq!(bb.read_binary(usize::MAX), Err(DecodeError::SizeExceeded { max: 1024 }));

    let mut bb = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], usize::MAX);
    assert_eq!(bb.read_binary(usize::MAX), Err(DecodeError::Truncated));
}

#[test]
fn read_count() {
    let read = |bytes, max| Reader::new(bytes, 16).read_count(max);
    assert_eq!(read(&[0], 4), Ok(0));
    assert_eq!(read(&[2, 0, 0], 4), Ok(2));
    assert_eq!(read(&[5, 0, 0, 0, 0, 0], 4), Err(DecodeError::ListExceeded { count: 5, max: 4 }));
    assert_eq!(read(&[3, 0], 4), Err(DecodeError::Truncated));
    assert_eq!(read(&[0x80, 0x94, 0xEB, 0xDC, 0x03], usize::MAX), Err(DecodeError::SizeExceeded { max: 16 }));
}

#[test]
fn read_field_headers() {
    let mut bb = Reader::new(&[0x02, 0x07], 16);
    let mut scan = bb.fields(3).unwrap();
    assert_eq!(bb.next_field(&mut scan), Ok(Some(0)));
    assert_eq!(bb.next_field(&mut scan), Ok(Some(2)));
    assert_eq!(bb.next_field(&mut scan), Ok(None));
    assert_eq!(bb.index(), 2);

    let mut bb = Reader::new(&[header::EMPTY], 16);
    let mut scan = bb.fields(3).unwrap();
    assert_eq!(bb.next_field(&mut scan), Ok(None));
    assert_eq!(bb.next_field(&mut scan), Ok(None));

    let scan_all = |bytes: &[u8], count| {
        let mut bb = Reader::new(bytes, 16);
        let mut scan = bb.fields(count)?;
        while bb.next_field(&mut scan)?.is_some() {}
        Ok::<usize, DecodeError>(bb.index())
    };
    assert_eq!(scan_all(&[0x07], 2), Err(DecodeError::FieldIndex { index: 2, count: 2 }));
    assert_eq!(scan_all(&[0x04, 0x03], 2), Err(DecodeError::FieldOrder { index: 0 }));
    assert_eq!(scan_all(&[0x04, 0x05], 2), Err(DecodeError::FieldOrder { index: 1 }));
    assert_eq!(scan_all(&[0x02, 0x00], 2), Err(DecodeError::Header(0x00)));
    assert_eq!(scan_all(&[0x01], 2), Err(DecodeError::Header(0x01)));
    assert_eq!(scan_all(&[0x02], 2), Err(DecodeError::Truncated));
}

#[cfg(test)]
fn write_once(cb: fn(&mut Writer)) -> Vec<u8> {
    let mut bb = Writer::new();
    cb(&mut bb);
    bb.into_data()
}

#[test]
fn write_uint() {
    assert_eq!(write_once(|bb| bb.write_uint(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_uint(127)), [127]);
    assert_eq!(write_once(|bb| bb.write_uint(128)), [128, 1]);
    assert_eq!(write_once(|bb| bb.write_uint(131070)), [254, 255, 7]);
    assert_eq!(write_once(|bb| bb.write_uint(u64::MAX)), [255, 255, 255, 255, 255, 255, 255, 255, 255, 1]);
}

#[test]
fn write_int() {
    assert_eq!(write_once(|bb| bb.write_int(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_int(-1)), [1]);
    assert_eq!(write_once(|bb| bb.write_int(1)), [2]);
    assert_eq!(write_once(|bb| bb.write_int(-64)), [127]);
    assert_eq!(write_once(|bb| bb.write_int(64)), [128, 1]);
    assert_eq!(write_once(|bb| bb.write_int(i64::from(i32::MIN))), [255, 255, 255, 255, 15]);
}

#[test]
fn write_field_headers() {
    let mut bb = Writer::new();
    let fields = bb.fields(&[false, false]).unwrap();
    assert_eq!(fields.last(), None);
    assert_eq!(bb.data(), [header::EMPTY]);

    let mut bb = Writer::new();
    let fields = bb.fields(&[true, false, true]).unwrap();
    bb.header(&fields, 0);
    bb.header(&fields, 2);
    bb.end(fields);
    assert_eq!(bb.data(), [0x02, 0x07]);
}

#[test]
fn read_depth() {
    // a chain of scans, each opening the next one from its only field
    let chain = |levels: usize| {
        let mut data = vec![0x03; levels - 1];
        data.push(header::EMPTY);
        data
    };
    let descend = |data: &[u8]| {
        let mut bb = Reader::new(data, usize::MAX);
        let mut scans = Vec::new();
        loop {
            let mut scan = bb.fields(1)?;
            match bb.next_field(&mut scan)? {
                Some(_) => scans.push(scan),
                None => break,
            }
        }
        assert_eq!(bb.depth(), scans.len());
        for mut scan in scans.into_iter().rev() {
            assert_eq!(bb.next_field(&mut scan), Ok(None));
        }
        Ok::<usize, DecodeError>(bb.depth())
    };
    assert_eq!(descend(&chain(1)), Ok(0));
    assert_eq!(descend(&chain(DEPTH_MAX)), Ok(0));
    assert_eq!(descend(&chain(DEPTH_MAX + 1)), Err(DecodeError::DepthExceeded { max: DEPTH_MAX }));

    // closing a scan twice releases one level only
    let mut bb = Reader::new(&[header::EMPTY, header::EMPTY], 16);
    let mut outer = bb.fields(1).unwrap();
    let mut inner = bb.fields(1).unwrap();
    assert_eq!(bb.next_field(&mut inner), Ok(None));
    assert_eq!(bb.next_field(&mut inner), Ok(None));
    assert_eq!(bb.depth(), 1);
    assert_eq!(bb.next_field(&mut outer), Ok(None));
    assert_eq!(bb.depth(), 0);
}

#[test]
fn write_depth() {
    let mut bb = Writer::new();
    let mut open = Vec::new();
    for _ in 0..DEPTH_MAX {
        open.push(bb.fields(&[true]).unwrap());
    }
    assert_eq!(bb.fields(&[true]), Err(EncodeError::DepthExceeded { max: DEPTH_MAX }));
    bb.end(open.pop().unwrap());
    assert!(bb.fields(&[]).is_ok());
}

#[test]
fn write_ceilings() {
    let mut bb = Writer::new();
    assert_eq!(bb.write_count(4, 3), Err(EncodeError::ListExceeded { count: 4, max: 3 }));
    assert_eq!(bb.write_text("abcd", 3), Err(EncodeError::FieldSizeExceeded { len: 4, max: 3 }));
    assert_eq!(
        bb.write_timestamp(&Timestamp::new(0, NANOS_PER_SEC)),
        Err(EncodeError::Nanos(NANOS_PER_SEC))
    );
    assert!(bb.is_empty());
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Varints read back exactly what was written, for every width.
        #[test]
        fn uint_round_trip(v in any::<u64>()) {
            let mut w = Writer::new();
            w.write_uint(v);
            let data = w.into_data();
            let mut r = Reader::new(&data, 16);
            prop_assert_eq!(r.read_u64(), Ok(v));
            prop_assert_eq!(r.index(), data.len());
        }

        #[test]
        fn int_round_trip(v in any::<i64>()) {
            let mut w = Writer::new();
            w.write_int(v);
            let data = w.into_data();
            prop_assert_eq!(Reader::new(&data, 16).read_i64(), Ok(v));
        }

        /// Narrow readers accept exactly the values of their width.
        #[test]
        fn narrow_reads_reject_wide_values(v in any::<u64>()) {
            let mut w = Writer::new();
            w.write_uint(v);
            let data = w.into_data();
            let got = Reader::new(&data, 16).read_u16();
            if v <= u64::from(u16::MAX) {
                prop_assert_eq!(got, Ok(v as u16));
            } else {
                prop_assert_eq!(got, Err(DecodeError::Overflow { bits: 16 }));
            }
        }

        /// Smaller magnitudes never take more bytes than larger ones.
        #[test]
        fn zigzag_favours_small_magnitudes(v in -1000i64..1000) {
            let mut small = Writer::new();
            small.write_int(v);
            let mut large = Writer::new();
            large.write_int(v.signum() * 100_000);
            prop_assert!(small.len() <= large.len());
        }
    }
}
