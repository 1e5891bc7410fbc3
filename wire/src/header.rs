//! Field header units.
//!
//! A header is a single byte. `0x00` stands for a struct without any present
//! field. Any other value packs `(index + 1) << 1` with the terminal flag in
//! the low bit, which is set on the last present field only.

/// Header of a struct instance without present fields.
pub const EMPTY: u8 = 0x00;

/// Upper bound on the number of fields per struct, so every header fits in
/// one byte.
pub const MAX_FIELDS: usize = 127;

/// Packs a field index and the terminal flag.
pub const fn encode(index: usize, last: bool) -> u8 {
    debug_assert!(index < MAX_FIELDS);
    (((index + 1) << 1) as u8) | last as u8
}

/// Unpacks a header into its field index and terminal flag. Returns `None`
/// for `EMPTY` and for the malformed value `0x01`.
pub const fn decode(header: u8) -> Option<(usize, bool)> {
    if header < 2 {
        None
    } else {
        Some((((header >> 1) - 1) as usize, header & 1 == 1))
    }
}

/// Encoder-side view of which fields of one instance are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    pub(crate) last: Option<usize>,
}

impl Fields {
    /// Index of the field that carries the terminal flag, if any.
    pub fn last(&self) -> Option<usize> {
        self.last
    }
}

/// Decoder-side progress through the headers of one struct instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldScan {
    pub(crate) count: usize,
    pub(crate) next: usize,
    pub(crate) first: bool,
    pub(crate) done: bool,
    pub(crate) closed: bool,
}

impl FieldScan {
    pub(crate) fn new(count: usize) -> Self {
        FieldScan { count, next: 0, first: true, done: false, closed: false }
    }

    /// Number of fields declared by the struct being decoded.
    pub fn count(&self) -> usize {
        self.count
    }
}

#[test]
fn encode_header() {
    assert_eq!(encode(0, false), 0x02);
    assert_eq!(encode(0, true), 0x03);
    assert_eq!(encode(1, true), 0x05);
    assert_eq!(encode(126, false), 0xFE);
    assert_eq!(encode(126, true), 0xFF);
}

#[test]
fn decode_header() {
    assert_eq!(decode(EMPTY), None);
    assert_eq!(decode(0x01), None);
    assert_eq!(decode(0x02), Some((0, false)));
    assert_eq!(decode(0x05), Some((1, true)));
    assert_eq!(decode(0xFF), Some((126, true)));
    for index in 0..MAX_FIELDS {
        assert_eq!(decode(encode(index, true)), Some((index, true)));
        assert_eq!(decode(encode(index, false)), Some((index, false)));
    }
}
