use crate::bb::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};

/// Implemented by every struct the colf compiler generates for Rust.
///
/// `write_to` and `read_from` handle one (possibly nested) struct instance;
/// `marshal` and `unmarshal` wrap them for a top-level instance and enforce
/// the package's size ceiling.
pub trait Message: Default + Sized {
    /// Size ceiling of the package that declares the struct.
    const SIZE_MAX: usize;

    /// Reports whether every field holds its default value, in which case the
    /// instance is elided when it appears as a value field.
    fn is_zero(&self) -> bool;

    fn write_to(&self, w: &mut Writer) -> Result<(), EncodeError>;

    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Encodes a top-level instance.
    fn marshal(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new();
        self.write_to(&mut w)?;
        if w.len() > Self::SIZE_MAX {
            return Err(EncodeError::SizeExceeded { size: w.len(), max: Self::SIZE_MAX });
        }
        Ok(w.into_data())
    }

    /// Decodes a top-level instance from the start of `data`, returning it
    /// together with the number of bytes consumed.
    fn unmarshal(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(data, Self::SIZE_MAX);
        let value = Self::read_from(&mut r)?;
        Ok((value, r.index()))
    }
}
