//! Runtime support and reference model for the colf wire format. See the
//! `colf-compiler` crate for the schema language that drives it.
//!
//! Every struct instance is a run of field headers, each followed by the
//! field's payload. Fields holding their default value are left out, and the
//! last present field carries a terminal flag, so no end marker is needed.
//!
//! ```
//! use colf_wire::*;
//!
//! let mut w = Writer::new();
//! let fields = w.fields(&[false, true]).unwrap();
//! w.header(&fields, 1);
//! w.write_int(5);
//! w.end(fields);
//! assert_eq!(w.data(), [0x05, 0x0A]);
//!
//! let mut r = Reader::new(&[0x05, 0x0A], DEFAULT_SIZE_MAX);
//! let mut scan = r.fields(2).unwrap();
//! assert_eq!(r.next_field(&mut scan), Ok(Some(1)));
//! assert_eq!(r.read_i32(), Ok(5));
//! assert_eq!(r.next_field(&mut scan), Ok(None));
//! ```

pub mod bb;
pub mod error;
pub mod header;
pub mod message;
pub mod timestamp;

pub use bb::*;
pub use error::*;
pub use header::FieldScan;
pub use header::Fields;
pub use message::*;
pub use timestamp::*;

/// Size ceiling applied when a schema is compiled without an explicit one.
pub const DEFAULT_SIZE_MAX: usize = 16 * 1024 * 1024;

/// List-length ceiling applied when a schema is compiled without an explicit one.
pub const DEFAULT_LIST_MAX: usize = 64 * 1024;

/// Ceiling on struct nesting, counting the top-level instance as one level.
/// Applies to every language, independent of the configured ceilings.
pub const DEPTH_MAX: usize = 128;
