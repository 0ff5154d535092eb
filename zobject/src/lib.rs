//! ZObject Model
//!
//! The self-describing structured value model used by the function
//! orchestrator: string leaves, ordered key-value trees with a `Z1K1` type
//! key, references, typed lists, structured errors and result envelopes.
//! The evaluation machinery lives in the `orchestrator` crate; this crate is
//! purely data.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod list;
pub mod value;

pub use envelope::Envelope;
pub use error::{ErrorKind, RuntimeResult, ZError};
pub use value::{ZMap, ZObject};
