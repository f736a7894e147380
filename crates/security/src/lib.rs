//! Security module for ferrocode: filesystem sandboxing.
//!
//! Every filesystem-bound tool goes through [`SafeFileOps`], which confines
//! reads and writes to a fixed set of allowed roots. The boundary is
//! best-effort: a symlink swapped in between validation and I/O is not
//! defended against.

pub mod path;

pub use path::{DirEntryInfo, SafeFileOps, SandboxError};
