//! A pure-source compiler for the Protocol Buffers interface description
//! language.
//!
//! `protolink` consumes `.proto` source files (proto2 or proto3) together
//! with their transitive imports and produces validated, fully linked file
//! descriptors matching the canonical `google/protobuf/descriptor.proto`
//! schema, byte-compatible with the reference compiler's output.
//!
//! The pipeline has three stages: parsing into a lossless concrete syntax
//! tree (see [`ast`]), per-file descriptor synthesis and validation, and
//! cross-file linking with custom-option interpretation. [`Compiler`] is
//! the entry point:
//!
//! ```
//! use protolink::{Compiler, MemoryAccessor};
//!
//! let mut accessor = MemoryAccessor::new();
//! accessor.add(
//!     "greet.proto",
//!     "syntax = \"proto3\";\n\
//!      message Greeting { string text = 1; }\n",
//! );
//!
//! let files = Compiler::new()
//!     .accessor(accessor)
//!     .parse_files(["greet.proto"])?;
//! assert_eq!(files[0].message_type[0].name(), "Greeting");
//! # Ok::<(), protolink::Error>(())
//! ```
//!
//! File access happens only through the configured
//! [`FileAccessor`]; the fixed set of `google/protobuf/*.proto` standard
//! imports is bundled and used when the accessor reports not-found.

pub mod ast;
pub mod types;

mod compile;
mod error;
mod generate;
mod lex;
mod link;
mod options;
mod parse;
mod tag;
mod validate;

use std::fmt;

pub use crate::{
    compile::{AccessorError, Compiler, FileAccessor, MemoryAccessor},
    error::{BoxError, Diagnostic, Error, Reporter, Severity, SourceLocation},
};

/// The largest permitted field tag number, `2^29 - 1`.
pub const MAX_TAG: i32 = 536_870_911;

/// The syntax of a protobuf file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Proto2,
    Proto3,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Proto2 => f.write_str("proto2"),
            Syntax::Proto3 => f.write_str("proto3"),
        }
    }
}
