//! Incremental structural analysis of Python source.
//!
//! This crate maintains parsed views of evolving Python modules:
//! - Top-level chunk splitting for span-by-span parsing
//! - A line-oriented outline parser producing positioned syntax trees
//! - Parse sessions that reuse unchanged spans between updates
//! - Merged module views with name, parameter, and import indexes
//! - Trait seams for inference engines that consume the trees

pub mod chunker;
pub mod incremental;
pub mod infer;
pub mod module;
pub mod names;
pub mod outline;
pub mod params;
pub mod test_helpers;
pub mod tree;

pub use incremental::{
    Document, DocumentCache, ParseOptions, SessionError, SessionResult, UpdateStats, UserScope,
};
pub use module::{ModuleView, ParseUnit, ViewError, ViewResult};
pub use outline::OutlineParser;
pub use tree::{ParseError, ParseResult, SpanParser, SpanRequest, SyntaxTree};
