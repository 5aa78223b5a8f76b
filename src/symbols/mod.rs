//! Symbol boundaries, line-pattern symbol extraction and precise code reads

mod bounds;
mod matcher;
mod reader;

pub use bounds::{find_symbol_bounds, BraceScanner, LineScan};
pub(crate) use bounds::brace_bounds;
pub use matcher::{SymbolKind, SymbolMatch, SymbolMatcher};
pub use reader::{
    format_lines, FileStats, LineSpan, ReadMode, ReadRequest, SymbolContent, SymbolIndex,
    SymbolReader,
};
