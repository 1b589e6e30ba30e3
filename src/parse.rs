//! Parser service.
//!
//! Runs `oxc_parser` over the source. The program is allocated in the
//! caller's arena and rewritten in place by the later stages. Parse
//! diagnostics surface as [`TransformErrorKind::Syntax`], which no other
//! stage produces.
//!
//! [`TransformErrorKind::Syntax`]: crate::errors::TransformErrorKind::Syntax

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::errors::{TransformError, TransformResult};

/// Every input is an ES module with TypeScript syntax allowed.
pub fn source_type_for(file_id: &str) -> SourceType {
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true);
    // `<T>x` assertions only parse with JSX off.
    let plain_ts = [".ts", ".mts", ".cts"]
        .iter()
        .any(|ext| file_id.ends_with(ext));
    source_type.with_jsx(!plain_ts)
}

/// Parse `source` into a [`Program`] owned by `allocator`.
pub fn parse_program<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    file_id: &str,
) -> TransformResult<Program<'a>> {
    let ret = Parser::new(allocator, source, source_type_for(file_id)).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(TransformError::syntax(message, file_id));
    }

    Ok(ret.program)
}
