//! Schema definition language parser.
//!
//! Produces the AST consumed by the IR builder. The grammar accepts exactly
//! named, non-null and list type wrappers; annotation argument values are
//! typed (string, int, float, bool, enum name, null, list, object) and any
//! other shape is a fatal parse error.

pub mod combinators;
pub mod types;

pub use types::{Annotation, Document, FieldDef, TypeDef, TypeRef, TypeShape, Value};

use crate::error::ParseError;

/// Parse an SDL document.
///
/// The whole input must be consumed; trailing garbage is an error so that a
/// truncated or mis-braced schema never silently loses tables.
pub fn parse_document(source: &str) -> Result<Document, ParseError> {
    match combinators::document(source) {
        Ok((rest, doc)) if rest.trim().is_empty() => Ok(doc),
        Ok((rest, _)) => Err(ParseError::TrailingInput {
            context: snippet(rest),
        }),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(ParseError::Syntax {
            context: snippet(e.input),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Syntax {
            context: String::new(),
        }),
    }
}

/// First line (up to 40 chars) at the failure point, for error context.
fn snippet(rest: &str) -> String {
    let line = rest.lines().next().unwrap_or("");
    line.chars().take(40).collect()
}
