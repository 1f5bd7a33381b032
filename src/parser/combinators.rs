//! Parser combinators using nom
//!
//! Grammar for the typed schema definition language: type definitions with
//! annotations, fields with list/non-null wrappers, and typed annotation
//! arguments.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::{opt, recognize},
    multi::{many0, separated_list0},
    sequence::{pair, preceded},
};

use super::types::{Annotation, Document, FieldDef, TypeDef, TypeRef, Value};

// =============================================================================
// Basic Combinators
// =============================================================================

/// Whitespace including `#` line comments and commas between fields.
fn ws(input: &str) -> IResult<&str, ()> {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        if let Some(comment) = trimmed.strip_prefix('#') {
            rest = match comment.find('\n') {
                Some(nl) => &comment[nl + 1..],
                None => "",
            };
            continue;
        }
        return Ok((trimmed, ()));
    }
}

/// Parse an identifier (alphanumeric + underscore, starting with letter or _).
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// Parse a double-quoted string with `\"`, `\\` and `\n` escapes.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"').parse(input)?;
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&input[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            _ => out.push(c),
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Parse a numeric literal into Int or Float.
fn number(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize((
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
        opt(pair(char('.'), take_while1(|c: char| c.is_ascii_digit()))),
    ))
    .parse(input)?;
    let value = if text.contains('.') {
        match text.parse::<f64>() {
            Ok(f) => Value::Float(f),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Float,
                )));
            }
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Digit,
                )));
            }
        }
    };
    Ok((rest, value))
}

// =============================================================================
// Annotation Arguments
// =============================================================================

/// Parse a typed annotation value. Only the known kinds parse; anything else
/// is a fatal syntax error at the call site.
fn value(input: &str) -> IResult<&str, Value> {
    let (input, _) = ws(input)?;
    alt((
        string_literal.map(Value::String),
        number,
        list_value,
        object_value,
        identifier.map(|name| match name {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            other => Value::Enum(other.to_string()),
        }),
    ))
    .parse(input)
}

fn list_value(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('[').parse(input)?;
    let (input, items) = separated_list0(preceded(ws, char(',')), value).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(']').parse(input)?;
    Ok((input, Value::List(items)))
}

fn object_value(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('{').parse(input)?;
    let (input, entries) =
        separated_list0(preceded(ws, char(',')), object_entry).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('}').parse(input)?;
    Ok((input, Value::Object(entries)))
}

fn object_entry(input: &str) -> IResult<&str, (String, Value)> {
    let (input, _) = ws(input)?;
    let (input, key) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(':').parse(input)?;
    let (input, val) = value(input)?;
    Ok((input, (key.to_string(), val)))
}

/// Parse one annotation argument: `name: value` or a bare positional value.
fn annotation_arg(input: &str) -> IResult<&str, (String, Value)> {
    let (input, _) = ws(input)?;
    // Named form first; a bare enum value would otherwise swallow the key.
    if let Ok((rest, (key, _, _, val))) =
        (identifier, ws, char(':'), value).parse(input)
    {
        return Ok((rest, (key.to_string(), val)));
    }
    let (input, val) = value(input)?;
    Ok((input, ("value".to_string(), val)))
}

/// Parse an annotation like `@index(unique: true, where: "x > 0")`.
fn annotation(input: &str) -> IResult<&str, Annotation> {
    let (input, _) = ws(input)?;
    let (input, _) = char('@').parse(input)?;
    let (input, name) = identifier(input)?;
    let (input, args) = opt((
        preceded(ws, char('(')),
        separated_list0(preceded(ws, char(',')), annotation_arg),
        preceded(ws, char(')')),
    ))
        .parse(input)?;
    Ok((
        input,
        Annotation {
            name: name.to_string(),
            args: args.map(|(_, args, _)| args).unwrap_or_default(),
        },
    ))
}

// =============================================================================
// Type References
// =============================================================================

/// Parse a type reference: `Name`, `Name!`, `[Name!]`, `[Name]!`, ...
fn type_ref(input: &str) -> IResult<&str, TypeRef> {
    let (input, _) = ws(input)?;
    let (input, inner) = alt((
        (
            char('['),
            type_ref,
            preceded(ws, char(']')),
        )
            .map(|(_, item, _)| TypeRef::List(Box::new(item))),
        identifier.map(|name| TypeRef::Named(name.to_string())),
    ))
    .parse(input)?;
    let (input, bang) = opt(char('!')).parse(input)?;
    Ok((
        input,
        match bang {
            Some(_) => TypeRef::NonNull(Box::new(inner)),
            None => inner,
        },
    ))
}

// =============================================================================
// Fields and Type Definitions
// =============================================================================

/// Parse a field: `name: Type! @ann ...`
fn field_def(input: &str) -> IResult<&str, FieldDef> {
    let (input, _) = ws(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(':').parse(input)?;
    let (input, ty) = type_ref(input)?;
    let (input, annotations) = many0(annotation).parse(input)?;
    // Optional trailing comma between fields.
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    Ok((
        input,
        FieldDef {
            name: name.to_string(),
            ty,
            annotations,
        },
    ))
}

/// Parse a type definition: `type Name @ann { fields }`
pub fn type_def(input: &str) -> IResult<&str, TypeDef> {
    let (input, _) = ws(input)?;
    let (input, _) = tag("type").parse(input)?;
    let (input, _) = take_while1(|c: char| c.is_whitespace()).parse(input)?;
    let (input, name) = identifier(input)?;
    let (input, annotations) = many0(annotation).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('{').parse(input)?;
    let (input, fields) = many0(field_def).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('}').parse(input)?;
    Ok((
        input,
        TypeDef {
            name: name.to_string(),
            annotations,
            fields,
        },
    ))
}

/// Parse a whole document: zero or more type definitions.
pub fn document(input: &str) -> IResult<&str, Document> {
    let (input, types) = many0(type_def).parse(input)?;
    let (input, _) = ws(input)?;
    Ok((input, Document { types }))
}
