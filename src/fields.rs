//! Field classification: one raw declaration into typed `FieldDef`s.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExprError;
use crate::expr::{self, Expr};
use crate::extract::RawField;
use crate::ir::{ArrayShape, ElementType, EnumTable, FieldDef, NamedInt, RandKind};
use crate::lexer::Cursor;
use crate::report::Diagnostic;

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// SV keywords that can show up where a field name is expected.
const SV_RESERVED: &[&str] = &[
    "bit", "logic", "reg", "byte", "shortint", "int", "integer", "longint", "rand", "randc",
    "constraint", "class", "endclass", "function", "task", "signed", "unsigned", "inside",
    "dist", "solve", "before", "if", "else", "foreach", "unique", "soft", "this", "super", "null",
    "new", "static", "local", "protected", "virtual", "extern", "enum", "typedef", "struct",
];

const QUALIFIERS: &[&str] = &["local", "protected", "static", "const", "var", "automatic"];

#[derive(Debug, Clone, Copy)]
struct BaseType<'t> {
    element: Base<'t>,
    signed: bool,
    width: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Base<'t> {
    Vector,
    Named(NamedInt),
    Enum(&'t str),
}

/// Classify one declaration. Comma lists yield one field per name.
pub fn classify(raw: &RawField, enums: &EnumTable, src: &str) -> (Vec<FieldDef>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    match classify_inner(raw, enums, src, &mut diagnostics) {
        Ok(fields) => (fields, diagnostics),
        Err(error) => {
            diagnostics.push(
                Diagnostic::review(format!(
                    "unrecognized field declaration `{}` ({error}); treated as opaque 32-bit integer",
                    raw.text
                ))
                .at_line(raw.line),
            );
            (fallback(raw).into_iter().collect(), diagnostics)
        }
    }
}

fn classify_inner(
    raw: &RawField,
    enums: &EnumTable,
    src: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<FieldDef>, ExprError> {
    let mut cursor = Cursor::new(&raw.tokens, src);
    let mut rand = RandKind::Fixed;
    loop {
        if cursor.eat("rand") {
            rand = RandKind::Random;
        } else if cursor.eat("randc") {
            rand = RandKind::Cyclic;
        } else if !QUALIFIERS.iter().any(|q| cursor.eat(q)) {
            break;
        }
    }

    let type_token = cursor.expect_ident()?;
    let mut base = match type_token.text.as_str() {
        "bit" | "logic" | "reg" => BaseType {
            element: Base::Vector,
            signed: false,
            width: None,
        },
        word => match NamedInt::from_keyword(word) {
            Some(named) => BaseType {
                element: Base::Named(named),
                signed: true,
                width: None,
            },
            None if enums.get(word).is_some() => BaseType {
                element: Base::Enum(word),
                signed: false,
                width: None,
            },
            None => {
                return Err(ExprError::Unexpected {
                    found: format!("unknown type `{word}`"),
                    line: type_token.line,
                });
            }
        },
    };

    if cursor.eat("signed") {
        base.signed = true;
    } else if cursor.eat("unsigned") {
        base.signed = false;
    }

    let mut packed_overflow = false;
    while cursor.peek_is("[") {
        cursor.next();
        let msb = expr::parse_expr(&mut cursor, 0)?;
        cursor.expect(":")?;
        let lsb = expr::parse_expr(&mut cursor, 0)?;
        cursor.expect("]")?;
        if packed_overflow {
            continue;
        }
        let width = match (msb.literal_value(), lsb.literal_value()) {
            (Some(m), Some(l)) => expr::range_width(m, l),
            _ => {
                diagnostics.push(
                    Diagnostic::review(format!(
                        "packed width `[{msb}:{lsb}]` is not a literal; assuming 32 bits"
                    ))
                    .at_line(type_token.line),
                );
                Some(32)
            }
        };
        match width.and_then(|w| base.width.map_or(Some(w), |acc| acc.checked_mul(w))) {
            Some(total) => base.width = Some(total),
            None => {
                diagnostics.push(
                    Diagnostic::review(format!(
                        "packed width of `{}` does not fit in 32 bits; assuming 32 bits",
                        raw.text
                    ))
                    .at_line(type_token.line),
                );
                base.width = Some(32);
                packed_overflow = true;
            }
        }
    }

    let mut fields = Vec::new();
    loop {
        let name_token = cursor.expect_ident()?;
        let name = name_token.text.clone();
        let shape = unpacked_shape(&mut cursor, &name, name_token.line, diagnostics)?;

        if cursor.eat("=") {
            let init = expr::parse_expr(&mut cursor, 0)?;
            diagnostics.push(
                Diagnostic::warning(format!("initializer of `{name}` (`{init}`) dropped"))
                    .at_line(name_token.line),
            );
        }

        if is_valid_name(&name) {
            fields.push(build(raw, &base, rand, shape, name, name_token.line, diagnostics));
        } else {
            diagnostics.push(
                Diagnostic::review(format!("`{name}` is not a valid field name; field dropped"))
                    .at_line(name_token.line),
            );
        }

        if cursor.at_end() {
            return Ok(fields);
        }
        cursor.expect(",")?;
    }
}

fn unpacked_shape(
    cursor: &mut Cursor<'_>,
    name: &str,
    line: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ArrayShape, ExprError> {
    if !cursor.eat("[") {
        return Ok(ArrayShape::None);
    }
    if cursor.eat("]") {
        return Ok(ArrayShape::Dynamic);
    }
    if cursor.peek().is_some_and(|t| t.text == "$") {
        cursor.next();
        if cursor.eat(":") {
            expr::parse_expr(cursor, 0)?;
        }
        cursor.expect("]")?;
        diagnostics.push(
            Diagnostic::warning(format!("queue `{name}` treated as a dynamic array")).at_line(line),
        );
        return Ok(ArrayShape::Dynamic);
    }
    let first = expr::parse_expr(cursor, 0)?;
    let second = if cursor.eat(":") {
        Some(expr::parse_expr(cursor, 0)?)
    } else {
        None
    };
    cursor.expect("]")?;
    if cursor.peek_is("[") {
        diagnostics.push(
            Diagnostic::review(format!("`{name}` has several unpacked dimensions; only the first is kept"))
                .at_line(line),
        );
        while cursor.eat("[") {
            while !cursor.at_end() && !cursor.eat("]") {
                cursor.next();
            }
        }
    }

    let size = match (&first, &second) {
        (f, None) => f.literal_value().and_then(|n| u32::try_from(n).ok()),
        (f, Some(s)) => f
            .literal_value()
            .zip(s.literal_value())
            .and_then(|(a, b)| expr::range_width(a, b)),
    };
    match size {
        Some(n) => Ok(ArrayShape::Fixed(n)),
        None => {
            let index = match (&first, &second) {
                (Expr::Ident(t), None) => format!("associative index `{t}`"),
                _ if first.is_literal() => format!("out-of-range size `{first}`"),
                _ => format!("non-literal size `{first}`"),
            };
            diagnostics.push(
                Diagnostic::review(format!("array `{name}` has {index}; treated as dynamic"))
                    .at_line(line),
            );
            Ok(ArrayShape::Dynamic)
        }
    }
}

fn build(
    raw: &RawField,
    base: &BaseType<'_>,
    mut rand: RandKind,
    shape: ArrayShape,
    name: String,
    line: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> FieldDef {
    let (element, width) = match base.element {
        Base::Vector if base.signed => (ElementType::Integer(None), Some(base.width.unwrap_or(1))),
        Base::Vector => (ElementType::BitVector, Some(base.width.unwrap_or(1))),
        Base::Named(named) => (ElementType::Integer(Some(named)), None),
        Base::Enum(enum_name) => (ElementType::Enum(enum_name.to_string()), None),
    };

    if rand == RandKind::Cyclic {
        let reason = if base.signed {
            Some("signed")
        } else if matches!(base.element, Base::Enum(_)) {
            Some("enum")
        } else if shape != ArrayShape::None {
            Some("array")
        } else {
            None
        };
        if let Some(reason) = reason {
            diagnostics.push(
                Diagnostic::warning(format!("randc on {reason} field `{name}` emitted as rand"))
                    .at_line(line),
            );
            rand = RandKind::Random;
        }
    }

    FieldDef {
        name,
        element,
        width,
        signed: base.signed,
        rand,
        shape,
        declaration: raw.text.clone(),
        line,
    }
}

pub fn is_valid_name(name: &str) -> bool {
    FIELD_NAME.is_match(name) && !SV_RESERVED.contains(&name)
}

/// Opaque integer for a declaration nothing else understood.
fn fallback(raw: &RawField) -> Option<FieldDef> {
    let cut = raw
        .tokens
        .iter()
        .position(|t| t.is("=") || t.is("["))
        .unwrap_or(raw.tokens.len());
    let name_token = raw.tokens[..cut].iter().rev().find(|t| t.is_ident())?;
    if !is_valid_name(&name_token.text) || raw.tokens[..cut].len() < 2 {
        return None;
    }
    let rand = if raw.tokens.iter().any(|t| t.is("rand") || t.is("randc")) {
        RandKind::Random
    } else {
        RandKind::Fixed
    };
    Some(FieldDef {
        name: name_token.text.clone(),
        element: ElementType::Integer(None),
        width: Some(32),
        signed: true,
        rand,
        shape: ArrayShape::None,
        declaration: raw.text.clone(),
        line: raw.line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EnumDef, EnumLabel, TypeCategory};
    use crate::lexer::{span_text, tokenize};
    use crate::report::DiagnosticKind;

    fn raw(src: &str) -> RawField {
        let tokens = tokenize(src);
        RawField {
            text: span_text(src, &tokens),
            tokens,
            line: 1,
        }
    }

    fn enums() -> EnumTable {
        EnumTable::build(vec![EnumDef {
            name: "mode_e".to_string(),
            width: 2,
            labels: vec![EnumLabel {
                name: "IDLE".to_string(),
                value: 0,
            }],
            line: 1,
        }])
        .0
    }

    fn one(src: &str) -> (FieldDef, Vec<Diagnostic>) {
        let (mut fields, diagnostics) = classify(&raw(src), &enums(), src);
        assert_eq!(fields.len(), 1, "{src}");
        (fields.remove(0), diagnostics)
    }

    #[test]
    fn unsigned_vector_keeps_literal_width() {
        let (x, diagnostics) = one("rand bit [7:0] x");
        assert_eq!(x.category(), TypeCategory::BitVector);
        assert_eq!(x.width, Some(8));
        assert!(!x.signed);
        assert_eq!(x.rand, RandKind::Random);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn signed_vector_is_integer_category() {
        let (v, _) = one("rand bit signed [15:0] signed_val");
        assert_eq!(v.category(), TypeCategory::Integer);
        assert_eq!(v.width, Some(16));
        assert!(v.signed);
        assert_eq!(v.bit_width(&enums()), 16);
    }

    #[test]
    fn named_integers_use_width_table() {
        for (src, width, signed) in [
            ("rand byte a", 8, true),
            ("rand shortint a", 16, true),
            ("rand int unsigned a", 32, false),
            ("integer a", 32, true),
            ("rand longint a", 64, true),
        ] {
            let (f, _) = one(src);
            assert_eq!(f.bit_width(&enums()), width, "{src}");
            assert_eq!(f.signed, signed, "{src}");
            assert_eq!(f.width, None);
        }
    }

    #[test]
    fn comma_lists_arrays_and_enums() {
        let src = "rand bit [3:0] a, b[4], c[]";
        let (fields, _) = classify(&raw(src), &enums(), src);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].shape, ArrayShape::Fixed(4));
        assert_eq!(fields[2].shape, ArrayShape::Dynamic);
        assert_eq!(fields[2].category(), TypeCategory::Array);

        let (m, _) = one("rand mode_e mode");
        assert_eq!(m.category(), TypeCategory::Enum);
        assert_eq!(m.bit_width(&enums()), 2);
    }

    #[test]
    fn randc_degrades_on_signed_and_keeps_on_vectors() {
        let (c, d) = one("randc bit [3:0] c");
        assert_eq!(c.rand, RandKind::Cyclic);
        assert!(d.is_empty());
        let (s, d) = one("randc int s");
        assert_eq!(s.rand, RandKind::Random);
        assert_eq!(d[0].kind, DiagnosticKind::Warning);
    }

    #[test]
    fn unknown_types_fall_back_to_opaque_integer() {
        let (f, d) = one("rand my_struct_t payload");
        assert_eq!(f.element, ElementType::Integer(None));
        assert_eq!(f.width, Some(32));
        assert_eq!(d[0].kind, DiagnosticKind::ManualReview);
    }

    #[test]
    fn parameter_widths_and_initializers_are_flagged() {
        let (f, d) = one("rand bit [W-1:0] data = 0");
        assert_eq!(f.width, Some(32));
        assert!(d.iter().any(|x| x.kind == DiagnosticKind::ManualReview));
        assert!(d.iter().any(|x| x.kind == DiagnosticKind::Warning && x.message.contains("initializer")));
    }

    #[test]
    fn oversized_packed_widths_fall_back_to_32_bits() {
        let (f, d) = one("rand bit [65535:0][65535:0] a");
        assert_eq!(f.width, Some(32));
        assert!(d.iter().any(|x| x.kind == DiagnosticKind::ManualReview && x.message.contains("32 bits")));

        let (f, d) = one("rand bit [7:0][3:0] b");
        assert_eq!(f.width, Some(32));
        assert!(d.is_empty());

        let (f, d) = one("rand bit [340282366920938463463374607431768211455:0] c");
        assert_eq!(f.width, Some(32));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn oversized_unpacked_sizes_become_dynamic() {
        let (f, d) = one("rand bit q[8589934592]");
        assert_eq!(f.shape, ArrayShape::Dynamic);
        assert!(d[0].message.contains("out-of-range size"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let src = "rand bit _hidden";
        let (fields, d) = classify(&raw(src), &enums(), src);
        assert!(fields.is_empty());
        assert_eq!(d[0].kind, DiagnosticKind::ManualReview);
    }
}
