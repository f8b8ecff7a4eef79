//! Entity extraction: enums, containers, and the raw pieces inside them.
//!
//! Works on the token stream of the normalized text. Spans index the raw text
//! as well, which is where constraint excerpts and hook bodies are cut from so
//! they keep their comments.
use crate::error::{ExprError, ExtractError};
use crate::expr;
use crate::ir::{EnumDef, EnumLabel, Hook, NamedInt};
use crate::lexer::{span_text, Cursor, Token, TokenKind};
use crate::report::Diagnostic;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct RawField {
    pub tokens: Vec<Token>, // without the trailing `;`
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct RawConstraint {
    pub name: String,
    pub body: Vec<Token>, // between the outer braces
    pub line: usize,
    pub excerpt: String,  // raw text from `constraint` to the closing brace
}

#[derive(Debug, Clone)]
pub struct RawClass {
    pub name: String,
    pub base: Option<String>,
    pub line: usize,
    pub fields: Vec<RawField>,
    pub constraints: Vec<RawConstraint>,
    pub hooks: Vec<Hook>,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub enums: Vec<EnumDef>,
    pub classes: Vec<RawClass>,
    pub diagnostics: Vec<Diagnostic>,
}

const MEMBER_QUALIFIERS: &[&str] = &[
    "local", "protected", "static", "virtual", "extern", "pure", "const", "automatic",
];

const HOOKS: &[&str] = &["pre_randomize", "post_randomize"];

// ————————————————————————————————————————————————————————————————————————————
// FRONT API
// ————————————————————————————————————————————————————————————————————————————

/// `normalized` is the text the tokens were lexed from; `raw` has the same layout
/// with comments intact.
pub fn extract(tokens: &[Token], normalized: &str, raw: &str) -> Extraction {
    let mut extractor = Extractor {
        cursor: Cursor::new(tokens, normalized),
        tokens,
        normalized,
        raw,
        out: Extraction::default(),
    };
    extractor.run();
    extractor.out
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

struct Extractor<'a> {
    cursor: Cursor<'a>,
    tokens: &'a [Token],
    normalized: &'a str,
    raw: &'a str,
    out: Extraction,
}

impl<'a> Extractor<'a> {
    fn run(&mut self) {
        while let Some(token) = self.cursor.peek() {
            if token.is("typedef") {
                self.typedef();
            } else if token.is("class") {
                self.class();
            } else if token.is("virtual") && self.cursor.peek_at(1).is_some_and(|t| t.is("class")) {
                self.cursor.next();
                self.class();
            } else {
                self.cursor.next();
            }
        }
    }

    fn warn(&mut self, message: String, line: usize) {
        self.out.diagnostics.push(Diagnostic::warning(message).at_line(line));
    }

    fn review(&mut self, message: String, line: usize) {
        self.out.diagnostics.push(Diagnostic::review(message).at_line(line));
    }

    // ---------------------------------- typedefs ---------------------------------- //

    fn typedef(&mut self) {
        let Some(start) = self.cursor.next() else { return };
        if self.cursor.peek_is("enum") {
            let resume = self.cursor.pos();
            if let Err(error) = self.enum_decl() {
                self.review(format!("malformed enum declaration skipped: {error}"), start.line);
                self.cursor.reset(resume);
                self.cursor.skip_statement();
            }
        } else if self.cursor.peek_is("class") {
            // forward declaration
            self.cursor.skip_statement();
        } else {
            self.warn("typedef other than enum skipped".to_string(), start.line);
            self.cursor.skip_statement();
        }
    }

    fn enum_decl(&mut self) -> Result<(), ExprError> {
        let line = self.cursor.expect("enum")?.line;
        let mut width = 32u32;

        if let Some(base) = self.cursor.peek().filter(|t| t.is_ident()) {
            width = match base.text.as_str() {
                "bit" | "logic" | "reg" => 1,
                word => NamedInt::from_keyword(word).map_or(32, NamedInt::width),
            };
            self.cursor.next();
            if !self.cursor.eat("signed") {
                self.cursor.eat("unsigned");
            }
        }
        if self.cursor.eat("[") {
            let msb = expr::parse_expr(&mut self.cursor, 0)?;
            self.cursor.expect(":")?;
            let lsb = expr::parse_expr(&mut self.cursor, 0)?;
            self.cursor.expect("]")?;
            match (msb.literal_value(), lsb.literal_value()) {
                (Some(m), Some(l)) => match expr::range_width(m, l) {
                    Some(w) => width = w,
                    None => {
                        width = 32;
                        self.review(
                            format!("enum width `[{msb}:{lsb}]` does not fit in 32 bits; assuming 32 bits"),
                            line,
                        );
                    }
                },
                _ => {
                    width = 32;
                    self.review(
                        format!("enum width `[{msb}:{lsb}]` is not literal; assuming 32 bits"),
                        line,
                    );
                }
            }
        }

        self.cursor.expect("{")?;
        let mut labels = Vec::new();
        let mut next_value = 0i64;
        loop {
            let label = self.cursor.expect_ident()?;
            let value = if self.cursor.eat("=") {
                let value_expr = expr::parse_expr(&mut self.cursor, 0)?;
                match value_expr.literal_value().and_then(|v| i64::try_from(v).ok()) {
                    Some(v) => v,
                    None => {
                        self.review(
                            format!(
                                "enum label `{}` has non-literal value `{value_expr}`; numbered {next_value}",
                                label.text
                            ),
                            label.line,
                        );
                        next_value
                    }
                }
            } else {
                next_value
            };
            labels.push(EnumLabel {
                name: label.text.clone(),
                value,
            });
            next_value = value.saturating_add(1);
            if self.cursor.eat("}") {
                break;
            }
            self.cursor.expect(",")?;
        }
        let name = self.cursor.expect_ident()?.text.clone();
        self.cursor.expect(";")?;

        self.out.enums.push(EnumDef {
            name,
            width,
            labels,
            line,
        });
        Ok(())
    }

    // --------------------------------- containers --------------------------------- //

    fn class(&mut self) {
        let Some(keyword) = self.cursor.next() else { return };
        let line = keyword.line;
        let header = self.class_header();
        let (name, base) = match header {
            Ok(header) => header,
            Err(error) => {
                self.review(format!("malformed class header skipped: {error}"), line);
                self.skip_past("endclass");
                return;
            }
        };

        let body_start = self.cursor.pos();
        match self.class_body(&name, base, line) {
            Ok(class) => self.out.classes.push(class),
            Err(error) => {
                self.out.diagnostics.push(
                    Diagnostic::review(format!("container `{name}` skipped: {error}"))
                        .at_line(error.line())
                        .in_container(&name),
                );
                self.cursor.reset(body_start);
                self.skip_past("endclass");
            }
        }
    }

    fn class_header(&mut self) -> Result<(String, Option<String>), ExprError> {
        let name = self.cursor.expect_ident()?.text.clone();
        self.skip_parameters()?;
        let mut base = None;
        if self.cursor.eat("extends") {
            base = Some(self.cursor.expect_ident()?.text.clone());
            self.skip_parameters()?;
            if self.cursor.peek_is("(") {
                self.skip_balanced()?;
            }
        }
        self.cursor.expect(";")?;
        Ok((name, base))
    }

    /// `#( ... )` parameter lists are dropped.
    fn skip_parameters(&mut self) -> Result<(), ExprError> {
        if self.cursor.eat("#") {
            self.skip_balanced()?;
        }
        Ok(())
    }

    fn skip_balanced(&mut self) -> Result<(), ExprError> {
        let open = self.cursor.expect("(")?;
        let mut depth = 1;
        while let Some(t) = self.cursor.next() {
            match t.text.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ExprError::Expected {
            expected: "`)`".to_string(),
            found: "end of input".to_string(),
            line: open.line,
        })
    }

    fn class_body(
        &mut self,
        name: &str,
        base: Option<String>,
        line: usize,
    ) -> Result<RawClass, ExtractError> {
        let mut class = RawClass {
            name: name.to_string(),
            base,
            line,
            fields: Vec::new(),
            constraints: Vec::new(),
            hooks: Vec::new(),
        };

        loop {
            let Some(token) = self.cursor.peek() else {
                return Err(ExtractError::Unterminated {
                    what: "class",
                    name: name.to_string(),
                    line,
                });
            };
            if token.kind == TokenKind::Directive {
                self.cursor.next();
                if self.cursor.peek_is("(") {
                    let _ = self.skip_balanced();
                }
                self.warn(format!("macro `{}` skipped", token.text), token.line);
                continue;
            }
            match token.text.as_str() {
                "endclass" => {
                    self.cursor.next();
                    if self.cursor.eat(":") {
                        self.cursor.next();
                    }
                    return Ok(class);
                }
                ";" => {
                    self.cursor.next();
                }
                "constraint" => self.constraint(&mut class)?,
                "typedef" => self.typedef(),
                "covergroup" => {
                    self.warn("covergroup skipped".to_string(), token.line);
                    self.skip_past("endgroup");
                }
                "class" => {
                    self.warn("nested class skipped".to_string(), token.line);
                    self.cursor.next();
                    self.skip_past("endclass");
                }
                "parameter" | "localparam" | "import" | "export" => {
                    self.warn(format!("`{}` declaration skipped", token.text), token.line);
                    self.cursor.skip_statement();
                }
                _ => self.member(&mut class)?,
            }
        }
    }

    /// Field, subroutine, or qualified constraint.
    fn member(&mut self, class: &mut RawClass) -> Result<(), ExtractError> {
        let start = self.cursor.pos();
        let mut prototype = false;
        while let Some(t) = self.cursor.peek().filter(|t| MEMBER_QUALIFIERS.contains(&t.text.as_str())) {
            prototype |= t.is("extern") || t.is("pure");
            self.cursor.next();
        }
        match self.cursor.peek() {
            Some(t) if t.is("function") || t.is("task") => self.subroutine(class, prototype),
            Some(t) if t.is("constraint") => {
                if prototype {
                    self.warn("extern constraint prototype skipped".to_string(), t.line);
                    self.cursor.skip_statement();
                    Ok(())
                } else {
                    self.constraint(class)
                }
            }
            _ => {
                self.cursor.reset(start);
                self.cursor.skip_statement();
                let end = self.cursor.pos();
                let tokens = &self.tokens[start..end];
                let tokens = match tokens.last() {
                    Some(last) if last.is(";") => &tokens[..tokens.len() - 1],
                    _ => tokens,
                };
                if let Some(first) = tokens.first() {
                    class.fields.push(RawField {
                        tokens: tokens.to_vec(),
                        text: span_text(self.normalized, tokens),
                        line: first.line,
                    });
                }
                Ok(())
            }
        }
    }

    fn constraint(&mut self, class: &mut RawClass) -> Result<(), ExtractError> {
        let Some(keyword) = self.cursor.next() else { return Ok(()) };
        let line = keyword.line;
        let name = match self.cursor.expect_ident() {
            Ok(t) => t.text.clone(),
            Err(error) => {
                return Err(ExtractError::Malformed {
                    what: "constraint",
                    detail: error.to_string(),
                    line,
                });
            }
        };
        if self.cursor.eat(";") {
            self.warn(format!("constraint prototype `{name}` has no body; skipped"), line);
            return Ok(());
        }
        if !self.cursor.peek_is("{") {
            return Err(ExtractError::Malformed {
                what: "constraint",
                detail: format!("expected `{{` after `constraint {name}`"),
                line,
            });
        }
        let open = self.cursor.pos();
        let Some(close) = find_close(self.tokens, open) else {
            return Err(ExtractError::Unterminated {
                what: "constraint",
                name,
                line,
            });
        };
        let excerpt = self.raw[keyword.span.start..self.tokens[close].span.end].to_string();
        class.constraints.push(RawConstraint {
            name,
            body: self.tokens[open + 1..close].to_vec(),
            line,
            excerpt,
        });
        self.cursor.reset(close + 1);
        Ok(())
    }

    fn subroutine(&mut self, class: &mut RawClass, prototype: bool) -> Result<(), ExtractError> {
        let Some(keyword) = self.cursor.next() else { return Ok(()) };
        let terminator = if keyword.is("function") { "endfunction" } else { "endtask" };
        let header_start = self.cursor.pos();
        self.cursor.skip_statement();
        let header = &self.tokens[header_start..self.cursor.pos()];
        let name = subroutine_name(header).unwrap_or_else(|| "<anonymous>".to_string());

        if prototype {
            self.warn(format!("{} prototype `{name}` skipped", keyword.text), keyword.line);
            return Ok(());
        }
        let Some(end) = self.tokens[self.cursor.pos()..]
            .iter()
            .position(|t| t.is(terminator))
            .map(|offset| self.cursor.pos() + offset)
        else {
            return Err(ExtractError::Unterminated {
                what: if keyword.is("function") { "function" } else { "task" },
                name,
                line: keyword.line,
            });
        };

        let body_start = header.last().map_or(keyword.span.end, |t| t.span.end);
        let body = self.raw[body_start..self.tokens[end].span.start].trim().to_string();
        self.cursor.reset(end + 1);
        if self.cursor.eat(":") {
            self.cursor.next();
        }

        if HOOKS.contains(&name.as_str()) {
            class.hooks.push(Hook {
                name,
                body,
                line: keyword.line,
            });
        } else {
            self.warn(format!("{} `{name}` skipped", keyword.text), keyword.line);
        }
        Ok(())
    }

    /// Advance past the next token with this text, or to the end.
    fn skip_past(&mut self, text: &str) {
        while let Some(t) = self.cursor.next() {
            if t.is(text) {
                return;
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Index of the `}` matching the `{` at `open`. Only braces are counted.
fn find_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.is("{") {
            depth += 1;
        } else if t.is("}") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        } else if depth == 1 && (t.is("constraint") || t.is("endclass")) {
            // a brace went missing; the rest belongs to the next member
            return None;
        }
    }
    None
}

/// Identifier right before the argument list (or before `;` when there is none).
fn subroutine_name(header: &[Token]) -> Option<String> {
    let cut = header
        .iter()
        .position(|t| t.is("(") || t.is(";"))
        .unwrap_or(header.len());
    header[..cut]
        .iter()
        .rev()
        .find(|t| t.is_ident())
        .map(|t| t.text.clone())
}
