//! Expression translation: SV expression AST to precedence-safe PyVSC text.
use std::collections::HashSet;

use thiserror::Error;

use crate::expr::{BinaryOp, Expr, SetItem, UnaryOp};
use crate::ir::{EnumTable, FieldDef};
use crate::report::Diagnostic;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// The fragment has no PyVSC form; the enclosing statement becomes a review comment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Unsupported(pub String);

type Translated = Result<Py, Unsupported>;

/// Python text plus the precedence of its outermost operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Py {
    pub text: String,
    prec: u8,
}

mod prec {
    pub const CMP: u8 = 4;
    pub const BOR: u8 = 5;
    pub const BXOR: u8 = 6;
    pub const BAND: u8 = 7;
    pub const SHIFT: u8 = 8;
    pub const ADD: u8 = 9;
    pub const MUL: u8 = 10;
    pub const UNARY: u8 = 11;
    pub const POW: u8 = 12;
    pub const ATOM: u8 = 13;
}

impl Py {
    fn atom(text: impl Into<String>) -> Py {
        Py {
            text: text.into(),
            prec: prec::ATOM,
        }
    }
    /// Text usable as the receiver of a method call or subscript.
    pub fn as_operand(&self) -> String {
        self.at(prec::ATOM)
    }
    /// Left operand of a Python `in`, which would otherwise chain with a comparison.
    pub fn as_membership_subject(&self) -> String {
        self.at(prec::CMP + 1)
    }
    /// Text wrapped in parentheses when it binds looser than `min`.
    fn at(&self, min: u8) -> String {
        if self.prec < min {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }
}

const PYTHON_RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in",
    "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with",
    "yield", "self",
];

pub fn escape_name(name: &str, suffix: &str) -> String {
    if PYTHON_RESERVED.contains(&name) {
        format!("{name}{suffix}")
    } else {
        name.to_string()
    }
}

/// `packet_cfg_t` -> `PacketCfg`. Trailing `_t` / `_e` dropped, each word capitalized.
pub fn class_name(name: &str) -> String {
    let stem = name
        .strip_suffix("_t")
        .or_else(|| name.strip_suffix("_e"))
        .filter(|s| !s.is_empty())
        .unwrap_or(name);
    let pascal: String = stem
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if pascal.is_empty() { name.to_string() } else { pascal }
}

/// Emitted Python name of an enum or container type.
pub fn type_name(name: &str, suffix: &str) -> String {
    escape_name(&class_name(name), suffix)
}

// ————————————————————————————————————————————————————————————————————————————
// TRANSLATOR
// ————————————————————————————————————————————————————————————————————————————

/// Per-container translation context. Loop indices are pushed while a
/// foreach body is translated.
pub struct Translator<'s> {
    fields: HashSet<&'s str>,
    enums: &'s EnumTable,
    has_base: bool,
    suffix: &'s str,
    locals: Vec<String>,
    warned: HashSet<String>,
    line: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'s> Translator<'s> {
    pub fn new(fields: &'s [FieldDef], enums: &'s EnumTable, has_base: bool, suffix: &'s str) -> Self {
        Self {
            fields: fields.iter().map(|f| f.name.as_str()).collect(),
            enums,
            has_base,
            suffix,
            locals: Vec::new(),
            warned: HashSet::new(),
            line: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn at_line(&mut self, line: usize) {
        self.line = line;
    }
    pub fn push_local(&mut self, name: &str) {
        self.locals.push(name.to_string());
    }
    pub fn pop_local(&mut self) {
        self.locals.pop();
    }
    pub fn local_name(&self, name: &str) -> String {
        escape_name(name, self.suffix)
    }

    fn ambiguity(&mut self, message: String) {
        self.diagnostics.push(Diagnostic::ambiguity(message).at_line(self.line));
    }

    // ------------------------------- Front API -------------------------------- //

    /// Value position.
    pub fn value(&mut self, expr: &Expr) -> Translated {
        match expr {
            Expr::Ident(name) => Ok(Py::atom(self.identifier(name))),
            Expr::Number(lit) => lit
                .to_python()
                .map(|text| {
                    let prec = if text.starts_with('-') { prec::UNARY } else { prec::ATOM };
                    Py { text, prec }
                })
                .ok_or_else(|| Unsupported(format!("literal `{}` has no two-state value", lit.text))),
            Expr::Str(text) => Err(Unsupported(format!("string literal {text}"))),
            Expr::System(name) => Err(Unsupported(format!("`{name}`"))),
            Expr::Unary { op, operand } => self.unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expr::Ternary { .. } => Err(Unsupported("conditional operator `?:`".to_string())),
            Expr::Index { base, index } => {
                let base = self.value(base)?;
                let index = self.value(index)?;
                Ok(Py::atom(format!("{}[{}]", base.at(prec::ATOM), index.text)))
            }
            Expr::Slice { base, msb, lsb } => {
                let base = self.value(base)?;
                let msb = self.value(msb)?;
                let lsb = self.value(lsb)?;
                Ok(Py::atom(format!("{}[{}:{}]", base.at(prec::ATOM), msb.text, lsb.text)))
            }
            Expr::PartSelect { .. } => Err(Unsupported(format!("indexed part-select `{expr}`"))),
            Expr::Member { base, name } => {
                let base = self.value(base)?;
                Ok(Py::atom(format!("{}.{}", base.at(prec::ATOM), escape_name(name, self.suffix))))
            }
            Expr::Call { callee, args } => match (callee.as_ref(), args.as_slice()) {
                (Expr::Member { base, name }, []) if name == "size" => {
                    let base = self.value(base)?;
                    Ok(Py::atom(format!("{}.size", base.at(prec::ATOM))))
                }
                _ => Err(Unsupported(format!("call `{expr}`"))),
            },
            Expr::Inside { operand, set } => self.inside(operand, set, false),
            Expr::Concat(_) | Expr::Replicate { .. } => Err(Unsupported(format!("concatenation `{expr}`"))),
        }
    }

    /// Boolean position: non-boolean values become `e != 0`.
    pub fn condition(&mut self, expr: &Expr) -> Translated {
        if expr.is_boolean() {
            return self.value(expr);
        }
        let value = self.value(expr)?;
        Ok(Py {
            text: format!("{} != 0", value.at(prec::CMP + 1)),
            prec: prec::CMP,
        })
    }

    /// Complement of `expr` in boolean position.
    pub fn negated(&mut self, expr: &Expr) -> Translated {
        match expr {
            Expr::Binary { op, lhs, rhs } => {
                if let Some(inverse) = op.complement() {
                    return self.binary(inverse, lhs, rhs);
                }
                match op {
                    BinaryOp::LogAnd => {
                        let l = self.negated(lhs)?;
                        let r = self.negated(rhs)?;
                        Ok(join(&l, " | ", &r, prec::BOR))
                    }
                    BinaryOp::LogOr => {
                        let l = self.negated(lhs)?;
                        let r = self.negated(rhs)?;
                        Ok(join(&l, " & ", &r, prec::BAND))
                    }
                    _ => self.equals_zero(expr),
                }
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.condition(operand),
            Expr::Inside { operand, set } => self.inside(operand, set, true),
            _ => self.equals_zero(expr),
        }
    }

    /// `vsc.rangelist(...)` for a set.
    pub fn rangelist(&mut self, set: &[SetItem]) -> Result<String, Unsupported> {
        let items = set
            .iter()
            .map(|item| self.set_item(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("vsc.rangelist({})", items.join(", ")))
    }

    /// `vsc.rng(lo, hi)` or a plain value.
    pub fn set_item(&mut self, item: &SetItem) -> Result<String, Unsupported> {
        match item {
            SetItem::Value(v) => Ok(self.value(v)?.text),
            SetItem::Range(lo, hi) => {
                let lo = self.value(lo)?;
                let hi = self.value(hi)?;
                Ok(format!("vsc.rng({}, {})", lo.text, hi.text))
            }
        }
    }

    // ------------------------------ Implementation ------------------------------ //

    fn identifier(&mut self, name: &str) -> String {
        if name == "this" {
            return "self".to_string();
        }
        let bare = name.rsplit("::").next().unwrap_or(name);
        if self.locals.iter().any(|l| l == bare) {
            return escape_name(bare, self.suffix);
        }
        if let Some(owner) = self.enums.owner_of(bare) {
            return format!("{}.{}", type_name(&owner.name, self.suffix), escape_name(bare, self.suffix));
        }
        if !self.fields.contains(bare) && !self.has_base && self.warned.insert(bare.to_string()) {
            self.diagnostics.push(
                Diagnostic::warning(format!("`{bare}` is not a declared field; emitted as `self.{bare}`"))
                    .at_line(self.line),
            );
        }
        format!("self.{}", escape_name(bare, self.suffix))
    }

    fn equals_zero(&mut self, expr: &Expr) -> Translated {
        let value = self.value(expr)?;
        Ok(Py {
            text: format!("{} == 0", value.at(prec::CMP + 1)),
            prec: prec::CMP,
        })
    }

    fn inside(&mut self, operand: &Expr, set: &[SetItem], negated: bool) -> Translated {
        let subject = self.value(operand)?;
        let list = self.rangelist(set)?;
        let method = if negated { "not_inside" } else { "inside" };
        Ok(Py::atom(format!("{}.{method}({list})", subject.at(prec::ATOM))))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> Translated {
        match op {
            UnaryOp::Not => self.negated(operand),
            UnaryOp::Plus => self.value(operand),
            UnaryOp::Neg | UnaryOp::BitNot => {
                let inner = self.value(operand)?;
                Ok(Py {
                    text: format!("{}{}", if op == UnaryOp::Neg { "-" } else { "~" }, inner.at(prec::UNARY)),
                    prec: prec::UNARY,
                })
            }
            _ => Err(Unsupported(format!("reduction operator `{}`", op.symbol()))),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Translated {
        // the randomizable operand leads
        let (op, lhs, rhs) = if lhs.is_literal() && !rhs.is_literal() {
            match op.mirror() {
                Some(mirrored) => (mirrored, rhs, lhs),
                None => {
                    if !op.is_logical() {
                        self.ambiguity(format!(
                            "literal on the left of non-commutative `{}` kept in place",
                            op.symbol()
                        ));
                    }
                    (op, lhs, rhs)
                }
            }
        } else {
            (op, lhs, rhs)
        };

        match op {
            BinaryOp::LogAnd | BinaryOp::LogOr => {
                let l = self.condition(lhs)?;
                let r = self.condition(rhs)?;
                Ok(if op == BinaryOp::LogAnd {
                    join(&l, " & ", &r, prec::BAND)
                } else {
                    join(&l, " | ", &r, prec::BOR)
                })
            }
            BinaryOp::Implies | BinaryOp::Equiv => Err(Unsupported(format!(
                "`{}` inside an expression",
                op.symbol()
            ))),
            BinaryOp::BitXnor => {
                let l = self.value(lhs)?;
                let r = self.value(rhs)?;
                let xor = join(&l, " ^ ", &r, prec::BXOR);
                Ok(Py::atom(format!("~({})", xor.text)))
            }
            _ if op.is_relational() => {
                if matches!(op, BinaryOp::CaseEq | BinaryOp::CaseNe) {
                    self.ambiguity(format!("`{}` translated as two-state comparison", op.symbol()));
                }
                let symbol = match op {
                    BinaryOp::CaseEq => "==",
                    BinaryOp::CaseNe => "!=",
                    other => other.symbol(),
                };
                let l = self.value(lhs)?;
                let r = self.value(rhs)?;
                // python chains comparisons, so nested ones are always wrapped
                Ok(Py {
                    text: format!("{} {symbol} {}", l.at(prec::CMP + 1), r.at(prec::CMP + 1)),
                    prec: prec::CMP,
                })
            }
            _ => {
                let (symbol, level) = match op {
                    BinaryOp::BitOr => ("|", prec::BOR),
                    BinaryOp::BitXor => ("^", prec::BXOR),
                    BinaryOp::BitAnd => ("&", prec::BAND),
                    BinaryOp::Shl | BinaryOp::AShl => ("<<", prec::SHIFT),
                    BinaryOp::Shr | BinaryOp::AShr => (">>", prec::SHIFT),
                    BinaryOp::Add => ("+", prec::ADD),
                    BinaryOp::Sub => ("-", prec::ADD),
                    BinaryOp::Mul => ("*", prec::MUL),
                    BinaryOp::Div => ("//", prec::MUL),
                    BinaryOp::Mod => ("%", prec::MUL),
                    _ => ("**", prec::POW),
                };
                let l = self.value(lhs)?;
                let r = self.value(rhs)?;
                if op == BinaryOp::Pow {
                    return Ok(Py {
                        text: format!("{} ** {}", l.at(prec::POW + 1), r.at(prec::UNARY)),
                        prec: prec::POW,
                    });
                }
                Ok(join(&l, &format!(" {symbol} "), &r, level))
            }
        }
    }
}

/// Left-associative join at `level`.
fn join(l: &Py, symbol: &str, r: &Py, level: u8) -> Py {
    Py {
        text: format!("{}{symbol}{}", l.at(level), r.at(level + 1)),
        prec: level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrayShape, ElementType, EnumDef, EnumLabel, RandKind};
    use crate::lexer::{tokenize, Cursor};
    use crate::report::DiagnosticKind;

    fn field(name: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            element: ElementType::BitVector,
            width: Some(8),
            signed: false,
            rand: RandKind::Random,
            shape: ArrayShape::None,
            declaration: String::new(),
            line: 1,
        }
    }

    fn parse(src: &str) -> Expr {
        let tokens = tokenize(src);
        let mut cursor = Cursor::new(&tokens, src);
        crate::expr::parse(&mut cursor).unwrap()
    }

    fn fixture() -> (Vec<FieldDef>, EnumTable) {
        let fields = ["a", "b", "x", "len", "arr", "lambda"].map(field).to_vec();
        let (enums, _) = EnumTable::build(vec![EnumDef {
            name: "mode_e".to_string(),
            width: 2,
            labels: vec![EnumLabel {
                name: "READ".to_string(),
                value: 0,
            }],
            line: 1,
        }]);
        (fields, enums)
    }

    fn cond(src: &str) -> String {
        let (fields, enums) = fixture();
        let mut t = Translator::new(&fields, &enums, false, "_");
        t.condition(&parse(src)).unwrap().text
    }

    fn neg(src: &str) -> String {
        let (fields, enums) = fixture();
        let mut t = Translator::new(&fields, &enums, false, "_");
        t.negated(&parse(src)).unwrap().text
    }

    #[test]
    fn negation_is_complement_correct() {
        assert_eq!(cond("!(a == b)"), "self.a != self.b");
        assert_eq!(cond("!(a != b)"), "self.a == self.b");
        assert_eq!(cond("!(a > b)"), "self.a <= self.b");
        assert_eq!(cond("!(a >= b)"), "self.a < self.b");
        assert_eq!(cond("!(a < b)"), "self.a >= self.b");
        assert_eq!(cond("!(a <= b)"), "self.a > self.b");
        assert_eq!(cond("!a"), "self.a == 0");
        assert_eq!(cond("!!a"), "self.a != 0");
    }

    #[test]
    fn de_morgan_applies_recursively() {
        assert_eq!(neg("a == 1 && (b < 2 || x)"), "(self.a != 1) | (self.b >= 2) & (self.x == 0)");
        assert_eq!(cond("!(x inside {1, [2:3]})"), "self.x.not_inside(vsc.rangelist(1, vsc.rng(2, 3)))");
    }

    #[test]
    fn logical_operators_coerce_to_boolean() {
        assert_eq!(cond("a && b > 1"), "(self.a != 0) & (self.b > 1)");
        assert_eq!(cond("a || b"), "(self.a != 0) | (self.b != 0)");
        assert_eq!(cond("x"), "self.x != 0");
    }

    #[test]
    fn arithmetic_precedence_and_division() {
        assert_eq!(cond("(a + b) / 2 == x"), "(self.a + self.b) // 2 == self.x");
        assert_eq!(cond("a - (b - x) > 0"), "self.a - (self.b - self.x) > 0");
        assert_eq!(cond("(a & 3) == 1"), "self.a & 3 == 1");
        assert_eq!(cond("a ~^ b"), "~(self.a ^ self.b) != 0");
        assert_eq!(cond("x[7:4] == 4'hA"), "self.x[7:4] == 0xA");
    }

    #[test]
    fn literal_left_is_reordered() {
        assert_eq!(cond("5 < x"), "self.x > 5");
        assert_eq!(cond("2 * len == 8"), "self.len * 2 == 8");
        let (fields, enums) = fixture();
        let mut t = Translator::new(&fields, &enums, false, "_");
        assert_eq!(t.condition(&parse("10 - x > 0")).unwrap().text, "10 - self.x > 0");
        assert_eq!(t.diagnostics[0].kind, DiagnosticKind::Ambiguity);
    }

    #[test]
    fn identifiers_resolve_locals_enums_fields() {
        let (fields, enums) = fixture();
        let mut t = Translator::new(&fields, &enums, false, "_");
        t.push_local("i");
        assert_eq!(t.condition(&parse("arr[i] != READ")).unwrap().text, "self.arr[i] != Mode.READ");
        assert_eq!(t.value(&parse("arr.size()")).unwrap().text, "self.arr.size");
        assert_eq!(t.value(&parse("this.lambda")).unwrap().text, "self.lambda_");
        t.pop_local();
        t.value(&parse("ghost + 1")).unwrap();
        t.value(&parse("ghost + 2")).unwrap();
        assert_eq!(t.diagnostics.len(), 1);
    }

    #[test]
    fn unsupported_fragments_are_reported() {
        let (fields, enums) = fixture();
        let mut t = Translator::new(&fields, &enums, false, "_");
        for src in ["a ? b : x", "{a, b} == 3", "$countones(a) == 1", "&a", "x == 4'b1x01", "f(a)"] {
            assert!(t.condition(&parse(src)).is_err(), "{src}");
        }
    }

    #[test]
    fn names_are_canonicalized() {
        assert_eq!(class_name("packet_cfg_t"), "PacketCfg");
        assert_eq!(class_name("state_e"), "State");
        assert_eq!(class_name("ALU_op"), "ALUOp");
        assert_eq!(escape_name("class", "_"), "class_");
        assert_eq!(escape_name("len", "_"), "len");
    }
}
