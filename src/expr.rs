//! SV expression AST and a Pratt parser over the token stream.
use std::fmt;

use serde::Serialize;

use crate::error::ExprError;
use crate::lexer::{Cursor, TokenKind};

// ————————————————————————————————————————————————————————————————————————————
// LITERALS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
    /// `'0`, `'1`, `'x`, `'z`
    Fill,
    Real,
}

/// A numeric literal as written. `size` and `based` are kept so metrics and
/// leak checks can tell `8'hFF` from `255`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Literal {
    pub text: String,
    pub size: Option<u32>,
    pub signed: bool,
    pub radix: Radix,
    pub based: bool,
    digits: String,
}

impl Literal {
    pub fn parse(text: &str) -> Literal {
        let clean: String = text.chars().filter(|c| *c != '_' && !c.is_whitespace()).collect();
        let Some(quote) = clean.find('\'') else {
            let radix = if clean.contains('.') { Radix::Real } else { Radix::Decimal };
            return Literal {
                text: text.to_string(),
                size: None,
                signed: true,
                radix,
                based: false,
                digits: clean,
            };
        };
        let size = clean[..quote].parse::<u32>().ok();
        let mut rest = &clean[quote + 1..];
        let mut signed = false;
        if rest.starts_with(['s', 'S']) {
            signed = true;
            rest = &rest[1..];
        }
        let radix = match rest.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('b') => Radix::Binary,
            Some('o') => Radix::Octal,
            Some('d') => Radix::Decimal,
            Some('h') => Radix::Hex,
            _ => Radix::Fill,
        };
        let digits = if radix == Radix::Fill { rest } else { &rest[1..] };
        Literal {
            text: text.to_string(),
            size,
            signed,
            radix,
            based: true,
            digits: digits.to_string(),
        }
    }

    pub fn is_four_state(&self) -> bool {
        self.digits
            .chars()
            .any(|c| matches!(c.to_ascii_lowercase(), 'x' | 'z' | '?'))
    }

    /// Integer value, if it has one independent of context. Sized literals are
    /// truncated to their size, and signed ones sign-extend from the top bit.
    pub fn value(&self) -> Option<i128> {
        let raw = self.magnitude()?;
        match self.size.filter(|size| (1..127).contains(size)) {
            Some(size) => {
                let masked = raw & ((1u128 << size) - 1);
                let value = masked as i128;
                if self.signed && (masked >> (size - 1)) & 1 == 1 {
                    Some(value - (1i128 << size))
                } else {
                    Some(value)
                }
            }
            None => i128::try_from(raw).ok(),
        }
    }

    /// Digits as written, before sizing.
    fn magnitude(&self) -> Option<u128> {
        if self.is_four_state() {
            return None;
        }
        let radix = match self.radix {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Decimal => 10,
            Radix::Hex => 16,
            Radix::Fill => return (self.digits == "0").then_some(0),
            Radix::Real => return None,
        };
        u128::from_str_radix(&self.digits, radix).ok()
    }

    /// Python spelling, or None when the literal has no Python equivalent.
    /// Based literals keep their radix unless sizing changed the value.
    pub fn to_python(&self) -> Option<String> {
        if self.is_four_state() {
            return None;
        }
        let prefix = match self.radix {
            Radix::Binary => "0b",
            Radix::Octal => "0o",
            Radix::Hex => "0x",
            Radix::Decimal | Radix::Fill => return self.value().map(|v| v.to_string()),
            Radix::Real => return Some(self.digits.clone()),
        };
        match (self.value(), self.magnitude()) {
            (Some(value), Some(raw)) if u128::try_from(value).ok() != Some(raw) => Some(value.to_string()),
            _ => Some(format!("{prefix}{}", self.digits)),
        }
    }
}

/// Bit count of a `[msb:lsb]` range, or None when it does not fit in `u32`.
pub fn range_width(msb: i128, lsb: i128) -> Option<u32> {
    let span = msb.checked_sub(lsb)?.unsigned_abs().checked_add(1)?;
    u32::try_from(span).ok()
}

// ————————————————————————————————————————————————————————————————————————————
// OPERATORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
    Plus,
    RedAnd,
    RedOr,
    RedXor,
    RedNand,
    RedNor,
    RedXnor,
}

impl UnaryOp {
    fn from_token(text: &str) -> Option<Self> {
        Some(match text {
            "!" => Self::Not,
            "~" => Self::BitNot,
            "-" => Self::Neg,
            "+" => Self::Plus,
            "&" => Self::RedAnd,
            "|" => Self::RedOr,
            "^" => Self::RedXor,
            "~&" => Self::RedNand,
            "~|" => Self::RedNor,
            "~^" | "^~" => Self::RedXnor,
            _ => return None,
        })
    }
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::BitNot => "~",
            Self::Neg => "-",
            Self::Plus => "+",
            Self::RedAnd => "&",
            Self::RedOr => "|",
            Self::RedXor => "^",
            Self::RedNand => "~&",
            Self::RedNor => "~|",
            Self::RedXnor => "~^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Implies,
    Equiv,
    LogOr,
    LogAnd,
    BitOr,
    BitXor,
    BitXnor,
    BitAnd,
    Eq,
    Ne,
    CaseEq,
    CaseNe,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    AShl,
    AShr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn from_token(text: &str) -> Option<Self> {
        Some(match text {
            "->" => Self::Implies,
            "<->" => Self::Equiv,
            "||" => Self::LogOr,
            "&&" => Self::LogAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "~^" | "^~" => Self::BitXnor,
            "&" => Self::BitAnd,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "===" => Self::CaseEq,
            "!==" => Self::CaseNe,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            "<<<" => Self::AShl,
            ">>>" => Self::AShr,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "**" => Self::Pow,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Implies => "->",
            Self::Equiv => "<->",
            Self::LogOr => "||",
            Self::LogAnd => "&&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitXnor => "~^",
            Self::BitAnd => "&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::CaseEq => "===",
            Self::CaseNe => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::AShl => "<<<",
            Self::AShr => ">>>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }

    /// SV precedence level, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Implies | Self::Equiv => 1,
            Self::LogOr => 3,
            Self::LogAnd => 4,
            Self::BitOr => 5,
            Self::BitXor | Self::BitXnor => 6,
            Self::BitAnd => 7,
            Self::Eq | Self::Ne | Self::CaseEq | Self::CaseNe => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 9,
            Self::Shl | Self::Shr | Self::AShl | Self::AShr => 10,
            Self::Add | Self::Sub => 11,
            Self::Mul | Self::Div | Self::Mod => 12,
            Self::Pow => 13,
        }
    }

    fn right_assoc(self) -> bool {
        matches!(self, Self::Implies | Self::Equiv)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::CaseEq | Self::CaseNe | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::LogAnd | Self::LogOr | Self::Implies | Self::Equiv)
    }

    /// `!(a op b)` == `a complement(op) b`
    pub fn complement(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::CaseEq => Self::CaseNe,
            Self::CaseNe => Self::CaseEq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Gt => Self::Le,
            Self::Le => Self::Gt,
            _ => return None,
        })
    }

    /// `a op b` == `b mirror(op) a`
    pub fn mirror(self) -> Option<Self> {
        Some(match self {
            Self::Lt => Self::Gt,
            Self::Gt => Self::Lt,
            Self::Le => Self::Ge,
            Self::Ge => Self::Le,
            op if op.is_commutative() => op,
            _ => return None,
        })
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Mul
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::BitXnor
                | Self::Eq
                | Self::Ne
                | Self::CaseEq
                | Self::CaseNe
                | Self::LogAnd
                | Self::LogOr
        )
    }
}

// ————————————————————————————————————————————————————————————————————————————
// AST
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SetItem {
    Value(Expr),
    Range(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expr {
    Ident(String),
    Number(Literal),
    Str(String),
    /// `$` or an uncalled `$name`
    System(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        other: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        base: Box<Expr>,
        msb: Box<Expr>,
        lsb: Box<Expr>,
    },
    PartSelect {
        base: Box<Expr>,
        start: Box<Expr>,
        width: Box<Expr>,
        ascending: bool,
    },
    Member {
        base: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Inside {
        operand: Box<Expr>,
        set: Vec<SetItem>,
    },
    Concat(Vec<Expr>),
    Replicate {
        count: Box<Expr>,
        items: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Constant integer value of a literal, possibly negated.
    pub fn literal_value(&self) -> Option<i128> {
        match self {
            Expr::Number(lit) => lit.value(),
            Expr::Unary { op: UnaryOp::Neg, operand } => operand.literal_value().and_then(i128::checked_neg),
            Expr::Unary { op: UnaryOp::Plus, operand } => operand.literal_value(),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Number(_) => true,
            Expr::Unary { op: UnaryOp::Neg | UnaryOp::Plus, operand } => operand.is_literal(),
            _ => false,
        }
    }

    /// Already yields a truth value (no `!= 0` coercion needed).
    pub fn is_boolean(&self) -> bool {
        match self {
            Expr::Binary { op, .. } => op.is_relational() || op.is_logical(),
            Expr::Unary { op: UnaryOp::Not, .. } => true,
            Expr::Inside { .. } => true,
            _ => false,
        }
    }

    /// Pre-order traversal.
    pub fn walk<'e>(&'e self, visit: &mut impl FnMut(&'e Expr)) {
        visit(self);
        match self {
            Expr::Ident(_) | Expr::Number(_) | Expr::Str(_) | Expr::System(_) => {}
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Ternary { cond, then, other } => {
                cond.walk(visit);
                then.walk(visit);
                other.walk(visit);
            }
            Expr::Index { base, index } => {
                base.walk(visit);
                index.walk(visit);
            }
            Expr::Slice { base, msb, lsb } => {
                base.walk(visit);
                msb.walk(visit);
                lsb.walk(visit);
            }
            Expr::PartSelect { base, start, width, .. } => {
                base.walk(visit);
                start.walk(visit);
                width.walk(visit);
            }
            Expr::Member { base, .. } => base.walk(visit),
            Expr::Call { callee, args } => {
                callee.walk(visit);
                args.iter().for_each(|a| a.walk(visit));
            }
            Expr::Inside { operand, set } => {
                operand.walk(visit);
                for item in set {
                    match item {
                        SetItem::Value(v) => v.walk(visit),
                        SetItem::Range(lo, hi) => {
                            lo.walk(visit);
                            hi.walk(visit);
                        }
                    }
                }
            }
            Expr::Concat(items) => items.iter().for_each(|a| a.walk(visit)),
            Expr::Replicate { count, items } => {
                count.walk(visit);
                items.iter().for_each(|a| a.walk(visit));
            }
        }
    }

    /// SV precedence of the node itself (atoms are 15).
    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Ternary { .. } => 2,
            Expr::Inside { .. } => 9,
            Expr::Unary { .. } => 14,
            _ => 15,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PARSER
// ————————————————————————————————————————————————————————————————————————————

/// Minimum binding power that stops before `->` / `<->`.
pub const ABOVE_IMPLICATION: u8 = 3;

const PREFIX_BP: u8 = 28;

/// Parse a full expression.
pub fn parse(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    parse_expr(cursor, 0)
}

/// Pratt loop. Binding powers are `2 * precedence` (+1 on the right for left-assoc ops).
/// `dist`, `before`, `:` and `:=` are not operators, so the loop stops at them.
pub fn parse_expr(cursor: &mut Cursor<'_>, min_bp: u8) -> Result<Expr, ExprError> {
    let mut lhs = parse_prefix(cursor)?;

    loop {
        let Some(token) = cursor.peek() else { break };
        if token.kind == TokenKind::Str {
            break;
        }

        if token.is("inside") {
            if 18 < min_bp {
                break;
            }
            cursor.next();
            let set = parse_set(cursor)?;
            lhs = Expr::Inside {
                operand: Box::new(lhs),
                set,
            };
            continue;
        }

        if token.is("?") {
            if 4 < min_bp {
                break;
            }
            cursor.next();
            let then = parse_expr(cursor, 0)?;
            cursor.expect(":")?;
            let other = parse_expr(cursor, 4)?;
            lhs = Expr::Ternary {
                cond: Box::new(lhs),
                then: Box::new(then),
                other: Box::new(other),
            };
            continue;
        }

        let Some(op) = BinaryOp::from_token(&token.text) else { break };
        let left_bp = op.precedence() * 2;
        if left_bp < min_bp {
            break;
        }
        let right_bp = if op.right_assoc() { left_bp } else { left_bp + 1 };
        cursor.next();
        let rhs = parse_expr(cursor, right_bp)?;
        lhs = Expr::binary(op, lhs, rhs);
    }

    Ok(lhs)
}

fn parse_prefix(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    let Some(token) = cursor.next() else {
        return Err(ExprError::UnexpectedEnd {
            expected: "expression".to_string(),
        });
    };

    let atom = match token.kind {
        TokenKind::Number => Expr::Number(Literal::parse(&token.text)),
        TokenKind::Str => Expr::Str(token.text.clone()),
        TokenKind::System => Expr::System(token.text.clone()),
        TokenKind::Ident => {
            let mut name = token.text.clone();
            while cursor.peek_is("::") {
                cursor.next();
                name.push_str("::");
                name.push_str(&cursor.expect_ident()?.text);
            }
            Expr::Ident(name)
        }
        TokenKind::Directive => {
            return Err(ExprError::Unexpected {
                found: token.text.clone(),
                line: token.line,
            });
        }
        TokenKind::Punct => match token.text.as_str() {
            "(" => {
                let inner = parse_expr(cursor, 0)?;
                cursor.expect(")")?;
                inner
            }
            "{" => parse_concat(cursor)?,
            text => match UnaryOp::from_token(text) {
                Some(op) => {
                    let operand = parse_expr(cursor, PREFIX_BP)?;
                    return Ok(Expr::unary(op, operand));
                }
                None => {
                    return Err(ExprError::Unexpected {
                        found: token.text.clone(),
                        line: token.line,
                    });
                }
            },
        },
    };

    parse_postfix(cursor, atom)
}

fn parse_postfix(cursor: &mut Cursor<'_>, mut base: Expr) -> Result<Expr, ExprError> {
    loop {
        if cursor.eat("[") {
            let first = parse_expr(cursor, 0)?;
            base = if cursor.eat(":") {
                let lsb = parse_expr(cursor, 0)?;
                Expr::Slice {
                    base: Box::new(base),
                    msb: Box::new(first),
                    lsb: Box::new(lsb),
                }
            } else if cursor.peek_is("+:") || cursor.peek_is("-:") {
                let ascending = cursor.eat("+:");
                if !ascending {
                    cursor.next();
                }
                let width = parse_expr(cursor, 0)?;
                Expr::PartSelect {
                    base: Box::new(base),
                    start: Box::new(first),
                    width: Box::new(width),
                    ascending,
                }
            } else {
                Expr::Index {
                    base: Box::new(base),
                    index: Box::new(first),
                }
            };
            cursor.expect("]")?;
        } else if cursor.peek_is(".") && cursor.peek_at(1).is_some_and(|t| t.is_ident()) {
            cursor.next();
            let name = cursor.expect_ident()?.text.clone();
            base = Expr::Member {
                base: Box::new(base),
                name,
            };
        } else if cursor.peek_is("(")
            && matches!(base, Expr::Ident(_) | Expr::Member { .. } | Expr::System(_))
        {
            cursor.next();
            let mut args = Vec::new();
            if !cursor.eat(")") {
                loop {
                    args.push(parse_expr(cursor, 0)?);
                    if cursor.eat(")") {
                        break;
                    }
                    cursor.expect(",")?;
                }
            }
            base = Expr::Call {
                callee: Box::new(base),
                args,
            };
        } else {
            return Ok(base);
        }
    }
}

/// After `{`: either `{a, b}` or `{n{a, b}}`.
fn parse_concat(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    let first = parse_expr(cursor, 0)?;
    if cursor.eat("{") {
        let mut items = vec![parse_expr(cursor, 0)?];
        while cursor.eat(",") {
            items.push(parse_expr(cursor, 0)?);
        }
        cursor.expect("}")?;
        cursor.expect("}")?;
        return Ok(Expr::Replicate {
            count: Box::new(first),
            items,
        });
    }
    let mut items = vec![first];
    while cursor.eat(",") {
        items.push(parse_expr(cursor, 0)?);
    }
    cursor.expect("}")?;
    Ok(Expr::Concat(items))
}

/// `{ v, [lo:hi], ... }` after `inside`.
pub fn parse_set(cursor: &mut Cursor<'_>) -> Result<Vec<SetItem>, ExprError> {
    cursor.expect("{")?;
    let mut items = Vec::new();
    if cursor.eat("}") {
        return Ok(items);
    }
    loop {
        items.push(parse_set_item(cursor)?);
        if cursor.eat("}") {
            return Ok(items);
        }
        cursor.expect(",")?;
    }
}

/// One value or `[lo:hi]` range, shared by `inside` sets and `dist` lists.
pub fn parse_set_item(cursor: &mut Cursor<'_>) -> Result<SetItem, ExprError> {
    if cursor.eat("[") {
        let lo = parse_expr(cursor, 0)?;
        cursor.expect(":")?;
        let hi = parse_expr(cursor, 0)?;
        cursor.expect("]")?;
        Ok(SetItem::Range(lo, hi))
    } else {
        Ok(SetItem::Value(parse_expr(cursor, 0)?))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SV RENDERING
// ————————————————————————————————————————————————————————————————————————————

impl fmt::Display for SetItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetItem::Value(v) => write!(f, "{v}"),
            SetItem::Range(lo, hi) => write!(f, "[{lo}:{hi}]"),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

struct Prec<'e>(&'e Expr, u8);

impl fmt::Display for Prec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) | Expr::Str(name) | Expr::System(name) => write!(f, "{name}"),
            Expr::Number(lit) => write!(f, "{}", lit.text),
            Expr::Unary { op, operand } => write!(f, "{}{}", op.symbol(), Prec(operand, 14)),
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                let (l, r) = if op.right_assoc() { (p + 1, p) } else { (p, p + 1) };
                write!(f, "{} {} {}", Prec(lhs, l), op.symbol(), Prec(rhs, r))
            }
            Expr::Ternary { cond, then, other } => {
                write!(f, "{} ? {} : {}", Prec(cond, 3), then, Prec(other, 2))
            }
            Expr::Index { base, index } => write!(f, "{}[{index}]", Prec(base, 15)),
            Expr::Slice { base, msb, lsb } => write!(f, "{}[{msb}:{lsb}]", Prec(base, 15)),
            Expr::PartSelect {
                base,
                start,
                width,
                ascending,
            } => {
                let op = if *ascending { "+:" } else { "-:" };
                write!(f, "{}[{start} {op} {width}]", Prec(base, 15))
            }
            Expr::Member { base, name } => write!(f, "{}.{name}", Prec(base, 15)),
            Expr::Call { callee, args } => write!(f, "{callee}({})", join(args)),
            Expr::Inside { operand, set } => {
                write!(f, "{} inside {{{}}}", Prec(operand, 10), join(set))
            }
            Expr::Concat(items) => write!(f, "{{{}}}", join(items)),
            Expr::Replicate { count, items } => write!(f, "{{{count}{{{}}}}}", join(items)),
        }
    }
}
