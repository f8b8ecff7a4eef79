// Typed model of one input unit. Built once per pass, read-only afterwards.

use indexmap::IndexMap;
use serde::Serialize;

use crate::analyze::metrics::BlockMetrics;
use crate::expr::{Expr, SetItem};
use crate::report::Diagnostic;

// ————————————————————————————————————————————————————————————————————————————
// ENUMS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumLabel {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumDef {
    pub name: String,
    pub width: u32,              // packed base width, 32 when not given
    pub labels: Vec<EnumLabel>,  // declaration order
    pub line: usize,
}

/// Unit-scoped enum lookup. Built after extraction, then only borrowed.
#[derive(Debug, Clone, Default)]
pub struct EnumTable {
    enums: Vec<EnumDef>,
    by_name: IndexMap<String, usize>,
    by_label: IndexMap<String, usize>,
}

impl EnumTable {
    /// A label declared by two enums keeps its first owner.
    pub fn build(enums: Vec<EnumDef>) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let mut by_name = IndexMap::new();
        let mut by_label = IndexMap::new();
        for (index, def) in enums.iter().enumerate() {
            if by_name.insert(def.name.clone(), index).is_some() {
                diagnostics.push(
                    Diagnostic::warning(format!("enum `{}` declared twice; last one wins", def.name))
                        .at_line(def.line),
                );
            }
            for label in &def.labels {
                match by_label.get(&label.name) {
                    Some(&owner) if owner != index => {
                        let owner: &EnumDef = &enums[owner];
                        diagnostics.push(
                            Diagnostic::warning(format!(
                                "enum label `{}` of `{}` also declared by `{}`; references resolve to `{}`",
                                label.name, def.name, owner.name, owner.name
                            ))
                            .at_line(def.line),
                        );
                    }
                    Some(_) => {}
                    None => {
                        by_label.insert(label.name.clone(), index);
                    }
                }
            }
        }
        (Self { enums, by_name, by_label }, diagnostics)
    }
    pub fn get(&self, name: &str) -> Option<&EnumDef> {
        self.by_name.get(name).map(|&i| &self.enums[i])
    }
    pub fn owner_of(&self, label: &str) -> Option<&EnumDef> {
        self.by_label.get(label).map(|&i| &self.enums[i])
    }
    pub fn iter(&self) -> impl Iterator<Item = &EnumDef> {
        self.enums.iter()
    }
    pub fn len(&self) -> usize {
        self.enums.len()
    }
    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FIELDS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeCategory {
    BitVector,
    Integer,
    Enum,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NamedInt {
    Byte,
    ShortInt,
    Int,
    Integer,
    LongInt,
}

impl NamedInt {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "byte" => Self::Byte,
            "shortint" => Self::ShortInt,
            "int" => Self::Int,
            "integer" => Self::Integer,
            "longint" => Self::LongInt,
            _ => return None,
        })
    }
    pub fn width(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::ShortInt => 16,
            Self::Int | Self::Integer => 32,
            Self::LongInt => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RandKind {
    Fixed,
    Random,
    Cyclic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrayShape {
    None,
    Fixed(u32),
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementType {
    BitVector,
    /// named integer type, or `None` for signed vectors and opaque fallbacks
    Integer(Option<NamedInt>),
    Enum(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub element: ElementType,
    pub width: Option<u32>,      // explicit width; None for named integers and enums
    pub signed: bool,
    pub rand: RandKind,
    pub shape: ArrayShape,
    pub declaration: String,     // source text, for verbose output
    pub line: usize,
}

impl FieldDef {
    pub fn category(&self) -> TypeCategory {
        if self.shape != ArrayShape::None {
            return TypeCategory::Array;
        }
        match self.element {
            ElementType::BitVector => TypeCategory::BitVector,
            ElementType::Integer(_) => TypeCategory::Integer,
            ElementType::Enum(_) => TypeCategory::Enum,
        }
    }
    /// Element width in bits (enum widths come from the table).
    pub fn bit_width(&self, enums: &EnumTable) -> u32 {
        match &self.element {
            ElementType::Integer(Some(named)) => self.width.unwrap_or(named.width()),
            ElementType::Enum(name) => enums.get(name).map_or(32, |e| e.width),
            _ => self.width.unwrap_or(1),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STATEMENTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightKind {
    /// `:=` weight applies to each value
    Exact,
    /// `:/` weight is shared across the range
    Proportional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistEntry {
    pub item: SetItem,
    pub weight: Expr,
    pub kind: WeightKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub condition: Option<Expr>, // None = else
    pub body: Vec<Statement>,
    pub line: usize,
}

/// `if / else if / else` chain. An else branch, when present, is last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditional {
    branches: Vec<Branch>,
}

impl Conditional {
    pub fn new(condition: Expr, body: Vec<Statement>, line: usize) -> Self {
        Self {
            branches: vec![Branch {
                condition: Some(condition),
                body,
                line,
            }],
        }
    }
    /// Rejects (returns) any branch that would follow an else.
    pub fn push(&mut self, branch: Branch) -> Result<(), Branch> {
        if self.has_else() {
            return Err(branch);
        }
        self.branches.push(branch);
        Ok(())
    }
    pub fn has_else(&self) -> bool {
        self.branches.last().is_some_and(|b| b.condition.is_none())
    }
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatementNode {
    RangeTest {
        var: Expr,
        lo: Expr,
        hi: Expr,
    },
    MembershipTest {
        var: Expr,
        set: Vec<SetItem>,
        negated: bool,
    },
    Distribution {
        var: Expr,
        entries: Vec<DistEntry>,
    },
    Implication {
        antecedent: Expr,
        consequent: Box<Statement>,
    },
    Conditional(Conditional),
    ForeachLoop {
        array: Expr,
        index: String,
        body: Vec<Statement>,
    },
    Uniqueness {
        targets: Vec<Expr>,
    },
    SoftMarker(Box<Statement>),
    /// `expr` is None when the text could not be parsed at all.
    RawExpression {
        text: String,
        expr: Option<Expr>,
    },
}

impl StatementNode {
    /// Stable tag used for construct metrics.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RangeTest { .. } => "range",
            Self::MembershipTest { .. } => "inside",
            Self::Distribution { .. } => "dist",
            Self::Implication { .. } => "implies",
            Self::Conditional(_) => "if",
            Self::ForeachLoop { .. } => "foreach",
            Self::Uniqueness { .. } => "unique",
            Self::SoftMarker(_) => "soft",
            Self::RawExpression { .. } => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub line: usize,
    pub node: StatementNode,
}

impl Statement {
    pub fn new(line: usize, node: StatementNode) -> Self {
        Self { line, node }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONTAINERS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveEdge {
    pub before: Expr,
    pub after: Expr,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintBlock {
    pub name: String,
    pub container: String,
    pub statements: Vec<Statement>,
    pub solve_edges: Vec<SolveEdge>, // source order, never validated for cycles
    pub metrics: BlockMetrics,
    pub line: usize,
    pub source: String,              // original text incl. comments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseResolution {
    Resolved,
    /// declared later in the same unit
    Forward,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRef {
    pub name: String,
    pub resolution: BaseResolution,
}

/// `pre_randomize` / `post_randomize` body, kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hook {
    pub name: String,
    pub body: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDef {
    pub name: String,
    pub base: Option<BaseRef>,
    pub fields: Vec<FieldDef>,
    pub constraints: Vec<ConstraintBlock>,
    pub hooks: Vec<Hook>,
    pub line: usize,
}

impl ClassDef {
    /// Base that will actually be emitted as a parent.
    pub fn emitted_base(&self) -> Option<&str> {
        self.base
            .as_ref()
            .filter(|b| b.resolution != BaseResolution::Missing)
            .map(|b| b.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str, value: i64) -> EnumLabel {
        EnumLabel {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn else_branch_stays_last() {
        let cond = Expr::Ident("a".to_string());
        let mut chain = Conditional::new(cond.clone(), Vec::new(), 1);
        let else_branch = Branch {
            condition: None,
            body: Vec::new(),
            line: 2,
        };
        assert!(chain.push(else_branch.clone()).is_ok());
        assert!(chain.push(Branch {
            condition: Some(cond),
            body: Vec::new(),
            line: 3
        })
        .is_err());
        assert!(chain.push(else_branch).is_err());
        assert_eq!(chain.branches().len(), 2);
        assert!(chain.has_else());
    }

    #[test]
    fn duplicate_labels_keep_first_owner() {
        let a = EnumDef {
            name: "a_e".to_string(),
            width: 2,
            labels: vec![label("IDLE", 0), label("RUN", 1)],
            line: 1,
        };
        let b = EnumDef {
            name: "b_e".to_string(),
            width: 32,
            labels: vec![label("IDLE", 5)],
            line: 2,
        };
        let (table, diagnostics) = EnumTable::build(vec![a, b]);
        assert_eq!(table.owner_of("IDLE").unwrap().name, "a_e");
        assert_eq!(table.owner_of("RUN").unwrap().name, "a_e");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(table.get("b_e").unwrap().width, 32);
    }

    #[test]
    fn category_follows_shape_then_element() {
        let mut field = FieldDef {
            name: "v".to_string(),
            element: ElementType::Integer(None),
            width: Some(16),
            signed: true,
            rand: RandKind::Random,
            shape: ArrayShape::None,
            declaration: String::new(),
            line: 1,
        };
        assert_eq!(field.category(), TypeCategory::Integer);
        assert_eq!(field.bit_width(&EnumTable::default()), 16);
        field.shape = ArrayShape::Fixed(4);
        assert_eq!(field.category(), TypeCategory::Array);
    }
}
