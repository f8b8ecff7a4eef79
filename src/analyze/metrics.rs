//! Per-block counters shown in verbose docstrings and rolled into statistics.
use indexmap::IndexMap;
use serde::Serialize;

use crate::expr::{BinaryOp, Expr, SetItem, UnaryOp};
use crate::ir::{SolveEdge, Statement, StatementNode};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockMetrics {
    pub lines: usize,
    pub if_branches: u32,
    pub else_if_branches: u32,
    pub else_branches: u32,
    pub logical: IndexMap<String, u32>,    // "&&", "||", "!", "->", "<->"
    pub constructs: IndexMap<String, u32>, // statement tag -> count
    pub bit_slices: u32,
    pub sized_literals: u32,
}

impl BlockMetrics {
    pub fn measure(statements: &[Statement], solve_edges: &[SolveEdge], lines: usize) -> Self {
        let mut metrics = BlockMetrics {
            lines,
            ..Default::default()
        };
        if !solve_edges.is_empty() {
            metrics.constructs.insert("solve".to_string(), solve_edges.len() as u32);
        }
        for edge in solve_edges {
            metrics.expr(&edge.before);
            metrics.expr(&edge.after);
        }
        for statement in statements {
            metrics.statement(statement);
        }
        metrics
    }

    pub fn conditionals(&self) -> u32 {
        self.if_branches + self.else_if_branches + self.else_branches
    }

    pub fn logical_total(&self) -> u32 {
        self.logical.values().sum()
    }

    fn statement(&mut self, statement: &Statement) {
        *self.constructs.entry(statement.node.tag().to_string()).or_insert(0) += 1;
        match &statement.node {
            StatementNode::RangeTest { var, lo, hi } => {
                self.expr(var);
                self.expr(lo);
                self.expr(hi);
            }
            StatementNode::MembershipTest { var, set, .. } => {
                self.expr(var);
                self.set(set);
            }
            StatementNode::Distribution { var, entries } => {
                self.expr(var);
                for entry in entries {
                    self.set(std::slice::from_ref(&entry.item));
                    self.expr(&entry.weight);
                }
            }
            StatementNode::Implication {
                antecedent,
                consequent,
            } => {
                self.expr(antecedent);
                self.statement(consequent);
            }
            StatementNode::Conditional(chain) => {
                for (i, branch) in chain.branches().iter().enumerate() {
                    match (&branch.condition, i) {
                        (Some(cond), 0) => {
                            self.if_branches += 1;
                            self.expr(cond);
                        }
                        (Some(cond), _) => {
                            self.else_if_branches += 1;
                            self.expr(cond);
                        }
                        (None, _) => self.else_branches += 1,
                    }
                    branch.body.iter().for_each(|s| self.statement(s));
                }
            }
            StatementNode::ForeachLoop { array, body, .. } => {
                self.expr(array);
                body.iter().for_each(|s| self.statement(s));
            }
            StatementNode::Uniqueness { targets } => targets.iter().for_each(|t| self.expr(t)),
            StatementNode::SoftMarker(inner) => self.statement(inner),
            StatementNode::RawExpression { expr, .. } => {
                if let Some(expr) = expr {
                    self.expr(expr);
                }
            }
        }
    }

    fn set(&mut self, set: &[SetItem]) {
        for item in set {
            match item {
                SetItem::Value(v) => self.expr(v),
                SetItem::Range(lo, hi) => {
                    self.expr(lo);
                    self.expr(hi);
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        expr.walk(&mut |e| {
            let logical = match e {
                Expr::Binary { op: BinaryOp::LogAnd, .. } => Some("&&"),
                Expr::Binary { op: BinaryOp::LogOr, .. } => Some("||"),
                Expr::Binary { op: BinaryOp::Implies, .. } => Some("->"),
                Expr::Binary { op: BinaryOp::Equiv, .. } => Some("<->"),
                Expr::Unary { op: UnaryOp::Not, .. } => Some("!"),
                Expr::Slice { .. } | Expr::PartSelect { .. } => {
                    self.bit_slices += 1;
                    None
                }
                Expr::Number(lit) if lit.based => {
                    self.sized_literals += 1;
                    None
                }
                _ => None,
            };
            if let Some(op) = logical {
                *self.logical.entry(op.to_string()).or_insert(0) += 1;
            }
        });
    }
}
