//! Constraint body analysis: token stream of one block into statement nodes.
//!
//! Recursive descent with keyword dispatch. Every failure is recovered at the
//! statement that caused it: the text is kept as a raw statement and flagged.
pub mod metrics;

use crate::error::ExprError;
use crate::expr::{self, BinaryOp, Expr, SetItem, UnaryOp, ABOVE_IMPLICATION};
use crate::extract::RawConstraint;
use crate::ir::{
    Branch, Conditional, ConstraintBlock, DistEntry, SolveEdge, Statement, StatementNode, WeightKind,
};
use crate::lexer::Cursor;
use crate::report::Diagnostic;

use metrics::BlockMetrics;

// ------------------------------- Front API -------------------------------- //

/// `src` is the normalized unit text the body tokens index into.
pub fn analyze(raw: &RawConstraint, container: &str, src: &str) -> (ConstraintBlock, Vec<Diagnostic>) {
    let mut analyzer = Analyzer {
        cursor: Cursor::new(&raw.body, src),
        edges: Vec::new(),
        diagnostics: Vec::new(),
        depth: 0,
    };
    let mut statements = Vec::new();
    while !analyzer.cursor.at_end() {
        analyzer.statement_into(&mut statements);
    }

    let metrics = BlockMetrics::measure(&statements, &analyzer.edges, raw.excerpt.lines().count());
    let diagnostics = analyzer
        .diagnostics
        .into_iter()
        .map(|d| d.in_constraint(&raw.name).in_container(container))
        .collect();
    let block = ConstraintBlock {
        name: raw.name.clone(),
        container: container.to_string(),
        statements,
        solve_edges: analyzer.edges,
        metrics,
        line: raw.line,
        source: raw.excerpt.clone(),
    };
    (block, diagnostics)
}

// ------------------------------ Implementation ------------------------------ //

struct Analyzer<'a> {
    cursor: Cursor<'a>,
    edges: Vec<SolveEdge>,
    diagnostics: Vec<Diagnostic>,
    depth: usize, // nesting inside if/foreach/implication bodies
}

impl<'a> Analyzer<'a> {
    /// Parse one statement; on failure keep its text as a flagged raw statement.
    fn statement_into(&mut self, out: &mut Vec<Statement>) {
        let start = self.cursor.pos();
        let line = self.cursor.line();
        if let Err(error) = self.statement(out) {
            self.cursor.reset(start);
            self.recover();
            if self.cursor.pos() == start {
                self.cursor.next();
            }
            let text = self.cursor.text_between(start, self.cursor.pos());
            let text = text.trim_end_matches(';').trim_end().to_string();
            self.diagnostics.push(
                Diagnostic::review(format!("statement not understood ({error}); passed through as a comment"))
                    .at_line(error.line().unwrap_or(line)),
            );
            out.push(Statement::new(line, StatementNode::RawExpression { text, expr: None }));
        }
    }

    /// Skip to just past a `;` or a closing brace at depth zero; stop before an
    /// unmatched closer so the enclosing block still sees it.
    fn recover(&mut self) {
        let mut depth = 0i32;
        while let Some(t) = self.cursor.peek() {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 && t.is("}") {
                        self.cursor.next();
                        return;
                    }
                }
                ";" if depth == 0 => {
                    self.cursor.next();
                    return;
                }
                _ => {}
            }
            self.cursor.next();
        }
    }

    fn statement(&mut self, out: &mut Vec<Statement>) -> Result<(), ExprError> {
        let Some(token) = self.cursor.peek() else {
            return Ok(());
        };
        let line = token.line;
        match token.text.as_str() {
            ";" => {
                self.cursor.next();
            }
            "solve" => self.solve()?,
            "if" => {
                let chain = self.conditional()?;
                out.push(Statement::new(line, StatementNode::Conditional(chain)));
            }
            "foreach" => {
                let node = self.foreach()?;
                out.push(Statement::new(line, node));
            }
            "unique" => {
                let node = self.unique()?;
                out.push(Statement::new(line, node));
            }
            "soft" => {
                self.cursor.next();
                let mut inner = Vec::new();
                self.expression_statement(&mut inner)?;
                out.extend(
                    inner
                        .into_iter()
                        .map(|s| Statement::new(line, StatementNode::SoftMarker(Box::new(s)))),
                );
            }
            "disable" => {
                let start = self.cursor.pos();
                self.cursor.skip_statement();
                let text = self.cursor.text_between(start, self.cursor.pos());
                self.diagnostics.push(
                    Diagnostic::review(format!("`{}` has no target equivalent", text.trim_end_matches(';')))
                        .at_line(line),
                );
                out.push(Statement::new(
                    line,
                    StatementNode::RawExpression {
                        text: text.trim_end_matches(';').to_string(),
                        expr: None,
                    },
                ));
            }
            "{" => {
                self.cursor.next();
                out.extend(self.block_body("}")?);
            }
            "begin" => {
                self.cursor.next();
                out.extend(self.block_body("end")?);
            }
            _ => self.expression_statement(out)?,
        }
        Ok(())
    }

    fn block_body(&mut self, closer: &str) -> Result<Vec<Statement>, ExprError> {
        let mut body = Vec::new();
        loop {
            if self.cursor.eat(closer) {
                return Ok(body);
            }
            if self.cursor.at_end() {
                return Err(ExprError::UnexpectedEnd {
                    expected: format!("`{closer}`"),
                });
            }
            self.statement_into(&mut body);
        }
    }

    /// Body of a branch, loop, or implication: one statement or a block.
    fn nested_body(&mut self) -> Result<Vec<Statement>, ExprError> {
        self.depth += 1;
        let mut body = Vec::new();
        let result = self.statement(&mut body);
        self.depth -= 1;
        result.map(|_| body)
    }

    fn solve(&mut self) -> Result<(), ExprError> {
        let line = self.cursor.expect("solve")?.line;
        let before = self.expr_list("before")?;
        let after = self.expr_list(";")?;
        if self.depth > 0 {
            self.diagnostics.push(
                Diagnostic::warning("solve-before inside a nested construct hoisted to block level")
                    .at_line(line),
            );
        }
        for b in &before {
            for a in &after {
                self.edges.push(SolveEdge {
                    before: b.clone(),
                    after: a.clone(),
                    line,
                });
            }
        }
        Ok(())
    }

    /// Comma-separated expressions up to and including `terminator`.
    fn expr_list(&mut self, terminator: &str) -> Result<Vec<Expr>, ExprError> {
        let mut items = vec![expr::parse(&mut self.cursor)?];
        while self.cursor.eat(",") {
            items.push(expr::parse(&mut self.cursor)?);
        }
        self.cursor.expect(terminator)?;
        Ok(items)
    }

    fn conditional(&mut self) -> Result<Conditional, ExprError> {
        let line = self.cursor.expect("if")?.line;
        let condition = self.parenthesized()?;
        let body = self.nested_body()?;
        let mut chain = Conditional::new(condition, body, line);

        while self.cursor.peek_is("else") {
            let else_line = self.cursor.line();
            self.cursor.next();
            let branch = if self.cursor.eat("if") {
                let condition = self.parenthesized()?;
                Branch {
                    condition: Some(condition),
                    body: self.nested_body()?,
                    line: else_line,
                }
            } else {
                Branch {
                    condition: None,
                    body: self.nested_body()?,
                    line: else_line,
                }
            };
            if let Err(dropped) = chain.push(branch) {
                let kind = if dropped.condition.is_some() { "else-if" } else { "else" };
                self.diagnostics.push(
                    Diagnostic::review(format!("unreachable {kind} branch after a final else dropped"))
                        .at_line(dropped.line),
                );
            }
        }
        Ok(chain)
    }

    fn parenthesized(&mut self) -> Result<Expr, ExprError> {
        self.cursor.expect("(")?;
        let inner = expr::parse(&mut self.cursor)?;
        self.cursor.expect(")")?;
        Ok(inner)
    }

    fn foreach(&mut self) -> Result<StatementNode, ExprError> {
        let line = self.cursor.expect("foreach")?.line;
        let header = self.parenthesized()?;
        let Expr::Index { base, index } = header else {
            return Err(ExprError::Expected {
                expected: "`array[index]` in foreach".to_string(),
                found: header.to_string(),
                line,
            });
        };
        let Expr::Ident(index) = *index else {
            return Err(ExprError::Expected {
                expected: "a single loop index".to_string(),
                found: index.to_string(),
                line,
            });
        };
        let body = self.nested_body()?;
        Ok(StatementNode::ForeachLoop {
            array: *base,
            index,
            body,
        })
    }

    fn unique(&mut self) -> Result<StatementNode, ExprError> {
        self.cursor.expect("unique")?;
        self.cursor.expect("{")?;
        let targets = self.expr_list("}")?;
        self.cursor.eat(";");
        Ok(StatementNode::Uniqueness { targets })
    }

    fn expression_statement(&mut self, out: &mut Vec<Statement>) -> Result<(), ExprError> {
        let line = self.cursor.line();
        let lhs = expr::parse_expr(&mut self.cursor, ABOVE_IMPLICATION)?;

        if self.cursor.eat("dist") {
            let entries = self.dist_list()?;
            self.cursor.expect(";")?;
            out.push(Statement::new(line, StatementNode::Distribution { var: lhs, entries }));
        } else if self.cursor.eat("->") {
            let consequents = self.nested_body()?;
            if consequents.is_empty() {
                self.diagnostics.push(
                    Diagnostic::review(format!("implication `{lhs} -> {{ }}` has an empty body; nothing emitted"))
                        .at_line(line),
                );
            } else if consequents.len() > 1 {
                self.diagnostics.push(
                    Diagnostic::warning(format!(
                        "implication with {} consequent statements split into one implication each",
                        consequents.len()
                    ))
                    .at_line(line),
                );
            }
            for consequent in consequents {
                out.push(Statement::new(
                    line,
                    StatementNode::Implication {
                        antecedent: lhs.clone(),
                        consequent: Box::new(consequent),
                    },
                ));
            }
        } else if self.cursor.eat("<->") {
            let rhs = expr::parse_expr(&mut self.cursor, ABOVE_IMPLICATION)?;
            self.cursor.expect(";")?;
            self.diagnostics.push(
                Diagnostic::warning("bidirectional implication emitted as two implications")
                    .at_line(line),
            );
            let forward = classify_expr(rhs.clone(), line, &mut self.diagnostics);
            let backward = classify_expr(lhs.clone(), line, &mut self.diagnostics);
            out.push(Statement::new(
                line,
                StatementNode::Implication {
                    antecedent: lhs,
                    consequent: Box::new(forward),
                },
            ));
            out.push(Statement::new(
                line,
                StatementNode::Implication {
                    antecedent: rhs,
                    consequent: Box::new(backward),
                },
            ));
        } else {
            self.cursor.expect(";")?;
            out.push(classify_expr(lhs, line, &mut self.diagnostics));
        }
        Ok(())
    }

    fn dist_list(&mut self) -> Result<Vec<DistEntry>, ExprError> {
        self.cursor.expect("{")?;
        let mut entries = Vec::new();
        loop {
            let item = expr::parse_set_item(&mut self.cursor)?;
            let (kind, weight) = if self.cursor.eat(":=") {
                (WeightKind::Exact, expr::parse(&mut self.cursor)?)
            } else if self.cursor.eat(":/") {
                (WeightKind::Proportional, expr::parse(&mut self.cursor)?)
            } else {
                (WeightKind::Exact, Expr::Number(expr::Literal::parse("1")))
            };
            entries.push(DistEntry { item, weight, kind });
            if self.cursor.eat("}") {
                return Ok(entries);
            }
            self.cursor.expect(",")?;
        }
    }
}

// ------------------------------ Classification ------------------------------ //

/// Range conjunction, then membership, then raw.
fn classify_expr(expr: Expr, line: usize, diagnostics: &mut Vec<Diagnostic>) -> Statement {
    if let Some(node) = range_conjunction(&expr, line, diagnostics) {
        return Statement::new(line, node);
    }
    let node = match expr {
        Expr::Inside { operand, set } => StatementNode::MembershipTest {
            var: *operand,
            set,
            negated: false,
        },
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } if matches!(*operand, Expr::Inside { .. }) => match *operand {
            Expr::Inside { operand, set } => StatementNode::MembershipTest {
                var: *operand,
                set,
                negated: true,
            },
            other => raw(Expr::unary(UnaryOp::Not, other)),
        },
        other => raw(other),
    };
    Statement::new(line, node)
}

fn raw(expr: Expr) -> StatementNode {
    StatementNode::RawExpression {
        text: expr.to_string(),
        expr: Some(expr),
    }
}

/// `v >= lo && v <= hi` (either order, either side literal) with literal bounds.
fn range_conjunction(expr: &Expr, line: usize, diagnostics: &mut Vec<Diagnostic>) -> Option<StatementNode> {
    let Expr::Binary {
        op: BinaryOp::LogAnd | BinaryOp::BitAnd,
        lhs,
        rhs,
    } = expr
    else {
        return None;
    };
    let (var_a, op_a, bound_a) = oriented_comparison(lhs)?;
    let (var_b, op_b, bound_b) = oriented_comparison(rhs)?;
    if var_a != var_b {
        return None;
    }
    let (lo, hi) = match (op_a, op_b) {
        (BinaryOp::Ge, BinaryOp::Le) => (bound_a, bound_b),
        (BinaryOp::Le, BinaryOp::Ge) => (bound_b, bound_a),
        _ => return None,
    };
    let (lo_value, hi_value) = (lo.literal_value()?, hi.literal_value()?);
    if lo_value > hi_value {
        diagnostics.push(
            Diagnostic::ambiguity(format!(
                "range `{expr}` has lower bound above upper bound; kept as written"
            ))
            .at_line(line),
        );
        return None;
    }
    Some(StatementNode::RangeTest {
        var: var_a.clone(),
        lo: lo.clone(),
        hi: hi.clone(),
    })
}

/// A comparison with a literal on one side, rewritten so the variable leads.
fn oriented_comparison(expr: &Expr) -> Option<(&Expr, BinaryOp, &Expr)> {
    let Expr::Binary { op, lhs, rhs } = expr else {
        return None;
    };
    if !op.is_relational() {
        return None;
    }
    match (lhs.is_literal(), rhs.is_literal()) {
        (false, true) => Some((lhs, *op, rhs)),
        (true, false) => Some((rhs, op.mirror()?, lhs)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::report::DiagnosticKind;

    fn run(body: &str) -> (ConstraintBlock, Vec<Diagnostic>) {
        let tokens = tokenize(body);
        let raw = RawConstraint {
            name: "c".to_string(),
            body: tokens,
            line: 1,
            excerpt: format!("constraint c {{{body}}}"),
        };
        analyze(&raw, "pkt", body)
    }

    fn tags(statements: &[Statement]) -> Vec<&'static str> {
        statements.iter().map(|s| s.node.tag()).collect()
    }

    #[test]
    fn range_conjunction_collapses_in_any_orientation() {
        let (block, _) = run("x >= 2 && x <= 9; 10 >= y && y >= 1;");
        assert_eq!(tags(&block.statements), ["range", "range"]);
        let StatementNode::RangeTest { var, lo, hi } = &block.statements[1].node else { panic!() };
        assert_eq!(var.as_ident(), Some("y"));
        assert_eq!(lo.literal_value(), Some(1));
        assert_eq!(hi.literal_value(), Some(10));
    }

    #[test]
    fn empty_implication_body_is_flagged() {
        let (block, diagnostics) = run("a == 1 -> { } b < 4;");
        assert_eq!(tags(&block.statements), ["raw"]);
        let flagged: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ManualReview)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].message.contains("empty body"), "{}", flagged[0].message);
    }

    #[test]
    fn inverted_range_is_never_swapped() {
        let (block, diagnostics) = run("x >= 9 && x <= 2;");
        assert_eq!(tags(&block.statements), ["raw"]);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Ambiguity);
        for s in &block.statements {
            if let StatementNode::RangeTest { lo, hi, .. } = &s.node {
                assert!(lo.literal_value() <= hi.literal_value());
            }
        }
    }

    #[test]
    fn mixed_or_non_literal_ranges_stay_raw() {
        let (block, diagnostics) = run("x >= lo && x <= 9; x >= 1 && y <= 2; x > 1 && x < 4;");
        assert_eq!(tags(&block.statements), ["raw", "raw", "raw"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn membership_with_negation() {
        let (block, _) = run("x inside {[0:127]}; !(y inside {1, 2});");
        let StatementNode::MembershipTest { negated, set, .. } = &block.statements[0].node else { panic!() };
        assert!(!negated);
        assert!(matches!(set[0], SetItem::Range(..)));
        let StatementNode::MembershipTest { negated, .. } = &block.statements[1].node else { panic!() };
        assert!(negated);
    }

    #[test]
    fn distribution_records_weight_kinds() {
        let (block, _) = run("len dist { [0:3] := 60, [4:15] :/ 40, 16 };");
        let StatementNode::Distribution { var, entries } = &block.statements[0].node else { panic!() };
        assert_eq!(var.as_ident(), Some("len"));
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [WeightKind::Exact, WeightKind::Proportional, WeightKind::Exact]);
        assert_eq!(entries[0].weight.literal_value(), Some(60));
        assert_eq!(entries[2].weight.literal_value(), Some(1));
    }

    #[test]
    fn solve_edges_keep_source_order_and_cross_product() {
        let (block, _) = run("x < 3; solve a, b before c; y > 1; solve d before e;");
        let pairs: Vec<_> = block
            .solve_edges
            .iter()
            .map(|e| (e.before.to_string(), e.after.to_string()))
            .collect();
        assert_eq!(pairs, [("a", "c"), ("b", "c"), ("d", "e")].map(|(a, b)| (a.to_string(), b.to_string())));
        assert_eq!(tags(&block.statements), ["raw", "raw"]);
    }

    #[test]
    fn conditional_chain_keeps_else_last_and_drops_extra_else() {
        let (block, diagnostics) =
            run("if (m == 0) { x < 2; } else if (m == 1) x < 4; else { x < 8; } else { x < 16; }");
        let StatementNode::Conditional(chain) = &block.statements[0].node else { panic!() };
        let branches = chain.branches();
        assert_eq!(branches.len(), 3);
        assert!(branches[2].condition.is_none());
        assert!(branches[..2].iter().all(|b| b.condition.is_some()));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ManualReview);
        assert_eq!(block.metrics.conditionals(), 3);
    }

    #[test]
    fn implication_with_block_splits_and_warns() {
        let (block, diagnostics) = run("mode == 1 -> { len < 4; len > 0; }");
        assert_eq!(tags(&block.statements), ["implies", "implies"]);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Warning);
        let (block, _) = run("a <-> b;");
        assert_eq!(tags(&block.statements), ["implies", "implies"]);
    }

    #[test]
    fn foreach_unique_soft_and_flattening() {
        let (block, _) = run(
            "foreach (arr[i]) { arr[i] < 10; } unique { a, b }; soft len == 4; begin x < 1; { y < 2; } end",
        );
        assert_eq!(tags(&block.statements), ["foreach", "unique", "soft", "raw", "raw"]);
        let StatementNode::ForeachLoop { index, array, .. } = &block.statements[0].node else { panic!() };
        assert_eq!(index, "i");
        assert_eq!(array.as_ident(), Some("arr"));
    }

    #[test]
    fn broken_statements_recover_locally() {
        let (block, diagnostics) = run("x < ; if (a) { y == ; z > 1; } w == 2;");
        assert_eq!(tags(&block.statements), ["raw", "if", "raw"]);
        assert_eq!(diagnostics.len(), 2);
        let StatementNode::Conditional(chain) = &block.statements[1].node else { panic!() };
        assert_eq!(chain.branches()[0].body.len(), 2);
        let StatementNode::RawExpression { text, expr } = &block.statements[0].node else { panic!() };
        assert_eq!(text, "x <");
        assert!(expr.is_none());
    }

    #[test]
    fn multi_index_foreach_is_flagged() {
        let (block, diagnostics) = run("foreach (m[i, j]) { m[i][j] < 3; } x < 1;");
        assert_eq!(tags(&block.statements), ["raw", "raw"]);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ManualReview);
    }

    #[test]
    fn nested_solve_is_hoisted() {
        let (block, diagnostics) = run("if (a) { solve x before y; x < 2; }");
        assert_eq!(block.solve_edges.len(), 1);
        assert!(diagnostics.iter().any(|d| d.message.contains("hoisted")));
    }
}
