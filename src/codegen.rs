//! PyVSC emission: one `@vsc.randobj` class per container, enums as `IntEnum`,
//! plus the unit header and a usage scaffold.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::TranslatorConfig;
use crate::ir::{
    ArrayShape, ClassDef, ConstraintBlock, ElementType, EnumDef, EnumTable, FieldDef, Hook, RandKind,
    Statement, StatementNode, TypeCategory, WeightKind,
};
use crate::lexer::collapse_ws;
use crate::report::{Diagnostic, Statistics, bump};
use crate::translate::{Translator, Unsupported, escape_name, type_name};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Emitted text of one container plus what the emitter had to say about it.
#[derive(Debug, Clone, Default)]
pub struct ClassOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    pub emitted: Statistics, // `emitted.<construct>` counters
}

pub struct Codegen<'c> {
    class: &'c ClassDef,
    enums: &'c EnumTable,
    config: &'c TranslatorConfig,
    tr: Translator<'c>,
    out: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    emitted: Statistics,
}

const REVIEW_PREFIX: &str = "# MANUAL REVIEW: ";

// ————————————————————————————————————————————————————————————————————————————
// CONTAINER EMISSION
// ————————————————————————————————————————————————————————————————————————————

impl<'c> Codegen<'c> {
    pub fn new(class: &'c ClassDef, enums: &'c EnumTable, config: &'c TranslatorConfig) -> Self {
        let has_base = class.emitted_base().is_some();
        Self {
            class,
            enums,
            config,
            tr: Translator::new(&class.fields, enums, has_base, &config.reserved_suffix),
            out: Vec::new(),
            diagnostics: Vec::new(),
            emitted: Statistics::new(),
        }
    }

    // ------------------------------- Front API -------------------------------- //

    pub fn emit(&mut self) {
        let class = self.class;
        self.class_header();
        self.init(&class.fields);
        for block in &class.constraints {
            self.constraint(block);
        }
        for hook in &class.hooks {
            self.hook(hook);
        }
    }

    pub fn into_output(mut self) -> ClassOutput {
        self.flush_translator(None);
        let container = self.class.name.clone();
        ClassOutput {
            text: self.out.join("\n"),
            diagnostics: self
                .diagnostics
                .into_iter()
                .map(|d| d.in_container(&container))
                .collect(),
            emitted: self.emitted,
        }
    }

    // ------------------------------ Implementation ------------------------------ //

    fn indented(&self, level: usize, text: &str) -> String {
        format!("{}{text}", self.config.indent.repeat(level))
    }

    fn push(&mut self, level: usize, text: &str) {
        let line = self.indented(level, text);
        self.out.push(line);
    }

    fn count(&mut self, construct: &str) {
        bump(&mut self.emitted, &format!("emitted.{construct}"), 1);
    }

    fn name(&self, name: &str) -> String {
        escape_name(name, &self.config.reserved_suffix)
    }

    fn flush_translator(&mut self, constraint: Option<&str>) {
        let drained = std::mem::take(&mut self.tr.diagnostics);
        self.diagnostics.extend(drained.into_iter().map(|d| match constraint {
            Some(name) => d.in_constraint(name),
            None => d,
        }));
    }

    fn class_header(&mut self) {
        let class = self.class;
        let suffix = &self.config.reserved_suffix;
        self.push(0, "@vsc.randobj");
        let head = match class.emitted_base() {
            Some(base) => format!("class {}({}):", type_name(&class.name, suffix), type_name(base, suffix)),
            None => format!("class {}:", type_name(&class.name, suffix)),
        };
        self.push(0, &head);
        self.push(1, &format!("\"\"\"Translated from SV class: {}\"\"\"", class.name));
    }

    fn init(&mut self, fields: &[FieldDef]) {
        self.out.push(String::new());
        self.push(1, "def __init__(self):");
        let has_base = self.class.emitted_base().is_some();
        if has_base {
            self.push(2, "super().__init__()");
        }
        for field in fields {
            let ty = field_type(field, self.enums, &self.config.reserved_suffix);
            let mut line = format!("self.{} = {ty}", self.name(&field.name));
            if self.config.verbose && !field.declaration.is_empty() {
                line.push_str(&format!("  # {}", collapse_ws(&field.declaration)));
            }
            self.push(2, &line);
            self.count("fields");
        }
        if fields.is_empty() && !has_base {
            self.push(2, "pass");
        }
    }

    fn constraint(&mut self, block: &ConstraintBlock) {
        let first_diagnostic = self.diagnostics.len();
        self.out.push(String::new());
        self.push(1, "@vsc.constraint");
        self.push(1, &format!("def {}(self):", self.name(&block.name)));
        if self.config.verbose {
            for line in verbose_docstring(block) {
                self.push(2, &line);
            }
        }
        self.count("constraints");

        let mut body = Vec::new();
        for edge in &block.solve_edges {
            self.tr.at_line(edge.line);
            match (self.tr.value(&edge.before), self.tr.value(&edge.after)) {
                (Ok(before), Ok(after)) => {
                    body.push(self.indented(2, &format!("vsc.solve_order({}, {})", before.text, after.text)));
                    self.count("solve_order");
                }
                (Err(reason), _) | (_, Err(reason)) => {
                    let sv = format!("solve {} before {};", edge.before, edge.after);
                    self.review_comment(edge.line, 2, &sv, Some(reason), &mut body);
                }
            }
        }
        self.block(&block.statements, 2, &mut body);
        self.out.extend(body);

        if block.statements.is_empty() && block.solve_edges.is_empty() {
            self.diagnostics.push(
                Diagnostic::review("empty constraint block emitted as `pass`")
                    .at_line(block.line)
                    .in_constraint(&block.name),
            );
        }
        for d in &mut self.diagnostics[first_diagnostic..] {
            d.constraint.get_or_insert_with(|| block.name.clone());
        }
        self.flush_translator(Some(&block.name));
    }

    fn hook(&mut self, hook: &Hook) {
        let doc = if hook.name == "pre_randomize" {
            "Called before randomization"
        } else {
            "Called after successful randomization"
        };
        self.out.push(String::new());
        self.push(1, &format!("def {}(self):", hook.name));
        self.push(2, &format!("\"\"\"{doc}\"\"\""));
        let lines: Vec<&str> = hook.body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if !lines.is_empty() {
            self.push(2, "# Original SV:");
            for line in lines {
                self.push(2, &format!("#   {line}"));
            }
        }
        self.push(2, "pass");
        self.count("hooks");
        self.diagnostics.push(
            Diagnostic::review(format!("`{}` body needs manual translation", hook.name)).at_line(hook.line),
        );
    }

    // ---------------------------- Statements ---------------------------- //

    /// Statements at `level`; a body with no executable line gets `pass`.
    fn block(&mut self, statements: &[Statement], level: usize, out: &mut Vec<String>) {
        let start = out.len();
        let groups = if self.config.group_adjacent_ranges {
            range_groups(statements)
        } else {
            Vec::new()
        };
        for (i, statement) in statements.iter().enumerate() {
            if let Some(names) = groups.iter().find(|(first, _)| *first == i).map(|(_, names)| names) {
                out.push(self.indented(level, &format!("# range checks: {}", names.join(", "))));
                self.diagnostics.push(
                    Diagnostic::ambiguity(format!(
                        "adjacent range/membership tests on {} grouped together",
                        names.join(", ")
                    ))
                    .at_line(statement.line),
                );
                self.count("grouped_ranges");
            }
            self.statement(statement, level, out);
        }
        if !out[start..].iter().any(|l| !l.trim_start().starts_with('#')) {
            out.push(self.indented(level, "pass"));
        }
    }

    fn statement(&mut self, statement: &Statement, level: usize, out: &mut Vec<String>) {
        self.tr.at_line(statement.line);
        if let StatementNode::RawExpression { text, expr: None } = &statement.node {
            // the analyzer already flagged it
            self.review_comment(statement.line, level, text, None, out);
            return;
        }
        let mut lines = Vec::new();
        match self.try_statement(statement, level, &mut lines) {
            Ok(()) => out.extend(lines),
            Err(reason) => self.review_comment(statement.line, level, &sv_text(&statement.node), Some(reason), out),
        }
    }

    fn review_comment(
        &mut self,
        line: usize,
        level: usize,
        sv: &str,
        reason: Option<Unsupported>,
        out: &mut Vec<String>,
    ) {
        out.push(self.indented(level, &format!("{REVIEW_PREFIX}{}", collapse_ws(sv))));
        self.count("review_comments");
        if let Some(Unsupported(reason)) = reason {
            self.diagnostics
                .push(Diagnostic::review(format!("{reason} has no PyVSC form; statement left as a comment")).at_line(line));
        }
    }

    /// Header expressions are translated before anything is written, so a failure
    /// leaves `out` untouched.
    fn try_statement(&mut self, statement: &Statement, level: usize, out: &mut Vec<String>) -> Result<(), Unsupported> {
        match &statement.node {
            StatementNode::RangeTest { var, lo, hi } => {
                let var = self.tr.value(var)?;
                let lo = self.tr.value(lo)?;
                let hi = self.tr.value(hi)?;
                out.push(self.indented(
                    level,
                    &format!(
                        "{} in vsc.rangelist(vsc.rng({}, {}))",
                        var.as_membership_subject(),
                        lo.text,
                        hi.text
                    ),
                ));
                self.count("range");
            }
            StatementNode::MembershipTest { var, set, negated } => {
                let var = self.tr.value(var)?;
                let list = self.tr.rangelist(set)?;
                let text = if *negated {
                    format!("{}.not_inside({list})", var.as_operand())
                } else {
                    format!("{} in {list}", var.as_membership_subject())
                };
                out.push(self.indented(level, &text));
                self.count("inside");
            }
            StatementNode::Distribution { var, entries } => {
                let subject = self.tr.value(var)?;
                let mut weights = Vec::with_capacity(entries.len());
                for entry in entries {
                    weights.push((self.tr.set_item(&entry.item)?, self.tr.value(&entry.weight)?.text));
                }
                for entry in entries {
                    if entry.kind == WeightKind::Exact && matches!(entry.item, crate::expr::SetItem::Range(..)) {
                        self.diagnostics.push(
                            Diagnostic::ambiguity(format!(
                                "`{} := {}` weights each value in SV; vsc.weight applies it to the range as a whole",
                                entry.item, entry.weight
                            ))
                            .at_line(statement.line),
                        );
                    }
                }
                out.push(self.indented(level, &format!("vsc.dist({}, [", subject.text)));
                for (item, weight) in weights {
                    out.push(self.indented(level + 1, &format!("vsc.weight({item}, {weight}),")));
                }
                out.push(self.indented(level, "])"));
                self.count("dist");
            }
            StatementNode::Implication { antecedent, consequent } => {
                let cond = self.tr.condition(antecedent)?;
                out.push(self.indented(level, &format!("with vsc.implies({}):", cond.text)));
                self.count("implies");
                self.block(std::slice::from_ref(&**consequent), level + 1, out);
            }
            StatementNode::Conditional(chain) => {
                let mut heads = Vec::with_capacity(chain.branches().len());
                for (i, branch) in chain.branches().iter().enumerate() {
                    self.tr.at_line(branch.line);
                    let head = match (&branch.condition, i) {
                        (Some(cond), 0) => ("if_then", format!("with vsc.if_then({}):", self.tr.condition(cond)?.text)),
                        (Some(cond), _) => ("else_if", format!("with vsc.else_if({}):", self.tr.condition(cond)?.text)),
                        (None, _) => ("else_then", "with vsc.else_then:".to_string()),
                    };
                    heads.push(head);
                }
                for (branch, (construct, head)) in chain.branches().iter().zip(heads) {
                    out.push(self.indented(level, &head));
                    self.count(construct);
                    self.block(&branch.body, level + 1, out);
                }
            }
            StatementNode::ForeachLoop { array, index, body } => {
                let array = self.tr.value(array)?;
                let idx = self.tr.local_name(index);
                out.push(self.indented(level, &format!("with vsc.foreach({}, idx=True) as {idx}:", array.text)));
                self.count("foreach");
                self.tr.push_local(index);
                self.block(body, level + 1, out);
                self.tr.pop_local();
            }
            StatementNode::Uniqueness { targets } => {
                let targets = targets
                    .iter()
                    .map(|t| self.tr.value(t).map(|py| py.text))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(self.indented(level, &format!("vsc.unique({})", targets.join(", "))));
                self.count("unique");
            }
            StatementNode::SoftMarker(inner) => {
                let wrapped = match &inner.node {
                    StatementNode::RawExpression { expr: Some(expr), .. } => Some(self.tr.condition(expr)?.text),
                    StatementNode::MembershipTest { var, set, negated } => {
                        let var = self.tr.value(var)?;
                        let list = self.tr.rangelist(set)?;
                        let method = if *negated { "not_inside" } else { "inside" };
                        Some(format!("{}.{method}({list})", var.as_operand()))
                    }
                    StatementNode::RangeTest { var, lo, hi } => {
                        let var = self.tr.value(var)?;
                        let lo = self.tr.value(lo)?;
                        let hi = self.tr.value(hi)?;
                        Some(format!("{}.inside(vsc.rangelist(vsc.rng({}, {})))", var.as_operand(), lo.text, hi.text))
                    }
                    _ => None,
                };
                match wrapped {
                    Some(text) => {
                        out.push(self.indented(level, &format!("vsc.soft({text})")));
                        self.count("soft");
                    }
                    None => {
                        self.diagnostics.push(
                            Diagnostic::warning(format!(
                                "soft marker dropped: PyVSC cannot soften a `{}` statement",
                                inner.node.tag()
                            ))
                            .at_line(statement.line),
                        );
                        self.statement(inner, level, out);
                    }
                }
            }
            StatementNode::RawExpression { expr: Some(expr), .. } => {
                let cond = self.tr.condition(expr)?;
                out.push(self.indented(level, &cond.text));
                self.count("expr");
            }
            StatementNode::RawExpression { text, expr: None } => {
                return Err(Unsupported(format!("unparsed statement `{text}`")));
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// UNIT EMISSION
// ————————————————————————————————————————————————————————————————————————————

pub fn file_header(unit: &str) -> String {
    format!(
        r#"#!/usr/bin/env python3
"""
PyVSC translation of {unit}, generated by sv2pyvsc.

This is a suggested translation and requires manual review. Please verify:
  1. Constraint semantics are preserved
  2. Data type mappings are correct
  3. Distribution weights match the original intent
  4. Solve order effects are equivalent
"""

import vsc
from enum import IntEnum"#
    )
}

pub fn enum_class(def: &EnumDef, suffix: &str) -> String {
    let mut lines = vec![
        format!("class {}(IntEnum):", type_name(&def.name, suffix)),
        format!("    \"\"\"Translated from SV enum: {}\"\"\"", def.name),
    ];
    for label in &def.labels {
        lines.push(format!("    {} = {}", escape_name(&label.name, suffix), label.value));
    }
    if def.labels.is_empty() {
        lines.push("    pass".to_string());
    }
    lines.join("\n")
}

/// `if __name__ == '__main__':` block instantiating and randomizing each container.
pub fn usage_scaffold(classes: &[ClassDef], config: &TranslatorConfig) -> String {
    let suffix = &config.reserved_suffix;
    let ind = |n: usize| config.indent.repeat(n);
    let mut lines = vec![
        format!("# {}", "=".repeat(77)),
        "# USAGE EXAMPLE".to_string(),
        format!("# {}", "=".repeat(77)),
        String::new(),
        "if __name__ == '__main__':".to_string(),
        format!("{}# vsc.set_randstate(12345)", ind(1)),
    ];
    for class in classes {
        let ty = type_name(&class.name, suffix);
        let mut var = escape_name(&class.name.to_lowercase(), suffix);
        if var == "vsc" || var == ty {
            var.push_str("_obj");
        }
        lines.push(String::new());
        lines.push(format!("{}{var} = {ty}()", ind(1)));
        lines.push(format!("{}try:", ind(1)));
        lines.push(format!("{}{var}.randomize()", ind(2)));
        lines.push(format!("{}print('{ty} randomized:')", ind(2)));
        for field in class.fields.iter().take(config.scaffold_field_limit) {
            let name = escape_name(&field.name, suffix);
            lines.push(format!("{}print(f'  {name} = {{{var}.{name}}}')", ind(2)));
        }
        let rest = class.fields.len().saturating_sub(config.scaffold_field_limit);
        if rest > 0 {
            lines.push(format!("{}print('  ... {rest} more field(s)')", ind(2)));
        }
        lines.push(format!("{}except Exception as e:", ind(1)));
        lines.push(format!("{}print(f'{ty} randomization failed: {{e}}')", ind(2)));
    }
    if classes.is_empty() {
        lines.push(format!("{}pass", ind(1)));
    }
    lines.join("\n")
}

/// Full unit text: header, enums, containers (already in emission order), scaffold.
pub fn assemble_unit(
    unit: &str,
    enums: &EnumTable,
    classes: &[ClassDef],
    bodies: &[String],
    config: &TranslatorConfig,
) -> String {
    let mut sections = vec![file_header(unit)];
    sections.extend(enums.iter().map(|def| enum_class(def, &config.reserved_suffix)));
    sections.extend(bodies.iter().cloned());
    if config.usage_scaffold {
        sections.push(usage_scaffold(classes, config));
    }
    let mut text = sections.join("\n\n\n");
    text.push('\n');
    text
}

// ————————————————————————————————————————————————————————————————————————————
// POST-EMISSION CHECKS
// ————————————————————————————————————————————————————————————————————————————

static LEAKS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("inside {", Regex::new(r"\binside\s*\{").unwrap()),
        ("dist {", Regex::new(r"\bdist\s*\{").unwrap()),
        ("sized literal", Regex::new(r"\d+'[sS]?[hHbBdDoO][0-9a-fA-F_xXzZ?]").unwrap()),
        ("&&", Regex::new(r"&&").unwrap()),
        ("||", Regex::new(r"\|\|").unwrap()),
    ]
});

/// Every field is initialized and every constraint has its routine.
pub fn check_class(class: &ClassDef, text: &str, suffix: &str) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    for field in &class.fields {
        let needle = format!("self.{} = ", escape_name(&field.name, suffix));
        if !text.contains(&needle) {
            found.push(Diagnostic::warning(format!("field `{}` missing from __init__", field.name)).at_line(field.line));
        }
    }
    for block in &class.constraints {
        let needle = format!("def {}(self):", escape_name(&block.name, suffix));
        if !text.contains(&needle) {
            found.push(
                Diagnostic::warning(format!("constraint `{}` has no emitted routine", block.name)).at_line(block.line),
            );
        }
    }
    found.into_iter().map(|d| d.in_container(&class.name)).collect()
}

/// SV syntax left in executable lines. Docstrings and comments are skipped.
pub fn check_leaks(text: &str) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    let mut in_docstring = false;
    for (i, line) in text.lines().enumerate() {
        let quotes = line.matches("\"\"\"").count();
        let skip = in_docstring || quotes > 0;
        if quotes % 2 == 1 {
            in_docstring = !in_docstring;
        }
        if skip {
            continue;
        }
        let code = line.split('#').next().unwrap_or_default();
        for (what, pattern) in LEAKS.iter() {
            if pattern.is_match(code) {
                found.push(Diagnostic::warning(format!(
                    "SV syntax `{what}` left in output line {}: {}",
                    i + 1,
                    code.trim()
                )));
            }
        }
    }
    found
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn field_type(field: &FieldDef, enums: &EnumTable, suffix: &str) -> String {
    let element = |rand: bool| {
        let prefix = if rand { "rand_" } else { "" };
        match (&field.element, field.width) {
            (ElementType::Enum(name), _) => format!("vsc.{prefix}enum_t({})", type_name(name, suffix)),
            (ElementType::Integer(Some(named)), None) => {
                let sign = if field.signed { "" } else { "u" };
                format!("vsc.{prefix}{sign}int{}_t()", named.width())
            }
            _ => {
                let kind = if field.signed { "int_t" } else { "bit_t" };
                format!("vsc.{prefix}{kind}({})", field.bit_width(enums))
            }
        }
    };
    let rand = field.rand != RandKind::Fixed;
    match (field.category(), field.shape) {
        (TypeCategory::Array, ArrayShape::Fixed(n)) => {
            let list = if rand { "rand_list_t" } else { "list_t" };
            format!("vsc.{list}({}, sz={n})", element(false))
        }
        (TypeCategory::Array, _) => {
            let list = if rand { "randsz_list_t" } else { "list_t" };
            format!("vsc.{list}({})", element(false))
        }
        _ if field.rand == RandKind::Cyclic => format!("vsc.randc_bit_t({})", field.bit_width(enums)),
        _ => element(rand),
    }
}

/// Start index and field names of each run of two or more adjacent simple tests on distinct fields.
fn range_groups(statements: &[Statement]) -> Vec<(usize, Vec<String>)> {
    let subject = |s: &Statement| match &s.node {
        StatementNode::RangeTest { var, .. } | StatementNode::MembershipTest { var, .. } => {
            var.as_ident().map(str::to_string)
        }
        _ => None,
    };
    let mut groups = Vec::new();
    let mut run: Option<(usize, Vec<String>)> = None;
    for (i, statement) in statements.iter().enumerate() {
        match (subject(statement), run.as_mut()) {
            (Some(name), Some((_, names))) if !names.contains(&name) => names.push(name),
            (Some(name), _) => {
                if let Some(done) = run.take().filter(|(_, n)| n.len() > 1) {
                    groups.push(done);
                }
                run = Some((i, vec![name]));
            }
            (None, _) => {
                if let Some(done) = run.take().filter(|(_, n)| n.len() > 1) {
                    groups.push(done);
                }
            }
        }
    }
    if let Some(done) = run.filter(|(_, n)| n.len() > 1) {
        groups.push(done);
    }
    groups
}

/// Single-line SV rendering of a statement, for review comments.
pub fn sv_text(node: &StatementNode) -> String {
    let body = |stmts: &[Statement]| {
        stmts
            .iter()
            .map(|s| sv_text(&s.node))
            .collect::<Vec<_>>()
            .join(" ")
    };
    match node {
        StatementNode::RangeTest { var, lo, hi } => format!("{var} >= {lo} && {var} <= {hi};"),
        StatementNode::MembershipTest { var, set, negated } => {
            let set = set.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
            if *negated {
                format!("!({var} inside {{{set}}});")
            } else {
                format!("{var} inside {{{set}}};")
            }
        }
        StatementNode::Distribution { var, entries } => {
            let entries = entries
                .iter()
                .map(|e| {
                    let op = if e.kind == WeightKind::Exact { ":=" } else { ":/" };
                    format!("{} {op} {}", e.item, e.weight)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{var} dist {{{entries}}};")
        }
        StatementNode::Implication { antecedent, consequent } => {
            format!("{antecedent} -> {}", sv_text(&consequent.node))
        }
        StatementNode::Conditional(chain) => chain
            .branches()
            .iter()
            .enumerate()
            .map(|(i, branch)| match (&branch.condition, i) {
                (Some(cond), 0) => format!("if ({cond}) {{ {} }}", body(&branch.body)),
                (Some(cond), _) => format!("else if ({cond}) {{ {} }}", body(&branch.body)),
                (None, _) => format!("else {{ {} }}", body(&branch.body)),
            })
            .collect::<Vec<_>>()
            .join(" "),
        StatementNode::ForeachLoop { array, index, body: stmts } => {
            format!("foreach ({array}[{index}]) {{ {} }}", body(stmts))
        }
        StatementNode::Uniqueness { targets } => {
            let targets = targets.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            format!("unique {{{targets}}};")
        }
        StatementNode::SoftMarker(inner) => format!("soft {}", sv_text(&inner.node)),
        StatementNode::RawExpression { text, expr } => match expr {
            Some(expr) => format!("{expr};"),
            None => text.clone(),
        },
    }
}

fn verbose_docstring(block: &ConstraintBlock) -> Vec<String> {
    let m = &block.metrics;
    let mut lines = vec!["r\"\"\"".to_string(), "Original SV constraint:".to_string()];
    lines.extend(
        block
            .source
            .lines()
            .map(|l| l.trim_end().replace("\"\"\"", "'''"))
            .filter(|l| !l.trim().is_empty())
            .map(|l| format!("    {}", l.trim_start())),
    );
    lines.push(String::new());
    lines.push("--- Constraint Metrics ---".to_string());
    lines.push(format!("Lines: {}", m.lines));
    lines.push(format!(
        "Conditionals: {} (if: {}, else-if: {}, else: {})",
        m.conditionals(),
        m.if_branches,
        m.else_if_branches,
        m.else_branches
    ));
    if m.logical_total() > 0 {
        let kinds = m.logical.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>();
        lines.push(format!("Logical Ops: {} ({})", m.logical_total(), kinds.join(", ")));
    }
    if !m.constructs.is_empty() {
        let kinds = m.constructs.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>();
        lines.push(format!("Constructs: {}", kinds.join(", ")));
    }
    if m.bit_slices > 0 || m.sized_literals > 0 {
        lines.push(format!("Special: bit_slices: {}, sized_literals: {}", m.bit_slices, m.sized_literals));
    }
    lines.push("\"\"\"".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze;
    use crate::extract::extract;
    use crate::fields::classify;
    use crate::lexer::tokenize;
    use crate::normalize::normalize;
    use crate::report::DiagnosticKind;

    /// Runs the front half of the pipeline on one source and emits every container.
    fn emit_all(src: &str, config: &TranslatorConfig) -> (EnumTable, Vec<ClassDef>, Vec<ClassOutput>) {
        let normalized = normalize(src);
        let tokens = tokenize(&normalized.text);
        let extraction = extract(&tokens, &normalized.text, src);
        let (enums, _) = EnumTable::build(extraction.enums.clone());
        let classes: Vec<ClassDef> = extraction
            .classes
            .iter()
            .map(|raw| ClassDef {
                name: raw.name.clone(),
                base: None,
                fields: raw
                    .fields
                    .iter()
                    .flat_map(|f| classify(f, &enums, &normalized.text).0)
                    .collect(),
                constraints: raw
                    .constraints
                    .iter()
                    .map(|c| analyze(c, &raw.name, &normalized.text).0)
                    .collect(),
                hooks: raw.hooks.clone(),
                line: raw.line,
            })
            .collect();
        let outputs = classes
            .iter()
            .map(|class| {
                let mut cg = Codegen::new(class, &enums, config);
                cg.emit();
                cg.into_output()
            })
            .collect();
        (enums, classes, outputs)
    }

    fn emit_one(src: &str) -> ClassOutput {
        emit_all(src, &TranslatorConfig::default()).2.remove(0)
    }

    #[test]
    fn container_without_constraints_has_only_fields() {
        let out = emit_one("class cfg; rand bit [3:0] a; bit flag; endclass");
        assert_eq!(
            out.text,
            [
                "@vsc.randobj",
                "class Cfg:",
                "    \"\"\"Translated from SV class: cfg\"\"\"",
                "",
                "    def __init__(self):",
                "        self.a = vsc.rand_bit_t(4)",
                "        self.flag = vsc.bit_t(1)",
            ]
            .join("\n")
        );
        assert!(!out.text.contains("@vsc.constraint"));
    }

    #[test]
    fn eight_bit_membership_scenario() {
        let out = emit_one("class pkt; rand bit [7:0] x; constraint c { x inside {[0:127]}; } endclass");
        assert!(out.text.contains("self.x = vsc.rand_bit_t(8)"));
        assert!(out.text.contains("        self.x in vsc.rangelist(vsc.rng(0, 127))"));
        assert_eq!(out.emitted.get("emitted.inside"), Some(&1));
    }

    #[test]
    fn distribution_keeps_ranges_and_weights() {
        let out = emit_one("class p; rand bit [3:0] len; constraint d { len dist { [0:3]:=60, [4:15]:/40, 7:=1 }; } endclass");
        let expected = [
            "        vsc.dist(self.len, [",
            "            vsc.weight(vsc.rng(0, 3), 60),",
            "            vsc.weight(vsc.rng(4, 15), 40),",
            "            vsc.weight(7, 1),",
            "        ])",
        ]
        .join("\n");
        assert!(out.text.contains(&expected), "{}", out.text);
        let ambiguities: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Ambiguity)
            .collect();
        assert_eq!(ambiguities.len(), 1);
        assert_eq!(ambiguities[0].constraint.as_deref(), Some("d"));
        assert_eq!(ambiguities[0].container.as_deref(), Some("p"));
    }

    #[test]
    fn solve_order_precedes_statements() {
        let src = "class s; rand bit a, b, c;
            constraint o { a < 2; solve a before b; b != c; solve b before c; }
        endclass";
        let out = emit_one(src);
        let body: Vec<&str> = out
            .text
            .lines()
            .skip_while(|l| !l.contains("def o(self)"))
            .skip(1)
            .map(str::trim)
            .collect();
        assert_eq!(
            body,
            vec![
                "vsc.solve_order(self.a, self.b)",
                "vsc.solve_order(self.b, self.c)",
                "self.a < 2",
                "self.b != self.c",
            ]
        );
    }

    #[test]
    fn control_flow_nests_with_blocks() {
        let src = "typedef enum {RD, WR} op_e;
        class t;
            rand op_e op; rand bit [7:0] arr[4]; rand bit [7:0] len;
            constraint k {
                op == WR -> len > 0;
                if (len < 4) { len != 2; } else if (len < 8) len != 5; else { len != 9; }
                foreach (arr[i]) arr[i] < len;
                unique {arr};
                soft len inside {[1:3]};
            }
        endclass";
        let out = emit_one(src);
        let text = out.text;
        assert!(text.contains("self.op = vsc.rand_enum_t(Op)"));
        assert!(text.contains("self.arr = vsc.rand_list_t(vsc.bit_t(8), sz=4)"));
        for want in [
            "        with vsc.implies(self.op == Op.WR):\n            self.len > 0",
            "        with vsc.if_then(self.len < 4):\n            self.len != 2",
            "        with vsc.else_if(self.len < 8):\n            self.len != 5",
            "        with vsc.else_then:\n            self.len != 9",
            "        with vsc.foreach(self.arr, idx=True) as i:\n            self.arr[i] < self.len",
            "        vsc.unique(self.arr)",
            "        vsc.soft(self.len.inside(vsc.rangelist(vsc.rng(1, 3))))",
        ] {
            assert!(text.contains(want), "missing {want:?} in\n{text}");
        }
        assert!(out.diagnostics.iter().all(|d| d.kind != DiagnosticKind::Warning), "{:?}", out.diagnostics);
    }

    #[test]
    fn unsupported_statement_becomes_review_comment() {
        let out = emit_one("class u; rand bit [7:0] a, b; constraint r { if (a > 1) { b == (a ? 1 : 2); } } endclass");
        assert!(out.text.contains("            # MANUAL REVIEW: b == (a ? 1 : 2);\n            pass"), "{}", out.text);
        assert!(out.diagnostics.iter().any(|d| d.kind == DiagnosticKind::ManualReview));
        assert_eq!(out.emitted.get("emitted.review_comments"), Some(&1));
    }

    #[test]
    fn types_map_to_pyvsc_constructors() {
        let out = emit_one(
            "class ty; rand int signed_i; rand byte unsigned ub; randc bit [2:0] cy; rand bit signed [15:0] sv;
             rand bit [7:0] q[]; longint fixed; endclass",
        );
        for want in [
            "self.signed_i = vsc.rand_int32_t()",
            "self.ub = vsc.rand_uint8_t()",
            "self.cy = vsc.randc_bit_t(3)",
            "self.sv = vsc.rand_int_t(16)",
            "self.q = vsc.randsz_list_t(vsc.bit_t(8))",
            "self.fixed = vsc.int64_t()",
        ] {
            assert!(out.text.contains(want), "missing {want:?} in\n{}", out.text);
        }
    }

    #[test]
    fn cyclic_named_integers_keep_their_width() {
        let out = emit_one("class c; randc byte unsigned b; randc int unsigned w; randc shortint unsigned h; endclass");
        for want in [
            "self.b = vsc.randc_bit_t(8)",
            "self.w = vsc.randc_bit_t(32)",
            "self.h = vsc.randc_bit_t(16)",
        ] {
            assert!(out.text.contains(want), "missing {want:?} in\n{}", out.text);
        }
    }

    #[test]
    fn relational_subjects_are_parenthesized_before_in() {
        let out = emit_one(
            "class m; rand bit [3:0] a, b; constraint c { (a == b) inside {1}; (a < b) inside {[0:1]}; b inside {[1:2]}; } endclass",
        );
        assert!(out.text.contains("        (self.a == self.b) in vsc.rangelist(1)"), "{}", out.text);
        assert!(out.text.contains("        (self.a < self.b) in vsc.rangelist("), "{}", out.text);
        assert!(out.text.contains("        self.b in vsc.rangelist("), "{}", out.text);
        assert!(!out.text.contains("self.a == self.b in"));
    }

    #[test]
    fn signed_sized_literals_keep_their_value() {
        let out = emit_one(
            "class s; rand bit signed [3:0] a; rand bit [3:0] u; constraint c { a == 4'sb1111; u != 4'hFF; u < 4'hA; } endclass",
        );
        assert!(out.text.contains("        self.a == -1"), "{}", out.text);
        assert!(out.text.contains("        self.u != 15"), "{}", out.text);
        assert!(out.text.contains("        self.u < 0xA"), "{}", out.text);
    }

    #[test]
    fn verbose_mode_documents_constraints() {
        let config = TranslatorConfig {
            verbose: true,
            ..Default::default()
        };
        let (_, _, outputs) = emit_all(
            "class v; rand bit [7:0] a; constraint c { if (a > 1 && a < 9) a != 4'h3; } endclass",
            &config,
        );
        let text = &outputs[0].text;
        assert!(text.contains("self.a = vsc.rand_bit_t(8)  # rand bit [7:0] a;"), "{text}");
        assert!(text.contains("Original SV constraint:"));
        assert!(text.contains("Conditionals: 1 (if: 1, else-if: 0, else: 0)"));
        assert!(text.contains("Logical Ops: 1 (&&: 1)"));
        assert!(text.contains("Special: bit_slices: 0, sized_literals: 1"));
        assert!(check_leaks(text).is_empty(), "{:?}", check_leaks(text));
    }

    #[test]
    fn grouping_marks_adjacent_simple_tests() {
        let config = TranslatorConfig {
            group_adjacent_ranges: true,
            ..Default::default()
        };
        let (_, _, outputs) = emit_all(
            "class g; rand bit [7:0] a, b, c; constraint r { a inside {1, 2}; b >= 1 && b <= 4; c != 0; } endclass",
            &config,
        );
        let out = &outputs[0];
        assert!(out.text.contains("        # range checks: a, b\n        self.a in vsc.rangelist(1, 2)"));
        assert_eq!(out.diagnostics.iter().filter(|d| d.kind == DiagnosticKind::Ambiguity).count(), 1);
    }

    #[test]
    fn hooks_are_stubbed() {
        let out = emit_one(
            "class h; rand bit a;
               function void post_randomize(); count++; endfunction
             endclass",
        );
        assert!(out.text.contains("    def post_randomize(self):\n        \"\"\"Called after successful randomization\"\"\""));
        assert!(out.text.contains("#   count++;"));
        assert!(out.diagnostics.iter().any(|d| d.kind == DiagnosticKind::ManualReview));
    }

    #[test]
    fn unit_assembly_and_checks() {
        let config = TranslatorConfig::default();
        let (enums, classes, outputs) = emit_all(
            "typedef enum bit [1:0] {IDLE, BUSY = 3} state_e;
             class none; rand state_e st; rand bit [7:0] lambda; constraint c { lambda > 0; } endclass",
            &config,
        );
        let bodies: Vec<String> = outputs.iter().map(|o| o.text.clone()).collect();
        let text = assemble_unit("fixture.sv", &enums, &classes, &bodies, &config);
        assert!(text.starts_with("#!/usr/bin/env python3\n"));
        assert!(text.contains("class State(IntEnum):\n    \"\"\"Translated from SV enum: state_e\"\"\"\n    IDLE = 0\n    BUSY = 3"));
        assert!(text.contains("class None_:"));
        assert!(text.contains("self.st = vsc.rand_enum_t(State)"));
        assert!(text.contains("self.lambda_ = vsc.rand_bit_t(8)"));
        assert!(text.contains("self.lambda_ > 0"));
        assert!(text.contains("    none = None_()\n    try:\n        none.randomize()"));
        assert!(text.contains("print(f'  lambda_ = {none.lambda_}')"));
        assert!(check_class(&classes[0], &outputs[0].text, "_").is_empty());
        assert!(check_leaks(&text).is_empty(), "{:?}", check_leaks(&text));
    }

    #[test]
    fn leak_check_ignores_comments_and_docstrings() {
        let text = "\"\"\"\nx inside {1}\n\"\"\"\n# a && b\nself.a && self.b\nvsc.weight(8'hFF, 1)";
        let leaks = check_leaks(text);
        assert_eq!(leaks.len(), 2, "{leaks:?}");
        assert!(leaks[0].message.contains("&&"));
        assert!(leaks[1].message.contains("sized literal"));
    }
}
