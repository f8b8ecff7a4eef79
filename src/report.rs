//! Diagnostics, statistics and the aggregated translation result.
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use colored::Colorize;
use indexmap::IndexMap;
use serde::Serialize;

use crate::ir::{ClassDef, EnumDef};

// ————————————————————————————————————————————————————————————————————————————
// DIAGNOSTICS
// ————————————————————————————————————————————————————————————————————————————

/// The three triage buckets a reviewer works through.
///
/// - `Warning`: recognized syntax that was only partially translated.
/// - `ManualReview`: something was skipped or emitted as a comment; a human must finish it.
/// - `Ambiguity`: translated by a heuristic that may not preserve exact meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Warning,
    ManualReview,
    Ambiguity,
}

/// One soft problem. Lower layers fill in what they know (usually a line);
/// outer layers attach constraint, container and unit names on the way up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            unit: None,
            container: None,
            constraint: None,
            line: None,
        }
    }
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message)
    }
    pub fn review(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::ManualReview, message)
    }
    pub fn ambiguity(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Ambiguity, message)
    }
    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
    pub fn in_constraint(mut self, name: &str) -> Self {
        self.constraint.get_or_insert_with(|| name.to_string());
        self
    }
    pub fn in_container(mut self, name: &str) -> Self {
        self.container.get_or_insert_with(|| name.to_string());
        self
    }
    pub fn in_unit(mut self, name: &str) -> Self {
        self.unit.get_or_insert_with(|| name.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut location = Vec::new();
        if let Some(unit) = &self.unit {
            location.push(unit.clone());
        }
        match (&self.container, &self.constraint) {
            (Some(c), Some(k)) => location.push(format!("{c}.{k}")),
            (Some(c), None) => location.push(c.clone()),
            (None, Some(k)) => location.push(k.clone()),
            (None, None) => {}
        }
        if let Some(line) = self.line {
            location.push(format!("line {line}"));
        }
        if location.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", location.join(" "), self.message)
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// STATISTICS
// ————————————————————————————————————————————————————————————————————————————

/// Counters keyed by metric name. Insertion order is report order.
pub type Statistics = IndexMap<String, u64>;

const HEADLINE_KEYS: &[&str] = &[
    "units",
    "classes",
    "fields",
    "constraints",
    "enums",
    "source_lines",
    "output_lines",
];

pub fn new_statistics() -> Statistics {
    HEADLINE_KEYS.iter().map(|k| (k.to_string(), 0)).collect()
}

pub fn bump(stats: &mut Statistics, key: &str, by: u64) {
    *stats.entry(key.to_string()).or_insert(0) += by;
}

pub fn merge_statistics(into: &mut Statistics, from: &Statistics) {
    for (k, v) in from {
        bump(into, k, *v);
    }
}

// ————————————————————————————————————————————————————————————————————————————
// RESULTS
// ————————————————————————————————————————————————————————————————————————————

/// Output of one input unit (one source text).
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// false when the unit could not be read or yielded nothing to translate
    pub ok: bool,
    #[serde(skip)]
    pub text: String,
    #[serde(skip)]
    pub enums: Vec<EnumDef>,
    #[serde(skip)]
    pub classes: Vec<ClassDef>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip)]
    pub statistics: Statistics,
}

/// Everything a caller gets back from a pass. The engine keeps no reference to it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslationResult {
    #[serde(skip)]
    pub text: String,
    pub units: Vec<UnitOutput>,
    pub warnings: Vec<Diagnostic>,
    pub review_flags: Vec<Diagnostic>,
    pub ambiguities: Vec<Diagnostic>,
    pub statistics: Statistics,
}

impl TranslationResult {
    /// Merge unit outputs that are already in input order.
    pub fn from_units(units: Vec<UnitOutput>) -> Self {
        let mut statistics = new_statistics();
        let mut warnings = Vec::new();
        let mut review_flags = Vec::new();
        let mut ambiguities = Vec::new();
        let mut texts = Vec::new();
        let multi = units.len() > 1;
        let mut seen = HashSet::new();

        for unit in &units {
            merge_statistics(&mut statistics, &unit.statistics);
            for d in unit.diagnostics.iter().filter(|d| seen.insert(*d)) {
                match d.kind {
                    DiagnosticKind::Warning => warnings.push(d.clone()),
                    DiagnosticKind::ManualReview => review_flags.push(d.clone()),
                    DiagnosticKind::Ambiguity => ambiguities.push(d.clone()),
                }
            }
            if unit.ok {
                if multi {
                    texts.push(format!("# >>> source: {}\n{}", unit.name, unit.text));
                } else {
                    texts.push(unit.text.clone());
                }
            }
        }

        Self {
            text: texts.join("\n\n"),
            units,
            warnings,
            review_flags,
            ambiguities,
            statistics,
        }
    }

    /// At least one unit produced something.
    pub fn is_usable(&self) -> bool {
        self.units.iter().any(|u| u.ok)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HUMAN-READABLE REPORT
// ————————————————————————————————————————————————————————————————————————————

pub fn render_report(result: &TranslationResult, generated_at: DateTime<Local>) -> String {
    let rule = "=".repeat(78);
    let thin = "-".repeat(78);
    let mut out = Vec::new();

    out.push(rule.clone());
    out.push(format!("{}", "SV TO PYVSC TRANSLATION REPORT".bold()));
    out.push(format!("generated {}", generated_at.format("%Y-%m-%d %H:%M:%S")));
    out.push(rule.clone());

    out.push(String::new());
    out.push(format!("{}", "UNITS".bold()));
    out.push(thin.clone());
    for unit in &result.units {
        let status = if unit.ok { "ok".green() } else { "failed".red() };
        out.push(format!("   {} {}", status, unit.name));
    }

    out.push(String::new());
    out.push(format!("{}", "STATISTICS".bold()));
    out.push(thin.clone());
    for (key, value) in &result.statistics {
        out.push(format!("   {key:<32} {value:>8}"));
    }

    let sections = [
        ("WARNINGS", &result.warnings),
        ("MANUAL REVIEW REQUIRED", &result.review_flags),
        ("SEMANTIC AMBIGUITIES", &result.ambiguities),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        out.push(String::new());
        let heading = format!("{title} ({})", items.len());
        out.push(match title {
            "WARNINGS" => format!("{}", heading.yellow().bold()),
            "MANUAL REVIEW REQUIRED" => format!("{}", heading.red().bold()),
            _ => format!("{}", heading.cyan().bold()),
        });
        out.push(thin.clone());
        for item in items.iter() {
            out.push(format!("   * {item}"));
        }
    }

    out.push(String::new());
    out.push(rule);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, ok: bool, diagnostics: Vec<Diagnostic>, classes: u64) -> UnitOutput {
        let mut statistics = new_statistics();
        bump(&mut statistics, "classes", classes);
        UnitOutput {
            name: name.to_string(),
            path: None,
            ok,
            text: format!("# {name}"),
            enums: Vec::new(),
            classes: Vec::new(),
            diagnostics,
            statistics,
        }
    }

    #[test]
    fn context_is_filled_only_when_missing() {
        let d = Diagnostic::warning("w")
            .at_line(3)
            .in_constraint("c")
            .in_container("pkt")
            .in_container("other")
            .at_line(9);
        assert_eq!(d.line, Some(3));
        assert_eq!(d.container.as_deref(), Some("pkt"));
        assert_eq!(d.to_string(), "[pkt.c line 3] w");
    }

    #[test]
    fn merge_splits_kinds_and_sums_statistics_in_order() {
        let a = unit("a.sv", true, vec![Diagnostic::warning("w1"), Diagnostic::review("r1")], 2);
        let b = unit("b.sv", true, vec![Diagnostic::ambiguity("m1"), Diagnostic::warning("w2")], 1);
        let result = TranslationResult::from_units(vec![a, b]);
        assert_eq!(result.statistics["classes"], 3);
        let warnings: Vec<_> = result.warnings.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(warnings, ["w1", "w2"]);
        assert_eq!(result.review_flags.len(), 1);
        assert_eq!(result.ambiguities.len(), 1);
        assert!(result.text.find("a.sv").unwrap() < result.text.find("b.sv").unwrap());
    }

    #[test]
    fn identical_diagnostics_are_reported_once() {
        let twice = Diagnostic::warning("`ghost` is not a declared field").at_line(4);
        let a = unit("a.sv", true, vec![twice.clone(), twice.clone().at_line(4)], 1);
        let b = unit("b.sv", true, vec![twice.clone().in_unit("b.sv")], 1);
        let result = TranslationResult::from_units(vec![a, b]);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn failed_units_are_excluded_from_text() {
        let a = unit("a.sv", false, vec![Diagnostic::review("unreadable")], 0);
        let result = TranslationResult::from_units(vec![a]);
        assert!(result.text.is_empty());
        assert!(!result.is_usable());
    }

    #[test]
    fn report_lists_every_bucket() {
        colored::control::set_override(false);
        let a = unit("a.sv", true, vec![Diagnostic::warning("w1"), Diagnostic::ambiguity("m1")], 1);
        let result = TranslationResult::from_units(vec![a]);
        let text = render_report(&result, Local::now());
        assert!(text.contains("WARNINGS (1)"));
        assert!(text.contains("SEMANTIC AMBIGUITIES (1)"));
        assert!(!text.contains("MANUAL REVIEW REQUIRED"));
        assert!(text.contains("a.sv"));
    }
}
