//! Orchestration: one input unit at a time through normalize → extract → classify →
//! analyze → emit, with optional worker pools at unit and container level.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::analyze::analyze;
use crate::codegen::{self, ClassOutput, Codegen};
use crate::config::TranslatorConfig;
use crate::error::EngineError;
use crate::extract::{RawClass, extract};
use crate::fields::classify;
use crate::ir::{BaseRef, BaseResolution, ClassDef, EnumTable};
use crate::lexer::tokenize;
use crate::normalize::normalize;
use crate::report::{Diagnostic, Statistics, TranslationResult, UnitOutput, bump, merge_statistics, new_statistics};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputUnit {
    File(PathBuf),
    Source { name: String, text: String },
}

impl InputUnit {
    pub fn name(&self) -> String {
        match self {
            InputUnit::File(path) => path.display().to_string(),
            InputUnit::Source { name, .. } => name.clone(),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            InputUnit::File(path) => Some(path),
            InputUnit::Source { .. } => None,
        }
    }

    fn read(&self) -> Result<String, EngineError> {
        match self {
            InputUnit::File(path) => std::fs::read_to_string(path).map_err(|source| EngineError::Read {
                path: path.clone(),
                source,
            }),
            InputUnit::Source { text, .. } => Ok(text.clone()),
        }
    }
}

/// Worker pools for one pass. `None` means run on the calling thread.
struct Pools {
    units: Option<ThreadPool>,
    classes: Option<ThreadPool>,
}

impl Pools {
    fn new(config: &TranslatorConfig) -> Result<Self, EngineError> {
        let build = |n: usize| -> Result<Option<ThreadPool>, EngineError> {
            if n <= 1 {
                return Ok(None);
            }
            Ok(Some(ThreadPoolBuilder::new().num_threads(n).build()?))
        };
        Ok(Self {
            units: build(config.unit_workers())?,
            classes: build(config.class_workers())?,
        })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FRONT API
// ————————————————————————————————————————————————————————————————————————————

/// Translate every unit. `targets` limits emission to the named containers (plus
/// their bases); empty means all. Only pool construction can fail; unreadable
/// units become review flags in the result.
pub fn translate(
    units: &[InputUnit],
    config: &TranslatorConfig,
    targets: &[String],
) -> Result<TranslationResult, EngineError> {
    let pools = Pools::new(config)?;
    info!(units = units.len(), jobs = config.unit_workers(), class_jobs = config.class_workers(), "translating");

    let run = |(index, unit): (usize, &InputUnit)| (index, run_unit(unit, config, targets, pools.classes.as_ref()));
    let mut outputs: Vec<(usize, UnitOutput)> = match &pools.units {
        Some(pool) => pool.install(|| units.par_iter().enumerate().map(run).collect()),
        None => units.iter().enumerate().map(run).collect(),
    };
    // completion order never leaks into the merge
    outputs.sort_by_key(|(index, _)| *index);
    let mut outputs: Vec<UnitOutput> = outputs.into_iter().map(|(_, unit)| unit).collect();

    if !targets.is_empty() {
        let known: HashSet<&str> = outputs
            .iter()
            .flat_map(|u| u.classes.iter().map(|c| c.name.as_str()))
            .collect();
        let unknown: Vec<String> = targets.iter().filter(|t| !known.contains(t.as_str())).cloned().collect();
        if let Some(first) = outputs.first_mut() {
            for target in unknown {
                warn!(container = %target, "requested container not found");
                first.diagnostics.push(Diagnostic::warning(format!(
                    "requested container `{target}` not found in any input"
                )));
            }
        }
    }

    let result = TranslationResult::from_units(outputs);
    info!(
        warnings = result.warnings.len(),
        review = result.review_flags.len(),
        ambiguities = result.ambiguities.len(),
        "translation finished"
    );
    Ok(result)
}

/// Translate one in-memory source on the calling thread.
pub fn translate_source(name: &str, text: &str, config: &TranslatorConfig) -> UnitOutput {
    translate_unit(name, None, text, config, &[], None)
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

fn run_unit(unit: &InputUnit, config: &TranslatorConfig, targets: &[String], pool: Option<&ThreadPool>) -> UnitOutput {
    let name = unit.name();
    match unit.read() {
        Ok(text) => translate_unit(&name, unit.path(), &text, config, targets, pool),
        Err(err) => {
            warn!(unit = %name, error = %err, "unit skipped");
            let mut statistics = new_statistics();
            bump(&mut statistics, "units", 1);
            UnitOutput {
                name: name.clone(),
                path: unit.path().map(Path::to_path_buf),
                ok: false,
                text: String::new(),
                enums: Vec::new(),
                classes: Vec::new(),
                diagnostics: vec![Diagnostic::review(format!("{err}; unit skipped")).in_unit(&name)],
                statistics,
            }
        }
    }
}

fn translate_unit(
    name: &str,
    path: Option<&Path>,
    text: &str,
    config: &TranslatorConfig,
    targets: &[String],
    pool: Option<&ThreadPool>,
) -> UnitOutput {
    debug!(unit = name, bytes = text.len(), "unit started");
    let mut diagnostics = Vec::new();

    let normalized = normalize(text);
    diagnostics.extend(normalized.diagnostics);
    let src = normalized.text.as_str();
    let tokens = tokenize(src);
    let extraction = extract(&tokens, src, text);
    diagnostics.extend(extraction.diagnostics);

    // built once, read-only for every container below
    let (enums, enum_diagnostics) = EnumTable::build(extraction.enums);
    diagnostics.extend(enum_diagnostics);

    let (order, bases, base_diagnostics) = resolve_bases(&extraction.classes);
    diagnostics.extend(base_diagnostics);
    let order = select_targets(order, &extraction.classes, targets);

    let work: Vec<(usize, &RawClass, Option<BaseRef>)> = order
        .iter()
        .enumerate()
        .map(|(slot, &i)| (slot, &extraction.classes[i], bases[i].clone()))
        .collect();
    let job = |(slot, raw, base): &(usize, &RawClass, Option<BaseRef>)| {
        (*slot, translate_class(raw, base.clone(), &enums, src, config))
    };
    let mut translated: Vec<(usize, TranslatedClass)> = match pool {
        Some(pool) if work.len() > 1 => pool.install(|| work.par_iter().map(job).collect()),
        _ => work.iter().map(job).collect(),
    };
    translated.sort_by_key(|(slot, _)| *slot);

    let mut statistics = new_statistics();
    let mut classes = Vec::with_capacity(translated.len());
    let mut bodies = Vec::with_capacity(translated.len());
    for (_, done) in translated {
        diagnostics.extend(done.diagnostics);
        diagnostics.extend(done.output.diagnostics);
        diagnostics.extend(codegen::check_class(&done.class, &done.output.text, &config.reserved_suffix));
        merge_statistics(&mut statistics, &done.output.emitted);
        merge_statistics(&mut statistics, &source_statistics(&done.class));
        bodies.push(done.output.text);
        classes.push(done.class);
    }

    let output = codegen::assemble_unit(name, &enums, &classes, &bodies, config);
    diagnostics.extend(codegen::check_leaks(&output));

    bump(&mut statistics, "units", 1);
    bump(&mut statistics, "classes", classes.len() as u64);
    bump(&mut statistics, "fields", classes.iter().map(|c| c.fields.len() as u64).sum());
    bump(&mut statistics, "constraints", classes.iter().map(|c| c.constraints.len() as u64).sum());
    bump(&mut statistics, "enums", enums.len() as u64);
    bump(&mut statistics, "source_lines", text.lines().count() as u64);
    bump(&mut statistics, "output_lines", output.lines().count() as u64);

    let ok = !classes.is_empty() || !enums.is_empty();
    if !ok {
        diagnostics.push(Diagnostic::review("no enum or class declarations found"));
    }
    debug!(unit = name, classes = classes.len(), diagnostics = diagnostics.len(), "unit finished");

    UnitOutput {
        name: name.to_string(),
        path: path.map(Path::to_path_buf),
        ok,
        text: output,
        enums: enums.iter().cloned().collect(),
        classes,
        diagnostics: diagnostics.into_iter().map(|d| d.in_unit(name)).collect(),
        statistics,
    }
}

struct TranslatedClass {
    class: ClassDef,
    output: ClassOutput,
    diagnostics: Vec<Diagnostic>, // classification and analysis
}

fn translate_class(
    raw: &RawClass,
    base: Option<BaseRef>,
    enums: &EnumTable,
    src: &str,
    config: &TranslatorConfig,
) -> TranslatedClass {
    let mut diagnostics = Vec::new();
    let mut fields = Vec::new();
    let mut seen = HashSet::new();
    for raw_field in &raw.fields {
        let (defs, found) = classify(raw_field, enums, src);
        diagnostics.extend(found);
        for def in defs {
            if seen.insert(def.name.clone()) {
                fields.push(def);
            } else {
                diagnostics.push(
                    Diagnostic::warning(format!("field `{}` declared twice; first declaration kept", def.name))
                        .at_line(def.line),
                );
            }
        }
    }
    let constraints = raw
        .constraints
        .iter()
        .map(|c| {
            let (block, found) = analyze(c, &raw.name, src);
            diagnostics.extend(found);
            block
        })
        .collect();

    let class = ClassDef {
        name: raw.name.clone(),
        base,
        fields,
        constraints,
        hooks: raw.hooks.clone(),
        line: raw.line,
    };
    let mut cg = Codegen::new(&class, enums, config);
    cg.emit();
    let output = cg.into_output();
    TranslatedClass {
        diagnostics: diagnostics.into_iter().map(|d| d.in_container(&raw.name)).collect(),
        class,
        output,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Resolve base names within the unit and compute an emission order in which every
/// base precedes its derived containers. Otherwise source order is kept.
fn resolve_bases(classes: &[RawClass]) -> (Vec<usize>, Vec<Option<BaseRef>>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let position: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let bases: Vec<Option<BaseRef>> = classes
        .iter()
        .enumerate()
        .map(|(i, class)| {
            let name = class.base.as_ref()?;
            let resolution = match position.get(name.as_str()) {
                Some(&j) if j < i => BaseResolution::Resolved,
                Some(_) => {
                    diagnostics.push(
                        Diagnostic::warning(format!("base `{name}` is declared later; emitted first"))
                            .at_line(class.line)
                            .in_container(&class.name),
                    );
                    BaseResolution::Forward
                }
                None => {
                    diagnostics.push(
                        Diagnostic::review(format!(
                            "base `{name}` is not declared in this unit; emitted without a parent"
                        ))
                        .at_line(class.line)
                        .in_container(&class.name),
                    );
                    BaseResolution::Missing
                }
            };
            Some(BaseRef {
                name: name.clone(),
                resolution,
            })
        })
        .collect();

    let mut order = Vec::with_capacity(classes.len());
    let mut state = vec![Visit::New; classes.len()];
    for i in 0..classes.len() {
        visit(i, classes, &position, &mut state, &mut order, &mut diagnostics);
    }
    (order, bases, diagnostics)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

fn visit(
    i: usize,
    classes: &[RawClass],
    position: &HashMap<&str, usize>,
    state: &mut [Visit],
    order: &mut Vec<usize>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match state[i] {
        Visit::Done => return,
        Visit::Active => {
            diagnostics.push(
                Diagnostic::warning("inheritance cycle; emission order follows source order")
                    .at_line(classes[i].line)
                    .in_container(&classes[i].name),
            );
            return;
        }
        Visit::New => {}
    }
    state[i] = Visit::Active;
    if let Some(&j) = classes[i].base.as_deref().and_then(|b| position.get(b)) {
        visit(j, classes, position, state, order, diagnostics);
    }
    state[i] = Visit::Done;
    order.push(i);
}

/// Keep requested containers and, transitively, their bases. Order is unchanged.
fn select_targets(order: Vec<usize>, classes: &[RawClass], targets: &[String]) -> Vec<usize> {
    if targets.is_empty() {
        return order;
    }
    let mut wanted: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = targets.iter().map(String::as_str).collect();
    while let Some(name) = stack.pop() {
        if !wanted.insert(name) {
            continue;
        }
        if let Some(base) = classes.iter().find(|c| c.name == name).and_then(|c| c.base.as_deref()) {
            stack.push(base);
        }
    }
    order.into_iter().filter(|&i| wanted.contains(classes[i].name.as_str())).collect()
}

/// `source.*` counters from the analyzed constraint blocks.
fn source_statistics(class: &ClassDef) -> Statistics {
    let mut stats = Statistics::new();
    for block in &class.constraints {
        let m = &block.metrics;
        for (tag, n) in &m.constructs {
            bump(&mut stats, &format!("source.{tag}"), u64::from(*n));
        }
        for (op, n) in &m.logical {
            bump(&mut stats, &format!("source.logical.{op}"), u64::from(*n));
        }
        bump(&mut stats, "source.conditionals", u64::from(m.conditionals()));
        bump(&mut stats, "source.bit_slices", u64::from(m.bit_slices));
        bump(&mut stats, "source.sized_literals", u64::from(m.sized_literals));
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DiagnosticKind;

    const PACKET: &str = include_str!("../samples/packet.sv");
    const ALU: &str = include_str!("../samples/alu.sv");
    const INHERIT: &str = include_str!("../samples/inherit.sv");

    fn source(name: &str, text: &str) -> InputUnit {
        InputUnit::Source {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn packet_sample_translates() {
        let unit = translate_source("packet.sv", PACKET, &TranslatorConfig::default());
        assert!(unit.ok);
        assert_eq!(unit.statistics["classes"], 1);
        assert_eq!(unit.statistics["enums"], 1);
        let text = &unit.text;
        assert!(text.contains("class PktKind(IntEnum):"));
        assert!(text.contains("class Packet:"));
        assert!(text.contains("self.len = vsc.rand_bit_t(8)"));
        assert!(text.contains("self.signed_val = vsc.rand_int_t(16)"));
        assert!(text.contains("vsc.dist(self.len, ["));
        assert!(text.contains("vsc.weight(vsc.rng(0, 3), 60),"));
        assert!(text.contains("if __name__ == '__main__':"));
        let signed = unit.classes[0].fields.iter().find(|f| f.name == "signed_val").unwrap();
        assert_eq!(signed.category(), crate::ir::TypeCategory::Integer);
        assert_eq!(signed.width, Some(16));
        assert!(signed.signed);
        assert!(unit.statistics["source.dist"] >= 1);
        assert!(unit.statistics["emitted.dist"] >= 1);
        assert!(codegen::check_leaks(text).is_empty());
    }

    #[test]
    fn parallel_output_matches_sequential() {
        let units = vec![source("packet.sv", PACKET), source("alu.sv", ALU), source("inherit.sv", INHERIT)];
        let sequential = translate(&units, &TranslatorConfig::default(), &[]).unwrap();
        let parallel_config = TranslatorConfig {
            jobs: 4,
            class_jobs: 3,
            ..Default::default()
        };
        for _ in 0..4 {
            let parallel = translate(&units, &parallel_config, &[]).unwrap();
            assert_eq!(parallel.text, sequential.text);
            assert_eq!(parallel.warnings, sequential.warnings);
            assert_eq!(parallel.review_flags, sequential.review_flags);
            assert_eq!(parallel.statistics, sequential.statistics);
        }
        assert!(sequential.text.find("# >>> source: packet.sv").unwrap() < sequential.text.find("# >>> source: alu.sv").unwrap());
    }

    #[test]
    fn forward_and_missing_bases() {
        let unit = translate_source("inherit.sv", INHERIT, &TranslatorConfig::default());
        let names: Vec<&str> = unit.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["base_item", "derived_item", "orphan"]);
        assert_eq!(unit.classes[1].base.as_ref().unwrap().resolution, BaseResolution::Forward);
        assert_eq!(unit.classes[2].base.as_ref().unwrap().resolution, BaseResolution::Missing);
        assert!(unit.text.contains("class DerivedItem(BaseItem):\n"));
        assert!(unit.text.contains("class Orphan:\n"));
        assert!(unit.text.find("class BaseItem:").unwrap() < unit.text.find("class DerivedItem(").unwrap());
        assert!(unit.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Warning && d.message.contains("declared later")));
        assert!(unit.diagnostics.iter().any(|d| d.kind == DiagnosticKind::ManualReview && d.message.contains("not declared")));
        // inherited field, no undeclared-field warning
        assert!(!unit.diagnostics.iter().any(|d| d.message.contains("`id` is not a declared field")));
    }

    #[test]
    fn targets_keep_bases_and_warn_on_unknown() {
        let units = vec![source("inherit.sv", INHERIT)];
        let targets = vec!["derived_item".to_string(), "nope".to_string()];
        let result = translate(&units, &TranslatorConfig::default(), &targets).unwrap();
        let names: Vec<&str> = result.units[0].classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["base_item", "derived_item"]);
        assert!(result.warnings.iter().any(|d| d.message.contains("`nope`")));
    }

    #[test]
    fn unreadable_unit_is_isolated() {
        let units = vec![
            InputUnit::File(PathBuf::from("/definitely/not/here.sv")),
            source("alu.sv", ALU),
        ];
        let result = translate(&units, &TranslatorConfig::default(), &[]).unwrap();
        assert!(result.is_usable());
        assert!(!result.units[0].ok);
        assert!(result.review_flags[0].message.contains("here.sv"));
        assert!(!result.text.contains("here.sv"));
        assert!(result.text.contains("class Alu"));
    }

    #[test]
    fn source_without_declarations_is_not_usable() {
        let result = translate(&[source("empty.sv", "// nothing here\nmodule m; endmodule\n")], &TranslatorConfig::default(), &[]).unwrap();
        assert!(!result.is_usable());
        assert!(!result.review_flags.is_empty());
    }

    #[test]
    fn unterminated_container_is_skipped_not_fatal() {
        let text = "class good; rand bit a; constraint c { a == 1; } endclass\nclass bad; rand bit b; constraint c { b == 1;\n";
        let unit = translate_source("broken.sv", text, &TranslatorConfig::default());
        assert!(unit.ok);
        assert_eq!(unit.classes.len(), 1);
        assert!(unit.diagnostics.iter().any(|d| d.kind == DiagnosticKind::ManualReview));
    }
}
