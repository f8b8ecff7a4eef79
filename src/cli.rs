//! CLI: SV sources → (translate | inspect)
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::config::TranslatorConfig;
use crate::engine::{self, InputUnit};
use crate::ir::{ClassDef, EnumDef};
use crate::report::{Diagnostic, TranslationResult, UnitOutput, render_report};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// translate SystemVerilog constraint classes into PyVSC (Python) suggestions for manual review
#[derive(Parser, Debug)]
#[command(name = "sv2pyvsc", version)]
pub struct CommandLineInterface {
    /// log filter: error, warn, info, debug, trace or a full directive (RUST_LOG wins when set)
    #[arg(long, short = 'l', global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// translate and write PyVSC text
    Translate(TranslateOut),
    /// print the parsed model (enums, classes, statements, diagnostics) as JSON
    Inspect(InspectOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// a file, a directory (every source file in it) or a quoted glob pattern
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// only emit these classes (their bases come along)
    #[arg(long = "class", value_name = "NAME")]
    classes: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct TranslateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .py file for one input, or a directory for several (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// document each constraint with its SV source and metrics
    #[arg(short, long)]
    verbose: bool,

    /// do not echo the generated text to stdout when writing files
    #[arg(short, long)]
    quiet: bool,

    /// input units translated in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// classes translated in parallel within one unit
    #[arg(long)]
    class_jobs: Option<usize>,

    /// mark runs of adjacent simple range checks as a group
    #[arg(long)]
    group_ranges: bool,

    /// leave out the `if __name__ == '__main__'` usage block
    #[arg(long)]
    no_scaffold: bool,

    /// print the human-readable review report to stderr
    #[arg(long)]
    report: bool,

    /// write the machine-readable report here
    #[arg(long, value_name = "PATH")]
    report_json: Option<PathBuf>,

    /// disable colors in the report
    #[arg(long)]
    no_color: bool,
}

#[derive(clap::Parser, Debug)]
struct InspectOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Serialize)]
struct Inspection<'a> {
    unit: &'a str,
    enums: &'a [EnumDef],
    classes: &'a [ClassDef],
    diagnostics: &'a [Diagnostic],
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_config(&self) -> anyhow::Result<TranslatorConfig> {
        match &self.config {
            Some(path) => Ok(TranslatorConfig::load(path)?),
            None => Ok(TranslatorConfig::default()),
        }
    }

    fn units(&self, config: &TranslatorConfig) -> anyhow::Result<Vec<InputUnit>> {
        let paths = resolve_inputs(&self.input, config).context("failed to resolve input paths")?;
        Ok(paths.into_iter().map(InputUnit::File).collect())
    }
}

impl TranslateOut {
    fn apply_overrides(&self, mut config: TranslatorConfig) -> TranslatorConfig {
        config.verbose |= self.verbose;
        config.group_adjacent_ranges |= self.group_ranges;
        if self.no_scaffold {
            config.usage_scaffold = false;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(class_jobs) = self.class_jobs {
            config.class_jobs = class_jobs;
        }
        config
    }

    fn run(&self) -> anyhow::Result<bool> {
        if self.no_color {
            colored::control::set_override(false);
        }
        let config = self.apply_overrides(self.input_settings.load_config()?);
        let units = self.input_settings.units(&config)?;
        let result = engine::translate(&units, &config, &self.input_settings.classes)?;

        match &self.out {
            Some(out) => {
                write_outputs(out, &result.units)?;
                if !self.quiet {
                    println!("{}", result.text);
                }
            }
            None => println!("{}", result.text),
        }

        if self.report {
            eprintln!("{}", render_report(&result, Local::now()));
        } else if !self.quiet {
            eprintln!("{}", summary(&result));
        }
        if let Some(path) = &self.report_json {
            let json = serde_json::to_string_pretty(&result)?;
            write_file(path, &json)?;
        }
        Ok(result.is_usable())
    }
}

impl InspectOut {
    fn run(&self) -> anyhow::Result<bool> {
        let config = self.input_settings.load_config()?;
        let units = self.input_settings.units(&config)?;
        let result = engine::translate(&units, &config, &self.input_settings.classes)?;
        let inspections: Vec<Inspection> = result
            .units
            .iter()
            .map(|u| Inspection {
                unit: &u.name,
                enums: &u.enums,
                classes: &u.classes,
                diagnostics: &u.diagnostics,
            })
            .collect();
        let json = serde_json::to_string_pretty(&inspections)?;
        match &self.out {
            Some(out) => write_file(out, &json)?,
            None => println!("{json}"),
        }
        Ok(result.is_usable())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
    /// Exit code 0 when at least one unit produced something, 1 otherwise.
    pub fn run(&self) -> anyhow::Result<ExitCode> {
        let usable = self.execute()?;
        Ok(if usable { ExitCode::SUCCESS } else { ExitCode::from(1) })
    }
    fn execute(&self) -> anyhow::Result<bool> {
        match &self.cmd {
            Command::Translate(target) => target.run(),
            Command::Inspect(target) => target.run(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Literal files pass through; directories expand to their source files (sorted);
/// glob patterns must match at least one file.
fn resolve_inputs<I>(patterns: I, config: &TranslatorConfig) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                let path = entry?;
                if path.is_file() {
                    matched_any = true;
                    out.push(path);
                }
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else if Path::new(pattern).is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(pattern)
                .with_context(|| format!("failed to list directory {pattern}"))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && config.is_source_file(p))
                .collect();
            if found.is_empty() {
                bail!("directory {pattern} holds no files with extensions {:?}", config.source_extensions);
            }
            found.sort();
            out.extend(found);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    Ok(out)
}

/// One `.py` per usable unit. `out` is a file only when there is exactly one unit.
fn write_outputs(out: &Path, units: &[UnitOutput]) -> anyhow::Result<()> {
    let usable: Vec<&UnitOutput> = units.iter().filter(|u| u.ok).collect();
    let into_dir = out.is_dir() || units.len() > 1;
    if !into_dir {
        if let Some(unit) = usable.first() {
            write_file(out, &unit.text)?;
        }
        return Ok(());
    }
    if out.exists() && !out.is_dir() {
        bail!("{} must be a directory when translating several inputs", out.display());
    }
    std::fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut taken = HashSet::new();
    for unit in usable {
        let stem = unit
            .path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| unit.name.clone());
        let mut file_name = format!("{stem}.py");
        let mut n = 1;
        while !taken.insert(file_name.clone()) {
            n += 1;
            file_name = format!("{stem}_{n}.py");
        }
        write_file(&out.join(file_name), &unit.text)?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn summary(result: &TranslationResult) -> String {
    format!(
        "translated {} unit(s), {} class(es): {} warning(s), {} manual review flag(s), {} ambiguity flag(s)",
        result.units.len(),
        result.statistics.get("classes").copied().unwrap_or(0),
        result.warnings.len(),
        result.review_flags.len(),
        result.ambiguities.len()
    )
}
