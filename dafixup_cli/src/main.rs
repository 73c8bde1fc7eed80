use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use itertools::Itertools;
use serde::Serialize;
use tracing::warn;

use dafixup::agent;
use dafixup::definitions::PatchDefinition;
use dafixup::descriptor::{CpuArch, FileSegment};
use dafixup::host::FsImageSource;
use dafixup::resolver;
use dafixup::scanner::{scan_pattern, Pattern};
use dafixup::template::TemplatePair;

#[derive(Parser)]
#[command(name = "dafixup", version)]
struct Cli {
    /// Verbose diagnostics (the -dafxdbg equivalent)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    Resolve(CommandResolve),
    Scan(CommandScan),
}

/// Resolve wildcarded patch templates against a binary and print the
/// concrete find/replace pair the patcher would apply
#[derive(Parser)]
struct CommandResolve {
    /// Target executable (defaults to the DiskArbitrationAgent binary)
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Find pattern overriding the built-in signature
    #[arg(long, requires = "replace")]
    find: Option<String>,

    /// Replace pattern overriding the built-in signature
    #[arg(long, requires = "find")]
    replace: Option<String>,

    /// Resolve every entry of a JSON patch definition file instead
    #[arg(long, conflicts_with_all = ["target", "find", "replace"])]
    definitions: Option<PathBuf>,

    /// Emit machine readable JSON
    #[arg(long)]
    json: bool,
}

/// Scan a binary for patterns, listing every match offset
#[derive(Parser)]
struct CommandScan {
    /// Binary to scan
    target: PathBuf,

    /// A pattern to scan for (can be specified multiple times)
    #[arg(short, long, required = true, value_parser(|s: &_| Pattern::new(s)))]
    pattern: Vec<Pattern>,

    /// Annotate match offsets with the containing section
    #[arg(long)]
    sections: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve(command) => resolve(command),
        Commands::Scan(command) => scan(command),
    }
}

struct Job {
    path: PathBuf,
    templates: TemplatePair,
    arch: CpuArch,
    segment: FileSegment,
}

#[derive(Serialize)]
struct ResolvedReport {
    path: PathBuf,
    arch: CpuArch,
    segment: FileSegment,
    offset: usize,
    wildcard: usize,
    observed: u8,
    find: String,
    replace: String,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).join(" ")
}

fn resolve(command: CommandResolve) -> Result<()> {
    let jobs = if let Some(path) = &command.definitions {
        let data = fs::read(path)
            .with_context(|| format!("failed to read definitions {}", path.display()))?;
        let defs: Vec<PatchDefinition> = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse definitions {}", path.display()))?;
        defs.into_iter()
            .map(|def| {
                Ok(Job {
                    templates: def.templates()?,
                    path: def.path,
                    arch: def.arch,
                    segment: def.segment,
                })
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        let templates = match (&command.find, &command.replace) {
            (Some(find), Some(replace)) => TemplatePair::new(find, replace)?,
            _ => agent::templates()?,
        };
        vec![Job {
            path: command
                .target
                .unwrap_or_else(|| PathBuf::from(agent::AGENT_PATH)),
            templates,
            arch: CpuArch::X86_64,
            segment: FileSegment::default(),
        }]
    };

    let source = FsImageSource;
    let mut reports = vec![];
    let mut failures = 0;
    for job in &jobs {
        match resolver::resolve_image(&source, &job.path, &job.templates) {
            Ok(resolved) => {
                if !command.json {
                    println!(
                        "{}: match at {}, operand {}",
                        job.path.display().to_string().bold(),
                        format!("{:#x}", resolved.offset).green(),
                        format!("{:#04x}", resolved.find[resolved.wildcard]).green(),
                    );
                    println!("  find:    {}", hex(&resolved.find));
                    println!("  replace: {}", hex(&resolved.replace));
                }
                reports.push(ResolvedReport {
                    path: job.path.clone(),
                    arch: job.arch,
                    segment: job.segment,
                    offset: resolved.offset,
                    wildcard: resolved.wildcard,
                    observed: resolved.find[resolved.wildcard],
                    find: hex(&resolved.find),
                    replace: hex(&resolved.replace),
                });
            }
            Err(err) => {
                eprintln!("{}", err.to_string().red());
                failures += 1;
            }
        }
    }

    if command.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if failures > 0 {
        bail!("{failures} of {} templates failed to resolve", jobs.len());
    }
    Ok(())
}

struct SectionIndex {
    ranges: Vec<(std::ops::Range<usize>, String)>,
}

impl SectionIndex {
    fn build(data: &[u8]) -> Option<Self> {
        use object::{Object, ObjectSection};

        let obj = match object::File::parse(data) {
            Ok(obj) => obj,
            Err(err) => {
                warn!("not annotating sections: {err}");
                return None;
            }
        };
        let mut ranges = vec![];
        for section in obj.sections() {
            let Some((start, len)) = section.file_range() else {
                continue;
            };
            let name = section.name().unwrap_or("<unnamed>").to_string();
            let label = format!("{name} ({:?})", section.kind());
            ranges.push((start as usize..(start + len) as usize, label));
        }
        Some(Self { ranges })
    }

    fn locate(&self, offset: usize) -> Option<&str> {
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(&offset))
            .map(|(_, label)| label.as_str())
    }
}

fn scan(command: CommandScan) -> Result<()> {
    let data = fs::read(&command.target)
        .with_context(|| format!("failed to read binary {}", command.target.display()))?;

    let sections = command
        .sections
        .then(|| SectionIndex::build(&data))
        .flatten();

    let patterns: Vec<&Pattern> = command.pattern.iter().collect();
    let bins = scan_pattern(&patterns, &data);

    let mut total = 0;
    for (pattern, matches) in patterns.iter().zip(&bins) {
        println!("{}", pattern.to_string().bold());
        if matches.is_empty() {
            println!("  {}", "no matches".red());
            continue;
        }
        total += matches.len();
        for offset in matches {
            match sections.as_ref().and_then(|s| s.locate(*offset)) {
                Some(label) => {
                    println!("  {} {}", format!("{offset:#010x}").green(), label.dimmed())
                }
                None => println!("  {}", format!("{offset:#010x}").green()),
            }
        }
    }
    println!(
        "{total} match{} across {} pattern{}",
        if total == 1 { "" } else { "es" },
        patterns.len(),
        if patterns.len() == 1 { "" } else { "s" },
    );
    Ok(())
}
