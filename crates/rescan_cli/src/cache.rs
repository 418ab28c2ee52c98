//! `rescan cache`: inspect and maintain the analysis cache.
//!
//! Every subcommand opens the project's cache, performs one operation and
//! prints a short report. A missing cache directory is an empty cache.

use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use rescan_cache::{Cache, CacheReport, ClearTarget, Namespace, NamespaceKind};
use rescan_common::ContentHash;
use serde::Serialize;

use crate::project::Project;
use crate::{CacheArgs, CacheCommand, ClearType, GlobalArgs};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Runs `rescan cache <subcommand>` against stdout and stdin.
pub fn run(
    args: &CacheArgs,
    project: &Project,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let stdin = std::io::stdin();
    execute(args, project, global, &mut stdout.lock(), &mut stdin.lock())
}

/// Runs a cache subcommand, writing its report to `out` and reading any
/// confirmation from `input`. Returns the process exit code.
pub fn execute(
    args: &CacheArgs,
    project: &Project,
    global: &GlobalArgs,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut cache = project.open_cache();

    match args.command {
        CacheCommand::Stats { json } => {
            let report = cache.report();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                render_report(&report, out)?;
            }
        }
        CacheCommand::Clear {
            kind,
            ref pattern,
            yes,
        } => {
            let target = clear_target(kind, pattern.as_deref())?;
            let what = describe_target(&target);
            if !yes && !confirm(&what, cache.cache_dir(), out, input)? {
                writeln!(out, "aborted")?;
                return Ok(0);
            }
            let removed = cache.clear(&target);
            if !global.quiet {
                writeln!(out, "Removed {} from {what}", entries(removed))?;
            }
        }
        CacheCommand::List { json } => list(&cache, json, global, out)?,
        CacheCommand::Invalidate { ref path } => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            let removed = cache.invalidate_file(&path);
            if !global.quiet {
                writeln!(out, "Removed {} for {}", entries(removed), path.display())?;
            }
        }
        CacheCommand::Optimize { max_age_days } => {
            let days = max_age_days.unwrap_or(project.config.cache.max_age_days);
            let max_age = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
            let removed = cache.optimize(max_age);
            if !global.quiet {
                writeln!(
                    out,
                    "Removed {} older than {days} day{}",
                    entries(removed),
                    if days == 1 { "" } else { "s" }
                )?;
            }
        }
    }

    cache.flush();
    Ok(0)
}

/// Maps `--type` and `--pattern` to a clear target. `--pattern` wins.
fn clear_target(
    kind: ClearType,
    pattern: Option<&str>,
) -> Result<ClearTarget, Box<dyn std::error::Error>> {
    if let Some(name) = pattern {
        // Reuse the namespace validation for the name.
        Namespace::pattern(name)?;
        return Ok(ClearTarget::Pattern(name.to_string()));
    }
    Ok(match kind {
        ClearType::All => ClearTarget::All,
        ClearType::Parse => ClearTarget::Kind(NamespaceKind::Parse),
        ClearType::Patterns => ClearTarget::Kind(NamespaceKind::Patterns),
        ClearType::Analysis => ClearTarget::Kind(NamespaceKind::Analysis),
    })
}

fn describe_target(target: &ClearTarget) -> String {
    match target {
        ClearTarget::All => "all namespaces".to_string(),
        ClearTarget::Kind(kind) => format!("the {kind} namespace"),
        ClearTarget::Pattern(name) => format!("pattern:{name}"),
    }
}

/// Asks for a yes/no answer. Anything but `y`/`yes` (including EOF) is no.
fn confirm(
    what: &str,
    cache_dir: &Path,
    out: &mut dyn Write,
    input: &mut dyn BufRead,
) -> std::io::Result<bool> {
    write!(out, "Clear {what} in {}? [y/N] ", cache_dir.display())?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[derive(Serialize)]
struct TrackedFile {
    path: String,
    digest: ContentHash,
}

fn list(
    cache: &Cache,
    json: bool,
    global: &GlobalArgs,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let files: Vec<TrackedFile> = cache
        .tracked_files()
        .into_iter()
        .map(|(path, digest)| TrackedFile { path, digest })
        .collect();

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&files)?)?;
        return Ok(());
    }
    if files.is_empty() {
        if !global.quiet {
            writeln!(out, "No tracked files")?;
        }
        return Ok(());
    }
    for file in &files {
        writeln!(out, "{}  {}", file.digest, file.path)?;
    }
    if !global.quiet {
        writeln!(out, "{} tracked file{}", files.len(), if files.len() == 1 { "" } else { "s" })?;
    }
    Ok(())
}

fn render_report(report: &CacheReport, out: &mut dyn Write) -> std::io::Result<()> {
    let stats = &report.stats;
    writeln!(out, "Cache directory: {}", report.cache_dir.display())?;
    writeln!(out, "Hits:            {}", stats.hits)?;
    writeln!(out, "Misses:          {}", stats.misses)?;
    writeln!(out, "Writes:          {}", stats.writes)?;
    writeln!(out, "Invalidations:   {}", stats.invalidations)?;
    writeln!(out, "Hit rate:        {:.1}%", stats.hit_rate)?;
    writeln!(out, "Tracked files:   {}", report.tracked_files)?;
    writeln!(out)?;
    writeln!(out, "{:<24} {:>8} {:>12}", "Namespace", "Entries", "Size")?;
    for usage in &report.namespaces {
        writeln!(
            out,
            "{:<24} {:>8} {:>12}",
            usage.name,
            usage.entries,
            format_bytes(usage.bytes)
        )?;
        if usage.name == NamespaceKind::Patterns.dir_name() {
            for pattern in &report.patterns {
                writeln!(
                    out,
                    "  {:<22} {:>8} {:>12}",
                    pattern.name,
                    pattern.entries,
                    format_bytes(pattern.bytes)
                )?;
            }
        }
    }
    writeln!(out, "Total size:      {}", format_bytes(report.total_bytes))
}

fn entries(count: usize) -> String {
    if count == 1 {
        "1 entry".to_string()
    } else {
        format!("{count} entries")
    }
}

/// Formats a byte count with binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
