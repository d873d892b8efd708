//! DC-009: CLI subcommands (init, validate, fmt, show, fingerprint).

use crate::core::{grammar, hasher, lint, parser, policy, render, types};
use clap::{Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Starter file written by `init`.
pub const STARTER: &str = r#"provider "aws" {
  region = "us-west-2"
}

resource "aws_datapipeline_pipeline" "test_pipeline" {
  name = uuid()
}
"#;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter main.tf
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Load a declaration file and run lints
    Validate {
        /// Path to the declaration file
        #[arg(short, long, default_value = "main.tf")]
        file: PathBuf,

        /// Lint policy (YAML)
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },

    /// Rewrite a declaration file in canonical layout
    Fmt {
        /// Path to the declaration file
        #[arg(short, long, default_value = "main.tf")]
        file: PathBuf,

        /// Fail if the file is not canonical instead of rewriting it
        #[arg(long)]
        check: bool,

        /// Allow rewriting a file that contains comments (they are dropped)
        #[arg(long)]
        strip_comments: bool,

        /// Lint policy (YAML), for extra functions
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },

    /// Print the loaded record
    Show {
        /// Path to the declaration file
        #[arg(short, long, default_value = "main.tf")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Lint policy (YAML), for extra functions
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },

    /// Print the BLAKE3 fingerprint of the canonical rendering
    Fingerprint {
        /// Path to the declaration file
        #[arg(short, long, default_value = "main.tf")]
        file: PathBuf,

        /// Lint policy (YAML), for extra functions
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },
}

/// Output format for `show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file, policy } => cmd_validate(&file, policy.as_deref()),
        Commands::Fmt {
            file,
            check,
            strip_comments,
            policy,
        } => cmd_fmt(&file, check, strip_comments, policy.as_deref()),
        Commands::Show {
            file,
            format,
            policy,
        } => cmd_show(&file, format, policy.as_deref()),
        Commands::Fingerprint { file, policy } => cmd_fingerprint(&file, policy.as_deref()),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let file = path.join("main.tf");
    if file.exists() {
        return Err(format!("{} already exists", file.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&file, STARTER)
        .map_err(|e| format!("cannot write {}: {}", file.display(), e))?;
    println!("Initialized: {}", file.display());
    Ok(())
}

fn load_policy(path: Option<&Path>) -> Result<policy::Policy, String> {
    match path {
        Some(p) => policy::parse_policy_file(p),
        None => Ok(policy::Policy::default()),
    }
}

/// Load a file and prefix load errors with its path.
fn load_record(
    file: &Path,
    options: &parser::LoadOptions,
) -> Result<types::DeclarationRecord, String> {
    parser::load_file(file, options).map_err(|e| match e {
        types::LoadError::Io { .. } => e.to_string(),
        other => format!("{}: {}", file.display(), other),
    })
}

fn cmd_validate(file: &Path, policy_path: Option<&Path>) -> Result<(), String> {
    let policy = load_policy(policy_path)?;
    let record = load_record(file, &policy.load_options())?;
    let findings = lint::validate_record(&record, &policy);

    for finding in &findings {
        eprintln!("  {}", finding);
    }
    if lint::has_errors(&findings) {
        let errors = findings
            .iter()
            .filter(|f| f.severity == lint::Severity::Error)
            .count();
        return Err(format!("{} lint error(s)", errors));
    }

    println!(
        "OK: provider {} ({}), {} resources, {} warning(s)",
        record.provider().name,
        record.provider().region,
        record.len(),
        findings.len()
    );
    Ok(())
}

fn cmd_fmt(
    file: &Path,
    check: bool,
    strip_comments: bool,
    policy_path: Option<&Path>,
) -> Result<(), String> {
    let policy = load_policy(policy_path)?;
    let source = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {}", file.display(), e))?;
    let record = parser::load_with(&source, &policy.load_options())
        .map_err(|e| format!("{}: {}", file.display(), e))?;
    let canonical = render::render(&record);

    if canonical == source {
        println!("{}: already formatted", file.display());
        return Ok(());
    }
    if check {
        return Err(format!("{} is not formatted", file.display()));
    }
    if !strip_comments && grammar::has_comments(&source) {
        return Err(format!(
            "{} contains comments that formatting would drop (use --strip-comments)",
            file.display()
        ));
    }

    write_atomic(file, &canonical)?;
    tracing::info!(file = %file.display(), "rewrote in canonical layout");
    println!("{}: formatted", file.display());
    Ok(())
}

/// Replace `file` via a uniquely named temp file in the same directory.
/// The temp file is removed if anything fails before the rename.
fn write_atomic(file: &Path, content: &str) -> Result<(), String> {
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| format!("cannot create temp file in {}: {}", dir.display(), e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("cannot write {}: {}", tmp.path().display(), e))?;
    if let Ok(meta) = std::fs::metadata(file) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| format!("cannot set permissions on {}: {}", tmp.path().display(), e))?;
    }
    tmp.persist(file)
        .map_err(|e| format!("cannot replace {}: {}", file.display(), e.error))?;
    Ok(())
}

/// Serialize a record for `show`.
pub fn format_record(
    record: &types::DeclarationRecord,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(record).map_err(|e| format!("JSON error: {}", e))
        }
        OutputFormat::Yaml => {
            serde_yaml_ng::to_string(record).map_err(|e| format!("YAML error: {}", e))
        }
    }
}

fn cmd_show(file: &Path, format: OutputFormat, policy_path: Option<&Path>) -> Result<(), String> {
    let policy = load_policy(policy_path)?;
    let record = load_record(file, &policy.load_options())?;
    let out = format_record(&record, format)?;
    println!("{}", out.trim_end());
    Ok(())
}

fn cmd_fingerprint(file: &Path, policy_path: Option<&Path>) -> Result<(), String> {
    let policy = load_policy(policy_path)?;
    let record = load_record(file, &policy.load_options())?;
    println!("{}  {}", hasher::fingerprint(&record), file.display());
    Ok(())
}
