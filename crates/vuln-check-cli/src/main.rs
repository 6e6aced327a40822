use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgAction, Parser};
use vuln_check_engine::{Engine, EngineOptions};
use vuln_check_host::{
    DebugLogWriter, FixturePackages, OsCommandRunner, OsPackageEnumerator, PackageEnumerator,
    StderrLogWriter, DEFAULT_MAX_DEPTH,
};
use vuln_check_types::{ReportEnvelope, RunMeta, ToolMeta, REPORT_SCHEMA, TOOL_NAME};

#[derive(Parser, Debug)]
#[command(
    name = "vuln-check",
    version,
    disable_version_flag = true,
    about = "Assess a host against a declarative vulnerability policy"
)]
struct Cli {
    /// Enable debug output on standard error.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Exit with status 2 on the first test whose master result disagrees
    /// with its expected result.
    #[arg(short = 'e', long = "enforce-expected")]
    enforce_expected: bool,

    /// Path to the policy document.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Use the fixture package table instead of querying the host.
    #[arg(short = 't', long = "test-hooks")]
    test_hooks: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Output form: human|grep|json.
    #[arg(short = 'o', long = "output")]
    output: Option<OutputArg>,

    /// Optional vuln-check.toml path.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug)]
enum OutputArg {
    Human,
    Grep,
    Json,
}

impl std::str::FromStr for OutputArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(OutputArg::Human),
            "grep" => Ok(OutputArg::Grep),
            "json" => Ok(OutputArg::Json),
            other => Err(format!("invalid output form: {}", other)),
        }
    }
}

/// Optional `vuln-check.toml`: defaults that CLI flags override.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct AppConfig {
    #[serde(default)]
    file: Option<PathBuf>,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default)]
    test_hooks: Option<bool>,
    #[serde(default)]
    output: Option<String>,
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from("vuln-check.toml");
            if p.exists() {
                p
            } else {
                return Ok(AppConfig::default());
            }
        }
    };
    let text = fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).with_context(|| "parse vuln-check.toml")?;
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    let file = cli
        .file
        .clone()
        .or_else(|| cfg.file.clone())
        .context("must specify a policy document (-f)")?;

    let output = match cli.output {
        Some(o) => o,
        None => match cfg.output.as_deref() {
            Some(s) => s.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            None => OutputArg::Human,
        },
    };

    let test_hooks = cli.test_hooks || cfg.test_hooks.unwrap_or(false);
    let enumerator: Box<dyn PackageEnumerator> = if test_hooks {
        Box::new(FixturePackages)
    } else {
        Box::new(OsPackageEnumerator::new(OsCommandRunner))
    };

    let options = EngineOptions {
        max_depth: cfg.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        debug: cli
            .debug
            .then(|| Arc::new(StderrLogWriter) as Arc<dyn DebugLogWriter>),
    };

    let doc = vuln_check_policy::load_document(&file)?;

    let started = Utc::now();
    let mut engine = Engine::with_options(enumerator, options);
    let analysis = engine
        .analyze(&doc)
        .with_context(|| format!("analyze {}", file.display()))?;
    let ended = Utc::now();

    match output {
        OutputArg::Human => {
            for record in &analysis.records {
                print!("{}", vuln_check_render::render_human(record));
            }
        }
        OutputArg::Grep => {
            for record in &analysis.records {
                print!("{}", vuln_check_render::render_grep(record));
            }
        }
        OutputArg::Json => {
            let duration_ms = ended.signed_duration_since(started).num_milliseconds().max(0) as u64;
            let report = ReportEnvelope {
                schema: REPORT_SCHEMA.to_string(),
                tool: ToolMeta {
                    name: TOOL_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                run: RunMeta {
                    started_at: started,
                    ended_at: Some(ended),
                    duration_ms: Some(duration_ms),
                },
                results: analysis.records.clone(),
            };
            println!("{}", vuln_check_render::render_json(&report)?);
        }
    }

    if cli.enforce_expected {
        if let Some(mismatch) = analysis.mismatches.first() {
            if mismatch.expected_error {
                eprintln!(
                    "vuln-check: test \"{}\" expected an error but evaluated cleanly",
                    mismatch.record.identifier
                );
            } else {
                eprintln!(
                    "vuln-check: test \"{}\" expected {} but evaluated to {}",
                    mismatch.record.identifier, mismatch.expected, mismatch.record.master_result
                );
            }
            std::process::exit(2);
        }
    }

    Ok(())
}
