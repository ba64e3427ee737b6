//! promptpack - Assemble token-budgeted repository context for LLM prompts.
//!
//! Usage:
//!   promptpack build --repo DIR     Build a prompt from repository files
//!   promptpack tree [PATH]          Show the scanned repository tree
//!   promptpack providers            List context providers
//!   promptpack --help               Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use promptpack_assemble::{
    EncoderCache, FileContextProvider, InstructionEngine, ProviderOptions, ProviderSet,
    SnippetSelection, compose_prompt,
};
use promptpack_core::{AppConfig, FileTree, NodeId, load_config};
use promptpack_scan::{RepoScanner, ScanConfig};

#[derive(Parser)]
#[command(
    name = "promptpack",
    version,
    about = "Assemble token-budgeted repository context for LLM prompts",
    long_about = "promptpack scans a repository, selects files with include and exclude \
                  globs, redacts secrets and packs the result into a markup document \
                  that fits a token budget.\n\n\
                  Logging goes to stderr and honours RUST_LOG."
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/promptpack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a prompt document
    Build(BuildArgs),

    /// Scan a repository and print its tree
    Tree {
        /// Repository to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,
    },

    /// List registered context providers
    Providers,
}

#[derive(Args)]
struct BuildArgs {
    /// Repository root
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Include glob (repeatable)
    #[arg(short, long = "include", value_name = "GLOB")]
    include: Vec<String>,

    /// Exclude glob (repeatable)
    #[arg(short, long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Token budget (defaults to the configured maximum)
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Objective snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    objective: Vec<String>,
    /// Custom objective text
    #[arg(long, value_name = "TEXT")]
    objective_custom: Option<String>,

    /// Scope snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    scope: Vec<String>,
    /// Custom scope text
    #[arg(long, value_name = "TEXT")]
    scope_custom: Option<String>,

    /// Requirements snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    requirements: Vec<String>,
    /// Custom requirements text
    #[arg(long, value_name = "TEXT")]
    requirements_custom: Option<String>,

    /// Constraints snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    constraints: Vec<String>,
    /// Custom constraints text
    #[arg(long, value_name = "TEXT")]
    constraints_custom: Option<String>,

    /// Process snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    process: Vec<String>,
    /// Custom process text
    #[arg(long, value_name = "TEXT")]
    process_custom: Option<String>,

    /// Output format snippet (repeatable)
    #[arg(long, value_name = "NAME")]
    output_format: Vec<String>,
    /// Custom output format text
    #[arg(long, value_name = "TEXT")]
    output_format_custom: Option<String>,

    /// Follow-up question (repeatable)
    #[arg(long, value_name = "TEXT")]
    question: Vec<String>,

    /// Use the git diff instead of repository files
    #[arg(long)]
    git_diff: bool,

    /// With --git-diff, use staged changes
    #[arg(long, requires = "git_diff")]
    staged: bool,

    /// Scanner threads (0 = serial)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Print the full result as JSON instead of the prompt
    #[arg(long)]
    json: bool,
}

impl BuildArgs {
    fn selection(&self) -> SnippetSelection {
        let mut selection = SnippetSelection::new();
        let categories = [
            ("Objective", &self.objective, &self.objective_custom),
            ("Scope", &self.scope, &self.scope_custom),
            ("Requirements", &self.requirements, &self.requirements_custom),
            ("Constraints", &self.constraints, &self.constraints_custom),
            ("Process", &self.process, &self.process_custom),
            ("Output", &self.output_format, &self.output_format_custom),
        ];
        for (category, names, custom) in categories {
            for name in names {
                selection.select(category, name.as_str());
            }
            if let Some(text) = custom {
                selection.set_custom(category, text.as_str());
            }
        }
        selection
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(path = ?cli.config, "Configuration loaded");

    match cli.command {
        Command::Build(args) => run_build(&config, &args)?,
        Command::Tree { path, depth } => run_tree(&config, &path, depth)?,
        Command::Providers => {
            for name in build_providers(&config)?.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Providers offered by this binary.
fn build_providers(config: &AppConfig) -> Result<ProviderSet> {
    let cache = Arc::new(EncoderCache::new());
    let mut providers = ProviderSet::new();
    providers.register(Box::new(FileContextProvider::new(
        config.clone(),
        Arc::clone(&cache),
    )))?;
    #[cfg(feature = "git")]
    providers.register(Box::new(promptpack_assemble::GitDiffProvider::new(
        config.clone(),
        cache,
    )))?;
    Ok(providers)
}

/// Build a prompt and write it out.
fn run_build(config: &AppConfig, args: &BuildArgs) -> Result<()> {
    let providers = build_providers(config)?;
    let name = if args.git_diff { "git_diff" } else { "files" };
    let provider = providers
        .require(name)
        .context("Provider not available in this build")?;

    let mut options = ProviderOptions::from_config(&args.repo, config);
    options.include = args.include.clone();
    options.exclude = args.exclude.clone();
    options.staged = args.staged;
    options.threads = args.threads;
    if let Some(max_tokens) = args.max_tokens {
        options.max_tokens = max_tokens;
    }

    let result = provider
        .get_context(&options, &CancellationToken::new())
        .with_context(|| format!("Failed to build context for {}", args.repo.display()))?;
    if result.is_cancelled() {
        bail!("Context assembly was cancelled: {}", result.budget_note);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&result)?;
        return write_output(args.output.as_deref(), &json);
    }

    let engine = InstructionEngine::from_config(config);
    let instructions = engine.render(&args.selection(), &args.question);
    let prompt = compose_prompt(&instructions, &result.document);
    write_output(args.output.as_deref(), &prompt)?;

    let estimated = if result.estimated { " (estimated)" } else { "" };
    eprintln!(
        "{} files, {} / {} tokens{}, {}",
        result.included_files.len(),
        result.total_tokens,
        options.max_tokens,
        estimated,
        format_size(prompt.len() as u64)
    );
    if !result.skipped_files.is_empty() {
        eprintln!("{} files skipped", result.skipped_files.len());
    }
    if !result.budget_note.is_empty() {
        eprintln!("{}", result.budget_note);
    }

    Ok(())
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Prompt written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Scan a repository and print its tree.
fn run_tree(config: &AppConfig, path: &Path, max_depth: u32) -> Result<()> {
    eprintln!("Scanning {}...", path.display());

    let scan_config = ScanConfig::new(path).with_ignore_patterns(config.ignore_patterns.iter().cloned());
    let tree = RepoScanner::new()
        .scan(&scan_config, &CancellationToken::new())
        .context("Scan failed")?;

    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        tree.root_path.display(),
        format_size(tree.total_size())
    );
    println!(
        " {} files, {} directories, {} ignored, {} symlinks skipped",
        tree.stats.total_files,
        tree.stats.total_dirs,
        tree.stats.ignored_entries,
        tree.stats.skipped_symlinks
    );
    println!(" Scanned in {:.2}s", tree.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_node(&tree, tree.root_id(), 0, max_depth);

    if tree.has_warnings() {
        println!();
        println!("{} warning(s) during scan", tree.warnings.len());
    }

    Ok(())
}

/// Print a node and its children.
fn print_node(tree: &FileTree, id: NodeId, depth: u32, max_depth: u32) {
    let node = &tree[id];
    let indent = "  ".repeat(depth as usize);

    if node.is_dir() {
        let name = if depth == 0 {
            tree.root_path.display().to_string()
        } else {
            node.name.to_string()
        };
        println!("{indent}▼ {name}/");
        if depth < max_depth {
            for child in &node.children {
                print_node(tree, *child, depth + 1, max_depth);
            }
        } else if !node.children.is_empty() {
            println!("{indent}    ... {} entries", node.children.len());
        }
    } else {
        println!("{indent}  {:<40} {:>10}", node.name, format_size(node.size));
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
