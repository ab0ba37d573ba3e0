use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use talon::{
    Breakage, DocstringOptions, DocstringStyle, Loader, LoaderConfig, PythonVersion, builtin_extension, check,
    to_json,
};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Extract a structured model of a Python package's API from its sources.
#[derive(Parser)]
#[command(name = "talon", version, about, long_about = None)]
struct Cli {
    /// Print diagnostic information about this build and exit.
    #[arg(long, global = true)]
    debug_info: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load packages and dump their API model as JSON.
    Dump(DumpArgs),
    /// Compare a package against another revision and report breakages.
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct DumpArgs {
    /// Packages to load, by name or path.
    #[arg(required = true)]
    packages: Vec<String>,

    /// Paths to search packages in (repeatable).
    #[arg(short = 's', long = "search", value_name = "PATH")]
    search: Vec<PathBuf>,

    /// Also search packages on the Python interpreter's search path.
    #[arg(short = 'y', long = "sys-path")]
    sys_path: bool,

    /// Look for stubs-only packages (`name-stubs`) and merge them in.
    #[arg(short = 'B', long = "find-stubs-packages")]
    find_stubs_packages: bool,

    /// Comma-separated list of builtin extensions to load.
    #[arg(short = 'e', long = "extensions", value_name = "NAMES")]
    extensions: Option<String>,

    /// Forbid dynamic inspection fallbacks.
    #[arg(short = 'X', long = "no-inspection")]
    no_inspection: bool,

    /// Force dynamic inspection instead of static analysis.
    #[arg(short = 'x', long = "force-inspection", conflicts_with = "no_inspection")]
    force_inspection: bool,

    /// Dump every field, including parsed docstring sections.
    #[arg(short = 'f', long = "full")]
    full: bool,

    /// Output file; `{package}` expands to the package name.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,

    /// Docstring style to parse with.
    #[arg(short = 'd', long = "docstyle", value_name = "STYLE", default_value = "auto")]
    docstyle: StyleArg,

    /// Comma-separated `key=value` docstring parsing options.
    #[arg(short = 'D', long = "docopts", value_name = "OPTS")]
    docopts: Option<String>,

    /// Resolve aliases to their target objects before dumping.
    #[arg(short = 'r', long = "resolve-aliases")]
    resolve_aliases: bool,

    /// Also resolve aliases that are not exported through `__all__`.
    #[arg(short = 'I', long = "resolve-implicit")]
    resolve_implicit: bool,

    /// Load external packages while resolving aliases.
    #[arg(short = 'U', long = "resolve-external", overrides_with = "no_resolve_external")]
    resolve_external: bool,

    /// Never load external packages while resolving aliases.
    #[arg(long = "no-resolve-external", overrides_with = "resolve_external")]
    no_resolve_external: bool,

    /// Print loading statistics to stderr.
    #[arg(short = 'S', long = "stats")]
    stats: bool,

    /// Python version used to evaluate version guards (e.g. 3.11).
    #[arg(long = "python-version", value_name = "VERSION")]
    python_version: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'L', long = "log-level", value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Package to check.
    package: String,

    /// Git reference to check against.
    #[arg(short = 'a', long = "against", value_name = "REF", default_value = "HEAD")]
    against: String,

    /// Git reference to use as the base (defaults to the working tree).
    #[arg(short = 'b', long = "base-ref", value_name = "REF")]
    base_ref: Option<String>,

    /// Paths to search packages in (repeatable).
    #[arg(short = 's', long = "search", value_name = "PATH")]
    search: Vec<PathBuf>,

    /// Force colored output.
    #[arg(long = "color", overrides_with = "no_color")]
    color: bool,

    /// Disable colored output.
    #[arg(long = "no-color", overrides_with = "color")]
    no_color: bool,

    /// Also show non-breaking detail lines.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Output format.
    #[arg(short = 'f', long = "format", value_name = "FORMAT", default_value = "full")]
    format: CheckFormat,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'L', long = "log-level", value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Google,
    Numpy,
    Sphinx,
    Auto,
}

impl From<StyleArg> for DocstringStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Google => Self::Google,
            StyleArg::Numpy => Self::Numpy,
            StyleArg::Sphinx => Self::Sphinx,
            StyleArg::Auto => Self::Auto,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CheckFormat {
    /// One block per breakage.
    Full,
    /// One line per breakage.
    Oneline,
}

/// Counts warning-level events so `--stats` can report them.
#[derive(Clone, Default)]
struct WarningCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn init_logging(level: &str) -> WarningCounter {
    let counter = WarningCounter::default();
    let filter = level.parse::<LevelFilter>().unwrap_or(LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(counter.clone())
        .init();
    counter
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.debug_info {
        print_debug_info();
        return ExitCode::SUCCESS;
    }
    let result = match cli.command {
        Some(Commands::Dump(args)) => dump(args),
        Some(Commands::Check(args)) => run_check(&args),
        None => {
            eprintln!("error: a subcommand is required; try `talon --help`");
            return ExitCode::from(2);
        }
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_debug_info() {
    println!("talon {}", env!("CARGO_PKG_VERSION"));
    println!("- rustc target: {}", std::env::consts::ARCH);
    println!("- os: {}", std::env::consts::OS);
    println!("- parser: ruff_python_parser");
}

/// Paths the Python interpreter would search, for `--sys-path`.
fn interpreter_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(pythonpath) = std::env::var("PYTHONPATH") {
        paths.extend(std::env::split_paths(&pythonpath));
    }
    let output = Command::new("python3")
        .args(["-c", "import sys; print('\\n'.join(p for p in sys.path if p))"])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                paths.push(PathBuf::from(line));
            }
        }
        _ => warn!("could not query the Python interpreter for its search path"),
    }
    paths
}

fn build_config(args: &DumpArgs) -> Result<LoaderConfig> {
    let mut search_paths = args.search.clone();
    if search_paths.is_empty() {
        search_paths.push(PathBuf::from("."));
    }
    if args.sys_path {
        search_paths.extend(interpreter_search_paths());
    }
    let mut docstring_options = DocstringOptions::default();
    if let Some(docopts) = &args.docopts {
        for pair in docopts.split(',').filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("invalid --docopts entry '{pair}', expected key=value");
            };
            docstring_options.set(key.trim(), value.trim());
        }
    }
    let python_version = match &args.python_version {
        Some(text) => {
            PythonVersion::parse(text).with_context(|| format!("invalid --python-version '{text}'"))?
        }
        None => PythonVersion::default(),
    };
    Ok(LoaderConfig {
        search_paths,
        find_stubs_packages: args.find_stubs_packages,
        allow_inspection: !args.no_inspection,
        force_inspection: args.force_inspection,
        docstring_style: args.docstyle.into(),
        docstring_options,
        resolve_implicit: args.resolve_implicit,
        resolve_external: if args.resolve_external {
            Some(true)
        } else if args.no_resolve_external {
            Some(false)
        } else {
            None
        },
        python_version,
        store_source: true,
    })
}

fn dump(args: DumpArgs) -> Result<ExitCode> {
    let warnings = init_logging(&args.log_level);
    let started = Instant::now();
    let config = build_config(&args)?;
    let style = config.docstring_style;
    let options = config.docstring_options.clone();
    let mut loader = Loader::new(config);

    if let Some(extensions) = &args.extensions {
        for name in extensions.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match builtin_extension(name) {
                Some(extension) => loader.add_extension(extension),
                None => bail!("unknown extension '{name}'"),
            }
        }
    }

    let mut roots = Vec::new();
    for package in &args.packages {
        let root = loader
            .load(package)
            .with_context(|| format!("could not load package '{package}'"))?;
        roots.push((package.clone(), root));
    }
    if args.resolve_aliases {
        loader.resolve_aliases();
    }

    for (package, root) in &roots {
        let value = to_json(&loader.modules, *root, args.full, style, &options);
        let rendered = serde_json::to_string_pretty(&value)?;
        match &args.output {
            Some(template) => {
                let path = template.replace("{package}", &loader.modules.get(*root).name);
                fs::write(&path, rendered).with_context(|| format!("could not write {path}"))?;
            }
            None => {
                if roots.len() > 1 {
                    println!("// {package}");
                }
                println!("{rendered}");
            }
        }
    }

    if args.stats {
        let stats = loader.stats();
        eprintln!("modules loaded: {}", stats.modules_loaded);
        eprintln!("objects in collection: {}", loader.modules.object_count());
        eprintln!("aliases resolved: {}", stats.aliases_resolved);
        eprintln!("aliases unresolved: {}", stats.aliases_failed);
        eprintln!("warnings: {}", warnings.0.load(Ordering::Relaxed));
        eprintln!("time loading: {:?}", stats.time_loading);
        eprintln!("time resolving: {:?}", stats.time_resolving);
        eprintln!("total time: {:?}", started.elapsed());
    }
    Ok(ExitCode::SUCCESS)
}

/// Checks out a git reference into a temporary worktree and returns its
/// directory. The worktree is detached so the reference can be anything
/// commit-ish.
fn checkout(reference: &str) -> Result<tempfile::TempDir> {
    let dir = tempfile::tempdir().context("could not create a temporary worktree directory")?;
    let status = Command::new("git")
        .args(["worktree", "add", "--detach", "--force"])
        .arg(dir.path())
        .arg(reference)
        .status()
        .context("could not run git")?;
    if !status.success() {
        bail!("git worktree add failed for reference '{reference}'");
    }
    Ok(dir)
}

fn remove_worktree(dir: &tempfile::TempDir) {
    let _ = Command::new("git")
        .args(["worktree", "remove", "--force"])
        .arg(dir.path())
        .status();
}

fn load_package(package: &str, search_paths: Vec<PathBuf>) -> Result<(Loader, talon::ObjectId)> {
    let mut loader = Loader::new(LoaderConfig {
        search_paths,
        resolve_implicit: true,
        ..LoaderConfig::default()
    });
    let root = loader
        .load(package)
        .with_context(|| format!("could not load package '{package}'"))?;
    loader.resolve_aliases();
    Ok((loader, root))
}

fn search_paths_in(root: PathBuf, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = vec![root.clone(), root.join("src")];
    for path in extra {
        if path.is_relative() {
            paths.push(root.join(path));
        } else {
            paths.push(path.clone());
        }
    }
    paths
}

fn run_check(args: &CheckArgs) -> Result<ExitCode> {
    init_logging(&args.log_level);
    if args.no_color {
        colored::control::set_override(false);
    } else if args.color {
        colored::control::set_override(true);
    }

    let old_worktree = checkout(&args.against)?;
    let old_result = load_package(
        &args.package,
        search_paths_in(old_worktree.path().to_path_buf(), &args.search),
    );

    let new_result = match &args.base_ref {
        Some(reference) => {
            let worktree = checkout(reference)?;
            let result = load_package(
                &args.package,
                search_paths_in(worktree.path().to_path_buf(), &args.search),
            );
            remove_worktree(&worktree);
            result
        }
        None => {
            let mut paths = search_paths_in(PathBuf::from("."), &args.search);
            paths.extend(args.search.iter().cloned());
            load_package(&args.package, paths)
        }
    };
    remove_worktree(&old_worktree);

    let (old_loader, old_root) = old_result?;
    let (new_loader, new_root) = new_result?;
    let breakages = check(&old_loader.modules, old_root, &new_loader.modules, new_root);

    for breakage in &breakages {
        print_breakage(breakage, args);
    }
    if breakages.is_empty() {
        if args.verbose {
            println!("{}", "no breaking changes found".green());
        }
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", format!("{} breaking changes found", breakages.len()).red());
        Ok(ExitCode::FAILURE)
    }
}

fn print_breakage(breakage: &Breakage, args: &CheckArgs) {
    match args.format {
        CheckFormat::Oneline => {
            let location = breakage
                .lineno
                .map(|lineno| format!(":{lineno}"))
                .unwrap_or_default();
            println!(
                "{}{}: {} {}",
                breakage.path.bold(),
                location,
                breakage.kind.to_string().red(),
                breakage.detail
            );
        }
        CheckFormat::Full => {
            println!("{}", breakage.path.bold());
            println!("  {}: {}", breakage.kind.to_string().red(), breakage.detail);
            if args.verbose {
                if let Some(lineno) = breakage.lineno {
                    println!("  at line {lineno}");
                }
            }
        }
    }
}
