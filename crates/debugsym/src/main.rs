use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use debugsym_core::config::{DEFAULT_CACHE_ROOT, DEFAULT_MERGE_TOOL, ResolverConfig};
use debugsym_core::platform::{LocalFilesystem, MirrorDownloader, SystemProcessRunner};
use debugsym_core::symbols::{hasher, inspect_file, DebugSymbolCache, NativeLibraryFilter, Resolver};
use debugsym_core::types::{debug_file_name, Module};
use debugsym_utils::{info, init_logging, init_logging_to_file, init_logging_with_level, warn, LogFormat, LogLevel};

/// Resolve and apply debug symbols for the modules of a crash dump.
#[derive(Parser, Debug)]
#[command(name = "debugsym")]
#[command(version)]
#[command(about = "Resolve and apply debug symbols for the modules of a crash dump", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Write logs to ~/.debugsym/ instead of the console
    #[arg(long, global = true, default_value_t = false)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve debug symbols for a JSON list of modules
    Resolve
    {
        /// JSON array of module records
        #[arg(long)]
        modules: PathBuf,
        /// Where to write the updated records (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        resolver: ResolverArgs,
    },
    /// Print the cache path a binary maps to
    CachePath
    {
        /// Local copy of the binary
        binary: PathBuf,
        /// Module file name (default: the binary's own file name)
        #[arg(long)]
        file_name: Option<String>,
        /// Root of the debug-symbol cache
        #[arg(long, env = "DEBUGSYM_CACHE_ROOT", default_value = DEFAULT_CACHE_ROOT)]
        cache_root: PathBuf,
    },
    /// Report the debug information carried by an ELF file
    Inspect
    {
        /// File to inspect
        binary: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ResolverArgs
{
    /// Root of the debug-symbol cache
    #[arg(long, env = "DEBUGSYM_CACHE_ROOT", default_value = DEFAULT_CACHE_ROOT)]
    cache_root: PathBuf,

    /// Symbol mirror template (file:// URL or path) with {digest}, {name}
    /// and {file} placeholders
    #[arg(long, env = "DEBUGSYM_SYMBOL_SERVER")]
    symbol_server: Option<String>,

    /// Program used to merge debug files into binaries
    #[arg(long, default_value = DEFAULT_MERGE_TOOL)]
    merge_tool: String,

    /// Number of modules resolved at the same time
    #[arg(long, short)]
    jobs: Option<usize>,

    /// Timeout for one download, in seconds
    #[arg(long, default_value_t = 60)]
    download_timeout_secs: u64,

    /// Timeout for one merge, in seconds
    #[arg(long, default_value_t = 120)]
    merge_timeout_secs: u64,

    /// Only locate debug files, do not merge them after a download
    #[arg(long, default_value_t = false)]
    no_patch_after_download: bool,

    /// Accept any merge-tool exit status
    #[arg(long, default_value_t = false)]
    ignore_merge_status: bool,

    /// Directory names whose libraries are eligible (repeatable)
    #[arg(long = "monitored-dir")]
    monitored_dirs: Vec<String>,
}

impl ResolverArgs
{
    fn config(&self) -> ResolverConfig
    {
        let mut config = ResolverConfig::new(&self.cache_root)
            .with_merge_tool(&self.merge_tool)
            .with_download_timeout(Duration::from_secs(self.download_timeout_secs))
            .with_merge_timeout(Duration::from_secs(self.merge_timeout_secs))
            .with_patch_after_download(!self.no_patch_after_download)
            .with_verify_merge_status(!self.ignore_merge_status);
        if let Some(template) = &self.symbol_server {
            config = config.with_symbol_url_template(template);
        }
        if let Some(jobs) = self.jobs {
            config = config.with_max_concurrency(jobs);
        }
        config
    }

    /// Reject a symbol server the mirror downloader cannot read from.
    fn check_symbol_server(&self) -> Result<(), String>
    {
        match &self.symbol_server {
            Some(template) if !MirrorDownloader::supports(template) => Err(format!(
                "unsupported symbol server '{template}': only file:// URLs and plain paths are supported"
            )),
            _ => Ok(()),
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn setup_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>>
{
    let format = std::env::var(debugsym_utils::logging::LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or_default();

    if cli.log_to_file {
        let path = init_logging_to_file(cli.log_level, format)?;
        eprintln!("Logging to {}", path.display());
        return Ok(());
    }
    match cli.log_level {
        Some(level) => init_logging_with_level(level, format)?,
        None => init_logging()?,
    }
    Ok(())
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Resolve {
            modules,
            output,
            resolver,
        } => {
            resolver.check_symbol_server()?;
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(resolve(&modules, output.as_deref(), &resolver))
        }
        Commands::CachePath {
            binary,
            file_name,
            cache_root,
        } => cache_path(&binary, file_name, cache_root),
        Commands::Inspect { binary } => inspect(&binary),
    }
}

async fn resolve(modules_path: &Path, output: Option<&Path>, args: &ResolverArgs) -> Result<(), Box<dyn std::error::Error>>
{
    let mut modules: Vec<Module> = serde_json::from_reader(BufReader::new(File::open(modules_path)?))?;
    info!(count = modules.len(), file = %modules_path.display(), "Loaded module list");

    let mut resolver = Resolver::new(
        args.config(),
        Arc::new(LocalFilesystem),
        Arc::new(MirrorDownloader),
        Arc::new(SystemProcessRunner),
    )?;
    if !args.monitored_dirs.is_empty() {
        resolver = resolver.with_filter(NativeLibraryFilter::new(args.monitored_dirs.iter().cloned()));
    }

    // Ctrl-C stops new modules from starting; running merges finish so no
    // binary is left half-written.
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Cannot listen for Ctrl-C, resolution runs to completion");
            std::future::pending::<()>().await;
        }
    };
    let report = resolver.resolve_until(&mut modules, interrupt).await?;

    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &modules)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &modules)?;
            writeln!(stdout)?;
        }
    }

    eprintln!("{report}");
    if report.interrupted {
        return Err("interrupted".into());
    }
    Ok(())
}

fn cache_path(binary: &Path, file_name: Option<String>, cache_root: PathBuf) -> Result<(), Box<dyn std::error::Error>>
{
    let file_name = match file_name {
        Some(name) => name,
        None => binary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or("binary path has no file name")?,
    };

    let digest = hasher::hash_file(binary)?;
    let cache = DebugSymbolCache::new(cache_root, Arc::new(LocalFilesystem));
    let path = cache.resolve_path(&digest, &debug_file_name(&file_name));

    println!("{}", path.display());
    let state = if path.is_file() { "cached" } else { "not cached" };
    eprintln!("digest {digest}, {state}");
    Ok(())
}

fn inspect(binary: &Path) -> Result<(), Box<dyn std::error::Error>>
{
    let summary = inspect_file(binary)?;

    println!("File:          {}", binary.display());
    println!("Format:        {}", summary.format);
    println!("Debug info:    {}", if summary.has_debug_info() { "yes" } else { "no" });
    println!("Symbol table:  {}", if summary.has_symtab { "yes" } else { "no" });
    println!("Build ID:      {}", summary.build_id.as_deref().unwrap_or("-"));
    println!("Debug link:    {}", summary.debuglink.as_deref().unwrap_or("-"));
    if !summary.debug_sections.is_empty() {
        println!("Sections:      {}", summary.debug_sections.join(", "));
    }
    Ok(())
}
