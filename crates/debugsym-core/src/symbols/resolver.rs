//! # Resolver
//!
//! Entry point of the crate: takes the modules of a dump, finds a debug file
//! for every eligible one and merges it into the local binary.
//!
//! Per module:
//!
//! ```text
//! Unfiltered ─┬─ NoLocalBinary
//!             ├─ FilteredOut
//!             └─ Hashed ─┬─ HashFailed
//!                        ├─ CacheHit ── patch ─┬─ Applied
//!                        │                     └─ Failed
//!                        └─ CacheMiss ── fetch ─┬─ FetchFailed
//!                                               └─ Downloaded ── patch? ─┬─ Applied / Skipped
//!                                                                        └─ Failed
//! ```
//!
//! Modules are resolved concurrently on the tokio runtime, at most
//! `max_concurrency` at a time. A failure on one module is logged and
//! recorded in the [`ResolutionReport`]; it never stops the others.
//!
//! Modules sharing one `local_path` are resolved once; the others copy
//! the result.
//!
//! ## Cancellation
//!
//! [`Resolver::resolve_until`] stops gracefully. Once the shutdown future
//! completes, modules still waiting for a permit end as
//! [`ModuleOutcome::Aborted`]. Modules already running finish, bounded by
//! the download and merge timeouts.
//!
//! Dropping the future instead aborts in-flight modules. A merge cut short
//! that way puts the staged original back in place (see
//! [`BinaryPatcher`](super::patcher::BinaryPatcher)).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::cache::DebugSymbolCache;
use super::fetcher::SymbolFetcher;
use super::filter::{ModuleFilter, NativeLibraryFilter};
use super::patcher::BinaryPatcher;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::platform::{Downloader, Filesystem, ProcessRunner};
use crate::types::{debug_file_name, ContentDigest, Module};

/// Result of the patch step for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus
{
    /// The debug file was merged into the local binary.
    Applied,
    /// Patching after download is disabled; the debug file is located only.
    Skipped,
    /// The merge failed; the original binary was kept.
    Failed,
}

/// Terminal state of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOutcome
{
    /// No local copy of the binary exists.
    NoLocalBinary,
    /// Rejected by the module filter.
    FilteredOut,
    /// The local binary could not be hashed.
    HashFailed,
    /// The debug file was already cached.
    CacheHit(PatchStatus),
    /// The debug file was downloaded into the cache.
    Downloaded(PatchStatus),
    /// The debug file could not be retrieved.
    FetchFailed,
    /// Resolution was cancelled before the module started, or its task
    /// ended without a result.
    Aborted,
}

impl ModuleOutcome
{
    /// Whether the module ended up with a debug symbol path.
    pub fn is_resolved(self) -> bool
    {
        matches!(
            self,
            ModuleOutcome::CacheHit(PatchStatus::Applied | PatchStatus::Skipped)
                | ModuleOutcome::Downloaded(PatchStatus::Applied | PatchStatus::Skipped)
        )
    }

    /// Whether the module took part in resolution at all.
    pub fn is_eligible(self) -> bool
    {
        !matches!(self, ModuleOutcome::NoLocalBinary | ModuleOutcome::FilteredOut)
    }
}

/// Outcome of a [`Resolver::resolve`] call, index-aligned with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport
{
    /// Terminal state of every input module, in input order.
    pub outcomes: Vec<ModuleOutcome>,
    /// Whether a shutdown request stopped the batch early.
    pub interrupted: bool,
}

impl ResolutionReport
{
    fn count(&self, predicate: impl Fn(ModuleOutcome) -> bool) -> usize
    {
        self.outcomes.iter().copied().filter(|outcome| predicate(*outcome)).count()
    }

    /// Modules that took part in resolution.
    pub fn eligible(&self) -> usize
    {
        self.count(ModuleOutcome::is_eligible)
    }

    /// Modules that ended with a debug symbol path.
    pub fn resolved(&self) -> usize
    {
        self.count(ModuleOutcome::is_resolved)
    }

    /// Modules whose debug file was already cached.
    pub fn cache_hits(&self) -> usize
    {
        self.count(|outcome| matches!(outcome, ModuleOutcome::CacheHit(_)))
    }

    /// Modules whose debug file was downloaded in this run.
    pub fn downloads(&self) -> usize
    {
        self.count(|outcome| matches!(outcome, ModuleOutcome::Downloaded(_)))
    }

    /// Modules whose debug file could not be retrieved.
    pub fn fetch_failures(&self) -> usize
    {
        self.count(|outcome| outcome == ModuleOutcome::FetchFailed)
    }

    /// Modules whose merge failed.
    pub fn patch_failures(&self) -> usize
    {
        self.count(|outcome| {
            matches!(
                outcome,
                ModuleOutcome::CacheHit(PatchStatus::Failed) | ModuleOutcome::Downloaded(PatchStatus::Failed)
            )
        })
    }
}

impl fmt::Display for ResolutionReport
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "resolved {} of {} eligible modules ({} total): {} cache hits, {} downloads, {} fetch failures, {} patch failures",
            self.resolved(),
            self.eligible(),
            self.outcomes.len(),
            self.cache_hits(),
            self.downloads(),
            self.fetch_failures(),
            self.patch_failures(),
        )?;
        if self.interrupted {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

struct Job
{
    index: usize,
    /// Later modules with the same `local_path`.
    duplicates: Vec<usize>,
    local_path: PathBuf,
    file_name: String,
}

struct Resolution
{
    outcome: ModuleOutcome,
    debug_symbol_path: Option<PathBuf>,
}

impl Resolution
{
    fn unresolved(outcome: ModuleOutcome) -> Self
    {
        Self {
            outcome,
            debug_symbol_path: None,
        }
    }

    fn located(outcome: ModuleOutcome, path: PathBuf) -> Self
    {
        let debug_symbol_path = outcome.is_resolved().then_some(path);
        Self {
            outcome,
            debug_symbol_path,
        }
    }
}

/// Resolves and applies debug symbols for the modules of a dump.
///
/// Generic over the three capabilities so tests can run it against fakes.
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use debugsym_core::config::ResolverConfig;
/// use debugsym_core::platform::{LocalFilesystem, MirrorDownloader, SystemProcessRunner};
/// use debugsym_core::symbols::Resolver;
/// use debugsym_core::types::Module;
///
/// # async fn run() -> debugsym_core::Result<()> {
/// let config = ResolverConfig::new("/var/cache/debugsym").with_symbol_url_template("file:///mnt/symbols/{digest}/{name}");
/// let resolver = Resolver::new(config, Arc::new(LocalFilesystem), Arc::new(MirrorDownloader), Arc::new(SystemProcessRunner))?;
///
/// let mut modules = vec![Module::new("somelib.so", "/lib/ruxit/somelib.so").with_local_path("./lib/ruxit/somelib.so")];
/// let report = resolver.resolve(&mut modules).await?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct Resolver<F, D, P>
{
    filter: Arc<dyn ModuleFilter>,
    inner: Arc<Inner<F, D, P>>,
}

struct Inner<F, D, P>
{
    fs: Arc<F>,
    cache: DebugSymbolCache<F>,
    fetcher: SymbolFetcher<F, D>,
    patcher: BinaryPatcher<F, P>,
    patch_after_download: bool,
    permits: Semaphore,
}

impl<F, D, P> Resolver<F, D, P>
where
    F: Filesystem,
    D: Downloader,
    P: ProcessRunner,
{
    /// Create a resolver using [`NativeLibraryFilter::default`].
    ///
    /// ## Errors
    ///
    /// Returns [`SymbolError::InvalidConfig`](crate::error::SymbolError::InvalidConfig)
    /// if `config` does not validate.
    pub fn new(config: ResolverConfig, fs: Arc<F>, downloader: Arc<D>, runner: Arc<P>) -> Result<Self>
    {
        config.validate()?;

        let inner = Inner {
            cache: DebugSymbolCache::new(config.cache_root.clone(), fs.clone()),
            fetcher: SymbolFetcher::new(
                fs.clone(),
                downloader,
                config.symbol_url_template.clone(),
                config.download_timeout,
            ),
            patcher: BinaryPatcher::new(
                fs.clone(),
                runner,
                config.merge_tool.clone(),
                config.merge_timeout,
                config.verify_merge_status,
            ),
            fs,
            patch_after_download: config.patch_after_download,
            permits: Semaphore::new(config.max_concurrency),
        };

        Ok(Self {
            filter: Arc::new(NativeLibraryFilter::default()),
            inner: Arc::new(inner),
        })
    }

    /// Replace the module eligibility policy.
    #[must_use]
    pub fn with_filter(mut self, filter: impl ModuleFilter + 'static) -> Self
    {
        self.filter = Arc::new(filter);
        self
    }

    /// Root of the debug-symbol cache.
    pub fn cache_root(&self) -> &Path
    {
        self.inner.cache.root()
    }

    /// Resolve every eligible module, setting `debug_symbol_path` in place.
    ///
    /// Makes no filesystem, network or process calls unless at least one
    /// module is eligible.
    ///
    /// ## Errors
    ///
    /// Only failures that affect every module escape: currently an unusable
    /// cache root ([`SymbolError::CacheRootUnavailable`](crate::error::SymbolError::CacheRootUnavailable)).
    pub async fn resolve(&self, modules: &mut [Module]) -> Result<ResolutionReport>
    {
        self.resolve_until(modules, std::future::pending()).await
    }

    /// Like [`resolve`](Self::resolve), but stops starting new modules once
    /// `shutdown` completes and waits for the running ones to finish.
    ///
    /// ```rust,no_run
    /// # use debugsym_core::platform::{LocalFilesystem, MirrorDownloader, SystemProcessRunner};
    /// # async fn run(
    /// #     resolver: debugsym_core::Resolver<LocalFilesystem, MirrorDownloader, SystemProcessRunner>,
    /// #     mut modules: Vec<debugsym_core::Module>,
    /// # ) -> debugsym_core::Result<()> {
    /// let shutdown = async {
    ///     let _ = tokio::signal::ctrl_c().await;
    /// };
    /// let report = resolver.resolve_until(&mut modules, shutdown).await?;
    /// if report.interrupted {
    ///     eprintln!("stopped early: {report}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// ## Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_until(&self, modules: &mut [Module], shutdown: impl Future<Output = ()>) -> Result<ResolutionReport>
    {
        let mut outcomes = Vec::with_capacity(modules.len());
        let mut jobs: Vec<Job> = Vec::new();
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();
        for (index, module) in modules.iter().enumerate() {
            let outcome = match &module.local_path {
                None => {
                    debug!(%module, "No local binary, skipping");
                    ModuleOutcome::NoLocalBinary
                }
                Some(_) if !self.filter.is_eligible(module) => {
                    debug!(%module, "Module not eligible, skipping");
                    ModuleOutcome::FilteredOut
                }
                Some(local_path) => {
                    if let Some(&job) = by_path.get(local_path) {
                        debug!(%module, "Binary already queued by another module");
                        jobs[job].duplicates.push(index);
                    } else {
                        by_path.insert(local_path.clone(), jobs.len());
                        jobs.push(Job {
                            index,
                            duplicates: Vec::new(),
                            local_path: local_path.clone(),
                            file_name: module.file_name.clone(),
                        });
                    }
                    ModuleOutcome::Aborted
                }
            };
            outcomes.push(outcome);
        }

        if jobs.is_empty() {
            return Ok(ResolutionReport {
                outcomes,
                interrupted: false,
            });
        }

        self.inner.cache.ensure_root().await?;
        info!(eligible = jobs.len(), total = modules.len(), "Resolving debug symbols");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        for job in jobs {
            let inner = Arc::clone(&self.inner);
            let mut stop = stop_rx.clone();
            let span = info_span!("resolve_module", module = %job.file_name);
            tasks.spawn(
                async move {
                    let stopped = async {
                        let _ = stop.wait_for(|stop| *stop).await;
                    };
                    let permit = tokio::select! {
                        biased;
                        () = stopped => None,
                        permit = inner.permits.acquire() => permit.ok(),
                    };
                    let resolution = match permit {
                        Some(_permit) => inner.resolve_one(&job).await,
                        None => Resolution::unresolved(ModuleOutcome::Aborted),
                    };
                    (job, resolution)
                }
                .instrument(span),
            );
        }

        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((job, resolution))) => {
                        for index in std::iter::once(job.index).chain(job.duplicates) {
                            outcomes[index] = resolution.outcome;
                            if let Some(path) = &resolution.debug_symbol_path {
                                modules[index].debug_symbol_path = Some(path.clone());
                            }
                        }
                    }
                    Some(Err(err)) => error!("Module resolution task failed: {err}"),
                },
                () = &mut shutdown, if !interrupted => {
                    warn!(running = tasks.len(), "Shutdown requested, finishing modules already in progress");
                    interrupted = true;
                    let _ = stop_tx.send(true);
                }
            }
        }

        let report = ResolutionReport { outcomes, interrupted };
        info!("{report}");
        Ok(report)
    }
}

impl<F, D, P> Inner<F, D, P>
where
    F: Filesystem,
    D: Downloader,
    P: ProcessRunner,
{
    async fn digest(&self, binary: &Path) -> io::Result<ContentDigest>
    {
        let result = self.fs.content_digest(binary).await;
        let missing = matches!(&result, Err(err) if err.kind() == io::ErrorKind::NotFound);
        if missing && self.patcher.recover(binary).await {
            return self.fs.content_digest(binary).await;
        }
        result
    }

    async fn resolve_one(&self, job: &Job) -> Resolution
    {
        let digest = match self.digest(&job.local_path).await {
            Ok(digest) => digest,
            Err(err) => {
                warn!(binary = %job.local_path.display(), "Cannot hash local binary: {err}");
                return Resolution::unresolved(ModuleOutcome::HashFailed);
            }
        };
        let cache_path = self.cache.resolve_path(&digest, &debug_file_name(&job.file_name));

        // Held through the patch as well: byte-identical binaries share the
        // entry and must not be downloaded or merged concurrently.
        let _guard = self.cache.lock(&digest).await;

        if self.cache.exists(&cache_path).await {
            debug!(%digest, path = %cache_path.display(), "Debug symbols cached");
            let status = self.patch(&job.local_path, &cache_path).await;
            return Resolution::located(ModuleOutcome::CacheHit(status), cache_path);
        }

        if !self.fetcher.fetch(&digest, &job.file_name, &cache_path).await {
            return Resolution::unresolved(ModuleOutcome::FetchFailed);
        }

        let status = if self.patch_after_download {
            self.patch(&job.local_path, &cache_path).await
        } else {
            PatchStatus::Skipped
        };
        Resolution::located(ModuleOutcome::Downloaded(status), cache_path)
    }

    async fn patch(&self, binary: &Path, debug_file: &Path) -> PatchStatus
    {
        match self.patcher.patch(binary, debug_file).await {
            Ok(()) => PatchStatus::Applied,
            Err(err) => {
                warn!(binary = %binary.display(), "Failed to merge debug symbols: {err}");
                PatchStatus::Failed
            }
        }
    }
}
