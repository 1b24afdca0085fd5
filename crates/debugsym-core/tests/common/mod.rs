//! In-memory capability fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use debugsym_core::config::ResolverConfig;
use debugsym_core::platform::{Downloader, FileInfo, Filesystem, ProcessOutput, ProcessRunner};
use debugsym_core::symbols::Resolver;
use debugsym_core::types::{ContentDigest, Module};

pub const CACHE_ROOT: &str = "/debugsymbols";
pub const DIGEST: &str = "some-md5-hash";
pub const LOCAL_PATH: &str = "./lib/ruxit/somelib.so";
pub const URL_TEMPLATE: &str = "https://symbols.example/{digest}/{name}";

pub fn somelib() -> Module
{
    Module::new("somelib.so", "/lib/ruxit/somelib.so").with_local_path(LOCAL_PATH)
}

pub fn local_path() -> PathBuf
{
    PathBuf::from(LOCAL_PATH)
}

pub fn staged_path() -> PathBuf
{
    PathBuf::from(format!("{LOCAL_PATH}.old"))
}

pub fn cache_path() -> PathBuf
{
    Path::new(CACHE_ROOT).join(DIGEST).join("somelib.dbg")
}

pub fn expected_suffix() -> PathBuf
{
    Path::new(DIGEST).join("somelib.dbg")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall
{
    Exists(PathBuf),
    Rename(PathBuf, PathBuf),
    Remove(PathBuf),
    CreateDirAll(PathBuf),
    ContentDigest(PathBuf),
    FileInfo(PathBuf),
}

/// Filesystem holding only file names and sizes.
#[derive(Default)]
pub struct FakeFilesystem
{
    files: Mutex<HashMap<PathBuf, u64>>,
    digests: Mutex<HashMap<PathBuf, String>>,
    calls: Mutex<Vec<FsCall>>,
    fail_create_dir: AtomicBool,
    fail_remove: Mutex<HashSet<PathBuf>>,
}

impl FakeFilesystem
{
    pub fn add_file(&self, path: impl Into<PathBuf>, len: u64)
    {
        self.files.lock().unwrap().insert(path.into(), len);
    }

    pub fn set_digest(&self, path: impl Into<PathBuf>, digest: &str)
    {
        self.digests.lock().unwrap().insert(path.into(), digest.to_string());
    }

    /// Add a binary with a known digest.
    pub fn add_binary(&self, path: impl Into<PathBuf>, digest: &str)
    {
        let path = path.into();
        self.add_file(path.clone(), 4096);
        self.set_digest(path, digest);
    }

    /// Drop a file without recording a call.
    pub fn delete_file(&self, path: &Path)
    {
        self.files.lock().unwrap().remove(path);
    }

    pub fn has_file(&self, path: &Path) -> bool
    {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn file_len(&self, path: &Path) -> Option<u64>
    {
        self.files.lock().unwrap().get(path).copied()
    }

    /// Make every `remove` of `path` fail.
    pub fn fail_remove_of(&self, path: impl Into<PathBuf>)
    {
        self.fail_remove.lock().unwrap().insert(path.into());
    }

    pub fn fail_create_dir_all(&self)
    {
        self.fail_create_dir.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<FsCall>
    {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &FsCall) -> usize
    {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn renames(&self) -> usize
    {
        self.calls.lock().unwrap().iter().filter(|c| matches!(c, FsCall::Rename(..))).count()
    }

    pub fn removes(&self) -> usize
    {
        self.calls.lock().unwrap().iter().filter(|c| matches!(c, FsCall::Remove(_))).count()
    }

    fn record(&self, call: FsCall)
    {
        self.calls.lock().unwrap().push(call);
    }
}

impl Filesystem for FakeFilesystem
{
    async fn exists(&self, path: &Path) -> bool
    {
        self.record(FsCall::Exists(path.to_path_buf()));
        self.has_file(path)
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>
    {
        self.record(FsCall::Rename(from.to_path_buf(), to.to_path_buf()));
        let mut files = self.files.lock().unwrap();
        let len = files.remove(from).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        files.insert(to.to_path_buf(), len);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()>
    {
        self.record(FsCall::Remove(path.to_path_buf()));
        if self.fail_remove.lock().unwrap().contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>
    {
        self.record(FsCall::CreateDirAll(path.to_path_buf()));
        if self.fail_create_dir.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    async fn content_digest(&self, path: &Path) -> io::Result<ContentDigest>
    {
        self.record(FsCall::ContentDigest(path.to_path_buf()));
        if !self.has_file(path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        let digest = self
            .digests
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::other("no digest configured"))?;
        ContentDigest::new(digest).map_err(io::Error::other)
    }

    async fn file_info(&self, path: &Path) -> Option<FileInfo>
    {
        self.record(FsCall::FileInfo(path.to_path_buf()));
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|len| FileInfo { len: *len, is_file: true })
    }
}

/// Downloader that either succeeds (writing a file into the fake
/// filesystem) or fails, recording every request.
pub struct FakeDownloader
{
    fs: Arc<FakeFilesystem>,
    succeed: AtomicBool,
    written_len: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeDownloader
{
    pub fn new(fs: Arc<FakeFilesystem>) -> Self
    {
        Self {
            fs,
            succeed: AtomicBool::new(false),
            written_len: AtomicUsize::new(1024),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_succeed(&self, succeed: bool)
    {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    /// Size of the file written on success; zero simulates an empty body.
    pub fn set_written_len(&self, len: usize)
    {
        self.written_len.store(len, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration)
    {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<(String, PathBuf)>
    {
        self.requests.lock().unwrap().clone()
    }
}

impl Downloader for FakeDownloader
{
    async fn download(&self, url: &str, dest: &Path) -> bool
    {
        self.requests.lock().unwrap().push((url.to_string(), dest.to_path_buf()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let succeed = self.succeed.load(Ordering::SeqCst);
        if succeed {
            self.fs.add_file(dest, self.written_len.load(Ordering::SeqCst) as u64);
        }
        succeed
    }
}

/// Merge tool stand-in. On exit code zero it "writes" the output binary
/// named by the `-o` argument into the fake filesystem.
pub struct FakeProcessRunner
{
    fs: Arc<FakeFilesystem>,
    exit_code: AtomicI32,
    hang: AtomicBool,
    spawn_error: AtomicBool,
    partial_write: AtomicBool,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    invocations: Mutex<Vec<(String, Vec<OsString>)>>,
}

impl FakeProcessRunner
{
    pub fn new(fs: Arc<FakeFilesystem>) -> Self
    {
        Self {
            fs,
            exit_code: AtomicI32::new(0),
            hang: AtomicBool::new(false),
            spawn_error: AtomicBool::new(false),
            partial_write: AtomicBool::new(false),
            delay: Mutex::new(None),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn set_exit_code(&self, code: i32)
    {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    pub fn set_hang(&self)
    {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn set_spawn_error(&self)
    {
        self.spawn_error.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration)
    {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Write a one-byte output file before the delay, like a tool killed
    /// mid-write would leave behind.
    pub fn set_partial_write(&self)
    {
        self.partial_write.store(true, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> Vec<(String, Vec<OsString>)>
    {
        self.invocations.lock().unwrap().clone()
    }

    /// Highest number of merges observed running at once.
    pub fn peak_concurrency(&self) -> usize
    {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ProcessRunner for FakeProcessRunner
{
    async fn run(&self, program: &str, args: &[OsString]) -> io::Result<ProcessOutput>
    {
        self.invocations.lock().unwrap().push((program.to_string(), args.to_vec()));
        if self.spawn_error.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.partial_write.load(Ordering::SeqCst) {
            if let Some(output) = args.get(1) {
                self.fs.add_file(PathBuf::from(output), 1);
            }
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let code = self.exit_code.load(Ordering::SeqCst);
        if code == 0 {
            if let Some(output) = args.get(1) {
                self.fs.add_file(PathBuf::from(output), 8192);
            }
        }
        Ok(ProcessOutput::exited(code))
    }
}

pub type FakeResolver = Resolver<FakeFilesystem, FakeDownloader, FakeProcessRunner>;

/// Fakes plus a configuration pointing at them.
pub struct Harness
{
    pub fs: Arc<FakeFilesystem>,
    pub downloader: Arc<FakeDownloader>,
    pub runner: Arc<FakeProcessRunner>,
    pub config: ResolverConfig,
}

impl Harness
{
    pub fn new() -> Self
    {
        let fs = Arc::new(FakeFilesystem::default());
        Self {
            downloader: Arc::new(FakeDownloader::new(fs.clone())),
            runner: Arc::new(FakeProcessRunner::new(fs.clone())),
            fs,
            config: ResolverConfig::new(CACHE_ROOT)
                .with_symbol_url_template(URL_TEMPLATE)
                .with_max_concurrency(4)
                .with_download_timeout(Duration::from_secs(5))
                .with_merge_timeout(Duration::from_secs(5)),
        }
    }

    pub fn resolver(&self) -> FakeResolver
    {
        Resolver::new(
            self.config.clone(),
            self.fs.clone(),
            self.downloader.clone(),
            self.runner.clone(),
        )
        .unwrap()
    }

    /// The local `somelib.so` binary, hashing to [`DIGEST`].
    pub fn with_binary(&self)
    {
        self.fs.add_binary(LOCAL_PATH, DIGEST);
    }

    pub fn with_cached_debug_file(&self)
    {
        self.fs.add_file(cache_path(), 1024);
    }

    pub fn with_stale_staged_file(&self)
    {
        self.fs.add_file(staged_path(), 4096);
    }

    pub fn expected_merge_args(&self) -> Vec<OsString>
    {
        vec![
            OsString::from("-o"),
            OsString::from(LOCAL_PATH),
            staged_path().into_os_string(),
            cache_path().into_os_string(),
        ]
    }
}
