//! Daemon-side implementations of the service traits behind the built-in
//! commands. Installations that attach a real media server or query engine
//! swap these out.

use std::{
    ffi::OsStr,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use patchbay_api::{Database, ImageStore, LibraryService, ProcessControl, Signal, UserService};
use patchbay_config::ConfigHandle;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Database access backed by a plain file on disk.
///
/// The daemon embeds no query engine, so `select` always fails. Backups
/// copy the database file into the backup directory under a timestamped
/// name, the same scheme the config store uses.
pub struct FileDatabase {
    config: Arc<ConfigHandle>,
}

impl FileDatabase {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self { config }
    }
}

impl Database for FileDatabase {
    fn select(&self, _query: &str) -> Result<Vec<Map<String, Value>>> {
        bail!("no query engine is attached to the database file")
    }

    fn backup(&self) -> Result<PathBuf> {
        let source = PathBuf::from(self.config.database_path());
        if source.as_os_str().is_empty() {
            bail!("database_path is not configured");
        }
        let backup_dir = self.config.resolve_backup_dir();
        fs::create_dir_all(&backup_dir)
            .with_context(|| format!("creating backup directory {}", backup_dir.display()))?;
        let stem = source
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("patchbay");
        let extension = source.extension().and_then(OsStr::to_str).unwrap_or("db");
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let target = backup_dir.join(format!("{stem}.backup-{stamp}.{extension}"));
        fs::copy(&source, &target).with_context(|| {
            format!("copying {} to {}", source.display(), target.display())
        })?;
        info!(path = %target.display(), "backed up database");
        Ok(target)
    }
}

/// Image bytes served from a directory of cached files.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Join `img` onto the root, refusing anything that points outside it.
    fn resolve(&self, img: &str) -> Result<PathBuf> {
        let relative = Path::new(img);
        if relative.is_absolute()
            || relative
                .components()
                .any(|part| !matches!(part, Component::Normal(_)))
        {
            bail!("image path {img:?} points outside the cache");
        }
        Ok(self.root.join(relative))
    }
}

impl ImageStore for FsImageStore {
    fn fetch(&self, img: &str, width: Option<u32>, height: Option<u32>) -> Result<Vec<u8>> {
        let path = self.resolve(img)?;
        if width.is_some() || height.is_some() {
            debug!(img, "scaling is not supported, serving the original");
        }
        fs::read(&path).with_context(|| format!("reading image {}", path.display()))
    }
}

/// Library refresh stand-in for installations with no media server attached.
pub struct NoopLibraryService;

impl LibraryService for NoopLibraryService {
    fn refresh(&self) -> Result<bool> {
        warn!("no media server is attached, library list left as is");
        Ok(false)
    }
}

/// User refresh stand-in for installations with no media server attached.
pub struct NoopUserService;

impl UserService for NoopUserService {
    fn refresh(&self) -> Result<bool> {
        warn!("no media server is attached, user list left as is");
        Ok(false)
    }
}

/// Process control that forwards restart and update requests to the daemon
/// main loop over a watch channel.
pub struct WatchControl {
    sender: watch::Sender<Option<Signal>>,
}

impl WatchControl {
    /// Create the control half and the receiver the main loop waits on.
    pub fn new() -> (Self, watch::Receiver<Option<Signal>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl ProcessControl for WatchControl {
    fn signal(&self, signal: Signal) -> Result<()> {
        info!(signal = signal.as_str(), "process signal requested");
        self.sender
            .send(Some(signal))
            .map_err(|_| anyhow!("the daemon main loop is gone"))
    }
}
