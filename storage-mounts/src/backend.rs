// SPDX-License-Identifier: GPL-3.0-only

//! File access behind virtual URLs.
//!
//! Each URL scheme is served by one [`FileBackend`]; [`BackendDispatch`]
//! picks the backend from the scheme. Backends only ever hand out virtual
//! URLs, real paths stay an implementation detail.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use storage_types::DeviceKind;
use tokio::sync::mpsc;

use crate::error::{Result, TranslateError};
use crate::registry::DeviceRegistry;
use crate::virtual_path::{
    DevicePathTranslator, FILE_SCHEME, LocalPathTranslator, PathTranslator, VAULT_SCHEME,
    VaultPathTranslator, VirtualUrl,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub url: VirtualUrl,
    pub real_path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

impl FileInfo {
    fn from_metadata(url: VirtualUrl, real_path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        Self {
            url,
            real_path,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        }
    }

    /// File name as stored on disk
    pub fn name(&self) -> String {
        self.real_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(VirtualUrl),
    Removed(VirtualUrl),
    Modified(VirtualUrl),
}

impl WatchEvent {
    pub fn url(&self) -> &VirtualUrl {
        match self {
            WatchEvent::Created(url) | WatchEvent::Removed(url) | WatchEvent::Modified(url) => url,
        }
    }
}

/// Watches one directory and reports its changes as virtual URLs.
/// Dropping the watcher stops it.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
    pub fn new(base_real: PathBuf, base_url: VirtualUrl) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let root = base_real.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for mapped in map_event(&root, &base_url, &event) {
                        // Receiver gone means the watcher is being dropped.
                        let _ = tx.send(mapped);
                    }
                }
                Err(e) => tracing::warn!("watch error below {}: {e}", root.display()),
            }
        })?;
        watcher.watch(&base_real, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Next change; `None` once the underlying watcher has stopped
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

fn map_event(root: &Path, base_url: &VirtualUrl, event: &notify::Event) -> Vec<WatchEvent> {
    let wrap: fn(VirtualUrl) -> WatchEvent = match event.kind {
        EventKind::Create(_) => WatchEvent::Created,
        EventKind::Remove(_) => WatchEvent::Removed,
        EventKind::Modify(_) => WatchEvent::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| path.strip_prefix(root).ok())
        .map(|relative| wrap(base_url.join_path(relative)))
        .collect()
}

/// Capabilities of one URL family
pub trait FileBackend: Send + Sync {
    fn create_info(&self, url: &VirtualUrl) -> Result<FileInfo>;

    /// Children of a directory URL, each carrying its own virtual URL
    fn create_iterator(&self, url: &VirtualUrl) -> Result<Box<dyn Iterator<Item = FileInfo> + Send>>;

    fn create_watcher(&self, url: &VirtualUrl) -> Result<FileWatcher>;
}

/// Serves files through a [`PathTranslator`]
pub struct TranslatedBackend<T> {
    translator: T,
}

impl<T: PathTranslator> TranslatedBackend<T> {
    pub fn new(translator: T) -> Self {
        Self { translator }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }
}

impl<T: PathTranslator> FileBackend for TranslatedBackend<T> {
    fn create_info(&self, url: &VirtualUrl) -> Result<FileInfo> {
        let real = self.translator.to_real(url)?;
        let metadata = std::fs::metadata(&real)?;
        Ok(FileInfo::from_metadata(url.clone(), real, &metadata))
    }

    fn create_iterator(&self, url: &VirtualUrl) -> Result<Box<dyn Iterator<Item = FileInfo> + Send>> {
        let real = self.translator.to_real(url)?;
        let parent = url.clone();

        let children = std::fs::read_dir(&real)?.filter_map(move |entry| {
            let entry = entry.ok()?;
            let metadata = entry.metadata().ok()?;
            let name = entry.file_name();
            Some(FileInfo::from_metadata(
                parent.join_path(Path::new(&name)),
                entry.path(),
                &metadata,
            ))
        });
        Ok(Box::new(children))
    }

    fn create_watcher(&self, url: &VirtualUrl) -> Result<FileWatcher> {
        let real = self.translator.to_real(url)?;
        FileWatcher::new(real, url.clone())
    }
}

/// Scheme to backend table
#[derive(Default, Clone)]
pub struct BackendDispatch {
    backends: HashMap<String, Arc<dyn FileBackend>>,
}

impl BackendDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vault, device-entry and local file backends
    pub fn standard(vault: VaultPathTranslator, registry: Arc<DeviceRegistry>) -> Self {
        let mut dispatch = Self::new();
        dispatch.register(VAULT_SCHEME, Arc::new(TranslatedBackend::new(vault)));

        let devices: Arc<dyn FileBackend> =
            Arc::new(TranslatedBackend::new(DevicePathTranslator::new(registry)));
        for kind in [DeviceKind::Block, DeviceKind::NetworkShare, DeviceKind::AppEntry] {
            dispatch.register(kind.scheme(), devices.clone());
        }

        dispatch.register(FILE_SCHEME, Arc::new(TranslatedBackend::new(LocalPathTranslator)));
        dispatch
    }

    pub fn register(&mut self, scheme: impl Into<String>, backend: Arc<dyn FileBackend>) {
        self.backends.insert(scheme.into(), backend);
    }

    pub fn for_url(&self, url: &VirtualUrl) -> Result<Arc<dyn FileBackend>> {
        self.backends
            .get(url.scheme())
            .cloned()
            .ok_or_else(|| TranslateError::UnsupportedScheme(url.scheme().to_string()))
    }

    pub fn info(&self, url: &VirtualUrl) -> Result<FileInfo> {
        self.for_url(url)?.create_info(url)
    }

    pub fn children(&self, url: &VirtualUrl) -> Result<Vec<FileInfo>> {
        let mut children: Vec<FileInfo> = self.for_url(url)?.create_iterator(url)?.collect();
        children.sort_by(|a, b| a.url.path().cmp(b.url.path()));
        Ok(children)
    }

    pub fn watch(&self, url: &VirtualUrl) -> Result<FileWatcher> {
        self.for_url(url)?.create_watcher(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn vault_dispatch(root: &Path) -> BackendDispatch {
        let mut dispatch = BackendDispatch::new();
        dispatch.register(
            VAULT_SCHEME,
            Arc::new(TranslatedBackend::new(VaultPathTranslator::new(root))),
        );
        dispatch
    }

    #[test]
    fn iterator_yields_child_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("docs")).expect("mkdir");
        std::fs::write(dir.path().join("docs/a.txt"), b"hello").expect("write");
        std::fs::create_dir(dir.path().join("docs/sub")).expect("mkdir");

        let dispatch = vault_dispatch(dir.path());
        let url = VirtualUrl::parse("vault://files/docs").expect("url");
        let children = dispatch.children(&url).expect("listing");

        let urls: Vec<String> = children.iter().map(|c| c.url.to_string()).collect();
        assert_eq!(urls, vec!["vault://files/docs/a.txt", "vault://files/docs/sub"]);
        assert_eq!(children[0].size, 5);
        assert_eq!(children[0].name(), "a.txt");
        assert!(children[1].is_dir);
    }

    #[test]
    fn info_resolves_the_real_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("note"), b"x").expect("write");

        let dispatch = vault_dispatch(dir.path());
        let info = dispatch
            .info(&VirtualUrl::parse("vault://files/note").expect("url"))
            .expect("info");
        assert_eq!(info.real_path, dir.path().join("note"));
        assert!(!info.is_dir);
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        let dispatch = BackendDispatch::new();
        let url = VirtualUrl::parse("ftp://host/x").expect("url");
        assert!(matches!(
            dispatch.info(&url),
            Err(TranslateError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn notify_events_map_to_virtual_urls() {
        let root = Path::new("/data/vault_unlocked");
        let base = VirtualUrl::vault_root();
        let event = notify::Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(root.join("docs/new.txt"))
            .add_path(PathBuf::from("/elsewhere/x"));

        assert_eq!(
            map_event(root, &base, &event),
            vec![WatchEvent::Created(
                VirtualUrl::parse("vault://files/docs/new.txt").expect("url")
            )]
        );

        let access = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(root.join("docs"));
        assert!(map_event(root, &base, &access).is_empty());
    }

    #[tokio::test]
    async fn watcher_reports_created_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatch = vault_dispatch(dir.path());
        let mut watcher = dispatch.watch(&VirtualUrl::vault_root()).expect("watcher");

        std::fs::write(dir.path().join("fresh.txt"), b"1").expect("write");

        let expected = VirtualUrl::parse("vault://files/fresh.txt").expect("url");
        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = watcher.recv().await {
                if matches!(&event, WatchEvent::Created(url) if *url == expected) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(seen);
    }
}
