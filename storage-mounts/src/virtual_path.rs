// SPDX-License-Identifier: GPL-3.0-only

//! Virtual URLs and their mapping to real paths.
//!
//! - `vault://files/<path>` lives below `<data_dir>/vault_unlocked`
//! - `block://<id>/<path>`, `network-share://<id>/<path>` and
//!   `app-entry://<id>/` resolve through the registry to the device's
//!   mount point; the id is percent-encoded in the authority
//! - `file:///<path>` is the local filesystem
//!
//! Path segments carry the raw file name bytes percent-encoded, so names
//! that are not valid UTF-8 still map back to the same file.

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use storage_types::DeviceKind;

use crate::error::{Result, TranslateError};
use crate::registry::DeviceRegistry;

pub const VAULT_SCHEME: &str = "vault";
pub const VAULT_HOST: &str = "files";
pub const FILE_SCHEME: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualUrl {
    scheme: String,
    host: String,
    /// Percent-encoded relative path without leading or trailing slashes;
    /// empty for the root
    path: String,
}

impl VirtualUrl {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: &str) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: path.trim_matches('/').to_string(),
        }
    }

    pub fn vault_root() -> Self {
        Self::new(VAULT_SCHEME, VAULT_HOST, "")
    }

    /// Entry URL of a device, e.g. `block://uuid%3A1234/`
    pub fn for_device(kind: DeviceKind, id: &str, path: &str) -> Self {
        Self::new(kind.scheme(), urlencoding::encode(id).into_owned(), path)
    }

    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| TranslateError::InvalidUrl(input.to_string()))?;
        if scheme.is_empty() {
            return Err(TranslateError::InvalidUrl(input.to_string()));
        }

        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        Ok(Self::new(scheme, host, path))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded device id carried in the authority
    pub fn device_id(&self) -> Result<String> {
        urlencoding::decode(&self.host)
            .map(|id| id.into_owned())
            .map_err(|_| TranslateError::InvalidUrl(self.to_string()))
    }

    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_matches('/');
        let path = match (self.path.is_empty(), name.is_empty()) {
            (_, true) => self.path.clone(),
            (true, false) => name.to_string(),
            (false, false) => format!("{}/{}", self.path, name),
        };
        Self {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            path,
        }
    }

    /// Append a real relative path, encoding each component's raw bytes
    pub fn join_path(&self, relative: &Path) -> Self {
        let encoded: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(urlencoding::encode_binary(part.as_bytes())),
                _ => None,
            })
            .collect();
        self.join(&encoded.join("/"))
    }

    /// Decoded relative path, rejecting anything that could escape the root
    /// it is joined onto
    fn relative_path(&self) -> Result<PathBuf> {
        let mut relative = PathBuf::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            let decoded = urlencoding::decode_binary(segment.as_bytes());
            let raw: &[u8] = &decoded;
            if raw == b"." {
                continue;
            }
            if raw == b".." || raw.contains(&b'/') || raw.contains(&0) {
                return Err(TranslateError::InvalidUrl(self.to_string()));
            }
            relative.push(OsStr::from_bytes(raw));
        }
        Ok(relative)
    }
}

impl fmt::Display for VirtualUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.host, self.path)
    }
}

impl FromStr for VirtualUrl {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Bidirectional mapping between one family of virtual URLs and real paths
pub trait PathTranslator: Send + Sync {
    fn to_real(&self, url: &VirtualUrl) -> Result<PathBuf>;

    /// `None` when `path` is not covered by this translator
    fn to_virtual(&self, path: &Path) -> Option<VirtualUrl>;
}

/// `vault://files/<path>` <-> `<unlocked root>/<path>`
#[derive(Debug, Clone)]
pub struct VaultPathTranslator {
    unlocked_root: PathBuf,
}

impl VaultPathTranslator {
    pub fn new(unlocked_root: impl Into<PathBuf>) -> Self {
        Self {
            unlocked_root: unlocked_root.into(),
        }
    }

    pub fn unlocked_root(&self) -> &Path {
        &self.unlocked_root
    }

    /// Paths outside the unlocked root map to the vault root
    pub fn vault_url(&self, path: &Path) -> VirtualUrl {
        match path.strip_prefix(&self.unlocked_root) {
            Ok(relative) => VirtualUrl::vault_root().join_path(relative),
            Err(_) => VirtualUrl::vault_root(),
        }
    }
}

impl PathTranslator for VaultPathTranslator {
    fn to_real(&self, url: &VirtualUrl) -> Result<PathBuf> {
        if url.scheme() != VAULT_SCHEME {
            return Err(TranslateError::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.host() != VAULT_HOST {
            return Err(TranslateError::InvalidUrl(url.to_string()));
        }
        Ok(self.unlocked_root.join(url.relative_path()?))
    }

    fn to_virtual(&self, path: &Path) -> Option<VirtualUrl> {
        Some(self.vault_url(path))
    }
}

/// Device entry URLs resolved through the registry's mount points
#[derive(Clone)]
pub struct DevicePathTranslator {
    registry: Arc<DeviceRegistry>,
}

impl DevicePathTranslator {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }
}

impl PathTranslator for DevicePathTranslator {
    fn to_real(&self, url: &VirtualUrl) -> Result<PathBuf> {
        let id = url.device_id()?;
        let device = self
            .registry
            .get_device(&id)
            .ok_or_else(|| TranslateError::UnknownDevice(id.clone()))?;

        if device.kind.scheme() != url.scheme() {
            return Err(TranslateError::UnsupportedScheme(url.scheme().to_string()));
        }

        let mount_point = device
            .mount_point
            .as_deref()
            .filter(|_| device.is_mounted())
            .ok_or(TranslateError::NotMounted(id))?;
        Ok(Path::new(mount_point).join(url.relative_path()?))
    }

    fn to_virtual(&self, path: &Path) -> Option<VirtualUrl> {
        let device = self.registry.get_device_by_mount_point(path)?;
        if !matches!(device.kind, DeviceKind::Block | DeviceKind::NetworkShare) {
            return None;
        }
        let relative = path.strip_prefix(device.mount_point.as_deref()?).ok()?;
        Some(VirtualUrl::for_device(device.kind, &device.id, "").join_path(relative))
    }
}

/// `file:///<absolute path>`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPathTranslator;

impl PathTranslator for LocalPathTranslator {
    fn to_real(&self, url: &VirtualUrl) -> Result<PathBuf> {
        if url.scheme() != FILE_SCHEME {
            return Err(TranslateError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(Path::new("/").join(url.relative_path()?))
    }

    fn to_virtual(&self, path: &Path) -> Option<VirtualUrl> {
        path.is_absolute()
            .then(|| VirtualUrl::new(FILE_SCHEME, "", "").join_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_are_symmetric() {
        let url = VirtualUrl::parse("vault://files/docs/a.txt").expect("valid url");
        assert_eq!(url.scheme(), "vault");
        assert_eq!(url.host(), "files");
        assert_eq!(url.path(), "docs/a.txt");
        assert_eq!(url.to_string(), "vault://files/docs/a.txt");
        assert_eq!(VirtualUrl::vault_root().to_string(), "vault://files/");
        assert!(VirtualUrl::parse("no-scheme").is_err());
    }

    #[test]
    fn vault_round_trip() {
        let vault = VaultPathTranslator::new("/home/a/.local/share/m/vault_unlocked");
        let url = VirtualUrl::parse("vault://files/docs/a.txt").expect("valid url");

        let real = vault.to_real(&url).expect("maps to real");
        assert_eq!(real, PathBuf::from("/home/a/.local/share/m/vault_unlocked/docs/a.txt"));
        assert_eq!(vault.vault_url(&real), url);

        let root = vault.to_real(&VirtualUrl::vault_root()).expect("root");
        assert_eq!(vault.vault_url(&root), VirtualUrl::vault_root());
    }

    #[test]
    fn non_utf8_names_round_trip_through_the_vault() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let vault = VaultPathTranslator::new("/v/vault_unlocked");
        let name = OsString::from_vec(b"caf\xE9.txt".to_vec());
        let real = Path::new("/v/vault_unlocked/docs").join(&name);

        let url = vault.vault_url(&real);
        assert_eq!(url.to_string(), "vault://files/docs/caf%E9.txt");
        assert_eq!(vault.to_real(&url).expect("maps back"), real);

        let reparsed = VirtualUrl::parse(&url.to_string()).expect("parses");
        assert_eq!(vault.to_real(&reparsed).expect("maps back"), real);
    }

    #[test]
    fn reserved_characters_are_encoded_per_segment() {
        let vault = VaultPathTranslator::new("/v");
        let real = PathBuf::from("/v/my docs/50% off?.txt");
        let url = vault.vault_url(&real);
        assert_eq!(url.to_string(), "vault://files/my%20docs/50%25%20off%3F.txt");
        assert_eq!(vault.to_real(&url).expect("maps back"), real);
    }

    #[test]
    fn outside_paths_map_to_vault_root() {
        let vault = VaultPathTranslator::new("/home/a/vault_unlocked");
        assert_eq!(vault.vault_url(Path::new("/etc/passwd")), VirtualUrl::vault_root());
        assert_eq!(
            vault.vault_url(Path::new("/home/a/vault_unlocked_other/x")),
            VirtualUrl::vault_root()
        );
    }

    #[test]
    fn vault_rejects_escapes_and_foreign_urls() {
        let vault = VaultPathTranslator::new("/v");
        let escape = VirtualUrl::parse("vault://files/../etc").expect("parses");
        assert!(matches!(vault.to_real(&escape), Err(TranslateError::InvalidUrl(_))));
        let encoded = VirtualUrl::parse("vault://files/%2E%2E/etc").expect("parses");
        assert!(matches!(vault.to_real(&encoded), Err(TranslateError::InvalidUrl(_))));
        let slash = VirtualUrl::parse("vault://files/a%2F..%2F..%2Fetc").expect("parses");
        assert!(matches!(vault.to_real(&slash), Err(TranslateError::InvalidUrl(_))));
        let foreign = VirtualUrl::parse("block://x/").expect("parses");
        assert!(matches!(
            vault.to_real(&foreign),
            Err(TranslateError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn device_ids_survive_the_authority() {
        let url = VirtualUrl::for_device(DeviceKind::NetworkShare, "smb:10.0.0.5/share", "dir");
        let parsed = VirtualUrl::parse(&url.to_string()).expect("parses");
        assert_eq!(parsed.scheme(), "network-share");
        assert_eq!(parsed.device_id().expect("decodes"), "smb:10.0.0.5/share");
        assert_eq!(parsed.path(), "dir");
    }

    #[test]
    fn local_paths_map_to_file_urls() {
        let url = LocalPathTranslator
            .to_virtual(Path::new("/tmp/x"))
            .expect("absolute");
        assert_eq!(url.to_string(), "file:///tmp/x");
        assert_eq!(LocalPathTranslator.to_real(&url).expect("real"), PathBuf::from("/tmp/x"));
    }
}
