//! Materializes resource locators as plain files native APIs can open.
//!
//! Accepted locators:
//!
//! * a plain filesystem path, returned as-is (made absolute) when it exists;
//! * a `file://` URI, resolved to its path;
//! * a `data:<mime>;base64,<payload>` URI;
//! * `res:<name>`, naming bytes registered with [`ResourceStager::embed`].
//!
//! The last two are written under a private temporary directory. A SHA-256
//! digest of the bytes is cached per locator, and a copy is skipped when the
//! destination already holds identical content.

use std::collections::HashMap;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};
use url::Url;

use crate::error::StagingError;

const EMBEDDED_SCHEME: &str = "res:";
const DATA_SCHEME: &str = "data:";
const FILE_SCHEME: &str = "file:";

/// A staged resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedResource {
    path: PathBuf,
    copied: bool,
}

impl StagedResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether bytes were written to disk by this call.
    pub const fn copied(&self) -> bool {
        self.copied
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[derive(Clone)]
struct CachedCopy {
    path: PathBuf,
    digest: String,
}

pub struct ResourceStager {
    root: Mutex<Option<TempDir>>,
    copies: Mutex<LruCache<String, CachedCopy>>,
    embedded: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl ResourceStager {
    /// `capacity` bounds the number of remembered digests, not files on disk.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            root: Mutex::new(None),
            copies: Mutex::new(LruCache::new(capacity)),
            embedded: RwLock::new(HashMap::new()),
        }
    }

    /// Registers bytes addressable as `res:<name>`. Re-registering a name
    /// replaces its content; the next staging call rewrites the file.
    pub fn embed(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.embedded.write().insert(name.into(), Arc::from(bytes));
    }

    /// Resolves `locator` to a local file.
    ///
    /// # Errors
    ///
    /// Fails when the source does not exist, when the locator is malformed,
    /// or when the staged copy cannot be written.
    pub fn stage(&self, locator: &str) -> Result<StagedResource, StagingError> {
        if let Some(name) = locator.strip_prefix(EMBEDDED_SCHEME) {
            let bytes = self
                .embedded
                .read()
                .get(name)
                .cloned()
                .ok_or_else(|| StagingError::UnknownResource(name.to_string()))?;
            let extension = Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("bin");
            return self.stage_bytes(locator, extension, &bytes);
        }

        if locator.starts_with(DATA_SCHEME) {
            let (mime, bytes) = decode_data_uri(locator)?;
            return self.stage_bytes(locator, extension_for_mime(&mime), &bytes);
        }

        if locator.starts_with(FILE_SCHEME) {
            let path = Url::parse(locator)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| StagingError::InvalidLocator {
                    locator: locator.to_string(),
                    message: "not a local file URI".to_string(),
                })?;
            return existing_file(&path);
        }

        existing_file(Path::new(locator))
    }

    /// Directory holding staged copies, once anything has been staged.
    pub fn root(&self) -> Option<PathBuf> {
        self.root.lock().as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Deletes every staged copy. Later staging calls start a fresh directory.
    pub fn cleanup(&self) {
        self.copies.lock().clear();
        if let Some(dir) = self.root.lock().take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(path = %path.display(), error = %err, "failed to remove staging directory");
            }
        }
    }

    fn stage_bytes(
        &self,
        key: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StagedResource, StagingError> {
        let digest = digest_hex(bytes);
        let mut copies = self.copies.lock();

        if let Some(cached) = copies.get(key) {
            if cached.digest == digest && cached.path.is_file() {
                return Ok(StagedResource {
                    path: cached.path.clone(),
                    copied: false,
                });
            }
        }

        let root = self.ensure_root()?;
        let path = root.join(staged_file_name(key, extension));

        // The digest cache may have evicted this key while the file survived.
        if std::fs::read(&path).is_ok_and(|existing| digest_hex(&existing) == digest) {
            copies.put(key.to_string(), CachedCopy {
                path: path.clone(),
                digest,
            });
            return Ok(StagedResource {
                path,
                copied: false,
            });
        }

        write_atomically(&root, &path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "resource staged");
        copies.put(key.to_string(), CachedCopy {
            path: path.clone(),
            digest,
        });
        Ok(StagedResource { path, copied: true })
    }

    fn ensure_root(&self) -> Result<PathBuf, StagingError> {
        let mut root = self.root.lock();
        if let Some(dir) = root.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::Builder::new()
            .prefix("desknotify-")
            .tempdir()
            .map_err(|source| StagingError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let path = dir.path().to_path_buf();
        *root = Some(dir);
        Ok(path)
    }
}

impl Drop for ResourceStager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for ResourceStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStager")
            .field("root", &self.root())
            .field("embedded", &self.embedded.read().len())
            .finish_non_exhaustive()
    }
}

fn existing_file(path: &Path) -> Result<StagedResource, StagingError> {
    if !path.is_file() {
        return Err(StagingError::NotFound(path.to_path_buf()));
    }
    let path = std::path::absolute(path).map_err(|source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(StagedResource {
        path,
        copied: false,
    })
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StagingError> {
    let io_err = |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

fn decode_data_uri(locator: &str) -> Result<(String, Vec<u8>), StagingError> {
    let invalid = |message: &str| StagingError::InvalidLocator {
        locator: truncated(locator),
        message: message.to_string(),
    };
    let rest = &locator[DATA_SCHEME.len()..];
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("only base64 data URIs are supported"))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| invalid(&err.to_string()))?;
    Ok((mime.to_ascii_lowercase(), bytes))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        _ => "bin",
    }
}

fn staged_file_name(key: &str, extension: &str) -> String {
    let key_digest = digest_hex(key.as_bytes());
    format!("staged-{}.{extension}", &key_digest[..16])
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn truncated(locator: &str) -> String {
    const MAX: usize = 48;
    match locator.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &locator[..cut]),
        None => locator.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceStager;
    use crate::error::StagingError;
    use std::num::NonZeroUsize;

    const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn stager() -> ResourceStager {
        ResourceStager::new(NonZeroUsize::MIN.saturating_add(7))
    }

    #[test]
    fn plain_existing_path_is_returned_unchanged() {
        let file = match tempfile::NamedTempFile::new() {
            Ok(file) => file,
            Err(err) => panic!("temp file: {err}"),
        };
        let staged = match stager().stage(&file.path().to_string_lossy()) {
            Ok(staged) => staged,
            Err(err) => panic!("stage failed: {err}"),
        };
        assert_eq!(staged.path(), file.path());
        assert!(!staged.copied());
    }

    #[test]
    fn missing_path_is_a_hard_error() {
        assert!(matches!(
            stager().stage("/no/such/icon.png"),
            Err(StagingError::NotFound(_))
        ));
    }

    #[test]
    fn staging_twice_skips_the_second_copy() {
        let stager = stager();
        let first = match stager.stage(PNG_URI) {
            Ok(staged) => staged,
            Err(err) => panic!("stage failed: {err}"),
        };
        let second = match stager.stage(PNG_URI) {
            Ok(staged) => staged,
            Err(err) => panic!("stage failed: {err}"),
        };
        assert!(first.copied());
        assert!(!second.copied());
        assert_eq!(first.path(), second.path());
        assert_eq!(first.path().extension().and_then(|e| e.to_str()), Some("png"));
    }

    #[test]
    fn changed_embedded_bytes_are_rewritten() {
        let stager = stager();
        stager.embed("sounds/ping.wav", b"one".to_vec());
        let first = match stager.stage("res:sounds/ping.wav") {
            Ok(staged) => staged,
            Err(err) => panic!("stage failed: {err}"),
        };
        stager.embed("sounds/ping.wav", b"two".to_vec());
        let second = match stager.stage("res:sounds/ping.wav") {
            Ok(staged) => staged,
            Err(err) => panic!("stage failed: {err}"),
        };
        assert!(second.copied());
        assert_eq!(first.path(), second.path());
        assert_eq!(std::fs::read(second.path()).ok().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn disk_content_short_circuits_after_eviction() {
        let stager = ResourceStager::new(NonZeroUsize::MIN);
        stager.embed("a.png", b"aaa".to_vec());
        stager.embed("b.png", b"bbb".to_vec());
        assert!(stager.stage("res:a.png").is_ok_and(|s| s.copied()));
        // Evicts the digest for a.png.
        assert!(stager.stage("res:b.png").is_ok_and(|s| s.copied()));
        assert!(stager.stage("res:a.png").is_ok_and(|s| !s.copied()));
    }

    #[test]
    fn unknown_embedded_resource_and_bad_data_uri_fail() {
        let stager = stager();
        assert!(matches!(
            stager.stage("res:missing.png"),
            Err(StagingError::UnknownResource(name)) if name == "missing.png"
        ));
        assert!(matches!(
            stager.stage("data:image/png,plain"),
            Err(StagingError::InvalidLocator { .. })
        ));
    }

    #[test]
    fn cleanup_removes_the_directory() {
        let stager = stager();
        assert!(stager.stage(PNG_URI).is_ok());
        let root = match stager.root() {
            Some(root) => root,
            None => panic!("root should exist after staging"),
        };
        stager.cleanup();
        assert!(!root.exists());
        assert!(stager.root().is_none());
    }
}
