//! Cache key derivation.
//!
//! A key is `<path token>@<namespace token>@<digest fragment>`. The path
//! token is the root-relative path escaped so that only `[A-Za-z0-9._-]`
//! remain: `_` becomes `__` and every other byte becomes `_xx` (lowercase
//! hex), so distinct paths never share a token. Tokens longer than their
//! bound are truncated and suffixed with `~` and a hash of the full token.

use std::fmt::{self, Write as _};
use std::path::{Component, Path, PathBuf};

use rescan_common::ContentHash;

use crate::identity::FileDigest;
use crate::namespace::Namespace;

/// Separator between key segments. Never produced by [`escape`].
pub(crate) const KEY_SEPARATOR: char = '@';

const MAX_PATH_TOKEN: usize = 96;
const MAX_NAMESPACE_TOKEN: usize = 48;

/// A storage-safe key for one cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a file stem.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives keys and normalized paths relative to a project root.
#[derive(Clone, Debug)]
pub struct KeyDeriver {
    root: PathBuf,
}

impl KeyDeriver {
    /// Creates a deriver for `root`. A relative root is anchored at the current directory.
    pub fn new(root: &Path) -> Self {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self {
            root: normalize_lexically(&root),
        }
    }

    /// The project root keys are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The on-disk location of `path`. Relative paths are taken relative to the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&self.root.join(path))
        }
    }

    /// The index key for `path`: root-relative with `/` separators, or the
    /// absolute path when the file lies outside the root.
    pub fn normalize(&self, path: &Path) -> String {
        let resolved = self.resolve(path);
        let shown = resolved.strip_prefix(&self.root).unwrap_or(&resolved);
        let parts: Vec<String> = shown
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                Component::ParentDir => Some("..".to_string()),
                Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
            })
            .collect();
        let joined = parts.join("/");
        if shown.is_absolute() {
            format!("/{joined}")
        } else {
            joined
        }
    }

    /// The bounded, escaped token for a normalized path.
    pub fn path_token(&self, normalized: &str) -> String {
        bounded(escape(normalized), MAX_PATH_TOKEN)
    }

    /// Derives the key for `path` in `namespace` given its current digest.
    pub fn derive_key(&self, path: &Path, namespace: &Namespace, digest: &FileDigest) -> CacheKey {
        self.key_for(&self.normalize(path), namespace, digest)
    }

    pub(crate) fn key_for(
        &self,
        normalized: &str,
        namespace: &Namespace,
        digest: &FileDigest,
    ) -> CacheKey {
        CacheKey(format!(
            "{}{sep}{}{sep}{}",
            self.path_token(normalized),
            namespace_token(namespace),
            digest.fragment(),
            sep = KEY_SEPARATOR,
        ))
    }
}

/// The namespace segment of a key.
pub(crate) fn namespace_token(namespace: &Namespace) -> String {
    match namespace {
        Namespace::Parse => "parse".to_string(),
        Namespace::Analysis => "analysis".to_string(),
        Namespace::Pattern(name) => bounded(escape(name), MAX_NAMESPACE_TOKEN),
    }
}

/// Splits a key stem into its path and namespace tokens.
pub(crate) fn split_stem(stem: &str) -> Option<(&str, &str)> {
    let mut parts = stem.splitn(3, KEY_SEPARATOR);
    let path = parts.next()?;
    let namespace = parts.next()?;
    parts.next()?;
    Some((path, namespace))
}

/// Injective escape into `[A-Za-z0-9._-]`.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'_' => out.push_str("__"),
            b if b.is_ascii_alphanumeric() || b == b'.' || b == b'-' => out.push(char::from(b)),
            b => {
                let _ = write!(out, "_{b:02x}");
            }
        }
    }
    out
}

fn bounded(token: String, max: usize) -> String {
    if token.len() <= max {
        return token;
    }
    let full = ContentHash::from_bytes(token.as_bytes()).to_string();
    let keep = max - full.len() - 1;
    format!("{}~{full}", &token[..keep])
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
