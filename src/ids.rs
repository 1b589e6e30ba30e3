//! Stable ids tagging every registration call from a file.

use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::{IdStrategy, TransformOptions};
use crate::directives::Tier;

/// Maps `(file, tier)` to an opaque id. Must return the same id for the same
/// pair for the lifetime of a build.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, file: &str, tier: Tier) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn(&str, Tier) -> String + Send + Sync,
{
    fn generate(&self, file: &str, tier: Tier) -> String {
        self(file, tier)
    }
}

/// `"<directive>:<file>"`
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveIdGenerator;

impl IdGenerator for DirectiveIdGenerator {
    fn generate(&self, file: &str, tier: Tier) -> String {
        format!("{}:{}", tier.directive(), file)
    }
}

/// `"<directive>:./<path relative to root>"`.
///
/// Parent segments are written as `__` so the id never climbs out of the root.
#[derive(Debug, Clone)]
pub struct RelativePathIdGenerator {
    root: PathBuf,
}

impl RelativePathIdGenerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IdGenerator for RelativePathIdGenerator {
    fn generate(&self, file: &str, tier: Tier) -> String {
        format!("{}:{}", tier.directive(), relative_id(&self.root, file))
    }
}

/// First `len` hex digits of `sha256("<relative path>:<directive>")`.
#[derive(Debug, Clone)]
pub struct HashedIdGenerator {
    root: Option<PathBuf>,
    len: usize,
}

impl HashedIdGenerator {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root, len: 16 }
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len.clamp(8, 64);
        self
    }
}

impl IdGenerator for HashedIdGenerator {
    fn generate(&self, file: &str, tier: Tier) -> String {
        let path = match &self.root {
            Some(root) => relative_id(root, file),
            None => file.replace('\\', "/"),
        };
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(tier.directive().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..self.len].to_string()
    }
}

/// Caches another generator's answers. Safe to share between threads running
/// independent transforms.
pub struct MemoizedIdGenerator<G> {
    inner: G,
    table: DashMap<(String, Tier), String>,
}

impl<G: IdGenerator> MemoizedIdGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            table: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<G: IdGenerator> IdGenerator for MemoizedIdGenerator<G> {
    fn generate(&self, file: &str, tier: Tier) -> String {
        let key = (file.to_string(), tier);
        if let Some(hit) = self.table.get(&key) {
            return hit.value().clone();
        }
        self.table
            .entry(key)
            .or_insert_with(|| self.inner.generate(file, tier))
            .value()
            .clone()
    }
}

/// Generator selected by `options.id_strategy`, memoized.
pub fn generator_for(options: &TransformOptions) -> Box<dyn IdGenerator> {
    let root = options.root.as_ref().map(PathBuf::from);
    match options.id_strategy {
        IdStrategy::Directive => Box::new(MemoizedIdGenerator::new(DirectiveIdGenerator)),
        IdStrategy::Relative => Box::new(MemoizedIdGenerator::new(RelativePathIdGenerator::new(
            root.unwrap_or_default(),
        ))),
        IdStrategy::Hashed => Box::new(MemoizedIdGenerator::new(HashedIdGenerator::new(root))),
    }
}

/// `./a/b.js` for `<root>/a/b.js`, `./__/x.js` for a sibling of the root.
fn relative_id(root: &Path, file: &str) -> String {
    let file = Path::new(file);
    let relative = if file.is_absolute() == root.is_absolute() && !root.as_os_str().is_empty() {
        relative_path(root, file)
    } else {
        file.to_path_buf()
    };

    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("__".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect();
    format!("./{}", segments.join("/"))
}

fn relative_path(root: &Path, file: &Path) -> PathBuf {
    if let Ok(inside) = file.strip_prefix(root) {
        return inside.to_path_buf();
    }
    let root_parts: Vec<Component> = root.components().collect();
    let file_parts: Vec<Component> = file.components().collect();
    let common = root_parts
        .iter()
        .zip(&file_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..root_parts.len() {
        relative.push("..");
    }
    for part in &file_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}
