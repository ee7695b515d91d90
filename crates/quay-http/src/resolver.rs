use std::path::{Component, Path, PathBuf};

use anyhow::{Context as _, Error};
use thiserror::Error;
use tracing::{event, Level};

/// Maps request paths to files confined to a document root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    index_file: String,
    allowed_extensions: Vec<String>,
}

/// A request path resolved to a servable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// Lowercase extension, without the dot.
    pub extension: String,
}

impl PathResolver {
    pub fn new(
        root: &Path,
        index_file: impl Into<String>,
        allowed_extensions: &[String],
    ) -> Result<Self, Error> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize document root {:?}", root))?;

        let allowed_extensions = allowed_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let value = Self {
            root,
            index_file: index_file.into(),
            allowed_extensions,
        };
        Ok(value)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a decoded request path.
    pub fn resolve(&self, path: &str) -> Result<Resolved, ResolveError> {
        let mut relative = path.strip_prefix('/').unwrap_or(path).to_string();
        if relative.is_empty() || relative.ends_with('/') {
            relative.push_str(&self.index_file);
        }

        let candidate = self.confine(&relative)?;

        let extension = candidate
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(ResolveError::Forbidden("extension not allowed"));
        }

        if !candidate.is_file() {
            return Err(ResolveError::NotFound);
        }

        // Symlinks inside the root may still point outside of it
        let canonical = candidate.canonicalize().map_err(|_| ResolveError::NotFound)?;
        if !canonical.starts_with(&self.root) {
            event!(Level::DEBUG, path = ?candidate, "symlink escapes document root");
            return Err(ResolveError::Forbidden("symlink escapes document root"));
        }

        let resolved = Resolved {
            path: candidate,
            extension,
        };
        Ok(resolved)
    }

    /// Lexically normalize `relative` below the root.
    fn confine(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let mut segments = Vec::new();

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(segment) => segments.push(segment),
                Component::CurDir => {}
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(ResolveError::Forbidden("path escapes document root"));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ResolveError::Forbidden("absolute path"));
                }
            }
        }

        let mut path = self.root.clone();
        path.extend(segments);
        Ok(path)
    }
}

/// The request path does not name a servable file.
///
/// Both variants are answered the same to clients.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("file not found")]
    NotFound,
    #[error("forbidden path: {0}")]
    Forbidden(&'static str),
}
