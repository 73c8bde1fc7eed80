//! Resolves a wildcarded template pair against a real executable image.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::host::ImageSource;
use crate::scanner::first_match;
use crate::template::{ResolvedTemplates, TemplatePair};

pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Debug)]
pub enum ResolveError {
    /// The target image could not be read. Recoverable: the dependent patch
    /// is registered disabled and the host keeps running.
    Unreadable { path: PathBuf, source: io::Error },
    /// The image was read but contains no match. Unrecoverable: an
    /// unresolved wildcard must never reach a descriptor.
    NotFound { path: PathBuf },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolveError::Unreadable { path, source } => {
                write!(f, "failed to read binary {}: {source}", path.display())
            }
            ResolveError::NotFound { path } => {
                write!(f, "no template match in binary {}", path.display())
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Unreadable { source, .. } => Some(source),
            ResolveError::NotFound { .. } => None,
        }
    }
}

/// Scan `data` for the pair's find template and bake the observed wildcard
/// byte into both templates. Lowest match offset wins; `None` means the
/// image holds no match anywhere, offset 0 included.
pub fn resolve_in(data: &[u8], templates: &TemplatePair) -> Option<ResolvedTemplates> {
    let offset = first_match(templates.find(), data)?;
    let observed = data[offset + templates.wildcard()];
    Some(templates.bake(offset, observed))
}

/// Read the image at `path` once and resolve the pair against it. The
/// buffer is dropped before returning on every path.
pub fn resolve_image(
    source: &dyn ImageSource,
    path: &Path,
    templates: &TemplatePair,
) -> Result<ResolvedTemplates> {
    debug!(path = %path.display(), find = %templates.find(), "resolving templates");

    let data = source
        .read_image(path)
        .map_err(|source| ResolveError::Unreadable {
            path: path.to_owned(),
            source,
        })?;

    let resolved = resolve_in(&data, templates).ok_or_else(|| ResolveError::NotFound {
        path: path.to_owned(),
    })?;

    debug!(
        offset = resolved.offset,
        observed = resolved.find[resolved.wildcard],
        "templates resolved"
    );
    Ok(resolved)
}
