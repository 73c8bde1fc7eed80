//! Seams for the external collaborators: file access and the load-time
//! interception service.
//!
//! The host module-init path is expected to call [`crate::agent::register`]
//! once the patching machinery is ready; descriptors are handed over by
//! value, so there is no callback to store and no ordering to get wrong.

use std::io;
use std::path::Path;

use crate::descriptor::{PatchDescriptor, ProcessMatch};

/// Reads a whole executable image into memory.
pub trait ImageSource {
    fn read_image(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`ImageSource`] backed by the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn read_image(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// The load-time interception service.
///
/// `watch_process` arms a patch: when the named executable launches, the
/// service applies the descriptor's byte substitutions to the mapped image,
/// skipping descriptors registered as disabled. `fatal` halts the host with
/// a diagnostic; it is reserved for states where continuing would corrupt a
/// live binary.
pub trait InterceptionService {
    fn watch_process(&mut self, proc: ProcessMatch, patches: PatchDescriptor);

    fn fatal(&self, diagnostic: String) -> !;
}
