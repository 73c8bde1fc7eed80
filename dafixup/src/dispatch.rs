//! Registration glue: resolve once, then hand descriptors to the service.

use std::path::Path;

use tracing::{debug, warn};

use crate::descriptor::{BinaryPatch, CpuArch, FileSegment, PatchDescriptor, ProcessMatch};
use crate::host::{ImageSource, InterceptionService};
use crate::resolver::{self, ResolveError};
use crate::template::TemplatePair;

/// Resolve `templates` against the binary at `path` and arm the resulting
/// patch with the interception service.
///
/// Failure policy: an unreadable target registers a disabled descriptor and
/// the host carries on without the patch; a readable target with no match
/// aborts the host via [`InterceptionService::fatal`], since armed-but-
/// unresolved templates would corrupt an unrelated byte in a live binary.
pub fn arm<S: InterceptionService>(
    service: &mut S,
    source: &dyn ImageSource,
    path: &Path,
    templates: &TemplatePair,
    arch: CpuArch,
    segment: FileSegment,
) {
    match resolver::resolve_image(source, path, templates) {
        Ok(resolved) => {
            debug!(path = %path.display(), offset = resolved.offset, "arming patch");
            let patch = BinaryPatch::from_resolved(resolved, arch, segment);
            service.watch_process(
                ProcessMatch::new(path),
                PatchDescriptor::active(path, vec![patch]),
            );
        }
        Err(err @ ResolveError::Unreadable { .. }) => {
            warn!("{err}; registering patch disabled");
            service.watch_process(ProcessMatch::new(path), PatchDescriptor::disabled(path));
        }
        Err(ResolveError::NotFound { path }) => {
            service.fatal(format!(
                "failed to locate patch site in binary: {}",
                path.display()
            ));
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::descriptor::PatchState;
    use std::collections::HashMap;
    use std::io;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::path::PathBuf;
    use std::sync::Mutex;

    pub(crate) struct MapSource(pub HashMap<PathBuf, Vec<u8>>);

    impl ImageSource for MapSource {
        fn read_image(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such image"))
        }
    }

    /// Records registrations; `fatal` stores the diagnostic and unwinds so
    /// the abort path is observable from tests.
    #[derive(Default)]
    pub(crate) struct RecordingService {
        pub watched: Vec<(ProcessMatch, PatchDescriptor)>,
        pub fatal: Mutex<Option<String>>,
    }

    impl InterceptionService for RecordingService {
        fn watch_process(&mut self, proc: ProcessMatch, patches: PatchDescriptor) {
            self.watched.push((proc, patches));
        }

        fn fatal(&self, diagnostic: String) -> ! {
            *self.fatal.lock().unwrap() = Some(diagnostic);
            panic!("host aborted");
        }
    }

    fn pair() -> TemplatePair {
        TemplatePair::new("83 F8 03 74 ?? 83 F8 02", "83 F8 03 74 ?? 83 F8 0F").unwrap()
    }

    const SITE: [u8; 8] = [0x83, 0xf8, 0x03, 0x74, 0x2a, 0x83, 0xf8, 0x02];

    #[test]
    fn test_arm_success() {
        let path = PathBuf::from("/usr/libexec/agent");
        let mut data = vec![0u8; 32];
        data.extend(SITE);
        let source = MapSource(HashMap::from([(path.clone(), data)]));
        let mut service = RecordingService::default();

        arm(
            &mut service,
            &source,
            &path,
            &pair(),
            CpuArch::X86_64,
            FileSegment::TextText,
        );

        assert!(service.fatal.lock().unwrap().is_none());
        let (proc, desc) = &service.watched[0];
        assert_eq!(proc.path, path);
        assert_eq!(proc.matches, 1);
        assert_eq!(desc.state, PatchState::Active);
        assert_eq!(desc.patches.len(), 1);
        assert_eq!(desc.patches[0].find[4], 0x2a);
        assert_eq!(desc.patches[0].replace[4], 0x2a);
        assert_eq!(desc.patches[0].replace[7], 0x0f);
    }

    #[test]
    fn test_arm_unreadable_disables() {
        let path = PathBuf::from("/usr/libexec/agent");
        let source = MapSource(HashMap::new());
        let mut service = RecordingService::default();

        arm(
            &mut service,
            &source,
            &path,
            &pair(),
            CpuArch::X86_64,
            FileSegment::TextText,
        );

        assert!(service.fatal.lock().unwrap().is_none());
        let (_, desc) = &service.watched[0];
        assert_eq!(desc.state, PatchState::Disabled);
        assert!(desc.patches.is_empty());
    }

    #[test]
    fn test_arm_no_match_is_fatal() {
        let path = PathBuf::from("/usr/libexec/agent");
        let source = MapSource(HashMap::from([(path.clone(), vec![0u8; 64])]));
        let mut service = RecordingService::default();

        let result = catch_unwind(AssertUnwindSafe(|| {
            arm(
                &mut service,
                &source,
                &path,
                &pair(),
                CpuArch::X86_64,
                FileSegment::TextText,
            )
        }));

        assert!(result.is_err());
        let diagnostic = service.fatal.lock().unwrap().clone().unwrap();
        assert!(diagnostic.contains("/usr/libexec/agent"));
        assert!(service.watched.is_empty());
    }
}
