//! The DiskArbitrationAgent fixup itself.
//!
//! DiskArbitrationAgent decides which dialog to show for a newly appeared
//! disk by switching on a status code; status 2 is the "disk unreadable"
//! prompt. The patch retargets that comparison to a status nothing
//! dispatches, so the prompt never appears. The jump displacement between
//! the two comparisons is assembled per-build, hence the wildcard byte.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::config::{host_version, PluginConfig};
use crate::descriptor::{CpuArch, FileSegment};
use crate::dispatch;
use crate::host::{ImageSource, InterceptionService};
use crate::template::TemplatePair;

pub const AGENT_PATH: &str =
    "/System/Library/Frameworks/DiskArbitration.framework/Versions/Current/Support/DiskArbitrationAgent";

// cmp eax, 3; je <disp>; cmp eax, 2
pub const FIND: &str = "83 F8 03 74 ?? 83 F8 02";
// cmp eax, 3; je <disp>; cmp eax, 15
pub const REPLACE: &str = "83 F8 03 74 ?? 83 F8 0F";

/// The wildcarded find/replace pair for the agent binary.
pub fn templates() -> Result<TemplatePair> {
    TemplatePair::new(FIND, REPLACE)
}

/// Plugin identity and the host-version range the patch is known good on.
pub fn plugin_config() -> Result<PluginConfig> {
    PluginConfig::new(
        "dafixup",
        env!("CARGO_PKG_VERSION"),
        host_version::MAVERICKS,
        host_version::CATALINA,
    )
}

/// Resolve the agent templates and arm the patch. Called by the host's
/// module-init path once the patching machinery is ready; runs the resolver
/// exactly once and moves its result into the registered descriptor.
pub fn register<S: InterceptionService>(service: &mut S, source: &dyn ImageSource) -> Result<()> {
    debug!("registering DiskArbitrationAgent patch");
    let templates = templates()?;
    dispatch::arm(
        service,
        source,
        Path::new(AGENT_PATH),
        &templates,
        CpuArch::X86_64,
        FileSegment::TextText,
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::PatchState;
    use crate::dispatch::test::{MapSource, RecordingService};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn test_plugin_config() {
        let cfg = plugin_config().unwrap();
        assert_eq!(cfg.name, "dafixup");
        assert_eq!(cfg.min_host, host_version::MAVERICKS);
        assert_eq!(cfg.max_host, host_version::CATALINA);
    }

    #[test]
    fn test_templates_shape() {
        let pair = templates().unwrap();
        assert_eq!(pair.len(), 8);
        assert_eq!(pair.wildcard(), 4);
        assert_eq!(pair.find().sig()[7], 0x02);
        assert_eq!(pair.replace().sig()[7], 0x0f);
    }

    #[test]
    fn test_register_resolves_agent_binary() {
        let path = PathBuf::from(AGENT_PATH);
        let mut data = vec![0u8; 512];
        data.extend([0x83, 0xf8, 0x03, 0x74, 0x5d, 0x83, 0xf8, 0x02]);
        data.extend(vec![0u8; 512]);
        let source = MapSource(HashMap::from([(path.clone(), data)]));
        let mut service = RecordingService::default();

        register(&mut service, &source).unwrap();

        let (proc, desc) = &service.watched[0];
        assert_eq!(proc.path, path);
        assert_eq!(desc.state, PatchState::Active);
        assert_eq!(
            desc.patches[0].find,
            [0x83, 0xf8, 0x03, 0x74, 0x5d, 0x83, 0xf8, 0x02]
        );
        assert_eq!(
            desc.patches[0].replace,
            [0x83, 0xf8, 0x03, 0x74, 0x5d, 0x83, 0xf8, 0x0f]
        );
    }

    #[test]
    fn test_register_missing_binary_stays_soft() {
        let source = MapSource(HashMap::new());
        let mut service = RecordingService::default();

        register(&mut service, &source).unwrap();

        assert!(service.fatal.lock().unwrap().is_none());
        assert_eq!(service.watched[0].1.state, PatchState::Disabled);
    }
}
