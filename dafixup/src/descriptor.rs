//! Declarative patch records handed to the interception service.
//!
//! All of these are plain values, immutable once built. Activation is
//! decided at construction time from the resolver's outcome; nothing flips
//! a flag on a shared record afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::template::ResolvedTemplates;

#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum CpuArch {
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "arm64")]
    #[serde(rename = "arm64")]
    Arm64,
}

/// Which mapped segment/section the service should restrict its search to.
/// The resolver itself never parses headers; this is forwarded verbatim.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Hash,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum FileSegment {
    #[default]
    #[strum(serialize = "__TEXT,__text")]
    #[serde(rename = "__TEXT,__text")]
    TextText,
    #[strum(serialize = "__TEXT,__const")]
    #[serde(rename = "__TEXT,__const")]
    TextConst,
    #[strum(serialize = "__DATA,__const")]
    #[serde(rename = "__DATA,__const")]
    DataConst,
    #[strum(serialize = "__DATA,__data")]
    #[serde(rename = "__DATA,__data")]
    DataData,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PatchState {
    Active,
    Disabled,
}

/// One byte substitution: find `find`, write `replace`, `count` times,
/// skipping the first `skip` occurrences, within `segment`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BinaryPatch {
    pub arch: CpuArch,
    pub find: Vec<u8>,
    pub replace: Vec<u8>,
    pub skip: u32,
    pub count: u32,
    pub segment: FileSegment,
}

impl BinaryPatch {
    /// A single-application patch from a resolved template pair.
    pub fn from_resolved(resolved: ResolvedTemplates, arch: CpuArch, segment: FileSegment) -> Self {
        Self {
            arch,
            find: resolved.find,
            replace: resolved.replace,
            skip: 0,
            count: 1,
            segment,
        }
    }
}

/// Everything the service needs to patch one target executable.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PatchDescriptor {
    pub path: PathBuf,
    pub patches: Vec<BinaryPatch>,
    pub state: PatchState,
}

impl PatchDescriptor {
    pub fn active(path: &Path, patches: Vec<BinaryPatch>) -> Self {
        Self {
            path: path.to_owned(),
            patches,
            state: PatchState::Active,
        }
    }

    /// A descriptor the service will skip. Carries no patch bytes at all, so
    /// even a service that ignored the state could not write anything.
    pub fn disabled(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            patches: vec![],
            state: PatchState::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == PatchState::Active
    }
}

/// Identifies which launching executable triggers patch application.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProcessMatch {
    pub path: PathBuf,
    pub matches: u32,
}

impl ProcessMatch {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            matches: 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_segment_names() {
        assert_eq!(FileSegment::TextText.to_string(), "__TEXT,__text");
        assert_eq!(
            FileSegment::from_str("__DATA,__const").unwrap(),
            FileSegment::DataConst
        );
        assert_eq!(CpuArch::from_str("x86_64").unwrap(), CpuArch::X86_64);
    }

    #[test]
    fn test_from_resolved() {
        let resolved = ResolvedTemplates {
            offset: 0x10,
            wildcard: 4,
            find: vec![0x83, 0xf8, 0x03, 0x74, 0x2a, 0x83, 0xf8, 0x02],
            replace: vec![0x83, 0xf8, 0x03, 0x74, 0x2a, 0x83, 0xf8, 0x0f],
        };
        let patch =
            BinaryPatch::from_resolved(resolved.clone(), CpuArch::X86_64, FileSegment::TextText);
        assert_eq!(patch.skip, 0);
        assert_eq!(patch.count, 1);
        assert_eq!(patch.find, resolved.find);
        assert_eq!(patch.replace, resolved.replace);
    }

    #[test]
    fn test_disabled_descriptor_is_empty() {
        let desc = PatchDescriptor::disabled(Path::new("/tmp/agent"));
        assert!(!desc.is_active());
        assert!(desc.patches.is_empty());
    }
}
