//! Serde model for patch definition files.
//!
//! A definition file is a JSON array of entries, each naming a target
//! binary and a wildcarded find/replace pair in pattern text form:
//!
//! ```json
//! [
//!   {
//!     "path": "/usr/libexec/some-daemon",
//!     "arch": "x86_64",
//!     "segment": "__TEXT,__text",
//!     "find": "83 F8 03 74 ?? 83 F8 02",
//!     "replace": "83 F8 03 74 ?? 83 F8 0F"
//!   }
//! ]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::descriptor::{CpuArch, FileSegment};
use crate::template::TemplatePair;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDefinition {
    pub path: PathBuf,
    #[serde(default = "default_arch")]
    pub arch: CpuArch,
    #[serde(default)]
    pub segment: FileSegment,
    pub find: String,
    pub replace: String,
}

fn default_arch() -> CpuArch {
    CpuArch::X86_64
}

impl PatchDefinition {
    /// Validate the textual patterns into a template pair.
    pub fn templates(&self) -> Result<TemplatePair> {
        TemplatePair::new(&self.find, &self.replace)
            .with_context(|| format!("bad patch definition for {}", self.path.display()))
    }
}
