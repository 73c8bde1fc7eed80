//! Plugin identity, boot-argument toggles, and the host-version gate.

use anyhow::{bail, Context, Result};

/// Disables the plugin entirely.
pub const BOOTARG_OFF: &str = "-dafxoff";
/// Raises log verbosity to debug.
pub const BOOTARG_DEBUG: &str = "-dafxdbg";
/// Allows starting on host versions newer than the tested range.
pub const BOOTARG_BETA: &str = "-dafxbeta";

/// Darwin major versions the gate reasons about.
pub mod host_version {
    pub const MAVERICKS: u32 = 13;
    pub const YOSEMITE: u32 = 14;
    pub const EL_CAPITAN: u32 = 15;
    pub const SIERRA: u32 = 16;
    pub const HIGH_SIERRA: u32 = 17;
    pub const MOJAVE: u32 = 18;
    pub const CATALINA: u32 = 19;
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct BootArgs {
    pub off: bool,
    pub debug: bool,
    pub beta: bool,
}

impl BootArgs {
    /// Pick our toggles out of the host's boot arguments; anything else is
    /// someone else's.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for arg in args {
            match arg.as_ref() {
                BOOTARG_OFF => out.off = true,
                BOOTARG_DEBUG => out.debug = true,
                BOOTARG_BETA => out.beta = true,
                _ => {}
            }
        }
        out
    }
}

/// Pack a `major.minor.patch` version string into a single u32, one byte
/// per component.
pub fn parse_module_version(s: &str) -> Result<u32> {
    let parts: Vec<&str> = s.split('.').collect();
    let (major, minor, patch) = match parts[..] {
        [major, minor, patch] => (major, minor, patch),
        _ => bail!("expected major.minor.patch, got \"{s}\""),
    };
    let parse = |part: &str| -> Result<u32> {
        let n: u32 = part
            .parse()
            .with_context(|| format!("bad version component \"{part}\""))?;
        if n > 0xff {
            bail!("version component {n} does not fit in a byte");
        }
        Ok(n)
    };
    Ok(parse(major)? << 16 | parse(minor)? << 8 | parse(patch)?)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PluginConfig {
    pub name: &'static str,
    pub version: u32,
    pub min_host: u32,
    pub max_host: u32,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StartDecision {
    Start { debug: bool },
    Disabled(DisabledReason),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DisabledReason {
    BootArg,
    UnsupportedHost,
}

impl PluginConfig {
    pub fn new(name: &'static str, version: &str, min_host: u32, max_host: u32) -> Result<Self> {
        Ok(Self {
            name,
            version: parse_module_version(version)?,
            min_host,
            max_host,
        })
    }

    /// Whether the plugin should run on this host. `-dafxoff` always wins;
    /// `-dafxbeta` lifts the upper bound of the tested version range but
    /// never the lower one.
    pub fn should_start(&self, host: u32, args: &BootArgs) -> StartDecision {
        if args.off {
            return StartDecision::Disabled(DisabledReason::BootArg);
        }
        if host < self.min_host || (host > self.max_host && !args.beta) {
            return StartDecision::Disabled(DisabledReason::UnsupportedHost);
        }
        StartDecision::Start { debug: args.debug }
    }
}
