use anyhow::{bail, Result};

use crate::scanner::Pattern;

/// A find/replace pattern pair sharing a single wildcard position.
///
/// The wildcard byte is the run-time operand that must survive the patch
/// unchanged; everything else is a fixed constant. Construction rejects any
/// pair the resolver could not safely bake.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TemplatePair {
    find: Pattern,
    replace: Pattern,
    wildcard: usize,
}

impl TemplatePair {
    pub fn new(find: &str, replace: &str) -> Result<Self> {
        Self::from_patterns(Pattern::new(find)?, Pattern::new(replace)?)
    }

    pub fn from_patterns(find: Pattern, replace: Pattern) -> Result<Self> {
        if find.len() != replace.len() {
            bail!(
                "find template is {} bytes but replace template is {}",
                find.len(),
                replace.len()
            );
        }
        if find.mask() != replace.mask() {
            bail!("find and replace templates must wildcard the same positions");
        }
        if find.mask().iter().any(|m| !matches!(m, 0x00 | 0xff)) {
            bail!("patch templates do not support nibble wildcards");
        }
        let wildcard = match find.wildcards()[..] {
            [w] => w,
            _ => bail!("patch templates require exactly one wildcard byte"),
        };
        Ok(Self {
            find,
            replace,
            wildcard,
        })
    }

    pub fn find(&self) -> &Pattern {
        &self.find
    }

    pub fn replace(&self) -> &Pattern {
        &self.replace
    }

    /// Index of the wildcard byte within both templates.
    pub fn wildcard(&self) -> usize {
        self.wildcard
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.find.len()
    }

    /// Produce concrete templates by filling the wildcard position of both
    /// patterns with the byte observed in the image at `offset`.
    pub fn bake(&self, offset: usize, observed: u8) -> ResolvedTemplates {
        let mut find = self.find.sig().to_vec();
        let mut replace = self.replace.sig().to_vec();
        find[self.wildcard] = observed;
        replace[self.wildcard] = observed;
        ResolvedTemplates {
            offset,
            wildcard: self.wildcard,
            find,
            replace,
        }
    }
}

/// Fully concrete find/replace byte sequences plus where they were found.
///
/// Owned by the caller; nothing downstream can observe a half-resolved
/// template.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedTemplates {
    pub offset: usize,
    pub wildcard: usize,
    pub find: Vec<u8>,
    pub replace: Vec<u8>,
}
