// src/memory/maps.rs
//! Read back the live mapping table of this process.

use std::path::Path;

use serde::Serialize;

use super::protection::PageProtection;
use super::region::Region;
use crate::error::{VmError, VmResult};

const PROC_MAPS: &str = "/proc/self/maps";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingInfo {
    pub start: usize,
    pub end: usize,
    #[serde(serialize_with = "serialize_protection")]
    pub protection: PageProtection,
    pub private: bool,
    pub name: Option<String>,
}

fn serialize_protection<S: serde::Serializer>(
    protection: &PageProtection,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&perms_string(*protection))
}

impl MappingInfo {
    pub fn region(&self) -> Region {
        Region::new(self.start, self.end - self.start)
    }

    /// Parse one `start-end perms offset dev inode [name]` line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let (start, end) = fields.next()?.split_once('-')?;
        let perms = fields.next()?.as_bytes();
        if perms.len() < 4 {
            return None;
        }

        let mut protection = PageProtection::NONE;
        protection.set(PageProtection::READ, perms[0] == b'r');
        protection.set(PageProtection::WRITE, perms[1] == b'w');
        protection.set(PageProtection::EXEC, perms[2] == b'x');

        // offset, dev, inode
        let name = fields.nth(3).map(|first| {
            // Paths may contain spaces
            let rest: Vec<&str> = fields.collect();
            if rest.is_empty() {
                first.to_string()
            } else {
                format!("{} {}", first, rest.join(" "))
            }
        });

        Some(MappingInfo {
            start: usize::from_str_radix(start, 16).ok()?,
            end: usize::from_str_radix(end, 16).ok()?,
            protection,
            private: perms[3] == b'p',
            name,
        })
    }
}

pub fn perms_string(protection: PageProtection) -> String {
    let flag = |bit, c| if protection.contains(bit) { c } else { '-' };
    [
        flag(PageProtection::READ, 'r'),
        flag(PageProtection::WRITE, 'w'),
        flag(PageProtection::EXEC, 'x'),
    ]
    .iter()
    .collect()
}

/// Every mapping of the current process.
pub fn snapshot() -> VmResult<Vec<MappingInfo>> {
    let path = Path::new(PROC_MAPS);
    if !path.exists() {
        return Err(VmError::Unsupported("mapping inspection"));
    }

    let content = std::fs::read_to_string(path).map_err(|source| VmError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content.lines().filter_map(MappingInfo::parse).collect())
}

/// The mapping containing `address`, if any.
pub fn mapping_at(address: usize) -> VmResult<Option<MappingInfo>> {
    Ok(snapshot()?
        .into_iter()
        .find(|mapping| mapping.start <= address && address < mapping.end))
}
