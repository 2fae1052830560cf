//! File-name pattern matching.
//!
//! Enumeration filters entries by the kernel-supplied search expression. On
//! Windows the platform's own matcher decides (the same routine the
//! filesystem uses), so projection behavior is bit-compatible with local
//! directories. Elsewhere a case-insensitive DOS-wildcard fallback keeps the
//! engines testable.

/// Match a file name against a wildcard pattern using ProjFS.
///
/// # Arguments
/// * `name` - File name to check
/// * `pattern` - Wildcard pattern
///
/// # Returns
/// True if the name matches the pattern.
#[cfg(target_os = "windows")]
pub fn name_matches(name: &str, pattern: &str) -> bool {
    use crate::util::wstr::string_to_wide;
    use windows::core::PCWSTR;
    use windows::Win32::Storage::ProjectedFileSystem::PrjFileNameMatch;

    let name_wide: Vec<u16> = string_to_wide(name);
    let pattern_wide: Vec<u16> = string_to_wide(pattern);

    unsafe {
        PrjFileNameMatch(
            PCWSTR::from_raw(name_wide.as_ptr()),
            PCWSTR::from_raw(pattern_wide.as_ptr()),
        )
        .as_bool()
    }
}

/// Match a file name against a wildcard pattern (non-Windows fallback).
///
/// Supports `*` and `?`, case-insensitively.
///
/// # Arguments
/// * `name` - File name to check
/// * `pattern` - Wildcard pattern
///
/// # Returns
/// True if the name matches the pattern.
#[cfg(not(target_os = "windows"))]
pub fn name_matches(name: &str, pattern: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let name: Vec<char> = name.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    wildcard(&name, &pattern)
}

#[cfg(not(target_os = "windows"))]
fn wildcard(name: &[char], pattern: &[char]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some('*'), _) => {
            wildcard(name, &pattern[1..])
                || (!name.is_empty() && wildcard(&name[1..], pattern))
        }
        (Some('?'), Some(_)) => wildcard(&name[1..], &pattern[1..]),
        (Some(p), Some(n)) => *p == *n && wildcard(&name[1..], &pattern[1..]),
        (Some(_), None) => false,
    }
}
