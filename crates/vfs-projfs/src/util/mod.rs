//! Small platform utilities.

pub mod filetime;
pub mod pattern;

#[cfg(target_os = "windows")]
pub mod wstr;

pub use filetime::systemtime_to_filetime_i64;
pub use pattern::name_matches;
