//! Output folder and file naming.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;

use crate::splitter::group::sanitize;

/// Extension of every emitted group file.
pub const OUTPUT_EXTENSION: &str = "xlsx";

/// Timestamp layout used in output folder names.
pub const FOLDER_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// `prefix_key`, or just `key` when the sanitized prefix is empty, without a
/// leading underscore.
pub fn base_name(prefix: &str, group_key: &str) -> String {
    let prefix = sanitize(prefix.trim());
    let base = if prefix.is_empty() {
        group_key.to_string()
    } else {
        format!("{prefix}_{group_key}")
    };
    match base.strip_prefix('_') {
        Some(stripped) => stripped.to_string(),
        None => base,
    }
}

/// `<sanitizedPrefix>_<yyyyMMddHHmmss>`, or the bare timestamp without a prefix.
pub fn folder_name(prefix: &str, started: NaiveDateTime) -> String {
    let stamp = started.format(FOLDER_TIMESTAMP_FORMAT);
    let prefix = sanitize(prefix.trim());
    if prefix.is_empty() {
        stamp.to_string()
    } else {
        format!("{prefix}_{stamp}")
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    counts: HashMap<String, u32>,
    issued: HashSet<String>,
}

/// Hands out output file names that are unique for the lifetime of one run.
///
/// Names are compared case-insensitively so that `Bob` and `bob` cannot
/// clobber each other on case-insensitive file systems.
#[derive(Debug, Default)]
pub struct FilenameRegistry {
    state: Mutex<RegistryState>,
}

impl FilenameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `base.ext` the first time a base name is seen, then
    /// `base_1.ext`, `base_2.ext`, ...
    pub fn allocate(&self, prefix: &str, group_key: &str) -> String {
        let base = base_name(prefix, group_key);
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        let count = state.counts.entry(base.to_lowercase()).or_insert(0);
        loop {
            let candidate = if *count == 0 {
                format!("{base}.{OUTPUT_EXTENSION}")
            } else {
                format!("{base}_{count}.{OUTPUT_EXTENSION}")
            };
            *count += 1;
            if state.issued.insert(candidate.to_lowercase()) {
                return candidate;
            }
        }
    }

    /// Number of names handed out so far.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issued
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn colliding_keys_get_numbered_suffixes() {
        let registry = FilenameRegistry::new();
        assert_eq!(registry.allocate("prefix", "A_B"), "prefix_A_B.xlsx");
        assert_eq!(registry.allocate("prefix", "A_B"), "prefix_A_B_1.xlsx");
        assert_eq!(registry.allocate("prefix", "A_B"), "prefix_A_B_2.xlsx");
    }

    #[test]
    fn suffix_never_reuses_an_existing_name() {
        let registry = FilenameRegistry::new();
        assert_eq!(registry.allocate("p", "x_1"), "p_x_1.xlsx");
        assert_eq!(registry.allocate("p", "x"), "p_x.xlsx");
        assert_eq!(registry.allocate("p", "x"), "p_x_2.xlsx");
    }

    #[test]
    fn names_differing_only_in_case_do_not_collide() {
        let registry = FilenameRegistry::new();
        assert_eq!(registry.allocate("", "Bob"), "Bob.xlsx");
        assert_eq!(registry.allocate("", "bob"), "bob_1.xlsx");
    }

    #[test]
    fn empty_prefix_and_leading_underscore_are_dropped() {
        assert_eq!(base_name("   ", "bob"), "bob");
        assert_eq!(base_name("", "_bob"), "bob");
        assert_eq!(base_name("Q3 report", "bob"), "Q3_report_bob");
        assert_eq!(base_name("/", "bob"), "bob");
    }

    #[test]
    fn folder_names_carry_the_timestamp() {
        let started = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        assert_eq!(folder_name("Tasks", started), "Tasks_20240506070809");
        assert_eq!(folder_name("", started), "20240506070809");
    }

    #[test]
    fn concurrent_allocation_yields_unique_names() {
        let registry = Arc::new(FilenameRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..25)
                        .map(|_| registry.allocate("p", "same"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names: Vec<String> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 200);
        assert_eq!(registry.len(), 200);
    }
}
