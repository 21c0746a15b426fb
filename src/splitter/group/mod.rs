//! Partitioning of data rows by the normalized value of the grouping column.
//!
//! Groups are enumerated in the order their key first appears while scanning
//! top to bottom, so identical input always produces identical output order.

use std::collections::HashMap;

use crate::splitter::model::{DataRow, Group, UNKNOWN_GROUP};

/// Characters that cannot appear in a file name on common platforms.
const FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replaces characters unsafe in file names (and whitespace) with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if FORBIDDEN.contains(&ch) || ch.is_control() || ch.is_whitespace() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// Normalizes a raw grouping cell into its group key.
pub fn group_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_GROUP.to_string();
    }
    let key = sanitize(trimmed);
    if key.is_empty() {
        UNKNOWN_GROUP.to_string()
    } else {
        key
    }
}

/// Insertion-ordered collection of groups.
#[derive(Debug, Default)]
struct GroupSet {
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl GroupSet {
    fn push(&mut self, key: String, row: DataRow) {
        let slot = match self.index.get(&key) {
            Some(slot) => *slot,
            None => {
                self.groups.push(Group::new(key.clone()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].rows.push(row);
    }
}

/// Splits `rows` into groups keyed by the value in `column`.
///
/// Every row lands in exactly one group and keeps its relative order.
pub fn group_rows<I>(rows: I, column: usize) -> Vec<Group>
where
    I: IntoIterator<Item = DataRow>,
{
    let mut set = GroupSet::default();
    for row in rows {
        let key = group_key(row.cell(column));
        set.push(key, row);
    }
    set.groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source_row: u32, cells: &[&str]) -> DataRow {
        DataRow::new(source_row, cells.iter().map(|cell| cell.to_string()).collect())
    }

    fn sources(group: &Group) -> Vec<u32> {
        group.rows.iter().map(|row| row.source_row).collect()
    }

    #[test]
    fn groups_follow_first_encounter_order() {
        let rows = vec![
            row(2, &["1", "Amy Task", "bob"]),
            row(3, &["2", "Ben Task", ""]),
            row(4, &["3", "Cid Task", "bob"]),
            row(5, &["4", "Dee Task", "ann"]),
        ];

        let groups = group_rows(rows, 2);
        let keys: Vec<&str> = groups.iter().map(|group| group.key.as_str()).collect();
        assert_eq!(keys, vec!["bob", "unknown", "ann"]);
        assert_eq!(sources(&groups[0]), vec![2, 4]);
        assert_eq!(sources(&groups[1]), vec![3]);
        assert_eq!(sources(&groups[2]), vec![5]);
    }

    #[test]
    fn every_row_lands_in_exactly_one_group() {
        let owners = ["x", "y", " ", "x", "z/1", "z 1", "", "y"];
        let rows: Vec<DataRow> = owners
            .iter()
            .enumerate()
            .map(|(index, owner)| row(index as u32 + 2, &[owner]))
            .collect();

        let groups = group_rows(rows.clone(), 0);
        let mut seen: Vec<u32> = groups.iter().flat_map(sources).collect();
        seen.sort_unstable();
        let expected: Vec<u32> = rows.iter().map(|row| row.source_row).collect();
        assert_eq!(seen, expected);

        assert_eq!(group_rows(rows, 0), groups, "grouping is deterministic");
    }

    #[test]
    fn blank_and_missing_cells_are_unknown() {
        let groups = group_rows(vec![row(2, &["   "]), row(3, &[])], 0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, UNKNOWN_GROUP);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn sanitized_values_share_a_group() {
        assert_eq!(group_key("A/B"), "A_B");
        assert_eq!(group_key("  A B "), "A_B");
        assert_eq!(group_key("a<b>c:d\"e|f?g*h\\i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(group_key("\t"), UNKNOWN_GROUP);

        let groups = group_rows(vec![row(2, &["A/B"]), row(3, &["A B"])], 0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "A_B");
    }

    #[test]
    fn keys_are_case_sensitive() {
        let groups = group_rows(vec![row(2, &["Bob"]), row(3, &["bob"])], 0);
        assert_eq!(groups.len(), 2);
    }
}
