//! Owner to child row ranges.
//!
//! Several tables do not store how many children an owner has. List columns
//! (`TypeDef.FieldList`, `PropertyMap.PropertyList`, ...) hold only the first child row;
//! the count follows from the next owner's first row. Owner-sorted tables
//! (`CustomAttribute`, `GenericParam`, `DeclSecurity`, ...) hold an owner per child row;
//! ranges follow from grouping runs of identical owners.

use std::collections::HashMap;

use crate::metadata::token::Token;

/// A run of consecutive rows: `start` is the first 1-based row id, `length` the count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Range {
    /// First row id
    pub start: u32,
    /// Number of rows
    pub length: u32,
}

impl Range {
    /// Create a range
    #[must_use]
    pub const fn new(start: u32, length: u32) -> Self {
        Range { start, length }
    }

    /// One past the last row id
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start + self.length
    }

    /// True if the range holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True if `rid` lies inside the range
    #[must_use]
    pub fn contains(&self, rid: u32) -> bool {
        rid >= self.start && rid < self.end()
    }

    /// Row ids in the range
    pub fn rows(&self) -> std::ops::Range<u32> {
        self.start..self.end()
    }
}

/// Derive one range per owner from the list column start indices.
///
/// `starts[i]` is the list column of owner row `i + 1`, `target_rows` the row count of the
/// child table. A start of 0, or one past the child table, yields an empty range; a start
/// lower than its predecessor's is treated as empty rather than wrapping.
#[must_use]
pub fn derive_list_ranges(starts: &[u32], target_rows: u32) -> Vec<Range> {
    let limit = target_rows + 1;

    starts
        .iter()
        .enumerate()
        .map(|(index, start)| {
            let start = *start;
            if start == 0 || start > target_rows {
                return Range::new(start, 0);
            }

            let next = starts
                .get(index + 1)
                .map_or(limit, |next| (*next).min(limit));
            Range::new(start, next.saturating_sub(start))
        })
        .collect()
}

/// Group runs of identical owners into ranges.
///
/// `owners` yields the owner of every child row in table order, starting at row 1. An
/// owner whose children are not adjacent receives several ranges. Null owners are skipped.
pub fn group_owner_runs<I>(owners: I) -> HashMap<Token, Vec<Range>>
where
    I: IntoIterator<Item = Token>,
{
    let mut ranges: HashMap<Token, Vec<Range>> = HashMap::new();
    let mut current: Option<(Token, Range)> = None;

    for (rid, owner) in (1u32..).zip(owners) {
        if let Some((token, range)) = current.as_mut() {
            if *token == owner {
                range.length += 1;
                continue;
            }
        }

        if let Some((token, range)) = current.take() {
            ranges.entry(token).or_default().push(range);
        }
        current = Some((owner, Range::new(rid, 1)));
    }

    if let Some((token, range)) = current {
        ranges.entry(token).or_default().push(range);
    }

    ranges.retain(|token, _| !token.is_null());
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_ranges_share_start() {
        // ownerB and ownerC share a start, ownerB owns nothing
        let ranges = derive_list_ranges(&[1, 5, 5], 10);

        assert_eq!(ranges[0], Range::new(1, 4));
        assert_eq!(ranges[0].rows(), 1..5);
        assert_eq!(ranges[1], Range::new(5, 0));
        assert!(ranges[1].is_empty());
        assert_eq!(ranges[2], Range::new(5, 6));
        assert_eq!(ranges[2].end(), 11);
    }

    #[test]
    fn list_ranges_edges() {
        assert!(derive_list_ranges(&[], 3).is_empty());
        assert_eq!(derive_list_ranges(&[0, 1], 3), vec![Range::new(0, 0), Range::new(1, 3)]);
        // start one past the child table: nothing left
        assert_eq!(derive_list_ranges(&[1, 4], 3), vec![Range::new(1, 3), Range::new(4, 0)]);
        // next start beyond the table is clamped
        assert_eq!(derive_list_ranges(&[2, 9], 3), vec![Range::new(2, 2), Range::new(9, 0)]);
        // decreasing starts do not wrap
        assert_eq!(derive_list_ranges(&[3, 2], 3)[0], Range::new(3, 0));
    }

    #[test]
    fn owner_runs() {
        let a = Token::new(0x0200_0001);
        let b = Token::new(0x0600_0001);
        let ranges = group_owner_runs([a, a, b, a, Token::new(0x0200_0000), b]);

        assert_eq!(ranges[&a], vec![Range::new(1, 2), Range::new(4, 1)]);
        assert_eq!(ranges[&b], vec![Range::new(3, 1), Range::new(6, 1)]);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn contains() {
        let range = Range::new(3, 2);
        assert!(!range.contains(2));
        assert!(range.contains(3));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }
}
