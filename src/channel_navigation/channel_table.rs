use std::collections::BTreeMap;

use crate::voice::ChannelInfo;

/// Snapshot of the server's channels keyed by id.
///
/// Ids are sparse; navigation walks them in order and skips the gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelTable {
    channels: BTreeMap<u32, ChannelInfo>,
}

impl ChannelTable {
    pub fn rebuild(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ChannelInfo> {
        self.channels.get(&id)
    }

    pub fn max_channel_id(&self) -> u32 {
        self.channels.keys().next_back().copied().unwrap_or(0)
    }

    pub fn first_id(&self) -> Option<u32> {
        self.channels.keys().next().copied()
    }

    /// First existing id strictly above `id`.
    pub fn next_above(&self, id: u32) -> Option<u32> {
        self.channels
            .range(id.saturating_add(1)..)
            .next()
            .map(|(k, _)| *k)
            .filter(|k| *k > id)
    }

    /// First existing id strictly below `id`.
    pub fn next_below(&self, id: u32) -> Option<u32> {
        self.channels.range(..id).next_back().map(|(k, _)| *k)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.values().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.channels.values()
    }

    /// One line per channel, roots and their direct children marked as parents.
    pub fn describe(&self) -> Vec<String> {
        self.channels
            .values()
            .map(|c| match c.parent_id {
                None | Some(0) => format!(
                    "Parent -> ID={:2} | Name={:<12} ({}) Users | ",
                    c.id, c.name, c.participant_count
                ),
                Some(parent) => format!(
                    "Child  -> ID={:2} | Name={:<12} ({}) Users | PID ={:2} | PName={:<12}",
                    c.id,
                    c.name,
                    c.participant_count,
                    parent,
                    self.get(parent).map(|p| p.name.as_str()).unwrap_or("?")
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u32, name: &str, parent: Option<u32>) -> ChannelInfo {
        ChannelInfo {
            id,
            name: name.to_string(),
            parent_id: parent,
            participant_count: 0,
        }
    }

    #[test]
    fn gaps_are_skipped() {
        let table = ChannelTable::rebuild(vec![
            channel(5, "Five", Some(0)),
            channel(0, "Root", None),
            channel(2, "Two", Some(0)),
        ]);

        assert_eq!(table.max_channel_id(), 5);
        assert_eq!(table.next_above(0), Some(2));
        assert_eq!(table.next_above(2), Some(5));
        assert_eq!(table.next_above(3), Some(5));
        assert_eq!(table.next_above(5), None);
        assert_eq!(table.next_below(5), Some(2));
        assert_eq!(table.next_below(2), Some(0));
        assert_eq!(table.next_below(0), None);
        assert_eq!(table.next_above(u32::MAX), None);
    }

    #[test]
    fn describe_marks_children() {
        let table = ChannelTable::rebuild(vec![
            channel(0, "Root", None),
            channel(1, "Ops", Some(0)),
            channel(3, "Night", Some(1)),
        ]);

        let lines = table.describe();
        assert!(lines[0].starts_with("Parent -> ID= 0 | Name=Root"));
        assert!(lines[1].starts_with("Parent -> ID= 1 | Name=Ops"));
        assert!(lines[2].starts_with("Child  -> ID= 3 | Name=Night"));
        assert!(lines[2].contains("PName=Ops"));
    }
}
