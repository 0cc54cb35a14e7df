use log::debug;
use serde::Serialize;

/// Whether anybody else is in our channel. The count includes ourselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Occupancy {
    Alone,
    Shared(usize),
}

impl Occupancy {
    pub fn from_count(count: usize) -> Self {
        if count <= 1 {
            Occupancy::Alone
        } else {
            Occupancy::Shared(count)
        }
    }
}

/// Debounces participant notifications.
///
/// Counts are recomputed on every membership event, but the operator only
/// hears about it when the occupancy differs from the last one announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantTracker {
    announced: Occupancy,
    last_count: Option<usize>,
}

impl Default for ParticipantTracker {
    fn default() -> Self {
        Self {
            announced: Occupancy::Alone,
            last_count: None,
        }
    }
}

impl ParticipantTracker {
    /// Records a fresh count and returns the occupancy to announce, if any.
    pub fn observe(&mut self, count: usize) -> Option<Occupancy> {
        self.last_count = Some(count);
        let occupancy = Occupancy::from_count(count);
        if occupancy == self.announced {
            return None;
        }
        debug!("Occupancy {:?} -> {:?}", self.announced, occupancy);
        self.announced = occupancy;
        Some(occupancy)
    }

    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// Forgets the previous session's channel.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_occupancy_changes_are_announced() {
        let mut tracker = ParticipantTracker::default();
        let announced: Vec<Occupancy> = [1, 1, 2, 2, 1, 0, 1]
            .into_iter()
            .filter_map(|count| tracker.observe(count))
            .collect();

        assert_eq!(announced, vec![Occupancy::Shared(2), Occupancy::Alone]);
        assert_eq!(tracker.last_count(), Some(1));
    }

    #[test]
    fn a_new_count_in_a_shared_channel_is_announced() {
        let mut tracker = ParticipantTracker::default();
        assert_eq!(tracker.observe(3), Some(Occupancy::Shared(3)));
        assert_eq!(tracker.observe(4), Some(Occupancy::Shared(4)));
        assert_eq!(tracker.observe(4), None);

        tracker.reset();
        assert_eq!(tracker.last_count(), None);
        assert_eq!(tracker.observe(1), None);
    }
}
