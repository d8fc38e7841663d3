use automation_primitives::{UpkeepId, UpkeepType};

use parking_lot::RwLock;
use std::collections::HashSet;

/// The set of upkeeps currently active on the registry.
#[derive(Debug, Default)]
pub struct ActiveUpkeepList {
    ids: RwLock<HashSet<UpkeepId>>,
}

impl ActiveUpkeepList {
    /// Returns a new empty [`ActiveUpkeepList`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set with the provided upkeeps.
    pub fn reset(&self, ids: &[UpkeepId]) {
        *self.ids.write() = ids.iter().copied().collect();
    }

    /// Adds the upkeeps, returning the number of upkeeps which were not active yet.
    pub fn add(&self, ids: &[UpkeepId]) -> usize {
        let mut set = self.ids.write();
        ids.iter().filter(|id| set.insert(**id)).count()
    }

    /// Removes the upkeeps, returning the number of upkeeps which were active.
    pub fn remove(&self, ids: &[UpkeepId]) -> usize {
        let mut set = self.ids.write();
        ids.iter().filter(|id| set.remove(*id)).count()
    }

    /// Returns the active upkeeps of any of the provided types, or every active upkeep if no
    /// type is provided.
    pub fn view(&self, types: &[UpkeepType]) -> Vec<UpkeepId> {
        self.ids
            .read()
            .iter()
            .filter(|id| types.is_empty() || types.contains(&id.upkeep_type()))
            .copied()
            .collect()
    }

    /// Returns true if the upkeep is active.
    pub fn is_active(&self, id: &UpkeepId) -> bool {
        self.ids.read().contains(id)
    }

    /// Returns the number of active upkeeps.
    pub fn size(&self) -> usize {
        self.ids.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn id(ty: UpkeepType) -> UpkeepId {
        let mut rng = rand::rng();
        UpkeepId::new(ty, rng.random(), rng.random())
    }

    #[test]
    fn test_should_count_changes_only() {
        // Given
        let list = ActiveUpkeepList::new();
        let (a, b) = (id(UpkeepType::Conditional), id(UpkeepType::LogTrigger));

        // When
        let added = list.add(&[a, b]);
        let added_again = list.add(&[a]);

        // Then
        assert_eq!(added, 2);
        assert_eq!(added_again, 0);
        assert_eq!(list.size(), 2);

        assert_eq!(list.remove(&[a, a]), 1);
        assert_eq!(list.remove(&[a]), 0);
        assert_eq!(list.size(), 1);
        assert!(!list.is_active(&a));
        assert!(list.is_active(&b));
    }

    #[test]
    fn test_should_view_by_type() {
        let list = ActiveUpkeepList::new();
        let conditional = id(UpkeepType::Conditional);
        let log = id(UpkeepType::LogTrigger);
        let mut bytes = [0u8; 32];
        bytes[9] = 1;
        bytes[15] = UpkeepType::LogTrigger.as_byte();
        let legacy = UpkeepId::from(alloy_primitives::B256::new(bytes));
        list.add(&[conditional, log, legacy]);

        let mut conditionals = list.view(&[UpkeepType::Conditional]);
        conditionals.sort();
        let mut expected = vec![conditional, legacy];
        expected.sort();
        assert_eq!(conditionals, expected);
        assert_eq!(list.view(&[UpkeepType::LogTrigger]), vec![log]);
        assert_eq!(list.view(&[]).len(), 3);
        assert!(list.view(&[UpkeepType::Cron]).is_empty());
    }

    #[test]
    fn test_should_reset_atomically() {
        let list = ActiveUpkeepList::new();
        list.add(&[id(UpkeepType::Conditional), id(UpkeepType::Conditional)]);

        let replacement = id(UpkeepType::LogTrigger);
        list.reset(&[replacement]);

        assert_eq!(list.size(), 1);
        assert!(list.is_active(&replacement));
    }
}
