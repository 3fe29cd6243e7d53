//! Behaviors sharing one intent token

use std::sync::Arc;

use rand::Rng;

use super::Behavior;

/// Ordered behaviors for one token with non-repeating random selection
pub struct BehaviorGroup {
    token: String,
    behaviors: Vec<Arc<dyn Behavior>>,
    last_selected: Option<usize>,
}

impl std::fmt::Debug for BehaviorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorGroup")
            .field("token", &self.token)
            .field("behaviors", &self.behaviors.len())
            .field("last_selected", &self.last_selected)
            .finish()
    }
}

impl BehaviorGroup {
    /// Create an empty group
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            behaviors: Vec::new(),
            last_selected: None,
        }
    }

    /// Token shared by the group
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Append a behavior
    pub fn push(&mut self, behavior: Arc<dyn Behavior>) {
        self.behaviors.push(behavior);
    }

    /// Number of behaviors
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Whether the group has no behaviors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Index of the previous selection
    #[must_use]
    pub const fn last_selected(&self) -> Option<usize> {
        self.last_selected
    }

    /// Behavior at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Behavior>> {
        self.behaviors.get(index)
    }

    /// Pick the next behavior
    ///
    /// With more than one candidate the pick is uniform over every index
    /// except the previous one.
    pub fn select<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(usize, Arc<dyn Behavior>)> {
        let index = match (self.behaviors.len(), self.last_selected) {
            (0, _) => return None,
            (1, _) => 0,
            (len, None) => rng.gen_range(0..len),
            (len, Some(last)) => {
                // Draw from the len-1 others and skip over `last`
                let pick = rng.gen_range(0..len - 1);
                if pick >= last { pick + 1 } else { pick }
            }
        };

        self.last_selected = Some(index);
        Some((index, Arc::clone(&self.behaviors[index])))
    }
}
