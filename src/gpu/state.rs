//! Resource State Tracking
//!
//! A single table of the current access state of every subresource. Call
//! sites only say which state they *need*; the tracker knows where each
//! subresource is and emits the barriers that get it there.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::{SmallVec, smallvec};

use super::types::{Barrier, ResourceId, ResourceState, Subresource};

pub type BarrierList = SmallVec<[Barrier; 4]>;

/// A barrier or access whose expected state did not match the tracked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMismatch {
    pub resource: ResourceId,
    pub subresource: u32,
    pub expected: ResourceState,
    pub actual: ResourceState,
}

impl fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} subresource {} is {:?}, expected {:?}",
            self.resource, self.subresource, self.actual, self.expected
        )
    }
}

/// Saved subresource states of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    resource: ResourceId,
    states: SmallVec<[ResourceState; 1]>,
}

/// Current-state table keyed by resource handle.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: FxHashMap<ResourceId, SmallVec<[ResourceState; 1]>>,
}

impl ResourceStateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a resource with `subresource_count` subresources.
    pub fn register(
        &mut self,
        resource: impl Into<ResourceId>,
        subresource_count: u32,
        initial: ResourceState,
    ) {
        let count = subresource_count.max(1) as usize;
        self.states
            .insert(resource.into(), smallvec![initial; count]);
    }

    pub fn forget(&mut self, resource: impl Into<ResourceId>) {
        self.states.remove(&resource.into());
    }

    #[must_use]
    pub fn is_tracked(&self, resource: impl Into<ResourceId>) -> bool {
        self.states.contains_key(&resource.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of one subresource.
    #[must_use]
    pub fn state(&self, resource: impl Into<ResourceId>, subresource: u32) -> Option<ResourceState> {
        self.states
            .get(&resource.into())
            .and_then(|s| s.get(subresource as usize).copied())
    }

    /// The common state of all subresources, if they agree.
    #[must_use]
    pub fn uniform_state(&self, resource: impl Into<ResourceId>) -> Option<ResourceState> {
        let states = self.states.get(&resource.into())?;
        let first = *states.first()?;
        states.iter().all(|s| *s == first).then_some(first)
    }

    /// Copies the current states of `resource`, for rolling back barriers
    /// recorded into a list that is then discarded.
    #[must_use]
    pub fn snapshot(&self, resource: impl Into<ResourceId>) -> Option<StateSnapshot> {
        let resource = resource.into();
        self.states.get(&resource).map(|states| StateSnapshot {
            resource,
            states: states.clone(),
        })
    }

    /// Puts a resource back into the states of `snapshot`. Resources forgotten
    /// since the snapshot stay forgotten.
    pub fn restore(&mut self, snapshot: StateSnapshot) {
        if let Some(states) = self.states.get_mut(&snapshot.resource) {
            *states = snapshot.states;
        }
    }

    /// Moves `subresource` of `resource` into `after`, returning the barriers
    /// required. Subresources already in `after` produce nothing.
    pub fn transition(
        &mut self,
        resource: impl Into<ResourceId>,
        subresource: Subresource,
        after: ResourceState,
    ) -> BarrierList {
        let resource = resource.into();
        let states = self
            .states
            .get_mut(&resource)
            .unwrap_or_else(|| panic!("transition of untracked resource {resource:?}"));
        let mut barriers = BarrierList::new();

        match subresource {
            Subresource::All => {
                let first = states[0];
                if states.iter().all(|s| *s == first) {
                    if first != after {
                        barriers.push(Barrier {
                            resource,
                            subresource: Subresource::All,
                            before: first,
                            after,
                        });
                    }
                } else {
                    for (index, before) in states.iter().enumerate() {
                        if *before != after {
                            barriers.push(Barrier {
                                resource,
                                subresource: Subresource::Index(index as u32),
                                before: *before,
                                after,
                            });
                        }
                    }
                }
                states.iter_mut().for_each(|s| *s = after);
            }
            Subresource::Index(index) => {
                let slot = &mut states[index as usize];
                if *slot != after {
                    barriers.push(Barrier {
                        resource,
                        subresource,
                        before: *slot,
                        after,
                    });
                    *slot = after;
                }
            }
        }

        barriers
    }

    /// Applies a barrier produced elsewhere, checking its `before` state.
    ///
    /// On mismatch the table is still updated so that one bad barrier does
    /// not cascade into a flood of follow-up reports.
    pub fn apply(&mut self, barrier: &Barrier) -> Result<(), StateMismatch> {
        let Some(states) = self.states.get_mut(&barrier.resource) else {
            return Err(StateMismatch {
                resource: barrier.resource,
                subresource: 0,
                expected: barrier.before,
                actual: ResourceState::Common,
            });
        };

        let mut result = Ok(());
        let mut check = |index: usize, state: &mut ResourceState| {
            if *state != barrier.before && result.is_ok() {
                result = Err(StateMismatch {
                    resource: barrier.resource,
                    subresource: index as u32,
                    expected: barrier.before,
                    actual: *state,
                });
            }
            *state = barrier.after;
        };

        match barrier.subresource {
            Subresource::All => {
                for (index, state) in states.iter_mut().enumerate() {
                    check(index, state);
                }
            }
            Subresource::Index(index) => match states.get_mut(index as usize) {
                Some(state) => check(index as usize, state),
                None => {
                    return Err(StateMismatch {
                        resource: barrier.resource,
                        subresource: index,
                        expected: barrier.before,
                        actual: ResourceState::Common,
                    });
                }
            },
        }

        result
    }

    /// Checks that every listed subresource is in `expected`.
    pub fn expect(
        &self,
        resource: impl Into<ResourceId>,
        subresources: impl IntoIterator<Item = u32>,
        expected: ResourceState,
    ) -> Result<(), StateMismatch> {
        let resource = resource.into();
        for index in subresources {
            let actual = self.state(resource, index).unwrap_or(ResourceState::Common);
            if actual != expected {
                return Err(StateMismatch {
                    resource,
                    subresource: index,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Checks every subresource of `resource`.
    pub fn expect_all(
        &self,
        resource: impl Into<ResourceId>,
        expected: ResourceState,
    ) -> Result<(), StateMismatch> {
        let resource = resource.into();
        let count = self.states.get(&resource).map_or(1, |s| s.len() as u32);
        self.expect(resource, 0..count, expected)
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::gpu::TextureId;

    fn texture() -> TextureId {
        let mut map = SlotMap::<TextureId, ()>::with_key();
        map.insert(())
    }

    #[test]
    fn transition_to_same_state_emits_nothing() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 4, ResourceState::Common);

        assert!(tracker.transition(tex, Subresource::All, ResourceState::Common).is_empty());
        assert!(tracker.transition(tex, Subresource::Index(2), ResourceState::Common).is_empty());
    }

    #[test]
    fn restore_rolls_back_recorded_transitions() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 3, ResourceState::Common);
        tracker.transition(tex, Subresource::Index(1), ResourceState::UnorderedAccess);

        let saved = tracker.snapshot(tex).unwrap();
        tracker.transition(tex, Subresource::All, ResourceState::CopySource);
        tracker.restore(saved);

        assert_eq!(tracker.state(tex, 0), Some(ResourceState::Common));
        assert_eq!(tracker.state(tex, 1), Some(ResourceState::UnorderedAccess));
    }

    #[test]
    fn restore_skips_forgotten_resources() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 1, ResourceState::Common);
        let saved = tracker.snapshot(tex).unwrap();
        tracker.forget(tex);

        tracker.restore(saved);
        assert!(!tracker.is_tracked(tex));
    }

    #[test]
    fn uniform_resource_gets_single_whole_barrier() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 6, ResourceState::Common);

        let barriers = tracker.transition(tex, Subresource::All, ResourceState::ShaderResource);
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].subresource, Subresource::All);
        assert_eq!(barriers[0].before, ResourceState::Common);
        assert_eq!(tracker.uniform_state(tex), Some(ResourceState::ShaderResource));
    }

    #[test]
    fn divergent_subresources_get_individual_barriers() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 3, ResourceState::Common);
        tracker.transition(tex, Subresource::Index(1), ResourceState::UnorderedAccess);

        let barriers = tracker.transition(tex, Subresource::All, ResourceState::UnorderedAccess);
        assert_eq!(barriers.len(), 2);
        assert!(barriers.iter().all(|b| b.before == ResourceState::Common));
        assert_eq!(tracker.uniform_state(tex), Some(ResourceState::UnorderedAccess));
    }

    #[test]
    fn apply_detects_wrong_before_state() {
        let tex = texture();
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 1, ResourceState::RenderTarget);

        let bad = Barrier {
            resource: tex.into(),
            subresource: Subresource::All,
            before: ResourceState::ShaderResource,
            after: ResourceState::CopySource,
        };
        let err = tracker.apply(&bad).unwrap_err();
        assert_eq!(err.actual, ResourceState::RenderTarget);
        assert_eq!(tracker.state(tex, 0), Some(ResourceState::CopySource));
    }

    #[test]
    fn subresource_index_follows_mip_major_layout() {
        assert_eq!(Subresource::at(0, 0, 11), Subresource::Index(0));
        assert_eq!(Subresource::at(3, 2, 11), Subresource::Index(25));
    }
}
