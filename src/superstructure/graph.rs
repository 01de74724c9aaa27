use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use slotmap::SlotMap;
use tracing::warn;

use crate::error::RegistryError;
use crate::structure::RoiNumber;

use super::{Superstructure, SuperstructureId};

slotmap::new_key_type! {
    /// Arena key of a node in the dependency graph.
    pub struct NodeKey;
}

/// One superstructure as seen by the dependency graph.
#[derive(Debug, Clone)]
struct Node {
    id: SuperstructureId,
    target: RoiNumber,
    sources: Vec<RoiNumber>,
    auto_update: bool,
}

/// Source-to-target edges between structures, one node per superstructure.
///
/// The graph is kept acyclic: a structure never depends, directly or
/// transitively, on itself, and each structure is the target of at most one
/// superstructure.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: SlotMap<NodeKey, Node>,
    by_id: HashMap<SuperstructureId, NodeKey>,
    by_target: HashMap<RoiNumber, NodeKey>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from stored records. Records that would break the
    /// graph's invariants are left out and logged.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Superstructure>) -> Self {
        let mut graph = Self::new();
        for record in records {
            if let Err(err) = graph.insert(record) {
                warn!(id = %record.id, %err, "superstructure left out of dependency graph");
            }
        }
        graph
    }

    /// Number of superstructures in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no superstructures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SuperstructureId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// The superstructure deriving `target`, if any.
    #[must_use]
    pub fn deriving(&self, target: RoiNumber) -> Option<SuperstructureId> {
        self.by_target.get(&target).map(|&key| self.nodes[key].id)
    }

    /// Checks that a superstructure deriving `target` from `sources` could be
    /// added.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SelfReference` if `target` is among
    /// `sources`, `RegistryError::TargetAlreadyDerived` if another
    /// superstructure already derives `target`, and
    /// `RegistryError::DependencyCycle` if a source depends on `target`.
    pub fn check(&self, target: RoiNumber, sources: &[RoiNumber]) -> Result<(), RegistryError> {
        if sources.contains(&target) {
            return Err(RegistryError::SelfReference(target));
        }
        if self.by_target.contains_key(&target) {
            return Err(RegistryError::TargetAlreadyDerived(target));
        }
        let downstream = self.downstream_of(target);
        if sources.iter().any(|s| downstream.contains(s)) {
            return Err(RegistryError::DependencyCycle { target });
        }
        Ok(())
    }

    /// Adds a superstructure.
    ///
    /// # Errors
    ///
    /// Fails as [`DependencyGraph::check`] does; the graph is unchanged.
    pub fn insert(&mut self, record: &Superstructure) -> Result<(), RegistryError> {
        self.check(record.target_roi_number, &record.source_roi_numbers)?;
        let key = self.nodes.insert(Node {
            id: record.id,
            target: record.target_roi_number,
            sources: record.source_roi_numbers.clone(),
            auto_update: record.auto_update,
        });
        self.by_id.insert(record.id, key);
        self.by_target.insert(record.target_roi_number, key);
        Ok(())
    }

    /// Removes a superstructure. Returns `false` if it was not present.
    pub fn remove(&mut self, id: SuperstructureId) -> bool {
        let Some(key) = self.by_id.remove(&id) else {
            return false;
        };
        if let Some(node) = self.nodes.remove(key) {
            self.by_target.remove(&node.target);
        }
        true
    }

    /// Updates the auto-update flag of a node. Returns `false` if absent.
    pub fn set_auto_update(&mut self, id: SuperstructureId, enabled: bool) -> bool {
        match self.by_id.get(&id).and_then(|&key| self.nodes.get_mut(key)) {
            Some(node) => {
                node.auto_update = enabled;
                true
            }
            None => false,
        }
    }

    /// Auto-updating superstructures that must be regenerated after `roi`
    /// changes, directly or through other derived structures, in an order
    /// where every superstructure comes after all of its affected sources.
    ///
    /// A superstructure with auto-update disabled is not regenerated and does
    /// not propagate the change further.
    #[must_use]
    pub fn affected_by(&self, roi: RoiNumber) -> Vec<SuperstructureId> {
        let affected = self.affected_nodes(roi);

        // Kahn's algorithm over the affected subgraph; ties break on the
        // target ROI number so the order is stable.
        let mut in_degree: HashMap<NodeKey, usize> = affected
            .iter()
            .map(|&key| {
                let node = &self.nodes[key];
                let degree = node
                    .sources
                    .iter()
                    .filter(|s| {
                        self.by_target
                            .get(s)
                            .is_some_and(|producer| affected.contains(producer))
                    })
                    .count();
                (key, degree)
            })
            .collect();

        let mut ready: BTreeSet<(RoiNumber, NodeKey)> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&key, _)| (self.nodes[key].target, key))
            .collect();

        let mut order = Vec::with_capacity(affected.len());
        while let Some((target, key)) = ready.pop_first() {
            order.push(self.nodes[key].id);
            for &consumer in &affected {
                if !self.nodes[consumer].sources.contains(&target) {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((self.nodes[consumer].target, consumer));
                    }
                }
            }
        }
        order
    }

    fn affected_nodes(&self, roi: RoiNumber) -> HashSet<NodeKey> {
        let mut affected = HashSet::new();
        let mut queue = VecDeque::from([roi]);
        let mut visited = HashSet::from([roi]);
        while let Some(changed) = queue.pop_front() {
            for (key, node) in &self.nodes {
                if node.auto_update && node.sources.contains(&changed) {
                    affected.insert(key);
                    if visited.insert(node.target) {
                        queue.push_back(node.target);
                    }
                }
            }
        }
        affected
    }

    /// Structures derived from `roi`, directly or transitively.
    fn downstream_of(&self, roi: RoiNumber) -> HashSet<RoiNumber> {
        let mut reached = HashSet::new();
        let mut queue = VecDeque::from([roi]);
        while let Some(changed) = queue.pop_front() {
            for node in self.nodes.values() {
                if node.sources.contains(&changed) && reached.insert(node.target) {
                    queue.push_back(node.target);
                }
            }
        }
        reached
    }
}
