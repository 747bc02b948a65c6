//! Controller/locked relationships between on-board pegs.

use std::collections::BTreeMap;

use log::{debug, warn};
use screw_unlock_core::{CellCoord, ComponentId, Event, LockLimits, PegId};

/// Directed edge from a controller to the peg it withholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockConnection {
    /// Peg that must be removed first.
    pub controller: PegId,
    /// Peg withheld until every controller is gone.
    pub locked: PegId,
}

#[derive(Clone, Debug)]
struct LockNode {
    cell: CellCoord,
    component: ComponentId,
    controllers: Vec<PegId>,
    controller: Option<PegId>,
    control: Option<PegId>,
    locked: bool,
}

impl LockNode {
    fn new(cell: CellCoord, component: ComponentId) -> Self {
        Self {
            cell,
            component,
            controllers: Vec::new(),
            controller: None,
            control: None,
            locked: false,
        }
    }
}

/// Lock graph over the pegs currently on the board.
///
/// Every peg controls at most one other peg, a locked peg may be held by up
/// to `max_controllers` controllers, and the graph stays acyclic with chains
/// no longer than `max_chain_length`. Mutations run a consistency pass that
/// silently repairs any state violating these rules.
#[derive(Clone, Debug)]
pub struct LockGraph {
    limits: LockLimits,
    nodes: BTreeMap<PegId, LockNode>,
    connections: Vec<LockConnection>,
}

impl LockGraph {
    /// Creates an empty graph enforcing the provided limits.
    #[must_use]
    pub fn new(limits: LockLimits) -> Self {
        Self {
            limits,
            nodes: BTreeMap::new(),
            connections: Vec::new(),
        }
    }

    /// Limits enforced by the graph.
    #[must_use]
    pub fn limits(&self) -> &LockLimits {
        &self.limits
    }

    /// Registers a peg that appeared on the board.
    pub fn place(&mut self, peg: PegId, component: ComponentId, cell: CellCoord) {
        let _ = self.nodes.insert(peg, LockNode::new(cell, component));
    }

    /// Reports whether the peg is registered as being on the board.
    #[must_use]
    pub fn is_on_board(&self, peg: PegId) -> bool {
        self.nodes.contains_key(&peg)
    }

    /// Reports whether the peg is withheld by at least one controller.
    #[must_use]
    pub fn is_locked(&self, peg: PegId) -> bool {
        self.nodes.get(&peg).map_or(false, |node| node.locked)
    }

    /// Primary controller of the peg.
    #[must_use]
    pub fn controller(&self, peg: PegId) -> Option<PegId> {
        self.nodes.get(&peg).and_then(|node| node.controller)
    }

    /// Every controller holding the peg, in the order they were attached.
    #[must_use]
    pub fn controllers(&self, peg: PegId) -> &[PegId] {
        self.nodes
            .get(&peg)
            .map_or(&[][..], |node| node.controllers.as_slice())
    }

    /// Peg controlled by the provided peg.
    #[must_use]
    pub fn control(&self, peg: PegId) -> Option<PegId> {
        self.nodes.get(&peg).and_then(|node| node.control)
    }

    /// Every connection in creation order.
    #[must_use]
    pub fn connections(&self) -> &[LockConnection] {
        &self.connections
    }

    /// Reports whether `controller` may start withholding `target`.
    #[must_use]
    pub fn can_control(&self, controller: PegId, target: PegId) -> bool {
        if controller == target {
            return false;
        }
        let (Some(source), Some(sink)) = (self.nodes.get(&controller), self.nodes.get(&target)) else {
            return false;
        };
        if source.control.is_some() {
            return false;
        }
        if source.cell.manhattan_distance(sink.cell) > self.limits.max_lock_distance {
            return false;
        }
        if sink.controllers.len() >= self.limits.max_controllers as usize
            || sink.controllers.contains(&controller)
        {
            return false;
        }
        if self.chain(controller).contains(&target) {
            return false;
        }

        let downstream = self.control_path(target);
        if downstream.contains(&controller) {
            return false;
        }

        let longest = self
            .lock_depth(controller)
            .saturating_add(u32::try_from(downstream.len()).unwrap_or(u32::MAX));
        longest <= self.limits.max_chain_length
    }

    /// Eligible controllers for `target`, nearest first.
    ///
    /// Candidates belong to a different component than the target and are not
    /// controlling anything yet.
    #[must_use]
    pub fn controller_candidates(&self, target: PegId) -> Vec<PegId> {
        let Some(sink) = self.nodes.get(&target) else {
            return Vec::new();
        };

        let mut candidates: Vec<(u32, PegId)> = self
            .nodes
            .iter()
            .filter(|(id, node)| node.component != sink.component && self.can_control(**id, target))
            .map(|(id, node)| (node.cell.manhattan_distance(sink.cell), *id))
            .collect();
        candidates.sort_unstable();
        candidates.into_iter().map(|(_, id)| id).collect()
    }

    /// Attaches `controller` to `target`, returning whether the lock was applied.
    pub fn apply_lock(&mut self, controller: PegId, target: PegId, out: &mut Vec<Event>) -> bool {
        if !self.can_control(controller, target) {
            return false;
        }

        if let Some(sink) = self.nodes.get_mut(&target) {
            sink.controllers.push(controller);
            if sink.controller.is_none() {
                sink.controller = Some(controller);
            }
            sink.locked = true;
        }
        if let Some(source) = self.nodes.get_mut(&controller) {
            source.control = Some(target);
        }
        self.connections.push(LockConnection {
            controller,
            locked: target,
        });
        out.push(Event::LockApplied {
            controller,
            locked: target,
        });

        self.repair(out);
        true
    }

    /// Removes a connection, unlocking its target once no controller remains.
    ///
    /// Returns `false` when the connection does not exist.
    pub fn remove_connection(&mut self, connection: LockConnection, out: &mut Vec<Event>) -> bool {
        let Some(position) = self.connections.iter().position(|c| *c == connection) else {
            return false;
        };
        let _ = self.connections.remove(position);

        let mut unlocked = false;
        if let Some(sink) = self.nodes.get_mut(&connection.locked) {
            sink.controllers.retain(|id| *id != connection.controller);
            if sink.controllers.is_empty() {
                unlocked = sink.locked;
                sink.locked = false;
                sink.controller = None;
            } else if sink.controller == Some(connection.controller) {
                sink.controller = sink.controllers.first().copied();
            }
        }
        if let Some(source) = self.nodes.get_mut(&connection.controller) {
            if source.control == Some(connection.locked) {
                source.control = None;
            }
        }

        out.push(Event::LockReleased {
            controller: connection.controller,
            locked: connection.locked,
        });
        if unlocked {
            out.push(Event::PegUnlocked {
                peg: connection.locked,
            });
        }
        true
    }

    /// Drops a peg leaving the board together with every connection touching it.
    pub fn release_peg(&mut self, peg: PegId, out: &mut Vec<Event>) {
        let touching: Vec<LockConnection> = self
            .connections
            .iter()
            .copied()
            .filter(|c| c.controller == peg || c.locked == peg)
            .collect();
        for connection in touching {
            let _ = self.remove_connection(connection, out);
        }
        let _ = self.nodes.remove(&peg);
        self.repair(out);
    }

    /// Removes every inbound connection of the peg.
    ///
    /// Returns whether the peg was locked before the call.
    pub fn force_unlock(&mut self, peg: PegId, out: &mut Vec<Event>) -> bool {
        let was_locked = self.is_locked(peg);
        let inbound: Vec<LockConnection> = self
            .connections
            .iter()
            .copied()
            .filter(|c| c.locked == peg)
            .collect();
        for connection in inbound {
            let _ = self.remove_connection(connection, out);
        }
        if let Some(node) = self.nodes.get_mut(&peg) {
            if node.locked {
                node.locked = false;
                node.controller = None;
                node.controllers.clear();
                out.push(Event::PegUnlocked { peg });
            }
        }
        was_locked
    }

    /// Ancestors reached through primary controllers, root first.
    #[must_use]
    pub fn chain(&self, peg: PegId) -> Vec<PegId> {
        let mut chain = Vec::new();
        let mut current = self.controller(peg);
        while let Some(id) = current {
            if id == peg || chain.contains(&id) || chain.len() > self.nodes.len() {
                break;
            }
            chain.push(id);
            current = self.controller(id);
        }
        chain.reverse();
        chain
    }

    /// One plus the longest chain of controller ancestors above the peg.
    #[must_use]
    pub fn lock_depth(&self, peg: PegId) -> u32 {
        self.depth_within(peg, self.nodes.len())
    }

    /// Number of locked pegs whose primary controller is not itself locked.
    #[must_use]
    pub fn count_lock_groups(&self) -> u32 {
        let groups = self
            .nodes
            .values()
            .filter(|node| node.locked)
            .filter(|node| !node.controller.map_or(false, |id| self.is_locked(id)))
            .count();
        u32::try_from(groups).unwrap_or(u32::MAX)
    }

    fn depth_within(&self, peg: PegId, budget: usize) -> u32 {
        if budget == 0 {
            return 1;
        }
        self.controllers(peg)
            .iter()
            .map(|id| self.depth_within(*id, budget - 1))
            .max()
            .map_or(1, |depth| depth.saturating_add(1))
    }

    fn control_path(&self, peg: PegId) -> Vec<PegId> {
        let mut path = vec![peg];
        let mut current = self.control(peg);
        while let Some(id) = current {
            if path.contains(&id) {
                break;
            }
            path.push(id);
            current = self.control(id);
        }
        path
    }

    fn repair(&mut self, out: &mut Vec<Event>) {
        let stale: Vec<LockConnection> = self
            .connections
            .iter()
            .copied()
            .filter(|c| !self.nodes.contains_key(&c.controller) || !self.nodes.contains_key(&c.locked))
            .collect();
        for connection in stale {
            debug!(
                "dropping lock {} -> {} with an endpoint off the board",
                connection.controller.get(),
                connection.locked.get()
            );
            let _ = self.remove_connection(connection, out);
        }

        let mutual: Vec<LockConnection> = self
            .connections
            .iter()
            .copied()
            .filter(|c| {
                self.connections
                    .iter()
                    .any(|other| other.controller == c.locked && other.locked == c.controller)
            })
            .collect();
        for connection in mutual {
            debug!(
                "breaking mutual lock {} <-> {}",
                connection.controller.get(),
                connection.locked.get()
            );
            let _ = self.remove_connection(connection, out);
        }

        let mut index = 0;
        while index < self.connections.len() {
            let connection = self.connections[index];
            if self.closes_cycle(connection) {
                debug!(
                    "breaking lock cycle through {} -> {}",
                    connection.controller.get(),
                    connection.locked.get()
                );
                let _ = self.remove_connection(connection, out);
            } else {
                index += 1;
            }
        }

        let connections = self.connections.clone();
        for (id, node) in self.nodes.iter_mut() {
            let inbound: Vec<PegId> = connections
                .iter()
                .filter(|c| c.locked == *id)
                .map(|c| c.controller)
                .collect();
            node.controllers.retain(|controller| inbound.contains(controller));
            for controller in inbound {
                if !node.controllers.contains(&controller) {
                    node.controllers.push(controller);
                }
            }

            if node.controllers.is_empty() {
                if node.locked {
                    warn!("force-unlocking peg {} left without controllers", id.get());
                    out.push(Event::PegUnlocked { peg: *id });
                }
                node.locked = false;
                node.controller = None;
            } else {
                node.locked = true;
                if !node.controller.map_or(false, |c| node.controllers.contains(&c)) {
                    node.controller = node.controllers.first().copied();
                }
            }

            node.control = connections
                .iter()
                .find(|c| c.controller == *id)
                .map(|c| c.locked);
        }
    }

    fn closes_cycle(&self, connection: LockConnection) -> bool {
        let mut current = Some(connection.locked);
        let mut steps = 0;
        while let Some(id) = current {
            if steps > self.nodes.len() {
                return true;
            }
            if id == connection.controller {
                return true;
            }
            current = self
                .connections
                .iter()
                .find(|c| c.controller == id)
                .map(|c| c.locked);
            steps += 1;
        }
        false
    }
}
