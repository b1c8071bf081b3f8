// src/dag/graph.rs

//! Mutable DAG of task nodes with synthetic start/end sentinels.
//!
//! Every graph has exactly one entry (`start`) and one exit (`end`). A node
//! with no explicit predecessor hangs off `start`; a node with no successor
//! points at `end`. An edge `X -> end` only exists while `X` has no other
//! successor, so the predecessors of `end` are exactly the current leaves.
//!
//! Composition moves nodes from one graph into another and keeps their
//! [`TaskId`]s, so ids handed out while building a sub-graph stay valid after
//! it has been spliced.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, Reversed};

use crate::dag::guard::TaskGuard;
use crate::dag::node::TaskNode;
use crate::dag::task::{MetaTask, Task, TaskKind};
use crate::errors::{JobGraphError, Result};
use crate::types::{TaskId, TaskStatus};

pub struct TaskGraph {
    graph: StableDiGraph<TaskNode, ()>,
    index: HashMap<TaskId, NodeIndex>,
    start: NodeIndex,
    end: NodeIndex,
}

/// Where imported roots get attached during a splice.
enum Anchor {
    Leaves,
    Start,
    Task(TaskId),
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let start = graph.add_node(TaskNode::start());
        let end = graph.add_node(TaskNode::end());
        graph.add_edge(start, end, ());

        let mut index = HashMap::new();
        index.insert(graph[start].id(), start);
        index.insert(graph[end].id(), end);

        Self {
            graph,
            index,
            start,
            end,
        }
    }

    // ---------------------------------------------------------------------
    // Building
    // ---------------------------------------------------------------------

    /// Add `task` after `predecessors` (after `start` when empty).
    pub fn add_task<T: Task + 'static>(
        &mut self,
        task: T,
        guard: TaskGuard,
        predecessors: &[TaskId],
    ) -> Result<TaskId> {
        self.add_node(TaskKind::Simple(Arc::new(task)), guard, predecessors)
    }

    pub fn add_meta_task<T: MetaTask + 'static>(
        &mut self,
        task: T,
        guard: TaskGuard,
        predecessors: &[TaskId],
    ) -> Result<TaskId> {
        self.add_node(TaskKind::Meta(Arc::new(task)), guard, predecessors)
    }

    /// Add a node of any kind. The general form of [`TaskGraph::add_task`].
    pub fn add_node(
        &mut self,
        kind: TaskKind,
        guard: TaskGuard,
        predecessors: &[TaskId],
    ) -> Result<TaskId> {
        let preds = if predecessors.is_empty() {
            vec![self.start]
        } else {
            predecessors
                .iter()
                .map(|id| self.require(*id))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(self.attach(TaskNode::new(kind, guard), &preds))
    }

    /// Add `task` after every current leaf.
    pub fn append_task<T: Task + 'static>(&mut self, task: T, guard: TaskGuard) -> TaskId {
        let leaves = self.leaf_indices();
        self.attach(TaskNode::new(TaskKind::Simple(Arc::new(task)), guard), &leaves)
    }

    pub fn append_meta_task<T: MetaTask + 'static>(&mut self, task: T, guard: TaskGuard) -> TaskId {
        let leaves = self.leaf_indices();
        self.attach(TaskNode::new(TaskKind::Meta(Arc::new(task)), guard), &leaves)
    }

    fn attach(&mut self, node: TaskNode, preds: &[NodeIndex]) -> TaskId {
        let id = node.id();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        for &p in preds {
            self.graph.update_edge(p, idx, ());
            self.remove_edge(p, self.end);
        }
        self.graph.update_edge(idx, self.end, ());
        id
    }

    /// Splice `sub` after the current leaves, keeping the imported guards.
    pub fn add_task_graph(&mut self, sub: TaskGraph) -> Result<()> {
        self.splice(sub, Anchor::Leaves, None).map(|_| ())
    }

    /// Splice `sub` after `anchor`; its roots require `anchor` to pass.
    pub fn add_task_graph_after(&mut self, sub: TaskGraph, anchor: TaskId) -> Result<()> {
        self.splice(
            sub,
            Anchor::Task(anchor),
            Some(TaskGuard::AllPredecessorsSucceeded),
        )
        .map(|_| ())
    }

    /// Splice `sub` with `guard` on its roots, after `anchor` or, when `None`,
    /// as a parallel branch hanging off `start`.
    pub fn add_task_graph_with_guard(
        &mut self,
        sub: TaskGraph,
        guard: TaskGuard,
        anchor: Option<TaskId>,
    ) -> Result<()> {
        let anchor = match anchor {
            Some(id) => Anchor::Task(id),
            None => Anchor::Start,
        };
        self.splice(sub, anchor, Some(guard)).map(|_| ())
    }

    /// Splice `sub` between `anchor` and the nodes that currently follow it.
    ///
    /// The anchor's former successors are rewired to depend on the imported
    /// leaves instead. Returns the ids of the imported nodes.
    pub fn insert_task_graph(&mut self, sub: TaskGraph, anchor: TaskId) -> Result<Vec<TaskId>> {
        let anchor_idx = self.require(anchor)?;
        let former: Vec<NodeIndex> = self.succ_indices(anchor_idx);

        let spliced = self.splice(
            sub,
            Anchor::Task(anchor),
            Some(TaskGuard::AllPredecessorsSucceeded),
        )?;
        if spliced.imported.is_empty() {
            return Ok(Vec::new());
        }

        for &leaf in &spliced.leaves {
            self.remove_edge(leaf, self.end);
            for &s in &former {
                self.graph.update_edge(leaf, s, ());
            }
        }
        for &s in &former {
            self.remove_edge(anchor_idx, s);
        }

        Ok(spliced
            .imported
            .iter()
            .map(|&idx| self.graph[idx].id())
            .collect())
    }

    fn splice(
        &mut self,
        mut sub: TaskGraph,
        anchor: Anchor,
        root_guard: Option<TaskGuard>,
    ) -> Result<Spliced> {
        if sub.is_empty() {
            return Ok(Spliced::default());
        }

        let anchors = match anchor {
            Anchor::Leaves => self.leaf_indices(),
            Anchor::Start => vec![self.start],
            Anchor::Task(id) => vec![self.require(id)?],
        };

        if let Some(dup) = sub.task_ids().into_iter().find(|id| self.index.contains_key(id)) {
            return Err(JobGraphError::InvalidGraph(format!(
                "task {dup} is already part of the target graph"
            )));
        }

        let roots: HashSet<TaskId> = sub
            .succ_indices(sub.start)
            .into_iter()
            .filter(|&i| i != sub.end)
            .map(|i| sub.graph[i].id())
            .collect();
        let leaves: HashSet<TaskId> = sub
            .pred_indices(sub.end)
            .into_iter()
            .filter(|&i| i != sub.start)
            .map(|i| sub.graph[i].id())
            .collect();
        let inner_edges: Vec<(TaskId, TaskId)> = sub.edges();

        let mut imported = Vec::new();
        let mut moved: HashMap<TaskId, NodeIndex> = HashMap::new();
        let work: Vec<NodeIndex> = sub
            .graph
            .node_indices()
            .filter(|&i| i != sub.start && i != sub.end)
            .collect();
        for old in work {
            let Some(mut node) = sub.graph.remove_node(old) else {
                continue;
            };
            if roots.contains(&node.id()) {
                if let Some(g) = root_guard {
                    node.set_guard(g);
                }
            }
            let id = node.id();
            let idx = self.graph.add_node(node);
            self.index.insert(id, idx);
            moved.insert(id, idx);
            imported.push(idx);
        }

        for (from, to) in inner_edges {
            if let (Some(&a), Some(&b)) = (moved.get(&from), moved.get(&to)) {
                self.graph.update_edge(a, b, ());
            }
        }

        for root in &roots {
            if let Some(&r) = moved.get(root) {
                for &a in &anchors {
                    self.graph.update_edge(a, r, ());
                }
            }
        }
        for &a in &anchors {
            self.remove_edge(a, self.end);
        }

        let leaf_indices: Vec<NodeIndex> = leaves.iter().filter_map(|l| moved.get(l).copied()).collect();
        for &l in &leaf_indices {
            self.graph.update_edge(l, self.end, ());
        }

        Ok(Spliced {
            imported,
            leaves: leaf_indices,
        })
    }

    fn remove_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if let Some(e) = self.graph.find_edge(from, to) {
            self.graph.remove_edge(e);
        }
    }

    fn require(&self, id: TaskId) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or_else(|| JobGraphError::TaskNotFound(id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn start_id(&self) -> TaskId {
        self.graph[self.start].id()
    }

    pub fn end_id(&self) -> TaskId {
        self.graph[self.end].id()
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.index.get(&id).map(|&i| &self.graph[i])
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.node(id).map(|n| n.status())
    }

    /// First work node called `name`.
    pub fn node_by_name(&self, name: &str) -> Option<&TaskNode> {
        self.nodes().find(|n| n.name() == name)
    }

    /// Work nodes, sentinels excluded, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph
            .node_indices()
            .filter(move |&i| i != self.start && i != self.end)
            .map(move |i| &self.graph[i])
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.nodes().map(|n| n.id()).collect()
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Direct predecessors of `id`, sentinels excluded.
    pub fn predecessors(&self, id: TaskId) -> Vec<TaskId> {
        self.index
            .get(&id)
            .map(|&i| self.work_ids(self.pred_indices(i)))
            .unwrap_or_default()
    }

    /// Direct successors of `id`, sentinels excluded.
    pub fn successors(&self, id: TaskId) -> Vec<TaskId> {
        self.index
            .get(&id)
            .map(|&i| self.work_ids(self.succ_indices(i)))
            .unwrap_or_default()
    }

    /// Transitive ancestors of `id`, nearest first, sentinels excluded.
    pub fn ancestors(&self, id: TaskId) -> Vec<TaskId> {
        self.index
            .get(&id)
            .map(|&i| self.work_ids(self.ancestor_indices(i)))
            .unwrap_or_default()
    }

    /// Nodes whose only successor is `end`.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.work_ids(self.leaf_indices())
    }

    /// Edges between work nodes.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter(|(a, b)| !self.is_sentinel(*a) && !self.is_sentinel(*b))
            .map(|(a, b)| (self.graph[a].id(), self.graph[b].id()))
            .collect()
    }

    /// All nodes in dependency order, sentinels included.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|i| self.graph[i].id()).collect())
            .map_err(|cycle| {
                JobGraphError::DagCycle(format!(
                    "cycle detected in task graph involving task '{}'",
                    self.graph[cycle.node_id()].name()
                ))
            })
    }

    /// Work nodes in dependency order.
    pub fn task_ids_in_order(&self) -> Result<Vec<TaskId>> {
        let start = self.start_id();
        let end = self.end_id();
        Ok(self
            .topological_sort()?
            .into_iter()
            .filter(|id| *id != start && *id != end)
            .collect())
    }

    /// Check that the graph is acyclic and that every node lies on a path
    /// from `start` to `end`.
    pub fn validate(&self) -> Result<()> {
        self.topological_sort()?;

        let mut from_start = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, self.start);
        while let Some(n) = dfs.next(&self.graph) {
            from_start.insert(n);
        }

        let mut to_end = HashSet::new();
        let rev = Reversed(&self.graph);
        let mut dfs = Dfs::new(rev, self.end);
        while let Some(n) = dfs.next(rev) {
            to_end.insert(n);
        }

        for i in self.graph.node_indices() {
            let node = &self.graph[i];
            if !from_start.contains(&i) {
                return Err(JobGraphError::InvalidGraph(format!(
                    "task '{}' is not reachable from start",
                    node.name()
                )));
            }
            if !to_end.contains(&i) {
                return Err(JobGraphError::InvalidGraph(format!(
                    "task '{}' does not reach end",
                    node.name()
                )));
            }
        }
        Ok(())
    }

    /// Add an edge between two existing work nodes.
    ///
    /// Used to wire nodes after the fact; refuses edges that would close a
    /// cycle.
    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        let a = self.require(from)?;
        let b = self.require(to)?;
        if self.is_sentinel(a) || self.is_sentinel(b) {
            return Err(JobGraphError::InvalidGraph(
                "sentinel nodes cannot be rewired".to_string(),
            ));
        }
        if a == b || self.ancestor_indices(a).contains(&b) {
            return Err(JobGraphError::DagCycle(format!(
                "edge '{}' -> '{}' would create a cycle",
                self.graph[a].name(),
                self.graph[b].name()
            )));
        }
        self.graph.update_edge(a, b, ());
        self.remove_edge(a, self.end);
        self.remove_edge(self.start, b);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Index-level access for the engine
    // ---------------------------------------------------------------------

    pub(crate) fn index_of(&self, id: TaskId) -> Option<NodeIndex> {
        self.index.get(&id).copied()
    }

    pub(crate) fn start_index(&self) -> NodeIndex {
        self.start
    }

    pub(crate) fn node_at(&self, idx: NodeIndex) -> &TaskNode {
        &self.graph[idx]
    }

    pub(crate) fn node_at_mut(&mut self, idx: NodeIndex) -> &mut TaskNode {
        &mut self.graph[idx]
    }

    pub(crate) fn node_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        let idx = self.index_of(id)?;
        Some(&mut self.graph[idx])
    }

    pub(crate) fn all_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    pub(crate) fn is_sentinel(&self, idx: NodeIndex) -> bool {
        idx == self.start || idx == self.end
    }

    pub(crate) fn pred_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect()
    }

    pub(crate) fn succ_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    /// Breadth-first walk over predecessors, nearest first, sentinels included.
    pub(crate) fn ancestor_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeIndex> = self.pred_indices(idx).into();
        while let Some(i) = queue.pop_front() {
            if !seen.insert(i) {
                continue;
            }
            order.push(i);
            queue.extend(self.pred_indices(i));
        }
        order
    }

    fn leaf_indices(&self) -> Vec<NodeIndex> {
        self.pred_indices(self.end)
    }

    fn work_ids(&self, indices: Vec<NodeIndex>) -> Vec<TaskId> {
        indices
            .into_iter()
            .filter(|&i| !self.is_sentinel(i))
            .map(|i| self.graph[i].id())
            .collect()
    }
}

#[derive(Default)]
struct Spliced {
    imported: Vec<NodeIndex>,
    leaves: Vec<NodeIndex>,
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.nodes().map(|n| n.name()).collect();
        f.debug_struct("TaskGraph")
            .field("tasks", &names)
            .field("edges", &self.edges().len())
            .finish()
    }
}
