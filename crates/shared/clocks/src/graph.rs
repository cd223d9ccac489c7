use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tandem_core::{Correlation, nanos_from_ticks, ticks_from_nanos};
use tandem_ports::{
    ChangeMask, ClockError, ClockId, ClockObserver, ClockResult, SubscriptionId,
};

use crate::monotonic;

/// A tree of logical clocks sharing one lock.
///
/// Nodes are stored in an arena and addressed by [`ClockId`]; user code
/// holds cheap [`Clock`] handles. Every query and mutation serialises on
/// the single internal mutex, matching the shared-resource policy of the
/// synchronisation stack: the graph is the one shared mutable resource.
pub struct ClockGraph {
    inner: Mutex<Graph>,
}

pub(crate) struct Graph {
    nodes: Vec<Node>,
    next_subscription: u64,
}

struct Node {
    kind: NodeKind,
    parent: Option<ClockId>,
    children: Vec<ClockId>,
    available: bool,
    subscribers: Vec<(SubscriptionId, Weak<dyn ClockObserver>)>,
}

pub(crate) enum NodeKind {
    System {
        tick_rate: f64,
        max_freq_error_ppm: f64,
        precision_secs: f64,
    },
    Correlated {
        tick_rate: f64,
        speed: f64,
        correlation: Correlation,
    },
    RangeCorrelated {
        correlation_a: Correlation,
        correlation_b: Correlation,
    },
}

impl ClockGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Graph {
                nodes: Vec::new(),
                next_subscription: 0,
            }),
        })
    }

    pub(crate) fn add_node(
        self: &Arc<Self>,
        kind: NodeKind,
        parent: Option<ClockId>,
    ) -> Clock {
        let mut graph = self.inner.lock();
        let id = ClockId::from_index(graph.nodes.len() as u32);
        graph.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            available: true,
            subscribers: Vec::new(),
        });
        if let Some(parent) = parent {
            graph.nodes[parent.index()].children.push(id);
        }
        drop(graph);
        Clock {
            graph: Arc::clone(self),
            id,
        }
    }

    /// Apply one atomic mutation to `id`, then notify the observers of
    /// `id` and all its descendants exactly once each. Observers run
    /// after the lock is released so they may query the graph freely.
    pub(crate) fn mutate<F>(&self, id: ClockId, apply: F)
    where
        F: FnOnce(&mut Graph) -> ChangeMask,
    {
        let (mask, notifications) = {
            let mut graph = self.inner.lock();
            let mask = apply(&mut graph);
            if !mask.any() {
                return;
            }
            (mask, graph.collect_notifications(id))
        };
        for (clock, observer) in notifications {
            observer.clock_changed(clock, mask);
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl Graph {
    fn node(&self, id: ClockId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: ClockId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn kind_mut(&mut self, id: ClockId) -> &mut NodeKind {
        &mut self.node_mut(id).kind
    }

    fn tick_rate(&self, id: ClockId) -> f64 {
        match &self.node(id).kind {
            NodeKind::System { tick_rate, .. } => *tick_rate,
            NodeKind::Correlated { tick_rate, .. } => *tick_rate,
            NodeKind::RangeCorrelated {
                correlation_a,
                correlation_b,
            } => {
                // Rate implied by the slope of the two-point line.
                let parent = self.node(id).parent.expect("range clock has a parent");
                (correlation_b.child_ticks - correlation_a.child_ticks)
                    * self.tick_rate(parent)
                    / (correlation_b.parent_ticks - correlation_a.parent_ticks)
            }
        }
    }

    fn speed(&self, id: ClockId) -> f64 {
        match &self.node(id).kind {
            NodeKind::Correlated { speed, .. } => *speed,
            _ => 1.0,
        }
    }

    fn ticks(&self, id: ClockId) -> f64 {
        match &self.node(id).kind {
            NodeKind::System { tick_rate, .. } => {
                ticks_from_nanos(monotonic::now_nanos(), *tick_rate)
            }
            _ => {
                let parent = self.node(id).parent.expect("non-root clock has a parent");
                self.from_parent_ticks(id, self.ticks(parent))
            }
        }
    }

    fn from_parent_ticks(&self, id: ClockId, parent_ticks: f64) -> f64 {
        let node = self.node(id);
        // A root clock is its own parent space: identity, matching the
        // no-op ascent in to_root_ticks.
        let Some(parent) = node.parent else {
            return parent_ticks;
        };
        match &node.kind {
            NodeKind::System { .. } => parent_ticks,
            NodeKind::Correlated {
                tick_rate,
                speed,
                correlation,
            } => {
                // Multiply before dividing: whole-divisor rate pairs
                // then stay exact in f64.
                correlation.child_ticks
                    + (parent_ticks - correlation.parent_ticks) * tick_rate * speed
                        / self.tick_rate(parent)
            }
            NodeKind::RangeCorrelated { correlation_a, correlation_b } => {
                correlation_a.child_ticks
                    + (parent_ticks - correlation_a.parent_ticks)
                        * (correlation_b.child_ticks - correlation_a.child_ticks)
                        / (correlation_b.parent_ticks - correlation_a.parent_ticks)
            }
        }
    }

    fn to_parent_ticks(&self, id: ClockId, ticks: f64) -> f64 {
        let node = self.node(id);
        // Same identity rule as from_parent_ticks for a root clock.
        let Some(parent) = node.parent else {
            return ticks;
        };
        match &node.kind {
            NodeKind::System { .. } => ticks,
            NodeKind::Correlated {
                tick_rate,
                speed,
                correlation,
            } => {
                // A stopped clock cannot be inverted: time on the parent
                // keeps moving while this clock's reading stands still.
                if *speed == 0.0 {
                    return f64::NAN;
                }
                correlation.parent_ticks
                    + (ticks - correlation.child_ticks) * self.tick_rate(parent)
                        / (tick_rate * speed)
            }
            NodeKind::RangeCorrelated { correlation_a, correlation_b } => {
                let child_span = correlation_b.child_ticks - correlation_a.child_ticks;
                if child_span == 0.0 {
                    return f64::NAN;
                }
                correlation_a.parent_ticks
                    + (ticks - correlation_a.child_ticks)
                        * (correlation_b.parent_ticks - correlation_a.parent_ticks)
                        / child_span
            }
        }
    }

    fn to_root_ticks(&self, id: ClockId, ticks: f64) -> f64 {
        let mut current = id;
        let mut t = ticks;
        while let Some(parent) = self.node(current).parent {
            t = self.to_parent_ticks(current, t);
            current = parent;
        }
        t
    }

    fn from_root_ticks(&self, id: ClockId, root_ticks: f64) -> f64 {
        let chain = self.ancestor_chain(id);
        let mut t = root_ticks;
        // chain runs self..root; descend from just below the root.
        for &step in chain.iter().rev() {
            if self.node(step).parent.is_none() {
                continue;
            }
            t = self.from_parent_ticks(step, t);
        }
        t
    }

    /// Self-inclusive chain up to the root.
    fn ancestor_chain(&self, id: ClockId) -> Vec<ClockId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn root(&self, id: ClockId) -> ClockId {
        *self.ancestor_chain(id).last().expect("chain includes self")
    }

    /// Convert via the lowest common ancestor: climbing all the way to
    /// the root would spuriously poison conversions with NaN from
    /// stopped clocks above the junction point.
    fn to_other_ticks(&self, from: ClockId, to: ClockId, ticks: f64) -> f64 {
        let from_chain = self.ancestor_chain(from);
        let to_chain = self.ancestor_chain(to);
        let to_set: HashSet<ClockId> = to_chain.iter().copied().collect();

        let Some(lca) = from_chain.iter().copied().find(|id| to_set.contains(id)) else {
            return f64::NAN;
        };

        let mut t = ticks;
        for &step in &from_chain {
            if step == lca {
                break;
            }
            t = self.to_parent_ticks(step, t);
        }

        let descent: Vec<ClockId> = to_chain
            .iter()
            .copied()
            .take_while(|&id| id != lca)
            .collect();
        for &step in descent.iter().rev() {
            t = self.from_parent_ticks(step, t);
        }
        t
    }

    fn dispersion_at_ticks(&self, id: ClockId, ticks: f64) -> f64 {
        let node = self.node(id);
        match &node.kind {
            NodeKind::System { precision_secs, .. } => *precision_secs,
            NodeKind::Correlated { correlation, .. } => {
                let parent = node.parent.expect("non-root clock has a parent");
                let parent_ticks = self.to_parent_ticks(id, ticks);
                correlation.error_at(ticks) + self.dispersion_at_ticks(parent, parent_ticks)
            }
            NodeKind::RangeCorrelated { correlation_a, correlation_b } => {
                let parent = node.parent.expect("non-root clock has a parent");
                let parent_ticks = self.to_parent_ticks(id, ticks);
                // The nearer correlation bounds the error.
                let da = (ticks - correlation_a.child_ticks).abs();
                let db = (ticks - correlation_b.child_ticks).abs();
                let nearer = if da <= db { correlation_a } else { correlation_b };
                nearer.error_at(ticks) + self.dispersion_at_ticks(parent, parent_ticks)
            }
        }
    }

    fn effective_speed(&self, id: ClockId) -> f64 {
        self.ancestor_chain(id)
            .iter()
            .map(|&step| self.speed(step))
            .product()
    }

    fn is_available(&self, id: ClockId) -> bool {
        self.ancestor_chain(id)
            .iter()
            .all(|&step| self.node(step).available)
    }

    fn root_system_params(&self, id: ClockId) -> (f64, f64) {
        match &self.node(self.root(id)).kind {
            NodeKind::System {
                max_freq_error_ppm,
                precision_secs,
                ..
            } => (*max_freq_error_ppm, *precision_secs),
            _ => (0.0, 0.0),
        }
    }

    pub(crate) fn set_parent(&mut self, id: ClockId, new_parent: ClockId) -> ClockResult<()> {
        // Reject cycles: the moved clock must not appear in the new
        // parent's ancestor chain.
        if self.ancestor_chain(new_parent).contains(&id) {
            return Err(ClockError::WouldCreateCycle);
        }
        if let Some(old_parent) = self.node(id).parent {
            self.node_mut(old_parent).children.retain(|&child| child != id);
        }
        self.node_mut(id).parent = Some(new_parent);
        self.node_mut(new_parent).children.push(id);
        Ok(())
    }

    fn collect_notifications(
        &mut self,
        start: ClockId,
    ) -> Vec<(ClockId, Arc<dyn ClockObserver>)> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node_mut(id);
            node.subscribers.retain(|(_, weak)| weak.strong_count() > 0);
            for (_, weak) in &node.subscribers {
                if let Some(observer) = weak.upgrade() {
                    out.push((id, observer));
                }
            }
            stack.extend(self.node(id).children.iter().copied());
        }
        out
    }
}

/// Handle to one clock in a [`ClockGraph`].
///
/// Cheap to clone; all methods serialise on the graph lock. Handle
/// equality is graph-and-id identity.
#[derive(Clone)]
pub struct Clock {
    graph: Arc<ClockGraph>,
    id: ClockId,
}

impl Clock {
    pub fn id(&self) -> ClockId {
        self.id
    }

    pub fn graph(&self) -> &Arc<ClockGraph> {
        &self.graph
    }

    pub fn same_graph(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
    }

    /// Current tick value.
    pub fn ticks(&self) -> f64 {
        self.graph.read(|g| g.ticks(self.id))
    }

    /// Current time in (fractional) nanoseconds on this clock's
    /// timeline.
    pub fn nanos(&self) -> f64 {
        self.graph
            .read(|g| nanos_from_ticks(g.ticks(self.id), g.tick_rate(self.id)))
    }

    pub fn tick_rate(&self) -> f64 {
        self.graph.read(|g| g.tick_rate(self.id))
    }

    pub fn nanos_per_tick(&self) -> f64 {
        1e9 / self.tick_rate()
    }

    /// Speed multiplier relative to the parent clock.
    pub fn speed(&self) -> f64 {
        self.graph.read(|g| g.speed(self.id))
    }

    /// Product of speed multipliers up to the root.
    pub fn effective_speed(&self) -> f64 {
        self.graph.read(|g| g.effective_speed(self.id))
    }

    pub fn parent(&self) -> Option<Clock> {
        let parent = self.graph.read(|g| g.node(self.id).parent)?;
        Some(Clock {
            graph: Arc::clone(&self.graph),
            id: parent,
        })
    }

    pub fn root(&self) -> Clock {
        let root = self.graph.read(|g| g.root(self.id));
        Clock {
            graph: Arc::clone(&self.graph),
            id: root,
        }
    }

    /// Equivalent tick value on the parent clock. Identity for a root
    /// clock, which is its own parent space.
    pub fn to_parent_ticks(&self, ticks: f64) -> f64 {
        self.graph.read(|g| g.to_parent_ticks(self.id, ticks))
    }

    /// Tick value this clock reads when the parent reads
    /// `parent_ticks`. Identity for a root clock.
    pub fn from_parent_ticks(&self, parent_ticks: f64) -> f64 {
        self.graph.read(|g| g.from_parent_ticks(self.id, parent_ticks))
    }

    pub fn to_root_ticks(&self, ticks: f64) -> f64 {
        self.graph.read(|g| g.to_root_ticks(self.id, ticks))
    }

    pub fn from_root_ticks(&self, root_ticks: f64) -> f64 {
        self.graph.read(|g| g.from_root_ticks(self.id, root_ticks))
    }

    /// Convert a tick value on this clock to the equivalent on `other`,
    /// walking up to the lowest common ancestor and back down.
    pub fn to_other_clock_ticks(&self, other: &Clock, ticks: f64) -> ClockResult<f64> {
        if !self.same_graph(other) {
            return Err(ClockError::DifferentGraphs);
        }
        Ok(self.graph.read(|g| g.to_other_ticks(self.id, other.id, ticks)))
    }

    /// Root-clock nanoseconds at which this clock will read `ticks`.
    ///
    /// NaN when any ancestor has zero speed: the moment is unknowable
    /// until motion resumes.
    pub fn calc_when(&self, ticks: f64) -> f64 {
        self.graph.read(|g| {
            let root = g.root(self.id);
            let root_ticks = g.to_root_ticks(self.id, ticks);
            nanos_from_ticks(root_ticks, g.tick_rate(root))
        })
    }

    /// Half-width of the error envelope, in seconds, on a reading of
    /// `ticks`. May be `+∞` for a clock that has never been correlated.
    pub fn dispersion_at_ticks(&self, ticks: f64) -> f64 {
        self.graph.read(|g| g.dispersion_at_ticks(self.id, ticks))
    }

    /// Maximum frequency error of the system clock at the root, in ppm.
    pub fn root_max_freq_error_ppm(&self) -> f64 {
        self.graph.read(|g| g.root_system_params(self.id).0)
    }

    /// Measured precision of the system clock at the root, in seconds.
    pub fn root_precision_secs(&self) -> f64 {
        self.graph.read(|g| g.root_system_params(self.id).1)
    }

    pub fn is_available(&self) -> bool {
        self.graph.read(|g| g.is_available(self.id))
    }

    /// Set this clock's local availability flag. Effective availability
    /// is the AND of the flag with every ancestor's availability.
    pub fn set_availability(&self, available: bool) {
        let id = self.id;
        self.graph.mutate(id, move |g| {
            let node = g.node_mut(id);
            if node.available == available {
                ChangeMask::default()
            } else {
                node.available = available;
                ChangeMask::availability()
            }
        });
    }

    /// Subscribe an observer to mutations of this clock and its
    /// ancestors. The graph holds the observer weakly.
    pub fn bind(&self, observer: &Arc<dyn ClockObserver>) -> SubscriptionId {
        let id = self.id;
        let weak = Arc::downgrade(observer);
        let mut graph = self.graph.inner.lock();
        let sub = SubscriptionId::from_raw(graph.next_subscription);
        graph.next_subscription += 1;
        graph.node_mut(id).subscribers.push((sub, weak));
        sub
    }

    pub fn unbind(&self, subscription: SubscriptionId) {
        let mut graph = self.graph.inner.lock();
        graph
            .node_mut(self.id)
            .subscribers
            .retain(|(sub, _)| *sub != subscription);
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        self.same_graph(other) && self.id == other.id
    }
}

impl Eq for Clock {}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock").field("id", &self.id).finish()
    }
}

impl std::hash::Hash for Clock {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.graph) as usize).hash(state);
        self.id.hash(state);
    }
}

// Kind-specific accessors used by the typed wrappers.
impl Clock {
    pub(crate) fn with_kind<R>(&self, f: impl FnOnce(&NodeKind) -> R) -> R {
        self.graph.read(|g| f(&g.node(self.id).kind))
    }

    pub(crate) fn mutate_node(&self, apply: impl FnOnce(&mut Graph) -> ChangeMask) {
        self.graph.mutate(self.id, apply);
    }

    pub(crate) fn reparent(&self, new_parent: &Clock) -> ClockResult<()> {
        if !self.same_graph(new_parent) {
            return Err(ClockError::DifferentGraphs);
        }
        let id = self.id;
        let parent_id = new_parent.id;
        let mut result = Ok(());
        self.graph.mutate(id, |g| match g.set_parent(id, parent_id) {
            Ok(()) => ChangeMask::parent(),
            Err(e) => {
                result = Err(e);
                ChangeMask::default()
            }
        });
        result
    }
}
