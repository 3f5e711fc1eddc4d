//! The FMM driver.
use std::cell::{Ref, RefCell};
use std::marker::PhantomData;

use log::warn;

use multipole_traits::fmm::{FmmOperators, NodeData, SolverStats};
use multipole_traits::parallel::{
    Communicator, NodeDataVisitor, PackedMessage, ParallelConfig, ParticleVisitor,
};
use multipole_traits::tree::{NodeView, TraverseOrder, Tree};
use multipole_traits::types::{BoundingBox, Coordinate};

use crate::semifar::{self, OperatorCosts};

/// Threshold value disabling the semifar regime.
pub const SEMIFAR_OFF: usize = usize::MAX;

/// An FMM solver bound to a tree, a node-data prototype and a kernel
/// operator set.
///
/// The solver owns the tree; node data is cloned from the prototype for
/// every cell and zeroed at the start of each solve. One call to
/// [`FmmSolver::solve`] runs the full pipeline: zero, upward (P2M, M2M),
/// near/far dual traversal (P2P, M2L, optionally P2L/M2P), downward (L2L,
/// L2P).
pub struct FmmSolver<V, D, T, O>
where
    V: Coordinate,
    D: NodeData,
    T: Tree<V>,
    O: FmmOperators<V, T::Point, D>,
{
    tree: T,
    prototype: D,
    node_data: Vec<RefCell<D>>,
    operators: O,
    stats: SolverStats,
    semifar_threshold: usize,
    operator_costs: Option<OperatorCosts>,
    _space: PhantomData<V>,
}

impl<V, D, T, O> FmmSolver<V, D, T, O>
where
    V: Coordinate,
    D: NodeData,
    T: Tree<V>,
    O: FmmOperators<V, T::Point, D>,
{
    /// Creates a solver owning `tree`. Every tree cell gets a clone of
    /// `prototype` as its expansion storage.
    pub fn new(tree: T, prototype: D, operators: O) -> Self {
        FmmSolver {
            tree,
            prototype,
            node_data: Vec::new(),
            operators,
            stats: SolverStats::default(),
            semifar_threshold: SEMIFAR_OFF,
            operator_costs: None,
            _space: PhantomData,
        }
    }

    /// Replaces the operator set, e.g. to switch translation algorithms
    /// between solves.
    pub fn set_operators(&mut self, operators: O) {
        self.operators = operators;
    }

    pub fn operators(&self) -> &O {
        &self.operators
    }

    /// Sets the semifar threshold: [`SEMIFAR_OFF`] disables the regime, 0
    /// asks the solver to choose the optimum from the configured operator
    /// costs at the next solve.
    pub fn set_semifar_threshold(&mut self, threshold: usize) {
        self.semifar_threshold = threshold;
    }

    pub fn semifar_threshold(&self) -> usize {
        self.semifar_threshold
    }

    /// Provides the per-operator cost estimates the automatic threshold
    /// choice needs, typically [`OperatorCosts::from_profile_db`].
    pub fn set_operator_costs(&mut self, costs: OperatorCosts) {
        self.operator_costs = Some(costs);
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn bounds(&self) -> BoundingBox<V> {
        self.tree.bounds()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    pub fn point_count(&self) -> usize {
        self.tree.point_count()
    }

    /// Inserts a particle into the owned tree.
    pub fn insert_point(&mut self, point: T::Point) -> usize {
        self.tree.insert(point)
    }

    pub fn remove_point(&mut self, index: usize) -> bool {
        self.tree.remove(index)
    }

    /// Completes pending point migrations on a distributed tree.
    /// Collective: every rank must call it.
    pub fn migrate_flush(&mut self) {
        self.tree.migrate_flush();
    }

    /// Rebalances node ownership on a distributed tree. Collective.
    pub fn distribute_nodes(&mut self) {
        self.tree.distribute_nodes();
    }

    pub fn find_point(&self, position: V) -> Option<usize> {
        self.tree.find(position)
    }

    pub fn foreach_point(&self, f: &mut dyn FnMut(usize, &RefCell<T::Point>)) {
        self.tree.foreach_point(f);
    }

    pub fn traverse(&self, order: TraverseOrder, f: &mut dyn FnMut(&NodeView<'_, V>)) {
        self.tree.traverse(order, f);
    }

    /// The expansion data of a node, for inspection after a solve.
    pub fn node_data(&self, handle: usize) -> Ref<'_, D> {
        self.node_data[handle].borrow()
    }

    /// Operator call counters accumulated since the last
    /// [`FmmSolver::reinit_stats`].
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn reinit_stats(&mut self) {
        self.stats.clear();
    }

    /// Near leaf pairs (local point counts) the dual traversal would hand
    /// to the direct interaction path.
    fn near_pair_counts(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        self.tree.near_far_traversal(&mut |_, _| true, &mut |a, b| {
            if a.handle != b.handle {
                pairs.push((a.points.len(), b.points.len()));
            }
        });
        pairs
    }

    /// The cost-optimal semifar threshold for the current tree shape, from
    /// the configured operator costs.
    pub fn optimal_semifar_threshold(&self) -> usize {
        match &self.operator_costs {
            Some(costs) => semifar::optimal_threshold(&self.near_pair_counts(), costs),
            None => SEMIFAR_OFF,
        }
    }

    fn prepare(&mut self) {
        let mut max_handle = 0;
        self.tree.traverse(TraverseOrder::PreOrder, &mut |node| {
            max_handle = max_handle.max(node.handle);
        });

        if self.node_data.len() <= max_handle {
            let prototype = self.prototype.clone();
            self.node_data
                .resize_with(max_handle + 1, || RefCell::new(prototype.clone()));
        }

        if self.semifar_threshold == 0 {
            self.semifar_threshold = self.optimal_semifar_threshold();
            if self.operator_costs.is_none() {
                warn!("no operator costs configured, disabling the semifar regime");
            }
        }
    }

    fn zero_pass(&mut self) {
        let data = &self.node_data;
        let stats = &mut self.stats;

        self.tree.traverse(TraverseOrder::PostOrder, &mut |node| {
            if node.state.is_remote() {
                return;
            }
            data[node.handle].borrow_mut().set_zero();
            stats.zero += 1;
        });
    }

    fn upward_pass(&mut self) {
        let tree = &self.tree;
        let data = &self.node_data;
        let ops = &self.operators;
        let stats = &mut self.stats;

        tree.traverse(TraverseOrder::PostOrder, &mut |node| {
            if node.state.is_remote() {
                return;
            }

            if node.is_leaf {
                let mut dst = data[node.handle].borrow_mut();
                for &i in node.points {
                    let point = tree.point(i).borrow();
                    ops.p2m(&point, node, &mut dst);
                    stats.p2m += 1;
                }
            }

            if node.point_count != 0 {
                if let Some(parent) = node.parent {
                    let parent_view = tree.node(parent);
                    let src = data[node.handle].borrow();
                    let mut dst = data[parent].borrow_mut();
                    ops.m2m(node, &src, &parent_view, &mut dst);
                    stats.m2m += 1;
                }
            }
        });
    }

    fn interaction_pass(&mut self) {
        let tree = &self.tree;
        let data = &self.node_data;
        let ops = &self.operators;
        let threshold = self.semifar_threshold;

        // both traversal callbacks account calls, so the counters go
        // through a cell for the duration of the walk
        let stats = RefCell::new(std::mem::take(&mut self.stats));

        tree.near_far_traversal(
            &mut |a, b| far_pair(data, ops, &stats, a, b),
            &mut |a, b| near_pair(tree, data, ops, &stats, threshold, a, b),
        );

        self.stats = stats.into_inner();
    }

    fn downward_pass(&mut self) {
        let tree = &self.tree;
        let data = &self.node_data;
        let ops = &self.operators;
        let stats = &mut self.stats;

        tree.traverse(TraverseOrder::PreOrder, &mut |node| {
            if node.state.is_remote() {
                return;
            }

            if node.point_count != 0 {
                if let Some(parent) = node.parent {
                    let parent_view = tree.node(parent);
                    let src = data[parent].borrow();
                    let mut dst = data[node.handle].borrow_mut();
                    ops.l2l(&parent_view, &src, node, &mut dst);
                    stats.l2l += 1;
                }
            }

            if node.is_leaf {
                let src = data[node.handle].borrow();
                for &i in node.points {
                    ops.l2p(node, &src, &mut tree.point(i).borrow_mut());
                    stats.l2p += 1;
                }
            }
        });
    }

    /// Runs one FMM solve on the current tree contents.
    pub fn solve(&mut self) {
        self.prepare();
        self.zero_pass();
        self.upward_pass();
        self.interaction_pass();
        self.downward_pass();
    }

    /// Runs one solve with the shared-node forward and backward exchanges
    /// of a distributed tree. On a single rank this reduces to
    /// [`FmmSolver::solve`].
    pub fn solve_parallel<C, PV, NV>(&mut self, config: &ParallelConfig<C, PV, NV>)
    where
        C: Communicator,
        PV: ParticleVisitor<T::Point>,
        NV: NodeDataVisitor<D>,
    {
        self.prepare();
        self.zero_pass();
        self.upward_pass();
        self.forward_exchange(config);
        self.interaction_pass();
        self.downward_pass();
        self.backward_exchange(config);
    }

    fn shared_nodes(&self) -> Vec<usize> {
        let mut shared = Vec::new();
        self.tree.traverse(TraverseOrder::PreOrder, &mut |node| {
            if node.state.is_shared() {
                shared.push(node.handle);
            }
        });
        shared
    }

    /// All-reduces the multipole contributions of shared nodes so every
    /// copy sees the global multipole. Blocks until all ranks have posted.
    fn forward_exchange<C, PV, NV>(&mut self, config: &ParallelConfig<C, PV, NV>)
    where
        C: Communicator,
        PV: ParticleVisitor<T::Point>,
        NV: NodeDataVisitor<D>,
    {
        let shared = self.shared_nodes();

        let mut msg = PackedMessage::new();
        for &handle in &shared {
            config
                .node_data
                .visit_fw_pack(&self.node_data[handle].borrow(), &mut msg);
        }

        let gathered = config.comm.all_gather_bytes(msg.as_bytes());

        for (rank, bytes) in gathered.into_iter().enumerate() {
            if rank == config.comm.rank() {
                continue;
            }

            let mut msg = PackedMessage::from_bytes(bytes);
            for &handle in &shared {
                let mut scratch = self.prototype.clone();
                scratch.set_zero();
                config.node_data.visit_fw_unpack(&mut scratch, &mut msg);
                config
                    .node_data
                    .visit_fw_reduce(&scratch, &mut self.node_data[handle].borrow_mut());
            }
        }
    }

    /// Returns the local contributions accumulated into shared nodes to
    /// every replica and combines them commutatively.
    fn backward_exchange<C, PV, NV>(&mut self, config: &ParallelConfig<C, PV, NV>)
    where
        C: Communicator,
        PV: ParticleVisitor<T::Point>,
        NV: NodeDataVisitor<D>,
    {
        let shared = self.shared_nodes();

        let mut msg = PackedMessage::new();
        for &handle in &shared {
            config
                .node_data
                .visit_bw_pack(&self.node_data[handle].borrow(), &mut msg);
        }

        let gathered = config.comm.all_gather_bytes(msg.as_bytes());

        for (rank, bytes) in gathered.into_iter().enumerate() {
            if rank == config.comm.rank() {
                continue;
            }

            let mut msg = PackedMessage::from_bytes(bytes);
            for &handle in &shared {
                let mut scratch = self.prototype.clone();
                scratch.set_zero();
                config.node_data.visit_bw_unpack(&mut scratch, &mut msg);
                config
                    .node_data
                    .visit_bw_reduce(&scratch, &mut self.node_data[handle].borrow_mut());
            }
        }
    }
}

/// Both directions of the expansion conversion on a far pair. A veto on the
/// first direction makes the walker descend; a veto on the second after the
/// first succeeded is a broken kernel contract and aborts.
fn far_pair<V, P, D, O>(
    data: &[RefCell<D>],
    ops: &O,
    stats: &RefCell<SolverStats>,
    a: &NodeView<'_, V>,
    b: &NodeView<'_, V>,
) -> bool
where
    V: Coordinate,
    D: NodeData,
    O: FmmOperators<V, P, D>,
{
    let remote = a.state.is_remote() || b.state.is_remote();

    let done = {
        let src = data[a.handle].borrow();
        let mut dst = data[b.handle].borrow_mut();
        ops.m2l(a, &src, b, &mut dst)
    };
    if !done {
        return false;
    }
    count_m2l(stats, remote);

    let done = {
        let src = data[b.handle].borrow();
        let mut dst = data[a.handle].borrow_mut();
        ops.m2l(b, &src, a, &mut dst)
    };
    if !done {
        // the kernel accepted one direction and refused the other
        panic!("m2l veto is not symmetric");
    }
    count_m2l(stats, remote);

    true
}

fn count_m2l(stats: &RefCell<SolverStats>, remote: bool) {
    let mut stats = stats.borrow_mut();
    if remote {
        stats.m2l_remote += 1;
    } else {
        stats.m2l += 1;
    }
}

fn near_pair<V, P, D, T, O>(
    tree: &T,
    data: &[RefCell<D>],
    ops: &O,
    stats: &RefCell<SolverStats>,
    threshold: usize,
    a: &NodeView<'_, V>,
    b: &NodeView<'_, V>,
) where
    V: Coordinate,
    D: NodeData,
    T: Tree<V, Point = P>,
    O: FmmOperators<V, P, D>,
{
    let remote = a.state.is_remote() || b.state.is_remote();

    if a.handle == b.handle {
        // each unordered pair exactly once, never the diagonal
        for (k, &i) in a.points.iter().enumerate() {
            for &j in &a.points[k + 1..] {
                ops.p2p(
                    &mut tree.point(i).borrow_mut(),
                    &mut tree.point(j).borrow_mut(),
                );
                stats.borrow_mut().p2p += 1;
            }
        }
        return;
    }

    if threshold != SEMIFAR_OFF {
        let small_a = a.points.len() < threshold;
        let small_b = b.points.len() < threshold;

        if !small_a && !small_b {
            // two crowded leaves: full bidirectional conversion
            if far_pair(data, ops, stats, a, b) {
                return;
            }
            // vetoed, fall back to the direct pairs below
        } else if small_a != small_b {
            let (small, large) = if small_a { (a, b) } else { (b, a) };

            {
                let mut large_data = data[large.handle].borrow_mut();
                for &i in small.points {
                    ops.p2l(&tree.point(i).borrow(), large, &mut large_data);
                    stats.borrow_mut().p2l += 1;
                }
            }

            let large_data = data[large.handle].borrow();
            for &i in small.points {
                ops.m2p(large, &large_data, &mut tree.point(i).borrow_mut());
                stats.borrow_mut().m2p += 1;
            }
            return;
        }
    }

    for &i in a.points {
        for &j in b.points {
            ops.p2p(
                &mut tree.point(i).borrow_mut(),
                &mut tree.point(j).borrow_mut(),
            );
            let mut stats = stats.borrow_mut();
            if remote {
                stats.p2p_remote += 1;
            } else {
                stats.p2p += 1;
            }
        }
    }
}
