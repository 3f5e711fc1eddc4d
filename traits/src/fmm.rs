//! Operator and node-data contracts for the FMM driver.
use crate::tree::NodeView;
use crate::types::Coordinate;

/// Per-node expansion storage. The solver clones a prototype for every tree
/// node and zeroes it at the start of each solve.
pub trait NodeData: Clone {
    fn set_zero(&mut self);
}

/// The kernel-defining operator set bound to a solver.
///
/// All operators are pure with respect to their inputs; accumulation happens
/// only through the explicit destination argument. The solver guarantees the
/// two particles handed to [`FmmOperators::p2p`] are distinct.
pub trait FmmOperators<V: Coordinate, P, D> {
    /// Direct interaction. May accumulate into both particles.
    fn p2p(&self, one: &mut P, other: &mut P);

    /// Direct interaction accumulating into `dst` only. Used when the other
    /// side is a remote replica whose owner performs its own accumulation.
    fn p2p_one_way(&self, dst: &mut P, src: &P);

    /// Accumulates `src`'s contribution into the multipole part of `dst`.
    fn p2m(&self, src: &P, dst_node: &NodeView<'_, V>, dst: &mut D);

    /// Translates the multipole part of a child into its parent.
    fn m2m(&self, src_node: &NodeView<'_, V>, src: &D, dst_node: &NodeView<'_, V>, dst: &mut D);

    /// Converts a source multipole into a destination local expansion.
    ///
    /// Returning false vetoes the conversion and makes the walker descend;
    /// the veto must be symmetric in the pair or the solver aborts.
    fn m2l(
        &self,
        src_node: &NodeView<'_, V>,
        src: &D,
        dst_node: &NodeView<'_, V>,
        dst: &mut D,
    ) -> bool;

    /// Translates the local part of a parent into a child.
    fn l2l(&self, src_node: &NodeView<'_, V>, src: &D, dst_node: &NodeView<'_, V>, dst: &mut D);

    /// Evaluates the local expansion at a particle and accumulates.
    fn l2p(&self, src_node: &NodeView<'_, V>, src: &D, dst: &mut P);

    /// Accumulates a particle into a destination local expansion. Only
    /// invoked in the semifar regime.
    fn p2l(&self, _src: &P, _dst_node: &NodeView<'_, V>, _dst: &mut D) {
        panic!("semifar regime requires a p2l operator and none was provided");
    }

    /// Evaluates a source multipole at a particle. Only invoked in the
    /// semifar regime.
    fn m2p(&self, _src_node: &NodeView<'_, V>, _src: &D, _dst: &mut P) {
        panic!("semifar regime requires an m2p operator and none was provided");
    }
}

/// Operator call counters for one solve. Counters count calls, not physical
/// interactions: a symmetric far pair increments `m2l` twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub zero: u64,
    pub p2p: u64,
    pub p2p_remote: u64,
    pub p2m: u64,
    pub m2m: u64,
    pub m2l: u64,
    pub m2l_remote: u64,
    pub l2l: u64,
    pub l2p: u64,
    pub p2l: u64,
    pub m2p: u64,
}

impl SolverStats {
    pub fn clear(&mut self) {
        *self = SolverStats::default();
    }
}
