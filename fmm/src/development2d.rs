//! Node data for 2D solves: a (multipole, local) pair of Laurent series.
use num::complex::Complex64;

use multipole_expansion::LaurentSeries;
use multipole_traits::fmm::NodeData;
use multipole_traits::parallel::{NodeDataVisitor, PackedMessage};
use multipole_traits::tree::NodeView;
use multipole_traits::types::{Coordinate, Vector2};

/// The expansion pair attached to every 2D tree cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Development2d {
    pub multipole: LaurentSeries,
    pub local: LaurentSeries,
}

impl Development2d {
    /// A zeroed pair. The local series carries the larger of the two
    /// degrees so local conversions never truncate.
    pub fn new(posdeg: usize, negdeg: usize) -> Development2d {
        Development2d {
            multipole: LaurentSeries::new(posdeg, negdeg),
            local: LaurentSeries::new(posdeg.max(negdeg), 0),
        }
    }

    /// Copies `src` into `self`; the degrees must coincide.
    pub fn copy_from(&mut self, src: &Development2d) {
        assert_eq!(self.multipole.posdeg(), src.multipole.posdeg());
        assert_eq!(self.multipole.negdeg(), src.multipole.negdeg());
        src.multipole.copy_into(&mut self.multipole);
        src.local.copy_into(&mut self.local);
    }
}

impl NodeData for Development2d {
    fn set_zero(&mut self) {
        self.multipole.set_zero();
        self.local.set_zero();
    }
}

fn center(node: &NodeView<'_, Vector2>) -> Complex64 {
    node.center.to_complex()
}

/// Multipole-to-multipole translation between a node and its parent.
pub fn m2m(
    src_node: &NodeView<'_, Vector2>,
    src: &Development2d,
    dst_node: &NodeView<'_, Vector2>,
    dst: &mut Development2d,
) {
    src.multipole
        .translate(center(src_node), &mut dst.multipole, center(dst_node));
}

/// Multipole-to-local conversion between well separated nodes.
pub fn m2l(
    src_node: &NodeView<'_, Vector2>,
    src: &Development2d,
    dst_node: &NodeView<'_, Vector2>,
    dst: &mut Development2d,
) -> bool {
    src.multipole
        .to_local(center(src_node), &mut dst.local, center(dst_node));
    true
}

/// Local-to-local translation between a parent and a child.
pub fn l2l(
    src_node: &NodeView<'_, Vector2>,
    src: &Development2d,
    dst_node: &NodeView<'_, Vector2>,
    dst: &mut Development2d,
) {
    src.local
        .translate(center(src_node), &mut dst.local, center(dst_node));
}

/// Evaluates the multipole part at `pos`.
pub fn multipole_evaluate(
    node: &NodeView<'_, Vector2>,
    devel: &Development2d,
    pos: &Vector2,
) -> Complex64 {
    devel.multipole.evaluate(pos.to_complex() - center(node))
}

/// Evaluates the local part at `pos`.
pub fn local_evaluate(
    node: &NodeView<'_, Vector2>,
    devel: &Development2d,
    pos: &Vector2,
) -> Complex64 {
    devel.local.evaluate(pos.to_complex() - center(node))
}

/// Serialisation hooks for distributed execution: the forward visit ships
/// the multipole part, the backward visit returns the local part, both
/// reduced by pointwise addition.
#[derive(Copy, Clone, Debug, Default)]
pub struct Development2dVisitor;

impl NodeDataVisitor<Development2d> for Development2dVisitor {
    fn migrate_pack(&self, data: &Development2d, msg: &mut PackedMessage) {
        data.multipole.pack(msg);
        data.local.pack(msg);
    }

    fn migrate_unpack(&self, data: &mut Development2d, msg: &mut PackedMessage) {
        data.multipole.unpack(msg);
        data.local.unpack(msg);
    }

    fn visit_fw_pack(&self, data: &Development2d, msg: &mut PackedMessage) {
        data.multipole.pack(msg);
    }

    fn visit_fw_unpack(&self, data: &mut Development2d, msg: &mut PackedMessage) {
        data.multipole.unpack(msg);
    }

    fn visit_fw_reduce(&self, contribution: &Development2d, into: &mut Development2d) {
        into.multipole.add(&contribution.multipole);
    }

    fn visit_bw_pack(&self, data: &Development2d, msg: &mut PackedMessage) {
        data.local.pack(msg);
    }

    fn visit_bw_unpack(&self, data: &mut Development2d, msg: &mut PackedMessage) {
        data.local.unpack(msg);
    }

    fn visit_bw_reduce(&self, contribution: &Development2d, into: &mut Development2d) {
        into.local.add(&contribution.local);
    }
}
