//! Node data for 3D solves: a (multipole, local) pair of spherical series.
use std::f64::consts::PI;

use num::complex::Complex64;
use num::Zero;

use multipole_expansion::harmonic;
use multipole_expansion::legendre::{tri_index, tri_size};
use multipole_expansion::SphericalSeries;
use multipole_traits::fmm::NodeData;
use multipole_traits::parallel::{NodeDataVisitor, PackedMessage};
use multipole_traits::tree::NodeView;
use multipole_traits::types::{Coordinate, Vector3};

/// The expansion pair attached to every 3D tree cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Development3d {
    pub multipole: SphericalSeries,
    pub local: SphericalSeries,
}

impl Development3d {
    /// A zeroed pair. The local series carries the larger of the two
    /// degrees so local conversions never truncate.
    pub fn new(posdeg: usize, negdeg: usize) -> Development3d {
        Development3d {
            multipole: SphericalSeries::new(posdeg, negdeg),
            local: SphericalSeries::new(posdeg.max(negdeg), 0),
        }
    }

    /// Copies `src` into `self`; the degrees must coincide.
    pub fn copy_from(&mut self, src: &Development3d) {
        assert_eq!(self.multipole.posdeg(), src.multipole.posdeg());
        assert_eq!(self.multipole.negdeg(), src.multipole.negdeg());
        src.multipole.copy_into(&mut self.multipole);
        src.local.copy_into(&mut self.local);
    }
}

impl NodeData for Development3d {
    fn set_zero(&mut self) {
        self.multipole.set_zero();
        self.local.set_zero();
    }
}

/// Accumulates a point charge into the multipole part of `dst`:
/// L_{l,m} += q·r^l·β²(l)·conj(Y_l^m) for the offset from the node center.
pub fn p2m_point(
    position: &Vector3,
    charge: f64,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    let deg = dst.multipole.negdeg();
    if deg == 0 {
        return;
    }

    let s = position.sub(&dst_node.center).to_spherical();
    let mut harmonics = vec![Complex64::zero(); tri_size(deg)];
    harmonic::evaluate_multiple_internal(
        deg,
        s.cos_theta,
        s.sin_theta,
        Complex64::new(s.cos_phi, s.sin_phi),
        &mut harmonics,
    );

    let mut fact = charge;
    for l in 0..deg {
        let b2 = 4.0 * PI / (2.0 * l as f64 + 1.0);
        for m in 0..=l {
            let term = fact * b2 * harmonics[tri_index(l, m)];
            *dst.multipole.neg_term_mut(l, m) += term.conj();
        }
        fact *= s.r;
    }
}

/// Accumulates a point charge into the local part of `dst`:
/// M_{l,m} += q·r^{−l−1}·β²(l)·conj(Y_l^m). The charge must lie outside the
/// ball the local expansion is evaluated in.
pub fn p2l_point(
    position: &Vector3,
    charge: f64,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    let deg = dst.local.posdeg();
    let s = position.sub(&dst_node.center).to_spherical();
    let mut harmonics = vec![Complex64::zero(); tri_size(deg)];
    harmonic::evaluate_multiple_internal(
        deg,
        s.cos_theta,
        s.sin_theta,
        Complex64::new(s.cos_phi, s.sin_phi),
        &mut harmonics,
    );

    let inv_r = 1.0 / s.r;
    let mut fact = charge * inv_r;
    for l in 0..=deg {
        let b2 = 4.0 * PI / (2.0 * l as f64 + 1.0);
        for m in 0..=l {
            let term = fact * b2 * harmonics[tri_index(l, m)];
            *dst.local.pos_term_mut(l, m) += term.conj();
        }
        fact *= inv_r;
    }
}

/// Multipole-to-multipole translation, direct summation.
pub fn m2m(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.multipole
        .translate(&src_node.center, &mut dst.multipole, &dst_node.center);
}

/// Multipole-to-local conversion, direct summation.
pub fn m2l(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) -> bool {
    src.multipole
        .to_local(&src_node.center, &mut dst.local, &dst_node.center);
    true
}

/// Local-to-local translation, direct summation.
pub fn l2l(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.local
        .translate(&src_node.center, &mut dst.local, &dst_node.center);
}

/// Multipole-to-multipole translation with the partial-sum recurrences.
pub fn m2m_kkylin(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.multipole
        .translate_kkylin(&src_node.center, &mut dst.multipole, &dst_node.center);
}

/// Multipole-to-local conversion with the partial-sum recurrences.
pub fn m2l_kkylin(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) -> bool {
    src.multipole
        .to_local_kkylin(&src_node.center, &mut dst.local, &dst_node.center);
    true
}

/// Local-to-local translation with the partial-sum recurrences.
pub fn l2l_kkylin(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.local
        .translate_kkylin(&src_node.center, &mut dst.local, &dst_node.center);
}

/// Multipole-to-multipole translation by point-and-shoot.
pub fn m2m_rotate(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.multipole
        .translate_rotate(&src_node.center, &mut dst.multipole, &dst_node.center);
}

/// Multipole-to-local conversion by point-and-shoot.
pub fn m2l_rotate(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) -> bool {
    src.multipole
        .to_local_rotate(&src_node.center, &mut dst.local, &dst_node.center);
    true
}

/// Local-to-local translation by point-and-shoot.
pub fn l2l_rotate(
    src_node: &NodeView<'_, Vector3>,
    src: &Development3d,
    dst_node: &NodeView<'_, Vector3>,
    dst: &mut Development3d,
) {
    src.local
        .translate_rotate(&src_node.center, &mut dst.local, &dst_node.center);
}

/// Evaluates the multipole part at `pos`.
pub fn multipole_evaluate(
    node: &NodeView<'_, Vector3>,
    devel: &Development3d,
    pos: &Vector3,
) -> Complex64 {
    devel.multipole.evaluate(&pos.sub(&node.center))
}

/// Evaluates the local part at `pos`.
pub fn local_evaluate(
    node: &NodeView<'_, Vector3>,
    devel: &Development3d,
    pos: &Vector3,
) -> Complex64 {
    devel.local.evaluate(&pos.sub(&node.center))
}

/// Cartesian gradient of the local part at `pos`.
pub fn local_gradient_evaluate(
    node: &NodeView<'_, Vector3>,
    devel: &Development3d,
    pos: &Vector3,
) -> Vector3 {
    devel.local.local_gradient_evaluate(&pos.sub(&node.center))
}

/// Cartesian gradient of the multipole part at `pos`.
pub fn multipole_gradient_evaluate(
    node: &NodeView<'_, Vector3>,
    devel: &Development3d,
    pos: &Vector3,
) -> Vector3 {
    devel
        .multipole
        .multipole_gradient_evaluate(&pos.sub(&node.center))
}

/// Serialisation hooks for distributed execution: multipoles travel
/// outward on the forward visit, locals return on the backward visit, both
/// reduced by pointwise addition.
#[derive(Copy, Clone, Debug, Default)]
pub struct Development3dVisitor;

impl NodeDataVisitor<Development3d> for Development3dVisitor {
    fn migrate_pack(&self, data: &Development3d, msg: &mut PackedMessage) {
        data.multipole.pack(msg);
        data.local.pack(msg);
    }

    fn migrate_unpack(&self, data: &mut Development3d, msg: &mut PackedMessage) {
        data.multipole.unpack(msg);
        data.local.unpack(msg);
    }

    fn visit_fw_pack(&self, data: &Development3d, msg: &mut PackedMessage) {
        data.multipole.pack(msg);
    }

    fn visit_fw_unpack(&self, data: &mut Development3d, msg: &mut PackedMessage) {
        data.multipole.unpack(msg);
    }

    fn visit_fw_reduce(&self, contribution: &Development3d, into: &mut Development3d) {
        into.multipole.add(&contribution.multipole);
    }

    fn visit_bw_pack(&self, data: &Development3d, msg: &mut PackedMessage) {
        data.local.pack(msg);
    }

    fn visit_bw_unpack(&self, data: &mut Development3d, msg: &mut PackedMessage) {
        data.local.unpack(msg);
    }

    fn visit_bw_reduce(&self, contribution: &Development3d, into: &mut Development3d) {
        into.local.add(&contribution.local);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use multipole_traits::tree::NodeState;
    use multipole_traits::types::BoundingBox;

    use super::*;

    pub(crate) fn node_at(center: Vector3) -> NodeView<'static, Vector3> {
        let half = Vector3::new(0.5, 0.5, 0.5);
        NodeView {
            handle: 0,
            parent: None,
            center,
            bounds: BoundingBox::new(center.sub(&half), center.add(&half)),
            depth: 0,
            is_leaf: true,
            point_count: 1,
            points: &[],
            state: NodeState::Local,
        }
    }

    #[test]
    fn p2m_reproduces_point_potential() {
        // A charge at (1, 0, 0) expanded about (0.75, 0.25, -0.25) must
        // reproduce its potential at a nearby exterior point.
        let node = node_at(Vector3::new(0.75, 0.25, -0.25));
        let p1 = Vector3::new(1.0, 0.0, 0.0);
        let p2 = Vector3::new(1.0, -0.5, 0.0);
        let charge = 0.05;

        let mut dev = Development3d::new(0, 24);
        p2m_point(&p1, charge, &node, &mut dev);

        let got = multipole_evaluate(&node, &dev, &p2).re;
        let want = charge / p2.dist(&p1);
        assert_relative_eq!(got, want, max_relative = 1e-3);
    }

    #[test]
    fn p2l_reproduces_point_potential() {
        let node = node_at(Vector3::new(5.0, 0.0, 0.0));
        let p = Vector3::new(3.0, -1.0, -1.0);

        let mut dev = Development3d::new(29, 0);
        p2l_point(&p, 1.0, &node, &mut dev);

        for &(x, y, z) in &[(5.3, 0.2, 0.1), (4.8, -0.4, 0.2), (5.0, 0.0, -0.5)] {
            let at = Vector3::new(x, y, z);
            let got = local_evaluate(&node, &dev, &at).re;
            let want = 1.0 / at.dist(&p);
            assert_relative_eq!(got, want, max_relative = 1e-9);
        }
    }

    #[test]
    fn p2l_gradient_matches_field() {
        let node = node_at(Vector3::new(5.0, 0.0, 0.0));
        let p = Vector3::new(3.0, -1.0, -1.0);

        let mut dev = Development3d::new(29, 0);
        p2l_point(&p, 1.0, &node, &mut dev);

        let at = Vector3::new(5.2, 0.3, -0.2);
        let grad = local_gradient_evaluate(&node, &dev, &at);
        let diff = at.sub(&p);
        let r = diff.norm();
        let want = diff.scale(-1.0 / (r * r * r));
        assert!(grad.dist(&want) / want.norm() < 1e-9);
    }

    #[test]
    fn translation_variants_agree_through_m2m() {
        let src_node = node_at(Vector3::new(0.25, 0.25, 0.25));
        let dst_node = node_at(Vector3::new(0.5, -0.5, 0.0));
        let p = Vector3::new(0.3, 0.2, 0.35);

        let mut src = Development3d::new(0, 14);
        p2m_point(&p, 1.0, &src_node, &mut src);

        let mut direct = Development3d::new(0, 14);
        m2m(&src_node, &src, &dst_node, &mut direct);
        let mut fast = Development3d::new(0, 14);
        m2m_kkylin(&src_node, &src, &dst_node, &mut fast);
        let mut ps = Development3d::new(0, 14);
        m2m_rotate(&src_node, &src, &dst_node, &mut ps);

        let at = Vector3::new(3.0, 1.0, -2.0);
        let reference = direct.multipole.evaluate(&at.sub(&dst_node.center)).re;
        assert_relative_eq!(
            fast.multipole.evaluate(&at.sub(&dst_node.center)).re,
            reference,
            max_relative = 1e-10
        );
        assert_relative_eq!(
            ps.multipole.evaluate(&at.sub(&dst_node.center)).re,
            reference,
            max_relative = 1e-9
        );
    }

    #[test]
    fn visitor_round_trip() {
        let node = node_at(Vector3::ZERO);
        let mut dev = Development3d::new(0, 10);
        p2m_point(&Vector3::new(0.2, -0.1, 0.3), 1.0, &node, &mut dev);

        let visitor = Development3dVisitor;
        let mut msg = PackedMessage::new();
        visitor.migrate_pack(&dev, &mut msg);

        let mut msg = PackedMessage::from_bytes(msg.into_bytes());
        let mut back = Development3d::new(0, 10);
        visitor.migrate_unpack(&mut back, &mut msg);
        assert!(msg.exhausted());
        assert_eq!(dev, back);
    }
}
