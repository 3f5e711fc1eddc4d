//! Operator set for the 3D Newton/Coulomb kernel 1/|x − y|.
use multipole_traits::fmm::FmmOperators;
use multipole_traits::parallel::{PackedMessage, ParticleVisitor};
use multipole_traits::tree::NodeView;
use multipole_traits::types::{Coordinate, Positioned, Vector3};

use crate::development3d::{self, Development3d};

/// A particle carrying a charge and accumulating the field at its
/// position.
#[derive(Clone, Debug, Default)]
pub struct PointCharge {
    pub position: Vector3,
    pub charge: f64,
    pub field: Vector3,
    pub index: u64,
}

impl PointCharge {
    pub fn new(position: Vector3, charge: f64, index: u64) -> PointCharge {
        PointCharge {
            position,
            charge,
            field: Vector3::ZERO,
            index,
        }
    }

    pub fn clear_accum(&mut self) {
        self.field = Vector3::ZERO;
    }
}

impl Positioned<Vector3> for PointCharge {
    fn position(&self) -> Vector3 {
        self.position
    }
}

/// The interchangeable 3D translation algorithms.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Translation {
    /// Direct term-by-term summation.
    #[default]
    Normal,
    /// Partial-sum recurrences along the destination order.
    Kkylin,
    /// Point-and-shoot through the Wigner rotations.
    Rotate,
}

/// Newton kernel operators accumulating fields, semifar capable.
#[derive(Copy, Clone, Debug, Default)]
pub struct Newton3d {
    pub translation: Translation,
    /// Distance under which a direct interaction is dropped; keeps
    /// coincident points from producing infinities.
    pub softening: f64,
}

impl Newton3d {
    pub fn new(translation: Translation) -> Newton3d {
        Newton3d {
            translation,
            softening: 1.0e-5,
        }
    }
}

impl FmmOperators<Vector3, PointCharge, Development3d> for Newton3d {
    fn p2p(&self, one: &mut PointCharge, other: &mut PointCharge) {
        // destination - source
        let diff = one.position.sub(&other.position);
        let r = diff.norm();

        if r > self.softening {
            let inv_r3 = 1.0 / (r * r * r);
            one.field = one.field.add(&diff.scale(-inv_r3 * other.charge));
            other.field = other.field.add(&diff.scale(inv_r3 * one.charge));
        }
    }

    fn p2p_one_way(&self, dst: &mut PointCharge, src: &PointCharge) {
        let diff = dst.position.sub(&src.position);
        let r = diff.norm();

        if r > self.softening {
            let inv_r3 = 1.0 / (r * r * r);
            dst.field = dst.field.add(&diff.scale(-inv_r3 * src.charge));
        }
    }

    fn p2m(&self, src: &PointCharge, dst_node: &NodeView<'_, Vector3>, dst: &mut Development3d) {
        development3d::p2m_point(&src.position, src.charge, dst_node, dst);
    }

    fn m2m(
        &self,
        src_node: &NodeView<'_, Vector3>,
        src: &Development3d,
        dst_node: &NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) {
        match self.translation {
            Translation::Normal => development3d::m2m(src_node, src, dst_node, dst),
            Translation::Kkylin => development3d::m2m_kkylin(src_node, src, dst_node, dst),
            Translation::Rotate => development3d::m2m_rotate(src_node, src, dst_node, dst),
        }
    }

    fn m2l(
        &self,
        src_node: &NodeView<'_, Vector3>,
        src: &Development3d,
        dst_node: &NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) -> bool {
        match self.translation {
            Translation::Normal => development3d::m2l(src_node, src, dst_node, dst),
            Translation::Kkylin => development3d::m2l_kkylin(src_node, src, dst_node, dst),
            Translation::Rotate => development3d::m2l_rotate(src_node, src, dst_node, dst),
        }
    }

    fn l2l(
        &self,
        src_node: &NodeView<'_, Vector3>,
        src: &Development3d,
        dst_node: &NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) {
        match self.translation {
            Translation::Normal => development3d::l2l(src_node, src, dst_node, dst),
            Translation::Kkylin => development3d::l2l_kkylin(src_node, src, dst_node, dst),
            Translation::Rotate => development3d::l2l_rotate(src_node, src, dst_node, dst),
        }
    }

    fn l2p(&self, src_node: &NodeView<'_, Vector3>, src: &Development3d, dst: &mut PointCharge) {
        let grad = development3d::local_gradient_evaluate(src_node, src, &dst.position);
        dst.field = dst.field.add(&grad);
    }

    fn p2l(&self, src: &PointCharge, dst_node: &NodeView<'_, Vector3>, dst: &mut Development3d) {
        development3d::p2l_point(&src.position, src.charge, dst_node, dst);
    }

    fn m2p(&self, src_node: &NodeView<'_, Vector3>, src: &Development3d, dst: &mut PointCharge) {
        let grad = development3d::multipole_gradient_evaluate(src_node, src, &dst.position);
        dst.field = dst.field.add(&grad);
    }
}

/// Wire format for [`PointCharge`]: migration ships the whole particle,
/// the forward visit only the source side, the backward visit only the
/// accumulated field, reduced by vector addition.
#[derive(Copy, Clone, Debug, Default)]
pub struct PointChargeVisitor;

impl ParticleVisitor<PointCharge> for PointChargeVisitor {
    fn alloc(&self) -> PointCharge {
        PointCharge::default()
    }

    fn migrate_pack(&self, particle: &PointCharge, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[
            particle.position.x,
            particle.position.y,
            particle.position.z,
            particle.charge,
            particle.field.x,
            particle.field.y,
            particle.field.z,
        ]);
        msg.put_u64(particle.index);
    }

    fn migrate_unpack(&self, particle: &mut PointCharge, msg: &mut PackedMessage) {
        let mut raw = [0.0; 7];
        msg.get_f64_slice(&mut raw);
        particle.position = Vector3::new(raw[0], raw[1], raw[2]);
        particle.charge = raw[3];
        particle.field = Vector3::new(raw[4], raw[5], raw[6]);
        particle.index = msg.get_u64();
    }

    fn visit_fw_pack(&self, particle: &PointCharge, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[
            particle.position.x,
            particle.position.y,
            particle.position.z,
            particle.charge,
        ]);
        msg.put_u64(particle.index);
    }

    fn visit_fw_unpack(&self, particle: &mut PointCharge, msg: &mut PackedMessage) {
        let mut raw = [0.0; 4];
        msg.get_f64_slice(&mut raw);
        particle.position = Vector3::new(raw[0], raw[1], raw[2]);
        particle.charge = raw[3];
        particle.field = Vector3::ZERO;
        particle.index = msg.get_u64();
    }

    fn visit_bw_pack(&self, particle: &PointCharge, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[particle.field.x, particle.field.y, particle.field.z]);
    }

    fn visit_bw_unpack(&self, particle: &mut PointCharge, msg: &mut PackedMessage) {
        let mut raw = [0.0; 3];
        msg.get_f64_slice(&mut raw);
        particle.field = Vector3::new(raw[0], raw[1], raw[2]);
    }

    fn visit_bw_reduce(&self, contribution: &PointCharge, into: &mut PointCharge) {
        into.field = into.field.add(&contribution.field);
    }
}
