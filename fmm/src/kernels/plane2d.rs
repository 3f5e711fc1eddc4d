//! Operator set for the 2D complex-plane kernel G(z, z₀) = 1/(z − z₀).
use num::complex::Complex64;
use num::Zero;

use multipole_traits::fmm::FmmOperators;
use multipole_traits::parallel::{PackedMessage, ParticleVisitor};
use multipole_traits::tree::NodeView;
use multipole_traits::types::{Coordinate, Positioned, Vector2};

use crate::development2d::{self, Development2d};

/// A particle carrying a density and accumulating the complex potential at
/// its position.
#[derive(Clone, Debug, Default)]
pub struct PlanePoint {
    pub position: Vector2,
    pub density: f64,
    pub accum: Complex64,
    pub index: u64,
}

impl PlanePoint {
    pub fn new(position: Vector2, density: f64, index: u64) -> PlanePoint {
        PlanePoint {
            position,
            density,
            accum: Complex64::zero(),
            index,
        }
    }

    pub fn clear_accum(&mut self) {
        self.accum = Complex64::zero();
    }
}

impl Positioned<Vector2> for PlanePoint {
    fn position(&self) -> Vector2 {
        self.position
    }
}

/// Plane kernel operators accumulating complex potentials, semifar capable.
#[derive(Copy, Clone, Debug, Default)]
pub struct Plane2d;

impl FmmOperators<Vector2, PlanePoint, Development2d> for Plane2d {
    fn p2p(&self, one: &mut PlanePoint, other: &mut PlanePoint) {
        // destination - source
        let zd_m_zs = one.position.to_complex() - other.position.to_complex();
        let inv = zd_m_zs.inv();

        one.accum += inv * other.density;
        other.accum -= inv * one.density;
    }

    fn p2p_one_way(&self, dst: &mut PlanePoint, src: &PlanePoint) {
        let zd_m_zs = dst.position.to_complex() - src.position.to_complex();
        dst.accum += zd_m_zs.inv() * src.density;
    }

    fn p2m(&self, src: &PlanePoint, dst_node: &NodeView<'_, Vector2>, dst: &mut Development2d) {
        // G(z, zp) = Σ_i (zp − zm)^(i−1) / (z − zm)^i  outside the cell
        let zp_m_zm = src.position.to_complex() - dst_node.center.to_complex();
        let mut tmp = Complex64::new(src.density, 0.0);

        for i in 1..=dst.multipole.negdeg() {
            *dst.multipole.term_mut(-(i as i32)) += tmp;
            tmp *= zp_m_zm;
        }
    }

    fn m2m(
        &self,
        src_node: &NodeView<'_, Vector2>,
        src: &Development2d,
        dst_node: &NodeView<'_, Vector2>,
        dst: &mut Development2d,
    ) {
        development2d::m2m(src_node, src, dst_node, dst);
    }

    fn m2l(
        &self,
        src_node: &NodeView<'_, Vector2>,
        src: &Development2d,
        dst_node: &NodeView<'_, Vector2>,
        dst: &mut Development2d,
    ) -> bool {
        development2d::m2l(src_node, src, dst_node, dst)
    }

    fn l2l(
        &self,
        src_node: &NodeView<'_, Vector2>,
        src: &Development2d,
        dst_node: &NodeView<'_, Vector2>,
        dst: &mut Development2d,
    ) {
        development2d::l2l(src_node, src, dst_node, dst);
    }

    fn l2p(&self, src_node: &NodeView<'_, Vector2>, src: &Development2d, dst: &mut PlanePoint) {
        dst.accum += development2d::local_evaluate(src_node, src, &dst.position);
    }

    fn p2l(&self, src: &PlanePoint, dst_node: &NodeView<'_, Vector2>, dst: &mut Development2d) {
        // G(z, zp) = -Σ_i (z − zl)^i / (zp − zl)^(i+1)  inside the cell
        let zp_m_zl = src.position.to_complex() - dst_node.center.to_complex();
        let inv = zp_m_zl.inv();
        let mut tmp = -src.density * inv;

        for i in 0..=dst.local.posdeg() {
            *dst.local.term_mut(i as i32) += tmp;
            tmp *= inv;
        }
    }

    fn m2p(&self, src_node: &NodeView<'_, Vector2>, src: &Development2d, dst: &mut PlanePoint) {
        dst.accum += development2d::multipole_evaluate(src_node, src, &dst.position);
    }
}

/// Wire format for [`PlanePoint`], mirroring the 3D particle: full state on
/// migration, sources forward, accumulators backward with additive
/// reduction.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlanePointVisitor;

impl ParticleVisitor<PlanePoint> for PlanePointVisitor {
    fn alloc(&self) -> PlanePoint {
        PlanePoint::default()
    }

    fn migrate_pack(&self, particle: &PlanePoint, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[
            particle.position.x,
            particle.position.y,
            particle.density,
            particle.accum.re,
            particle.accum.im,
        ]);
        msg.put_u64(particle.index);
    }

    fn migrate_unpack(&self, particle: &mut PlanePoint, msg: &mut PackedMessage) {
        let mut raw = [0.0; 5];
        msg.get_f64_slice(&mut raw);
        particle.position = Vector2::new(raw[0], raw[1]);
        particle.density = raw[2];
        particle.accum = Complex64::new(raw[3], raw[4]);
        particle.index = msg.get_u64();
    }

    fn visit_fw_pack(&self, particle: &PlanePoint, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[particle.position.x, particle.position.y, particle.density]);
        msg.put_u64(particle.index);
    }

    fn visit_fw_unpack(&self, particle: &mut PlanePoint, msg: &mut PackedMessage) {
        let mut raw = [0.0; 3];
        msg.get_f64_slice(&mut raw);
        particle.position = Vector2::new(raw[0], raw[1]);
        particle.density = raw[2];
        particle.accum = Complex64::zero();
        particle.index = msg.get_u64();
    }

    fn visit_bw_pack(&self, particle: &PlanePoint, msg: &mut PackedMessage) {
        msg.put_f64_slice(&[particle.accum.re, particle.accum.im]);
    }

    fn visit_bw_unpack(&self, particle: &mut PlanePoint, msg: &mut PackedMessage) {
        let mut raw = [0.0; 2];
        msg.get_f64_slice(&mut raw);
        particle.accum = Complex64::new(raw[0], raw[1]);
    }

    fn visit_bw_reduce(&self, contribution: &PlanePoint, into: &mut PlanePoint) {
        into.accum += contribution.accum;
    }
}
