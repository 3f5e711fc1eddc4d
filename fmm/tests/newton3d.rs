//! End-to-end 3D solves against direct summation.
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use multipole_fmm::kernels::newton3d::{Newton3d, PointCharge, Translation};
use multipole_fmm::{Development3d, FmmSolver};
use multipole_traits::fmm::FmmOperators;
use multipole_traits::types::{Coordinate, Vector3};
use multipole_tree::PrTree;

type Solver = FmmSolver<Vector3, Development3d, PrTree<Vector3, PointCharge>, Newton3d>;

fn random_points(np: usize, seed: u64) -> Vec<PointCharge> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..np)
        .map(|i| {
            let position = Vector3::new(
                rng.gen_range(-0.999..0.999),
                rng.gen_range(-0.999..0.999),
                rng.gen_range(-0.999..0.999),
            );
            let charge = rng.gen_range(0.0..2.0 / np as f64);
            PointCharge::new(position, charge, i as u64)
        })
        .collect()
}

fn build_solver(
    points: &[PointCharge],
    order: usize,
    max_box: usize,
    translation: Translation,
) -> Solver {
    let tree = PrTree::new(
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(1.0, 1.0, 1.0),
        max_box,
    );
    let mut solver = FmmSolver::new(tree, Development3d::new(0, order), Newton3d::new(translation));
    for p in points {
        solver.insert_point(p.clone());
    }
    solver
}

fn direct_field(points: &[PointCharge], i: usize) -> Vector3 {
    let ops = Newton3d::new(Translation::Normal);
    let mut probe = points[i].clone();
    probe.clear_accum();
    for (j, src) in points.iter().enumerate() {
        if j != i {
            ops.p2p_one_way(&mut probe, src);
        }
    }
    probe.field
}

fn solved_fields(solver: &Solver) -> Vec<PointCharge> {
    let mut out = Vec::new();
    solver.foreach_point(&mut |_, cell| out.push(cell.borrow().clone()));
    out.sort_by_key(|p| p.index);
    out
}

/// Uniform random cloud solved with the point-and-shoot translations,
/// sampled against the O(N²) sum.
#[test]
fn uniform_random_cloud_matches_direct() {
    let points = random_points(2000, 7);
    let mut solver = build_solver(&points, 20, 50, Translation::Rotate);
    solver.solve();

    let solved = solved_fields(&solver);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..100 {
        let i = rng.gen_range(0..points.len());
        let reference = direct_field(&points, i);
        let err = solved[i].field.dist(&reference) / reference.norm();
        assert!(err <= 1.0e-3, "particle {i}: error {err:e}");
    }
}

/// The three translation algorithms have identical semantics; their solves
/// must agree far more tightly than either agrees with the direct sum.
#[test]
fn translation_variants_agree() {
    let points = random_points(400, 3);

    let mut fields = Vec::new();
    for translation in [Translation::Normal, Translation::Kkylin, Translation::Rotate] {
        let mut solver = build_solver(&points, 10, 20, translation);
        solver.solve();
        fields.push(solved_fields(&solver));
    }

    for i in 0..points.len() {
        let reference = &fields[0][i].field;
        for variant in &fields[1..] {
            let err = variant[i].field.dist(reference) / reference.norm().max(1.0);
            assert!(err <= 1.0e-8, "particle {i}: variants disagree by {err:e}");
        }
    }
}

/// Vetoing every expansion conversion must degrade the solve to plain
/// direct summation over the walker's pair enumeration.
#[derive(Copy, Clone, Default)]
struct VetoAll(Newton3d);

impl FmmOperators<Vector3, PointCharge, Development3d> for VetoAll {
    fn p2p(&self, one: &mut PointCharge, other: &mut PointCharge) {
        self.0.p2p(one, other)
    }

    fn p2p_one_way(&self, dst: &mut PointCharge, src: &PointCharge) {
        self.0.p2p_one_way(dst, src)
    }

    fn p2m(
        &self,
        src: &PointCharge,
        dst_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) {
        self.0.p2m(src, dst_node, dst)
    }

    fn m2m(
        &self,
        src_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        src: &Development3d,
        dst_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) {
        self.0.m2m(src_node, src, dst_node, dst)
    }

    fn m2l(
        &self,
        _src_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        _src: &Development3d,
        _dst_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        _dst: &mut Development3d,
    ) -> bool {
        false
    }

    fn l2l(
        &self,
        src_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        src: &Development3d,
        dst_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        dst: &mut Development3d,
    ) {
        self.0.l2l(src_node, src, dst_node, dst)
    }

    fn l2p(
        &self,
        src_node: &multipole_traits::tree::NodeView<'_, Vector3>,
        src: &Development3d,
        dst: &mut PointCharge,
    ) {
        self.0.l2p(src_node, src, dst)
    }
}

#[test]
fn vetoed_conversions_fall_back_to_direct_pairs() {
    let points = random_points(40, 5);

    let tree = PrTree::new(
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(1.0, 1.0, 1.0),
        4,
    );
    let mut solver = FmmSolver::new(
        tree,
        Development3d::new(0, 8),
        VetoAll(Newton3d::new(Translation::Normal)),
    );
    for p in &points {
        solver.insert_point(p.clone());
    }
    solver.solve();

    assert_eq!(solver.stats().m2l, 0);

    let solved = {
        let mut out = Vec::new();
        solver.foreach_point(&mut |_, cell| out.push(cell.borrow().clone()));
        out.sort_by_key(|p| p.index);
        out
    };

    for i in 0..points.len() {
        let reference = direct_field(&points, i);
        assert!(
            solved[i].field.dist(&reference) <= 1.0e-12 * reference.norm().max(1.0),
            "particle {i}"
        );
    }
}
