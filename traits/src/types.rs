//! Cartesian point types and bounding boxes.
use num::complex::Complex64;

/// Axis access shared by the 2D and 3D point types. The tree and the solver
/// are generic over this trait so a single implementation covers both planes
/// and space.
pub trait Coordinate: Copy + Clone + std::fmt::Debug + PartialEq + 'static {
    /// Spatial dimension.
    const DIM: usize;

    /// Component along `axis`, `0 <= axis < DIM`.
    fn coord(&self, axis: usize) -> f64;

    /// Builds a point from per-axis components.
    fn from_fn(f: impl FnMut(usize) -> f64) -> Self;

    fn zero() -> Self {
        Self::from_fn(|_| 0.0)
    }

    fn add(&self, other: &Self) -> Self {
        Self::from_fn(|a| self.coord(a) + other.coord(a))
    }

    fn sub(&self, other: &Self) -> Self {
        Self::from_fn(|a| self.coord(a) - other.coord(a))
    }

    fn scale(&self, factor: f64) -> Self {
        Self::from_fn(|a| self.coord(a) * factor)
    }

    fn norm(&self) -> f64 {
        let mut sum = 0.0;
        for a in 0..Self::DIM {
            let c = self.coord(a);
            sum += c * c;
        }
        sum.sqrt()
    }

    fn dist(&self, other: &Self) -> f64 {
        self.sub(other).norm()
    }
}

/// A 2D Cartesian point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Vector2 {
        Vector2 { x, y }
    }

    /// The complex number x + iy. 2D expansions live in the complex plane.
    pub fn to_complex(&self) -> Complex64 {
        Complex64::new(self.x, self.y)
    }
}

impl Coordinate for Vector2 {
    const DIM: usize = 2;

    fn coord(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            _ => self.y,
        }
    }

    fn from_fn(mut f: impl FnMut(usize) -> f64) -> Self {
        Vector2 {
            x: f(0),
            y: f(1),
        }
    }
}

/// A 3D Cartesian point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Spherical coordinates of a 3D point, kept in the evaluated form the
/// expansion routines consume.
#[derive(Copy, Clone, Debug)]
pub struct Spherical {
    pub r: f64,
    pub cos_theta: f64,
    pub sin_theta: f64,
    pub cos_phi: f64,
    pub sin_phi: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3 { x, y, z }
    }

    /// Decomposes into spherical coordinates. Degenerate directions keep the
    /// conventional values cos θ = 1 at the origin and cos φ = 1 on the
    /// polar axis.
    pub fn to_spherical(&self) -> Spherical {
        let r = self.norm();
        let rho = (self.x * self.x + self.y * self.y).sqrt();

        let (cos_theta, sin_theta) = if r > 0.0 {
            (self.z / r, rho / r)
        } else {
            (1.0, 0.0)
        };

        let (cos_phi, sin_phi) = if rho > 0.0 {
            (self.x / rho, self.y / rho)
        } else {
            (1.0, 0.0)
        };

        Spherical {
            r,
            cos_theta,
            sin_theta,
            cos_phi,
            sin_phi,
        }
    }

    /// Spherical angles (r, θ, φ) with θ ∈ [0, π] and φ ∈ (−π, π].
    pub fn to_angles(&self) -> (f64, f64, f64) {
        let r = self.norm();
        let theta = if r > 0.0 { (self.z / r).acos() } else { 0.0 };
        let phi = if self.x != 0.0 || self.y != 0.0 {
            self.y.atan2(self.x)
        } else {
            0.0
        };
        (r, theta, phi)
    }

    pub fn from_spherical(s: &Spherical) -> Vector3 {
        Vector3 {
            x: s.r * s.sin_theta * s.cos_phi,
            y: s.r * s.sin_theta * s.sin_phi,
            z: s.r * s.cos_theta,
        }
    }
}

impl Coordinate for Vector3 {
    const DIM: usize = 3;

    fn coord(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    fn from_fn(mut f: impl FnMut(usize) -> f64) -> Self {
        Vector3 {
            x: f(0),
            y: f(1),
            z: f(2),
        }
    }
}

/// Anything living at a position the tree can sort, i.e. a particle.
pub trait Positioned<V: Coordinate> {
    fn position(&self) -> V;
}

/// An axis-aligned box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox<V: Coordinate> {
    pub lower: V,
    pub upper: V,
}

impl<V: Coordinate> BoundingBox<V> {
    pub fn new(lower: V, upper: V) -> BoundingBox<V> {
        BoundingBox { lower, upper }
    }

    pub fn center(&self) -> V {
        V::from_fn(|a| 0.5 * (self.lower.coord(a) + self.upper.coord(a)))
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.upper.coord(axis) - self.lower.coord(axis)
    }

    pub fn contains(&self, point: &V) -> bool {
        (0..V::DIM).all(|a| {
            let c = point.coord(a);
            c >= self.lower.coord(a) && c < self.upper.coord(a)
        })
    }

    /// Largest per-axis gap between the two boxes. Positive means the boxes
    /// are separated along at least one axis, zero that they touch, negative
    /// that they overlap on every axis.
    pub fn gap(&self, other: &BoundingBox<V>) -> f64 {
        let mut gap = f64::NEG_INFINITY;
        for a in 0..V::DIM {
            let g = (self.lower.coord(a) - other.upper.coord(a))
                .max(other.lower.coord(a) - self.upper.coord(a));
            gap = gap.max(g);
        }
        gap
    }

    /// The child box obtained by bisecting every axis; bit `a` of `index`
    /// selects the upper half along axis `a`.
    pub fn child(&self, index: usize) -> BoundingBox<V> {
        let center = self.center();
        let lower = V::from_fn(|a| {
            if index >> a & 1 == 1 {
                center.coord(a)
            } else {
                self.lower.coord(a)
            }
        });
        let upper = V::from_fn(|a| {
            if index >> a & 1 == 1 {
                self.upper.coord(a)
            } else {
                center.coord(a)
            }
        });
        BoundingBox { lower, upper }
    }

    /// Index of the child box `point` falls into.
    pub fn child_index(&self, point: &V) -> usize {
        let center = self.center();
        let mut index = 0;
        for a in 0..V::DIM {
            if point.coord(a) >= center.coord(a) {
                index |= 1 << a;
            }
        }
        index
    }
}
