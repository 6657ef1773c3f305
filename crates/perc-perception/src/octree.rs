//! Octree index for neighbourhood search over an obstacle cloud.
//!
//! Nodes live in one flat arena and leaves hold point indices, so a query
//! hit maps straight back into the caller's slice. The
//! [`EuclideanClusterer`][crate::cluster::EuclideanClusterer] grows clusters
//! with [`Octree::query_radius`].
//!
//! # Example
//!
//! ```rust
//! use perc_perception::octree::Octree;
//! use perc_types::Point3;
//!
//! let points = [
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.1, 0.0, 0.0),
//!     Point3::new(9.0, 9.0, 0.0),
//! ];
//! let tree = Octree::build(&points, 8);
//!
//! let mut hits = tree.query_radius(Point3::new(1.0, 0.0, 0.0), 0.5);
//! hits.sort_unstable();
//! assert_eq!(hits, vec![0, 1]);
//! ```

use perc_types::Point3;

/// Splitting stops at this depth even if a leaf is over capacity, so
/// coincident points cannot recurse forever.
pub const MAX_DEPTH: usize = 12;

/// Closed box `[lo, hi]` per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lo: Point3,
    pub hi: Point3,
}

impl Bounds {
    /// Tightest box around `points`; `None` when there are none.
    pub fn of(points: &[Point3]) -> Option<Self> {
        let (head, rest) = points.split_first()?;
        let mut b = Self { lo: *head, hi: *head };
        for p in rest {
            b.lo = Point3::new(b.lo.x.min(p.x), b.lo.y.min(p.y), b.lo.z.min(p.z));
            b.hi = Point3::new(b.hi.x.max(p.x), b.hi.y.max(p.y), b.hi.z.max(p.z));
        }
        Some(b)
    }

    fn mid(&self) -> Point3 {
        self.lo.add(self.hi).scale(0.5)
    }

    /// Squared distance from `p` to the nearest point of the box (0 inside).
    fn dist2_to(&self, p: Point3) -> f64 {
        let gap = |v: f64, lo: f64, hi: f64| (lo - v).max(0.0).max(v - hi);
        let (dx, dy, dz) = (
            gap(p.x, self.lo.x, self.hi.x),
            gap(p.y, self.lo.y, self.hi.y),
            gap(p.z, self.lo.z, self.hi.z),
        );
        dx * dx + dy * dy + dz * dz
    }

    /// Octant `k` of the box; bit 0/1/2 selects the upper half in x/y/z.
    fn octant(&self, k: usize) -> Self {
        let m = self.mid();
        let pick = |bit: usize, lo: f64, mid: f64, hi: f64| {
            if k & bit == 0 { (lo, mid) } else { (mid, hi) }
        };
        let (x0, x1) = pick(1, self.lo.x, m.x, self.hi.x);
        let (y0, y1) = pick(2, self.lo.y, m.y, self.hi.y);
        let (z0, z1) = pick(4, self.lo.z, m.z, self.hi.z);
        Self {
            lo: Point3::new(x0, y0, z0),
            hi: Point3::new(x1, y1, z1),
        }
    }
}

/// Octant code of `p` relative to `mid`, matching [`Bounds::octant`].
fn octant_of(p: Point3, mid: Point3) -> usize {
    usize::from(p.x >= mid.x) | usize::from(p.y >= mid.y) << 1 | usize::from(p.z >= mid.z) << 2
}

fn is_finite(p: Point3) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

fn dist2(a: Point3, b: Point3) -> f64 {
    let d = a.sub(b);
    d.x * d.x + d.y * d.y + d.z * d.z
}

#[derive(Debug)]
struct Node {
    bounds: Bounds,
    depth: usize,
    /// Point indices; emptied when the node splits.
    items: Vec<usize>,
    /// Arena index of the first of eight consecutive children.
    first_child: Option<usize>,
}

/// Static octree over a borrowed point slice.
///
/// Built once per frame; leaves split when they hold more than `capacity`
/// indices.
#[derive(Debug)]
pub struct Octree<'a> {
    points: &'a [Point3],
    nodes: Vec<Node>,
    capacity: usize,
}

impl<'a> Octree<'a> {
    /// Index every point of `points`. Non-finite points are left out.
    pub fn build(points: &'a [Point3], capacity: usize) -> Self {
        let finite: Vec<Point3> = points.iter().copied().filter(|p| is_finite(*p)).collect();
        let bounds = Bounds::of(&finite).unwrap_or(Bounds {
            lo: Point3::zero(),
            hi: Point3::zero(),
        });
        let mut tree = Self {
            points,
            nodes: vec![Node {
                bounds,
                depth: 0,
                items: Vec::new(),
                first_child: None,
            }],
            capacity: capacity.max(1),
        };
        for (i, p) in points.iter().enumerate() {
            if is_finite(*p) {
                tree.insert(i);
            }
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().map(|n| n.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of the points within `radius` of `centre`, boundary included.
    /// Order is unspecified.
    pub fn query_radius(&self, centre: Point3, radius: f64) -> Vec<usize> {
        let r2 = radius * radius;
        let mut out = Vec::new();
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.bounds.dist2_to(centre) > r2 {
                continue;
            }
            match node.first_child {
                Some(first) => stack.extend(first..first + 8),
                None => out.extend(
                    node.items
                        .iter()
                        .copied()
                        .filter(|&i| dist2(self.points[i], centre) <= r2),
                ),
            }
        }
        out
    }

    fn insert(&mut self, index: usize) {
        let p = self.points[index];
        let mut id = 0;
        while let Some(first) = self.nodes[id].first_child {
            id = first + octant_of(p, self.nodes[id].bounds.mid());
        }
        self.nodes[id].items.push(index);
        if self.nodes[id].items.len() > self.capacity && self.nodes[id].depth < MAX_DEPTH {
            self.split(id);
        }
    }

    fn split(&mut self, id: usize) {
        let first = self.nodes.len();
        let bounds = self.nodes[id].bounds;
        let depth = self.nodes[id].depth + 1;
        self.nodes.extend((0..8).map(|k| Node {
            bounds: bounds.octant(k),
            depth,
            items: Vec::new(),
            first_child: None,
        }));
        self.nodes[id].first_child = Some(first);

        let mid = bounds.mid();
        for i in std::mem::take(&mut self.nodes[id].items) {
            let child = first + octant_of(self.points[i], mid);
            self.nodes[child].items.push(i);
        }
        for child in first..first + 8 {
            if self.nodes[child].items.len() > self.capacity && depth < MAX_DEPTH {
                self.split(child);
            }
        }
    }
}
