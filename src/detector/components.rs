/// Connected components of a binary mask with per-component shape statistics
use crate::models::{BitMatrix, Point};

/// Union-Find data structure over component labels
pub struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        // Label 0 is reserved for background
        Self { parent: vec![0] }
    }

    /// Allocate a fresh singleton label
    pub fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        label
    }

    pub fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Path compression
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, x: u32, y: u32) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            // Keep the smaller label as root so results are order independent
            let (lo, hi) = if root_x < root_y { (root_x, root_y) } else { (root_y, root_x) };
            self.parent[hi as usize] = lo;
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.len() <= 1
    }
}

impl Default for UnionFind {
    fn default() -> Self {
        Self::new()
    }
}

/// An 8-connected foreground region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    /// Pixel count
    pub area: usize,
    /// Inclusive bounding box: min x, min y, max x, max y
    pub bbox: (usize, usize, usize, usize),
    /// Mean pixel position
    pub centroid: Point,
}

impl Component {
    /// Bounding box width in pixels
    pub fn width(&self) -> usize {
        self.bbox.2 - self.bbox.0 + 1
    }

    /// Bounding box height in pixels
    pub fn height(&self) -> usize {
        self.bbox.3 - self.bbox.1 + 1
    }

    /// Bounding box width / height
    pub fn aspect(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    /// Share of the bounding box covered by the component
    pub fn fill_ratio(&self) -> f32 {
        self.area as f32 / (self.width() * self.height()) as f32
    }
}

#[derive(Clone, Copy)]
struct Accumulator {
    area: usize,
    sum_x: u64,
    sum_y: u64,
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

/// Find 8-connected foreground regions, ordered by first pixel in raster order
pub fn find_components(matrix: &BitMatrix) -> Vec<Component> {
    let width = matrix.width();
    let height = matrix.height();

    let mut labels = vec![0u32; width * height];
    let mut uf = UnionFind::new();

    // First pass: provisional labels
    for y in 0..height {
        for x in 0..width {
            if !matrix.get(x, y) {
                continue;
            }

            let mut neighbors = [0u32; 4];
            let mut n = 0;
            // Left, up-left, up, up-right
            if x > 0 && labels[y * width + x - 1] != 0 {
                neighbors[n] = labels[y * width + x - 1];
                n += 1;
            }
            if y > 0 {
                let up = (y - 1) * width;
                if x > 0 && labels[up + x - 1] != 0 {
                    neighbors[n] = labels[up + x - 1];
                    n += 1;
                }
                if labels[up + x] != 0 {
                    neighbors[n] = labels[up + x];
                    n += 1;
                }
                if x + 1 < width && labels[up + x + 1] != 0 {
                    neighbors[n] = labels[up + x + 1];
                    n += 1;
                }
            }

            let idx = y * width + x;
            match neighbors[..n].iter().min() {
                None => labels[idx] = uf.make_set(),
                Some(&min_label) => {
                    labels[idx] = min_label;
                    for &l in &neighbors[..n] {
                        if l != min_label {
                            uf.union(min_label, l);
                        }
                    }
                }
            }
        }
    }

    // Second pass: accumulate statistics per root
    let mut accs: Vec<Option<Accumulator>> = vec![None; uf.len()];
    let mut order: Vec<u32> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let label = labels[y * width + x];
            if label == 0 {
                continue;
            }
            let root = uf.find(label);
            match &mut accs[root as usize] {
                Some(acc) => {
                    acc.area += 1;
                    acc.sum_x += x as u64;
                    acc.sum_y += y as u64;
                    acc.min_x = acc.min_x.min(x);
                    acc.min_y = acc.min_y.min(y);
                    acc.max_x = acc.max_x.max(x);
                    acc.max_y = acc.max_y.max(y);
                }
                slot @ None => {
                    order.push(root);
                    *slot = Some(Accumulator {
                        area: 1,
                        sum_x: x as u64,
                        sum_y: y as u64,
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    });
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|root| accs[root as usize])
        .map(|acc| Component {
            area: acc.area,
            bbox: (acc.min_x, acc.min_y, acc.max_x, acc.max_y),
            centroid: Point::new(
                acc.sum_x as f32 / acc.area as f32,
                acc.sum_y as f32 / acc.area as f32,
            ),
        })
        .collect()
}
