//! Dynamic bounding volume tree used as the broad phase.
//!
//! Leaves store a fattened copy of their proxy's box so that small motions do
//! not touch the tree. Insertion descends by surface-area cost and the tree is
//! kept balanced with AVL-style rotations.

use glam::Vec3;

use crate::core::aabb::Aabb;

/// Index of a leaf node, stable until the proxy is removed.
pub type ProxyId = usize;

const NULL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    /// Box last reported for the proxy (leaves only).
    tight: Aabb,
    parent: usize,
    left: usize,
    right: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
    enlarged: bool,
    proxy: Option<T>,
}

impl<T> Node<T> {
    fn is_leaf(&self) -> bool {
        self.left == NULL
    }
}

/// Result of [`DynamicTree::ray_cast`].
#[derive(Debug, Clone, Copy)]
pub struct TreeRayHit<T> {
    pub proxy: T,
    pub lambda: f32,
    pub normal: Vec3,
}

enum PairTask {
    Within(usize),
    Between(usize, usize),
}

#[derive(Debug, Clone)]
pub struct DynamicTree<T: Copy> {
    nodes: Vec<Node<T>>,
    free_list: Vec<usize>,
    root: usize,
    margin: f32,
    proxy_count: usize,
}

impl<T: Copy> DynamicTree<T> {
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL,
            margin,
            proxy_count: 0,
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Height of the root (0 for a single leaf, -1 for an empty tree).
    pub fn height(&self) -> i32 {
        if self.root == NULL {
            -1
        } else {
            self.nodes[self.root].height
        }
    }

    /// Inserts a proxy. Enlarged proxies get the margin added to their box;
    /// others (static geometry) are stored exactly.
    pub fn add_proxy(&mut self, proxy: T, tight: Aabb, enlarged: bool) -> ProxyId {
        let id = self.allocate_node();
        let node = &mut self.nodes[id];
        node.aabb = if enlarged {
            tight.expanded(self.margin)
        } else {
            tight
        };
        node.tight = tight;
        node.height = 0;
        node.enlarged = enlarged;
        node.proxy = Some(proxy);
        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    /// Removes a proxy and returns its payload.
    ///
    /// # Panics
    ///
    /// Panics when `id` is not a live proxy of this tree.
    pub fn remove_proxy(&mut self, id: ProxyId) -> T {
        let proxy = self
            .nodes
            .get(id)
            .filter(|node| node.height == 0)
            .and_then(|node| node.proxy);
        let Some(proxy) = proxy else {
            panic!("remove_proxy: {id} is not a live proxy of this tree");
        };
        self.remove_leaf(id);
        self.free_node(id);
        self.proxy_count -= 1;
        proxy
    }

    /// Moves a proxy. Returns `false` without touching the tree when the new
    /// box still fits inside the stored one.
    pub fn update(&mut self, id: ProxyId, tight: Aabb, displacement: Vec3) -> bool {
        let node = &mut self.nodes[id];
        debug_assert!(node.height == 0 && node.proxy.is_some(), "update of a dead proxy");
        node.tight = tight;
        if node.enlarged {
            if node.aabb.contains(&tight) {
                return false;
            }
        } else if node.aabb == tight {
            return false;
        }

        self.remove_leaf(id);
        let node = &mut self.nodes[id];
        node.aabb = if node.enlarged {
            tight.expanded(self.margin).swept(displacement)
        } else {
            tight
        };
        self.insert_leaf(id);
        true
    }

    pub fn proxy(&self, id: ProxyId) -> Option<T> {
        self.nodes.get(id).filter(|node| node.height == 0).and_then(|node| node.proxy)
    }

    /// Stored (fattened) box of a proxy.
    pub fn fat_aabb(&self, id: ProxyId) -> Option<Aabb> {
        self.nodes
            .get(id)
            .filter(|node| node.height == 0 && node.proxy.is_some())
            .map(|node| node.aabb)
    }

    pub fn proxies(&self) -> impl Iterator<Item = (ProxyId, T)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.height == 0)
            .filter_map(|(id, node)| node.proxy.map(|proxy| (id, proxy)))
    }

    /// Calls `callback` for every proxy whose stored box overlaps `aabb`.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(ProxyId, T)) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(proxy) = node.proxy {
                    callback(index, proxy);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Reports every pair of proxies with overlapping boxes exactly once.
    /// Pairs rejected by `filter` are skipped.
    pub fn enumerate_pairs(
        &self,
        mut filter: impl FnMut(T, T) -> bool,
        mut callback: impl FnMut(T, T),
    ) {
        if self.root == NULL {
            return;
        }
        let mut stack = vec![PairTask::Within(self.root)];
        while let Some(task) = stack.pop() {
            match task {
                PairTask::Within(index) => {
                    let node = &self.nodes[index];
                    if !node.is_leaf() {
                        stack.push(PairTask::Within(node.left));
                        stack.push(PairTask::Within(node.right));
                        stack.push(PairTask::Between(node.left, node.right));
                    }
                }
                PairTask::Between(a, b) => {
                    let (node_a, node_b) = (&self.nodes[a], &self.nodes[b]);
                    if !node_a.aabb.overlaps(&node_b.aabb) {
                        continue;
                    }
                    match (node_a.is_leaf(), node_b.is_leaf()) {
                        (true, true) => {
                            if let (Some(pa), Some(pb)) = (node_a.proxy, node_b.proxy) {
                                if filter(pa, pb) {
                                    callback(pa, pb);
                                }
                            }
                        }
                        (true, false) => {
                            stack.push(PairTask::Between(a, node_b.left));
                            stack.push(PairTask::Between(a, node_b.right));
                        }
                        (false, true) => {
                            stack.push(PairTask::Between(node_a.left, b));
                            stack.push(PairTask::Between(node_a.right, b));
                        }
                        (false, false) => {
                            if node_a.aabb.surface_area() >= node_b.aabb.surface_area() {
                                stack.push(PairTask::Between(node_a.left, b));
                                stack.push(PairTask::Between(node_a.right, b));
                            } else {
                                stack.push(PairTask::Between(a, node_b.left));
                                stack.push(PairTask::Between(a, node_b.right));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Casts the ray `origin + lambda * direction`, `lambda` in `[0, max_lambda]`.
    ///
    /// `pre` may skip a proxy before `test` runs; `post` may reject a hit, in
    /// which case the search continues as if the proxy had been missed.
    pub fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_lambda: f32,
        mut pre: impl FnMut(T) -> bool,
        mut post: impl FnMut(&TreeRayHit<T>) -> bool,
        mut test: impl FnMut(T) -> Option<(f32, Vec3)>,
    ) -> Option<TreeRayHit<T>> {
        if self.root == NULL {
            return None;
        }

        let mut best: Option<TreeRayHit<T>> = None;
        let mut best_lambda = max_lambda;
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                let Some(proxy) = node.proxy else { continue };
                if !pre(proxy) {
                    continue;
                }
                if let Some((lambda, normal)) = test(proxy) {
                    if lambda < best_lambda {
                        let hit = TreeRayHit {
                            proxy,
                            lambda,
                            normal,
                        };
                        if !post(&hit) {
                            continue;
                        }
                        best_lambda = lambda;
                        best = Some(hit);
                    }
                }
                continue;
            }

            let left_entry = self.nodes[node.left].aabb.ray_entry(origin, direction, best_lambda);
            let right_entry = self.nodes[node.right].aabb.ray_entry(origin, direction, best_lambda);
            match (left_entry, right_entry) {
                (Some(l), Some(r)) => {
                    // Nearer child is popped first.
                    if l < r {
                        stack.push(node.right);
                        stack.push(node.left);
                    } else {
                        stack.push(node.left);
                        stack.push(node.right);
                    }
                }
                (Some(_), None) => stack.push(node.left),
                (None, Some(_)) => stack.push(node.right),
                (None, None) => {}
            }
        }

        best
    }

    /// Checks structural and containment invariants of the whole tree.
    pub fn validate(&self) -> Result<(), String> {
        let mut leaves = 0;
        let mut reachable = 0;
        if self.root != NULL {
            if self.nodes[self.root].parent != NULL {
                return Err("root has a parent".into());
            }
            let mut stack = vec![self.root];
            while let Some(index) = stack.pop() {
                reachable += 1;
                let node = &self.nodes[index];
                if node.is_leaf() {
                    leaves += 1;
                    if node.height != 0 || node.proxy.is_none() {
                        return Err(format!("leaf {index} has no proxy or non-zero height"));
                    }
                    if !node.aabb.contains(&node.tight) {
                        return Err(format!("leaf {index} does not contain its proxy box"));
                    }
                    continue;
                }
                let (left, right) = (&self.nodes[node.left], &self.nodes[node.right]);
                if left.parent != index || right.parent != index {
                    return Err(format!("children of {index} have a wrong parent"));
                }
                if node.height != 1 + left.height.max(right.height) {
                    return Err(format!("node {index} has a stale height"));
                }
                if !node.aabb.contains(&left.aabb) || !node.aabb.contains(&right.aabb) {
                    return Err(format!("node {index} does not contain its children"));
                }
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        if leaves != self.proxy_count {
            return Err(format!("{leaves} leaves but {} proxies", self.proxy_count));
        }
        if reachable + self.free_list.len() != self.nodes.len() {
            return Err("nodes leaked from the free list".into());
        }
        Ok(())
    }

    fn allocate_node(&mut self) -> usize {
        let node = Node {
            aabb: Aabb::empty(),
            tight: Aabb::empty(),
            parent: NULL,
            left: NULL,
            right: NULL,
            height: 0,
            enlarged: false,
            proxy: None,
        };
        if let Some(index) = self.free_list.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.height = -1;
        node.proxy = None;
        node.parent = NULL;
        node.left = NULL;
        node.right = NULL;
        self.free_list.push(index);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL {
            self.root = leaf;
            self.nodes[leaf].parent = NULL;
            return;
        }

        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let area = node.aabb.surface_area();
            let combined_area = node.aabb.merged(&leaf_aabb).surface_area();

            // Cost of pairing the leaf with this node, and the minimum cost
            // pushed down to the children.
            let cost = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);

            let child_cost = |child: &Node<T>| {
                let merged = leaf_aabb.merged(&child.aabb).surface_area();
                if child.is_leaf() {
                    merged + inheritance
                } else {
                    merged - child.aabb.surface_area() + inheritance
                }
            };
            let cost_left = child_cost(&self.nodes[node.left]);
            let cost_right = child_cost(&self.nodes[node.right]);

            if cost < cost_left && cost < cost_right {
                break;
            }
            index = if cost_left < cost_right {
                node.left
            } else {
                node.right
            };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_node = &self.nodes[sibling];
            let merged = leaf_aabb.merged(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let parent = &mut self.nodes[new_parent];
            parent.parent = old_parent;
            parent.aabb = merged;
            parent.height = height;
            parent.left = sibling;
            parent.right = leaf;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent == NULL {
            self.root = new_parent;
        } else if self.nodes[old_parent].left == sibling {
            self.nodes[old_parent].left = new_parent;
        } else {
            self.nodes[old_parent].right = new_parent;
        }

        self.refit_upwards(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].left == leaf {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };

        if grand_parent == NULL {
            self.root = sibling;
            self.nodes[sibling].parent = NULL;
            self.free_node(parent);
        } else {
            if self.nodes[grand_parent].left == parent {
                self.nodes[grand_parent].left = sibling;
            } else {
                self.nodes[grand_parent].right = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_upwards(grand_parent);
        }
        self.nodes[leaf].parent = NULL;
    }

    fn refit_upwards(&mut self, mut index: usize) {
        while index != NULL {
            index = self.balance(index);
            let (left, right) = (self.nodes[index].left, self.nodes[index].right);
            let height = 1 + self.nodes[left].height.max(self.nodes[right].height);
            let aabb = self.nodes[left].aabb.merged(&self.nodes[right].aabb);
            let node = &mut self.nodes[index];
            node.height = height;
            node.aabb = aabb;
            index = node.parent;
        }
    }

    /// Performs a left or right rotation if `a` is imbalanced and returns the
    /// new root of the subtree.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let b = self.nodes[a].left;
        let c = self.nodes[a].right;
        let balance = self.nodes[c].height - self.nodes[b].height;

        if balance > 1 {
            // Rotate c up.
            let f = self.nodes[c].left;
            let g = self.nodes[c].right;
            self.nodes[c].left = a;
            self.nodes[c].parent = self.nodes[a].parent;
            self.nodes[a].parent = c;
            self.replace_child_of_parent(c, a);

            let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
                (f, g)
            } else {
                (g, f)
            };
            self.nodes[c].right = keep;
            self.nodes[a].right = give;
            self.nodes[give].parent = a;
            self.nodes[a].aabb = self.nodes[b].aabb.merged(&self.nodes[give].aabb);
            self.nodes[c].aabb = self.nodes[a].aabb.merged(&self.nodes[keep].aabb);
            self.nodes[a].height = 1 + self.nodes[b].height.max(self.nodes[give].height);
            self.nodes[c].height = 1 + self.nodes[a].height.max(self.nodes[keep].height);
            return c;
        }

        if balance < -1 {
            // Rotate b up.
            let d = self.nodes[b].left;
            let e = self.nodes[b].right;
            self.nodes[b].left = a;
            self.nodes[b].parent = self.nodes[a].parent;
            self.nodes[a].parent = b;
            self.replace_child_of_parent(b, a);

            let (keep, give) = if self.nodes[d].height > self.nodes[e].height {
                (d, e)
            } else {
                (e, d)
            };
            self.nodes[b].right = keep;
            self.nodes[a].left = give;
            self.nodes[give].parent = a;
            self.nodes[a].aabb = self.nodes[c].aabb.merged(&self.nodes[give].aabb);
            self.nodes[b].aabb = self.nodes[a].aabb.merged(&self.nodes[keep].aabb);
            self.nodes[a].height = 1 + self.nodes[c].height.max(self.nodes[give].height);
            self.nodes[b].height = 1 + self.nodes[a].height.max(self.nodes[keep].height);
            return b;
        }

        a
    }

    /// Points the parent of `new_child` (already set) at it instead of `old_child`.
    fn replace_child_of_parent(&mut self, new_child: usize, old_child: usize) {
        let parent = self.nodes[new_child].parent;
        if parent == NULL {
            self.root = new_child;
        } else if self.nodes[parent].left == old_child {
            self.nodes[parent].left = new_child;
        } else {
            self.nodes[parent].right = new_child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Small deterministic generator so the tests do not depend on `rand`.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }

        fn aabb(&mut self, extent: f32) -> Aabb {
            let center = Vec3::new(self.next(), self.next(), self.next()) * 50.0;
            let half = Vec3::new(self.next(), self.next(), self.next()) * extent;
            Aabb::from_center_half_extents(center, half)
        }
    }

    #[test]
    fn invariants_hold_under_churn() {
        let mut rng = Lcg(7);
        let mut tree = DynamicTree::new(0.1);
        let mut live = Vec::new();

        for i in 0..200u32 {
            live.push(tree.add_proxy(i, rng.aabb(2.0), true));
        }
        tree.validate().expect("valid after inserts");

        for (step, id) in live.iter().enumerate() {
            let displacement = Vec3::new(rng.next() - 0.5, 0.0, rng.next() - 0.5);
            tree.update(*id, rng.aabb(2.0), displacement);
            if step % 17 == 0 {
                tree.validate().expect("valid during updates");
            }
        }

        for id in live.drain(..100) {
            tree.remove_proxy(id);
        }
        tree.validate().expect("valid after removals");
        assert_eq!(tree.proxy_count(), 100);
        // Rotations keep the tree far from the degenerate linked list.
        assert!(tree.height() < 30, "height {}", tree.height());
    }

    #[test]
    fn small_moves_inside_margin_do_not_touch_tree() {
        let mut tree = DynamicTree::new(0.5);
        let id = tree.add_proxy(1u32, Aabb::new(Vec3::ZERO, Vec3::ONE), true);
        tree.add_proxy(2u32, Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0)), true);

        let nudged = Aabb::new(Vec3::splat(0.2), Vec3::splat(1.2));
        assert!(!tree.update(id, nudged, Vec3::ZERO));
        let moved = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(tree.update(id, moved, Vec3::X));
        let fat = tree.fat_aabb(id).expect("live proxy");
        assert!(fat.contains(&moved));
        assert!(fat.max.x >= 3.0 + 0.5 + 1.0 - 1e-6);
        tree.validate().expect("valid");
    }

    #[test]
    fn degenerate_boxes_round_trip() {
        let mut tree = DynamicTree::new(0.0);
        let point = Aabb::new(Vec3::splat(3.0), Vec3::splat(3.0));
        let flat = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 4.0));
        let a = tree.add_proxy('a', point, false);
        let b = tree.add_proxy('b', flat, true);
        tree.validate().expect("valid");

        let mut found = Vec::new();
        tree.query(&Aabb::new(Vec3::splat(2.5), Vec3::splat(3.5)), |_, p| found.push(p));
        assert_eq!(found, vec!['a']);

        assert_eq!(tree.remove_proxy(a), 'a');
        assert_eq!(tree.remove_proxy(b), 'b');
        assert_eq!(tree.height(), -1);
        tree.validate().expect("valid when empty");
    }

    #[test]
    fn pair_enumeration_reports_each_pair_once() {
        let n = 12u32;
        let mut tree = DynamicTree::new(0.1);
        for i in 0..n {
            let offset = Vec3::splat(i as f32 * 0.01);
            tree.add_proxy(i, Aabb::new(offset, offset + Vec3::ONE), true);
        }
        // A far away proxy overlaps nothing.
        tree.add_proxy(99, Aabb::new(Vec3::splat(100.0), Vec3::splat(101.0)), true);

        let mut pairs = Vec::new();
        tree.enumerate_pairs(|_, _| true, |a, b| pairs.push((a.min(b), a.max(b))));
        assert_eq!(pairs.len() as u32, n * (n - 1) / 2);
        pairs.sort_unstable();
        pairs.dedup();
        assert_eq!(pairs.len() as u32, n * (n - 1) / 2);
        assert!(pairs.iter().all(|(a, b)| a != b));

        let mut even_pairs = 0;
        tree.enumerate_pairs(|a, b| (a + b) % 2 == 0, |_, _| even_pairs += 1);
        // 6 even and 6 odd ids give 15 + 15 same-parity pairs.
        assert_eq!(even_pairs, 30);
    }

    #[test]
    fn ray_cast_finds_nearest_box() {
        let mut tree = DynamicTree::new(0.0);
        let boxes = [
            Aabb::new(Vec3::new(4.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(9.0, -1.0, -1.0), Vec3::new(11.0, 1.0, 1.0)),
            Aabb::new(Vec3::new(4.0, 5.0, -1.0), Vec3::new(6.0, 7.0, 1.0)),
        ];
        for (i, aabb) in boxes.iter().enumerate() {
            tree.add_proxy(i, *aabb, false);
        }
        let test = |i: usize| {
            boxes[i]
                .ray_entry(Vec3::ZERO, Vec3::X, f32::MAX)
                .map(|lambda| (lambda, Vec3::NEG_X))
        };

        let hit = tree
            .ray_cast(Vec3::ZERO, Vec3::X, f32::MAX, |_| true, |_| true, test)
            .expect("hits first box");
        assert_eq!(hit.proxy, 0);
        assert_relative_eq!(hit.lambda, 4.0, epsilon = 1e-5);

        let hit = tree
            .ray_cast(Vec3::ZERO, Vec3::X, f32::MAX, |p| p != 0, |_| true, test)
            .expect("pre filter skips the first box");
        assert_eq!(hit.proxy, 1);

        let hit = tree
            .ray_cast(Vec3::ZERO, Vec3::X, f32::MAX, |_| true, |h| h.proxy != 0, test)
            .expect("post filter keeps searching");
        assert_eq!(hit.proxy, 1);

        assert!(tree
            .ray_cast(Vec3::ZERO, Vec3::X, 3.0, |_| true, |_| true, test)
            .is_none());
    }

    #[test]
    fn ray_cast_on_empty_tree_misses() {
        let tree: DynamicTree<u8> = DynamicTree::new(0.1);
        assert!(tree
            .ray_cast(Vec3::ZERO, Vec3::X, f32::MAX, |_| true, |_| true, |_| Some((0.0, Vec3::X)))
            .is_none());
    }

    #[test]
    #[should_panic(expected = "not a live proxy")]
    fn removing_dead_proxy_panics() {
        let mut tree = DynamicTree::new(0.1);
        let id = tree.add_proxy(0u8, Aabb::new(Vec3::ZERO, Vec3::ONE), true);
        tree.remove_proxy(id);
        tree.remove_proxy(id);
    }
}
