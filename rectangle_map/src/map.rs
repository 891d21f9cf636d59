// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The rectangle tree itself.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use core::mem;

use crate::{AddError, Rectangle};

/// Index of a node in the map's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeId(usize);

/// The root is always the first node and is never freed.
const ROOT: NodeId = NodeId(0);

enum NodeKind<T> {
    /// Two children exactly partitioning this node's rectangle.
    Branch { left: NodeId, right: NodeId },
    /// A leaf holding a caller value.
    Filled(T),
    /// An unused leaf.
    Empty,
}

struct Node<T> {
    kind: NodeKind<T>,
    rect: Rectangle,
    /// Area of the largest empty leaf in this subtree.
    largest_gap: u64,
    parent: Option<NodeId>,
}

impl<T> Node<T> {
    fn empty(rect: Rectangle, parent: Option<NodeId>) -> Self {
        Self {
            kind: NodeKind::Empty,
            rect,
            largest_gap: rect.area(),
            parent,
        }
    }

    fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Branch { left, right } => Some((left, right)),
            _ => None,
        }
    }

    fn is_empty_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Empty)
    }
}

/// Tracks used and unused sub-rectangles of a fixed-size region.
///
/// Values of type `T` identify the occupant of each filled rectangle; the map hands
/// them back from [`remove`](Self::remove).
pub struct RectangleMap<T> {
    /// Node arena. Freed slots are kept as empty leaves and recycled through `free_nodes`.
    nodes: Vec<Node<T>>,
    free_nodes: Vec<NodeId>,
    /// Number of filled leaves.
    len: usize,
    /// Sum of the areas of all empty leaves.
    space_remaining: u64,
    /// Scratch stack reused by the search to avoid reallocating on every insertion.
    stack: Vec<NodeId>,
}

impl<T> RectangleMap<T> {
    /// Creates an empty map covering `width` × `height` pixels.
    ///
    /// The size never changes; to grow, build a larger map and move the occupants.
    pub fn new(width: u32, height: u32) -> Self {
        let root = Rectangle::new(0, 0, width, height);
        Self {
            nodes: vec![Node::empty(root, None)],
            free_nodes: Vec::new(),
            len: 0,
            space_remaining: root.area(),
            stack: Vec::new(),
        }
    }

    /// Width of the whole map.
    #[inline]
    pub fn width(&self) -> u32 {
        self.node(ROOT).rect.width
    }

    /// Height of the whole map.
    #[inline]
    pub fn height(&self) -> u32 {
        self.node(ROOT).rect.height
    }

    /// Total area of the map.
    #[inline]
    pub fn area(&self) -> u64 {
        self.node(ROOT).rect.area()
    }

    /// Total area of all unused leaves.
    #[inline]
    pub fn remaining_space(&self) -> u64 {
        self.space_remaining
    }

    /// Number of rectangles currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no rectangles are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserves a `width` × `height` rectangle for `value`.
    ///
    /// Searches depth first for the first empty leaf that can hold the request, then
    /// splits it until a leaf of exactly the requested size remains. On failure the map
    /// is not modified and `value` is dropped.
    pub fn add(&mut self, width: u32, height: u32, value: T) -> Result<Rectangle, AddError> {
        if width == 0 || height == 0 {
            return Err(AddError::zero_sized(width, height));
        }
        let size = u64::from(width) * u64::from(height);

        let Some(found) = self.find_empty_leaf(width, height, size) else {
            return Err(AddError::no_space(width, height));
        };

        // Split along whichever axis leaves the largest space.
        let rect = self.node(found).rect;
        let found = if rect.width - width > rect.height - height {
            let node = self.split_horizontally(found, width);
            self.split_vertically(node, height)
        } else {
            let node = self.split_vertically(found, height);
            self.split_horizontally(node, width)
        };

        let node = self.node_mut(found);
        node.kind = NodeKind::Filled(value);
        node.largest_gap = 0;
        let rect = node.rect;
        let parent = node.parent;
        self.update_gaps(parent);

        self.len += 1;
        self.space_remaining -= size;

        Ok(rect)
    }

    /// Removes a rectangle previously returned by [`add`](Self::add) and returns its
    /// value.
    ///
    /// Neighbouring empty leaves are merged back together on the way up the tree.
    ///
    /// # Panics
    ///
    /// If `rectangle` does not exactly match a stored rectangle. This always indicates
    /// broken bookkeeping in the caller.
    pub fn remove(&mut self, rectangle: &Rectangle) -> T {
        // Binary chop down the tree. The rectangle is in the left child if and only if
        // its origin lies inside the left child's rectangle.
        let mut id = ROOT;
        while let Some((left, right)) = self.node(id).children() {
            let left_rect = self.node(left).rect;
            id = if rectangle.x < left_rect.right() && rectangle.y < left_rect.bottom() {
                left
            } else {
                right
            };
        }

        let node = self.node_mut(id);
        let value = match mem::replace(&mut node.kind, NodeKind::Empty) {
            NodeKind::Filled(value) if node.rect == *rectangle => value,
            other => {
                node.kind = other;
                panic!("rectangle {rectangle:?} is not stored in the map");
            }
        };
        let size = node.rect.area();
        node.largest_gap = size;

        // Collapse branches whose children are both empty leaves.
        let mut parent = node.parent;
        while let Some(id) = parent {
            let Some((left, right)) = self.node(id).children() else {
                unreachable!("parent nodes are always branches");
            };
            if !(self.node(left).is_empty_leaf() && self.node(right).is_empty_leaf()) {
                break;
            }
            self.free_node(left);
            self.free_node(right);
            let node = self.node_mut(id);
            node.kind = NodeKind::Empty;
            node.largest_gap = node.rect.area();
            parent = node.parent;
        }
        self.update_gaps(parent);

        debug_assert!(self.len > 0, "removed a rectangle from an empty map");
        self.len -= 1;
        self.space_remaining += size;

        value
    }

    /// Iterates over all stored rectangles and their values, in tree order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            leaves: self.leaves(),
        }
    }

    /// Iterates over every leaf of the tree, filled or empty.
    ///
    /// The leaves always tile the whole map.
    pub fn leaves(&self) -> Leaves<'_, T> {
        Leaves {
            map: self,
            stack: vec![ROOT],
        }
    }

    /// Walks the whole tree and checks the structural invariants.
    ///
    /// This is slow and intended for tests and debugging.
    ///
    /// # Panics
    ///
    /// If any child does not exactly partition its parent, a cached largest gap is
    /// stale, or the cached occupant count or free space disagrees with the tree.
    pub fn check_invariants(&self) {
        let mut filled = 0;
        let mut free = 0;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match node.kind {
                NodeKind::Branch { left, right } => {
                    let (l, r) = (self.node(left).rect, self.node(right).rect);
                    let parent = node.rect;
                    let vertical_split = l.x == r.x
                        && l.width == parent.width
                        && r.width == parent.width
                        && r.y == l.bottom()
                        && l.height + r.height == parent.height;
                    let horizontal_split = l.y == r.y
                        && l.height == parent.height
                        && r.height == parent.height
                        && r.x == l.right()
                        && l.width + r.width == parent.width;
                    assert!(
                        l.x == parent.x && l.y == parent.y && (vertical_split || horizontal_split),
                        "children {l:?} and {r:?} do not partition {parent:?}"
                    );
                    assert_eq!(
                        node.largest_gap,
                        self.node(left).largest_gap.max(self.node(right).largest_gap),
                        "stale largest gap for {parent:?}"
                    );
                    assert_eq!(self.node(left).parent, Some(id), "broken parent link");
                    assert_eq!(self.node(right).parent, Some(id), "broken parent link");
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Filled(_) => {
                    assert_eq!(node.largest_gap, 0, "filled leaf with a gap");
                    filled += 1;
                }
                NodeKind::Empty => {
                    assert_eq!(
                        node.largest_gap,
                        node.rect.area(),
                        "empty leaf gap mismatch"
                    );
                    free += node.rect.area();
                }
            }
        }
        assert_eq!(filled, self.len, "occupant count mismatch");
        assert_eq!(free, self.space_remaining, "free space mismatch");
    }

    fn find_empty_leaf(&mut self, width: u32, height: u32, size: u64) -> Option<NodeId> {
        let mut stack = mem::take(&mut self.stack);
        stack.clear();
        stack.push(ROOT);

        let mut found = None;
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            // No point descending if the rectangle cannot fit in this subtree.
            if node.rect.width < width || node.rect.height < height || node.largest_gap < size {
                continue;
            }
            match node.kind {
                NodeKind::Empty => {
                    found = Some(id);
                    break;
                }
                NodeKind::Branch { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Filled(_) => {}
            }
        }

        self.stack = stack;
        found
    }

    /// Splits `id` into a left part of `left_width` and the remainder, returning the
    /// left part. Does nothing if the node is already the right width.
    fn split_horizontally(&mut self, id: NodeId, left_width: u32) -> NodeId {
        let rect = self.node(id).rect;
        if rect.width == left_width {
            return id;
        }
        let left = self.alloc_node(Node::empty(
            Rectangle::new(rect.x, rect.y, left_width, rect.height),
            Some(id),
        ));
        let right = self.alloc_node(Node::empty(
            Rectangle::new(rect.x + left_width, rect.y, rect.width - left_width, rect.height),
            Some(id),
        ));
        self.node_mut(id).kind = NodeKind::Branch { left, right };
        left
    }

    /// Splits `id` into a top part of `top_height` and the remainder, returning the
    /// top part. Does nothing if the node is already the right height.
    fn split_vertically(&mut self, id: NodeId, top_height: u32) -> NodeId {
        let rect = self.node(id).rect;
        if rect.height == top_height {
            return id;
        }
        let top = self.alloc_node(Node::empty(
            Rectangle::new(rect.x, rect.y, rect.width, top_height),
            Some(id),
        ));
        let bottom = self.alloc_node(Node::empty(
            Rectangle::new(rect.x, rect.y + top_height, rect.width, rect.height - top_height),
            Some(id),
        ));
        self.node_mut(id).kind = NodeKind::Branch {
            left: top,
            right: bottom,
        };
        top
    }

    /// Recomputes the cached largest gap of every branch from `id` up to the root.
    fn update_gaps(&mut self, mut id: Option<NodeId>) {
        while let Some(current) = id {
            let Some((left, right)) = self.node(current).children() else {
                unreachable!("parent nodes are always branches");
            };
            let gap = self
                .node(left)
                .largest_gap
                .max(self.node(right).largest_gap);
            let node = self.node_mut(current);
            node.largest_gap = gap;
            id = node.parent;
        }
    }

    fn alloc_node(&mut self, node: Node<T>) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id.0] = node;
            id
        } else {
            self.nodes.push(node);
            NodeId(self.nodes.len() - 1)
        }
    }

    fn free_node(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.kind = NodeKind::Empty;
        node.parent = None;
        self.free_nodes.push(id);
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id.0]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id.0]
    }
}

impl<T> Debug for RectangleMap<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RectangleMap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("len", &self.len)
            .field("space_remaining", &self.space_remaining)
            .finish_non_exhaustive()
    }
}

/// A leaf of a [`RectangleMap`], as yielded by [`RectangleMap::leaves`].
#[derive(Debug)]
pub struct Leaf<'a, T> {
    /// The area covered by the leaf.
    pub rect: Rectangle,
    /// The occupant, or `None` for unused space.
    pub value: Option<&'a T>,
}

/// Iterator over all leaves of a [`RectangleMap`].
pub struct Leaves<'a, T> {
    map: &'a RectangleMap<T>,
    stack: Vec<NodeId>,
}

impl<'a, T> Iterator for Leaves<'a, T> {
    type Item = Leaf<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let node = self.map.node(id);
            match &node.kind {
                NodeKind::Branch { left, right } => {
                    self.stack.push(*right);
                    self.stack.push(*left);
                }
                NodeKind::Filled(value) => {
                    return Some(Leaf {
                        rect: node.rect,
                        value: Some(value),
                    });
                }
                NodeKind::Empty => {
                    return Some(Leaf {
                        rect: node.rect,
                        value: None,
                    });
                }
            }
        }
        None
    }
}

impl<T> Debug for Leaves<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Leaves")
            .field("pending", &self.stack.len())
            .finish_non_exhaustive()
    }
}

/// Iterator over the stored rectangles of a [`RectangleMap`].
pub struct Iter<'a, T> {
    leaves: Leaves<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Rectangle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.leaves
            .by_ref()
            .find_map(|leaf| leaf.value.map(|value| (leaf.rect, value)))
    }
}

impl<T> Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Iter").finish_non_exhaustive()
    }
}

impl<'a, T> IntoIterator for &'a RectangleMap<T> {
    type Item = (Rectangle, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
