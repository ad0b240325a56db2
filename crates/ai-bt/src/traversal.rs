//! Walks over static tree structure.
//!
//! These never look at execution state; they are used while building and analysing trees. All
//! walks use explicit stacks/queues, so arbitrarily deep trees do not recurse. The caller is
//! responsible for handing in an acyclic structure.

use std::collections::VecDeque;

/// Uniform child access over any tree-shaped structure addressed by `usize` ids.
pub trait Hierarchy {
    fn child_count(&self, node: usize) -> usize;

    fn child_at(&self, node: usize, index: usize) -> usize;
}

/// Parent before children, children left to right.
pub fn pre_order<H: Hierarchy + ?Sized>(
    tree: &H,
    root: usize,
) -> PreOrder<'_, H, fn(usize) -> bool> {
    PreOrder {
        tree,
        stack: vec![root],
        skip_children: |_| false,
    }
}

/// Pre-order walk that still yields nodes matching `skip` but does not descend into them.
pub fn pre_order_skip_children<H, F>(tree: &H, root: usize, skip: F) -> PreOrder<'_, H, F>
where
    H: Hierarchy + ?Sized,
    F: FnMut(usize) -> bool,
{
    PreOrder {
        tree,
        stack: vec![root],
        skip_children: skip,
    }
}

pub struct PreOrder<'a, H: ?Sized, F> {
    tree: &'a H,
    stack: Vec<usize>,
    skip_children: F,
}

impl<H, F> Iterator for PreOrder<'_, H, F>
where
    H: Hierarchy + ?Sized,
    F: FnMut(usize) -> bool,
{
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let node = self.stack.pop()?;
        if !(self.skip_children)(node) {
            let count = self.tree.child_count(node);
            for i in (0..count).rev() {
                self.stack.push(self.tree.child_at(node, i));
            }
        }
        Some(node)
    }
}

/// Children left to right, then the parent.
pub fn post_order<H: Hierarchy + ?Sized>(tree: &H, root: usize) -> PostOrder<'_, H> {
    PostOrder {
        tree,
        stack: vec![(root, 0)],
    }
}

pub struct PostOrder<'a, H: ?Sized> {
    tree: &'a H,
    // (node, next child to visit)
    stack: Vec<(usize, usize)>,
}

impl<H: Hierarchy + ?Sized> Iterator for PostOrder<'_, H> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            let (node, next_child) = *self.stack.last()?;
            if next_child < self.tree.child_count(node) {
                if let Some(top) = self.stack.last_mut() {
                    top.1 += 1;
                }
                self.stack.push((self.tree.child_at(node, next_child), 0));
            } else {
                self.stack.pop();
                return Some(node);
            }
        }
    }
}

/// Breadth-first, yielding `(node, level)` with the root at level 0.
pub fn level_order<H: Hierarchy + ?Sized>(tree: &H, root: usize) -> LevelOrder<'_, H> {
    let mut queue = VecDeque::new();
    queue.push_back((root, 0));
    LevelOrder { tree, queue }
}

pub struct LevelOrder<'a, H: ?Sized> {
    tree: &'a H,
    queue: VecDeque<(usize, u32)>,
}

impl<H: Hierarchy + ?Sized> Iterator for LevelOrder<'_, H> {
    type Item = (usize, u32);

    fn next(&mut self) -> Option<(usize, u32)> {
        let (node, level) = self.queue.pop_front()?;
        for i in 0..self.tree.child_count(node) {
            self.queue.push_back((self.tree.child_at(node, i), level + 1));
        }
        Some((node, level))
    }
}

/// Height of the subtree rooted at `root` (a lone node has height 0).
pub fn subtree_height<H: Hierarchy + ?Sized>(tree: &H, root: usize) -> u32 {
    level_order(tree, root).map(|(_, level)| level).max().unwrap_or(0)
}
