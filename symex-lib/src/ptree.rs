// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The process tree: a binary tree of every fork made during
//! exploration, with live states at its leaves.
//!
//! Each edge carries a small bit set. Every random path searcher owns
//! one bit, and an edge has that bit set while the subtree below it
//! contains a state the searcher knows about, so several searchers
//! can walk the same tree.

use id_arena::{Arena, Id};
use std::ops::Index;

use crate::state::StateId;

pub type NodeId = Id<PTreeNode>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Edge {
    pub node: Option<NodeId>,
    pub tag: u8,
}

impl Edge {
    fn to(node: NodeId, tag: u8) -> Self {
        Edge { node: Some(node), tag }
    }

    pub fn is_valid_for(&self, mask: u8) -> bool {
        self.tag & mask != 0
    }
}

#[derive(Clone, Debug)]
pub struct PTreeNode {
    pub parent: Option<NodeId>,
    pub left: Edge,
    pub right: Edge,
    /// The state at this leaf, if it is a leaf
    pub state: Option<StateId>,
}

impl PTreeNode {
    fn leaf(parent: Option<NodeId>, state: StateId) -> Self {
        PTreeNode { parent, left: Edge::default(), right: Edge::default(), state: Some(state) }
    }
}

pub struct PTree {
    arena: Arena<PTreeNode>,
    pub root: Edge,
    registered: u8,
}

impl Index<NodeId> for PTree {
    type Output = PTreeNode;

    fn index(&self, i: NodeId) -> &Self::Output {
        &self.arena[i]
    }
}

impl PTree {
    pub fn new(initial: StateId) -> (Self, NodeId) {
        let mut arena = Arena::new();
        let root = arena.alloc(PTreeNode::leaf(None, initial));
        (PTree { arena, root: Edge::to(root, 0), registered: 0 }, root)
    }

    /// A fresh tag bit for a searcher walking this tree. At most
    /// eight searchers may share a tree.
    pub fn next_id(&mut self) -> u8 {
        assert!(self.registered < 8, "too many searchers share the process tree");
        let id = 1 << self.registered;
        self.registered += 1;
        id
    }

    /// The edge pointing at `node`, from its parent or the root.
    pub fn edge_to(&self, node: NodeId) -> &Edge {
        match self.arena[node].parent {
            None => &self.root,
            Some(parent) => {
                let parent = &self.arena[parent];
                if parent.left.node == Some(node) {
                    &parent.left
                } else {
                    &parent.right
                }
            }
        }
    }

    pub fn edge_to_mut(&mut self, node: NodeId) -> &mut Edge {
        match self.arena[node].parent {
            None => &mut self.root,
            Some(parent) => {
                let parent = &mut self.arena[parent];
                if parent.left.node == Some(node) {
                    &mut parent.left
                } else {
                    &mut parent.right
                }
            }
        }
    }

    /// Split the leaf `node` of the forking state `current` into two
    /// leaves. The right leaf, which keeps `current`, inherits the tag
    /// of the edge into `node`. Returns the new leaves for `forked` and
    /// `current`.
    pub fn attach(&mut self, node: NodeId, forked: StateId, current: StateId) -> (NodeId, NodeId) {
        assert!(self.arena[node].left.node.is_none() && self.arena[node].right.node.is_none());
        assert_eq!(self.arena[node].state, Some(current), "attach assumes the right state is the current state");
        let tag = self.edge_to(node).tag;
        let left = self.arena.alloc(PTreeNode::leaf(Some(node), forked));
        let right = self.arena.alloc(PTreeNode::leaf(Some(node), current));
        let n = &mut self.arena[node];
        n.state = None;
        n.left = Edge::to(left, 0);
        n.right = Edge::to(right, tag);
        (left, right)
    }

    /// Remove the leaf `node`, pruning ancestors left without children
    /// and splicing out the first ancestor left with one child.
    pub fn remove(&mut self, node: NodeId) {
        assert!(self.arena[node].left.node.is_none() && self.arena[node].right.node.is_none());
        let mut n = Some(node);
        loop {
            let current = match n {
                Some(current) => current,
                None => break,
            };
            let parent = self.arena[current].parent;
            match parent {
                None => self.root = Edge::default(),
                Some(p) => {
                    let p = &mut self.arena[p];
                    if p.left.node == Some(current) {
                        p.left = Edge::default()
                    } else {
                        p.right = Edge::default()
                    }
                }
            }
            self.arena[current].state = None;
            n = parent;
            match n {
                Some(p) if self.arena[p].left.node.is_none() && self.arena[p].right.node.is_none() => (),
                _ => break,
            }
        }

        if let Some(n) = n {
            let child = if self.arena[n].left.node.is_some() { self.arena[n].left } else { self.arena[n].right };
            let parent = self.arena[n].parent;
            if let Some(c) = child.node {
                self.arena[c].parent = parent
            }
            match parent {
                None => self.root = child,
                Some(p) => {
                    let p = &mut self.arena[p];
                    if p.left.node == Some(n) {
                        p.left = child
                    } else {
                        p.right = child
                    }
                }
            }
            let n = &mut self.arena[n];
            n.left = Edge::default();
            n.right = Edge::default();
            n.parent = None
        }
    }

    /// Live states in the tree, left to right.
    pub fn leaves(&self) -> Vec<StateId> {
        let mut leaves = Vec::new();
        let mut stack: Vec<NodeId> = self.root.node.into_iter().collect();
        while let Some(n) = stack.pop() {
            let node = &self.arena[n];
            if let Some(state) = node.state {
                leaves.push(state)
            }
            stack.extend(node.right.node);
            stack.extend(node.left.node)
        }
        leaves
    }
}
