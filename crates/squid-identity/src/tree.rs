//! Materialized identity tree

use serde::Serialize;
use squid_core::{Identity, IdentityId};
use std::collections::HashMap;

/// One identity together with its materialized descendants, children in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityTree {
    /// Node at this position
    pub identity: Identity,
    /// Subtrees of its children
    pub children: Vec<IdentityTree>,
    /// Descendants that no listed child reaches. Only set on the assembled root.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detached: Vec<Identity>,
}

impl IdentityTree {
    /// Assemble the subtree rooted at `root` from a flat list of identities.
    ///
    /// Children listed by a node but missing from `identities` are skipped.
    pub fn assemble(root: Identity, identities: Vec<Identity>) -> Self {
        let mut by_id: HashMap<IdentityId, Identity> =
            identities.into_iter().map(|i| (i.did.clone(), i)).collect();
        by_id.remove(&root.did);
        let anchor = root.did.clone();
        let mut tree = Self::build(root, &mut by_id);
        tree.detached = by_id
            .into_values()
            .filter(|i| i.descends_from(&anchor))
            .collect();
        tree.detached.sort_by(|a, b| a.did.cmp(&b.did));
        tree
    }

    fn build(identity: Identity, pool: &mut HashMap<IdentityId, Identity>) -> Self {
        let children = identity
            .children
            .iter()
            .filter_map(|child_id| pool.remove(child_id))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|child| Self::build(child, pool))
            .collect();
        Self {
            identity,
            children,
            detached: Vec::new(),
        }
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(IdentityTree::len).sum::<usize>()
    }

    /// A tree always has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Pre-order traversal.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(&node.identity)
        })
    }

    /// Find a node by id.
    pub fn find(&self, id: &IdentityId) -> Option<&IdentityTree> {
        if &self.identity.did == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Greatest depth of any node.
    pub fn max_depth(&self) -> u8 {
        self.iter().map(|i| i.depth).max().unwrap_or(0)
    }

    /// Human-readable descriptions of every broken structural invariant.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let root_id = &self.identity.root_id;
        let max_depth = self.identity.creation_rules.max_depth;
        self.collect_violations(root_id, max_depth, &mut violations);
        for orphan in &self.detached {
            let parent = orphan
                .parent_id
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string);
            violations.push(format!(
                "{} names parent {parent} which does not list it",
                orphan.did
            ));
        }
        violations
    }

    fn collect_violations(&self, root_id: &IdentityId, max_depth: u8, out: &mut Vec<String>) {
        let parent = &self.identity;
        if &parent.root_id != root_id {
            out.push(format!(
                "{} has root {} not {root_id}",
                parent.did, parent.root_id
            ));
        }
        if parent.depth > max_depth {
            out.push(format!(
                "{} depth {} > max {max_depth}",
                parent.did, parent.depth
            ));
        }
        for child in &self.children {
            let c = &child.identity;
            if c.depth != parent.depth + 1 {
                out.push(format!(
                    "{} depth {} under parent depth {}",
                    c.did, c.depth, parent.depth
                ));
            }
            if !parent
                .creation_rules
                .allowed_child_types
                .contains(&c.identity_type)
            {
                out.push(format!(
                    "{} type {} not allowed under {}",
                    c.did, c.identity_type, parent.identity_type
                ));
            }
            if c.parent_id.as_ref() != Some(&parent.did) {
                out.push(format!("{} parent pointer mismatch", c.did));
            }
            child.collect_violations(root_id, max_depth, out);
        }
    }
}
