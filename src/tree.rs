//! Rebuilds the reply forest of one message from its flat comment rows.
//!
//! Rows are treated as an arena indexed by id; the nesting is a transient index
//! built per read. Ordering at every level is the order of the input slice,
//! which the stores guarantee to be insertion order.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{Comment, CommentNode, Id};

/// Assembled thread of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentForest {
    pub comments: Vec<CommentNode>,
    /// Every input row counts once, whatever its depth.
    pub comment_count: usize,
}

/// Build the nested forest for `comments`, which must all share one `message_id`
/// and be in insertion order.
///
/// A row whose parent is absent from the input (or is the row itself) is promoted
/// to top level at its own position. Rows reachable only through a parent cycle
/// are promoted the same way, cutting the cycle at its earliest member.
pub fn assemble(comments: Vec<Comment>) -> CommentForest {
    let comment_count = comments.len();

    let mut slot_of: HashMap<Id, usize> = HashMap::with_capacity(comment_count);
    for (slot, c) in comments.iter().enumerate() {
        slot_of.entry(c.id).or_insert(slot);
    }

    let mut parent: Vec<Option<usize>> = vec![None; comment_count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comment_count];
    let mut roots: Vec<usize> = Vec::new();

    for (slot, c) in comments.iter().enumerate() {
        match c.parent_id.and_then(|p| slot_of.get(&p).copied()) {
            Some(p) if p != slot => {
                parent[slot] = Some(p);
                children[p].push(slot);
            }
            _ => {
                if c.parent_id.is_some() {
                    warn!(comment_id = %c.id, message_id = %c.message_id, "orphan comment promoted to top level");
                }
                roots.push(slot);
            }
        }
    }

    // Pre-order walk; anything left unvisited hangs off a cycle.
    let mut preorder = walk(&roots, &children, comment_count);
    if preorder.len() < comment_count {
        let mut visited = vec![false; comment_count];
        for &s in &preorder {
            visited[s] = true;
        }
        let mut on_path = vec![usize::MAX; comment_count];
        for slot in 0..comment_count {
            if visited[slot] {
                continue;
            }
            // Follow parents until a slot repeats; that slot lies on the cycle.
            let mut path = Vec::new();
            let mut cur = slot;
            while on_path[cur] != slot {
                on_path[cur] = slot;
                path.push(cur);
                match parent[cur] {
                    Some(p) => cur = p,
                    None => break,
                }
            }
            let start = path.iter().position(|&s| s == cur).unwrap_or(0);
            let head = path[start..].iter().copied().min().unwrap_or(slot);
            warn!(comment_id = %comments[head].id, "comment cycle broken, promoting to top level");
            if let Some(p) = parent[head].take() {
                children[p].retain(|&c| c != head);
            }
            roots.push(head);
            for s in walk(&[head], &children, comment_count) {
                visited[s] = true;
            }
        }
        roots.sort_unstable();
        preorder = walk(&roots, &children, comment_count);
    }

    // Reverse pre-order visits every child before its parent, so each node can
    // take ownership of already built replies without recursion.
    let mut rows: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = vec![None; comment_count];
    for &slot in preorder.iter().rev() {
        let replies = children[slot].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(row) = rows[slot].take() {
            built[slot] = Some(CommentNode::new(row, replies));
        }
    }

    let comments = roots.iter().filter_map(|&r| built[r].take()).collect();
    CommentForest { comments, comment_count }
}

fn walk(roots: &[usize], children: &[Vec<usize>], capacity: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(capacity);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(slot) = stack.pop() {
        order.push(slot);
        stack.extend(children[slot].iter().rev().copied());
    }
    order
}
