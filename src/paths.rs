// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Key-node path counting.
//!
//! For every node `u` we compute
//! `count(u) = [u is a key node] + sum(count(v) for v in adjacency(u))`
//! over the forward (successor) adjacency. The recursion is unrolled
//! into an explicit stack so that deep netlists cannot overflow the
//! call stack. A successor that is still on the active stack
//! contributes 0, which is what breaks cycles.
//!
//! Note the direction: the recurrence walks successors even though the
//! quantity is usually described as "paths reaching `u` from a key
//! node". This is the quantity the downstream classifier was trained
//! on, so we keep it as is.

use crate::dotgraph::{Graph, KeyNodeSet};

struct Frame {
    node: usize,
    next_child: usize,
    count: u64,
}

/// Compute the path count of every node.
///
/// Nodes are started in sequence order and each count is memoized
/// after its first full computation, so the result is deterministic
/// even where cycle truncation makes it order-dependent.
/// Counts saturate at `u64::MAX`.
pub fn count_paths(adjacency: &[Vec<usize>], key_nodes: &KeyNodeSet) -> Vec<u64> {
    let n = adjacency.len();
    let mut memo: Vec<Option<u64>> = vec![None; n];
    let mut visiting = vec![false; n];
    let mut stack: Vec<Frame> = Vec::new();

    let enter = |node: usize, visiting: &mut Vec<bool>| {
        visiting[node] = true;
        Frame {
            node, next_child: 0,
            count: key_nodes.contains(node) as u64,
        }
    };

    for start in 0..n {
        if memo[start].is_some() {
            continue
        }
        stack.push(enter(start, &mut visiting));
        while let Some(mut top) = stack.pop() {
            if let Some(&v) = adjacency[top.node].get(top.next_child) {
                top.next_child += 1;
                match memo[v] {
                    Some(c) => {
                        top.count = top.count.saturating_add(c);
                        stack.push(top);
                    }
                    None if !visiting[v] => {
                        stack.push(top);
                        stack.push(enter(v, &mut visiting));
                    }
                    // a successor on the active stack contributes 0.
                    None => stack.push(top),
                }
                continue
            }
            visiting[top.node] = false;
            memo[top.node] = Some(top.count);
            if let Some(parent) = stack.last_mut() {
                parent.count = parent.count.saturating_add(top.count);
            }
        }
    }

    memo.into_iter().map(|c| c.unwrap_or(0)).collect()
}

/// Path counts for a loaded graph.
pub fn graph_path_counts(graph: &Graph) -> Vec<u64> {
    let timer = clilog::stimer!("path counting");
    let counts = count_paths(&graph.adjacency, &graph.key_nodes);
    clilog::finish!(timer);
    clilog::debug!("path counts computed for {} nodes from {} key nodes",
                   counts.len(), graph.key_nodes.len());
    counts
}
