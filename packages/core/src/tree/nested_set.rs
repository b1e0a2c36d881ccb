//! Nested-Set Index
//!
//! Derives `left_bound` / `right_bound` for every subject from the structural
//! data (`parent_id`, `sort`). A depth-first walk in sibling order hands out
//! a counter value on enter (left) and on exit (right), so that:
//!
//! - `right = left + 2 * subtree_size - 1`
//! - every descendant D of N satisfies `N.left < D.left < D.right < N.right`
//! - sibling ranges never overlap
//!
//! Descendant and ancestor reads are then plain range comparisons.
//!
//! # Failure Model
//!
//! Bounds are computed completely in memory before anything is written. A
//! subject that cannot be reached from a root is either part of a `parent_id`
//! cycle (`CycleDetected`) or hangs below a missing parent (`NotFound`); in
//! both cases `repair` returns the error without writing a single bound.

use crate::db::{NodeBounds, SubjectStore, TreeLink};
use crate::tree::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Outcome of a repair pass
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairStats {
    /// Subjects that received bounds in this pass
    pub visited: usize,

    /// Subjects whose stored bounds actually changed
    pub rewritten: usize,

    /// Whether the whole forest was renumbered
    pub full_forest: bool,
}

type ChildIndex<'a> = HashMap<Option<&'a str>, Vec<&'a TreeLink>>;

enum Step<'a> {
    Enter(&'a TreeLink),
    Exit(usize),
}

pub struct NestedSetIndex;

impl NestedSetIndex {
    /// Compute bounds for the whole forest, numbering from 1
    pub fn compute_forest(links: &[TreeLink]) -> Result<Vec<NodeBounds>, TreeError> {
        let children = Self::child_index(links);
        let roots = children.get(&None).cloned().unwrap_or_default();

        let bounds = Self::number(&roots, &children, 1);
        if bounds.len() < links.len() {
            let visited: HashSet<&str> = bounds.iter().map(|b| b.id.as_str()).collect();
            return Err(Self::diagnose_unreachable(links, &visited));
        }
        Ok(bounds)
    }

    /// Compute bounds for the subtree rooted at `root_id`, starting at `first_bound`
    pub fn compute_subtree(
        links: &[TreeLink],
        root_id: &str,
        first_bound: i64,
    ) -> Result<Vec<NodeBounds>, TreeError> {
        let by_id: HashMap<&str, &TreeLink> = links.iter().map(|l| (l.id.as_str(), l)).collect();
        let root = by_id
            .get(root_id)
            .copied()
            .ok_or_else(|| TreeError::not_found(root_id))?;

        Self::check_ancestry(root, &by_id)?;

        let children = Self::child_index(links);
        Ok(Self::number(&[root], &children, first_bound))
    }

    /// Recompute and persist bounds
    ///
    /// `scope = None` renumbers the whole forest. `scope = Some(id)` renumbers
    /// the subtree of `id` in place when the subtree still holds exactly the
    /// subjects inside its current bound window; otherwise it falls back to
    /// the whole forest. Idempotent for unchanged `parent_id` / `sort` data.
    pub async fn repair(
        store: &dyn SubjectStore,
        scope: Option<&str>,
    ) -> Result<RepairStats, TreeError> {
        let links = store.forest_links().await?;

        let (bounds, full_forest) = match scope {
            None => (Self::compute_forest(&links)?, true),
            Some(scope_id) => match Self::scoped_bounds(&links, scope_id)? {
                Some(bounds) => (bounds, false),
                None => (Self::compute_forest(&links)?, true),
            },
        };

        let current: HashMap<&str, (i64, i64)> = links
            .iter()
            .map(|l| (l.id.as_str(), (l.left_bound, l.right_bound)))
            .collect();
        let changed: Vec<NodeBounds> = bounds
            .iter()
            .filter(|b| current.get(b.id.as_str()) != Some(&(b.left_bound, b.right_bound)))
            .cloned()
            .collect();

        if !changed.is_empty() {
            store.write_bounds(&changed).await?;
        }

        tracing::debug!(
            "Nested-set repair ({}): {} visited, {} rewritten",
            if full_forest { "forest" } else { "subtree" },
            bounds.len(),
            changed.len()
        );

        Ok(RepairStats {
            visited: bounds.len(),
            rewritten: changed.len(),
            full_forest,
        })
    }

    /// True when the stored bounds equal a fresh computation
    pub fn is_consistent(links: &[TreeLink]) -> bool {
        match Self::compute_forest(links) {
            Ok(bounds) => {
                let current: HashMap<&str, (i64, i64)> = links
                    .iter()
                    .map(|l| (l.id.as_str(), (l.left_bound, l.right_bound)))
                    .collect();
                bounds
                    .iter()
                    .all(|b| current.get(b.id.as_str()) == Some(&(b.left_bound, b.right_bound)))
            }
            Err(_) => false,
        }
    }

    /// In-place subtree numbering, or `None` when the forest must be renumbered
    fn scoped_bounds(
        links: &[TreeLink],
        scope_id: &str,
    ) -> Result<Option<Vec<NodeBounds>>, TreeError> {
        let scope = links
            .iter()
            .find(|l| l.id == scope_id)
            .ok_or_else(|| TreeError::not_found(scope_id))?;

        if scope.left_bound <= 0 || scope.right_bound <= scope.left_bound {
            return Ok(None);
        }

        let bounds = Self::compute_subtree(links, scope_id, scope.left_bound)?;
        if bounds.first().map(|b| b.right_bound) != Some(scope.right_bound) {
            return Ok(None);
        }

        // Same size is not enough: the window must hold the same members
        let members: HashSet<&str> = bounds.iter().map(|b| b.id.as_str()).collect();
        let window: HashSet<&str> = links
            .iter()
            .filter(|l| l.left_bound >= scope.left_bound && l.right_bound <= scope.right_bound)
            .map(|l| l.id.as_str())
            .collect();
        if members != window {
            return Ok(None);
        }

        Ok(Some(bounds))
    }

    /// Children per parent, ordered by `sort` then id
    fn child_index(links: &[TreeLink]) -> ChildIndex<'_> {
        let mut children: ChildIndex<'_> = HashMap::new();
        for link in links {
            children
                .entry(link.parent_id.as_deref())
                .or_default()
                .push(link);
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));
        }
        children
    }

    /// Iterative depth-first numbering over an explicit stack
    fn number(starts: &[&TreeLink], children: &ChildIndex<'_>, first: i64) -> Vec<NodeBounds> {
        let mut counter = first;
        let mut bounds: Vec<NodeBounds> = Vec::new();
        let mut stack: Vec<Step<'_>> = starts.iter().rev().map(|l| Step::Enter(*l)).collect();

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(link) => {
                    let slot = bounds.len();
                    bounds.push(NodeBounds {
                        id: link.id.clone(),
                        left_bound: counter,
                        right_bound: 0,
                    });
                    counter += 1;
                    stack.push(Step::Exit(slot));
                    if let Some(kids) = children.get(&Some(link.id.as_str())) {
                        stack.extend(kids.iter().rev().map(|k| Step::Enter(*k)));
                    }
                }
                Step::Exit(slot) => {
                    bounds[slot].right_bound = counter;
                    counter += 1;
                }
            }
        }

        bounds
    }

    /// Walk up from `start`; fail on a loop or a dangling parent
    fn check_ancestry(
        start: &TreeLink,
        by_id: &HashMap<&str, &TreeLink>,
    ) -> Result<(), TreeError> {
        let mut path: Vec<&str> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = position.get(current.id.as_str()) {
                return Err(TreeError::cycle(
                    path[at..].iter().map(|id| id.to_string()).collect(),
                ));
            }
            position.insert(current.id.as_str(), path.len());
            path.push(current.id.as_str());

            match current.parent_id.as_deref() {
                None => return Ok(()),
                Some(parent_id) => match by_id.get(parent_id) {
                    Some(parent) => current = parent,
                    None => return Err(TreeError::not_found(parent_id)),
                },
            }
        }
    }

    /// Explain why some subjects were not reached from any root
    fn diagnose_unreachable(links: &[TreeLink], visited: &HashSet<&str>) -> TreeError {
        let by_id: HashMap<&str, &TreeLink> = links.iter().map(|l| (l.id.as_str(), l)).collect();

        let mut unreached: Vec<&TreeLink> = links
            .iter()
            .filter(|l| !visited.contains(l.id.as_str()))
            .collect();
        unreached.sort_by(|a, b| a.id.cmp(&b.id));

        for link in unreached {
            if let Err(err) = Self::check_ancestry(link, &by_id) {
                tracing::warn!("Nested-set repair aborted: {}", err);
                return err;
            }
        }

        // Every unreached subject must fail the ancestry check above
        TreeError::cycle(Vec::new())
    }
}
