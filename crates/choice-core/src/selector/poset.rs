//! Stack-free partial order over a set of selectors
//!
//! An edge `a -> b` means `b` extends `a` with extra outer items, so `b` is
//! the more specific selector wherever both match. Transitive edges are
//! removed, leaving only direct refinements.

use std::{cmp::Ordering, fmt};

use indexmap::{IndexMap, IndexSet};

use super::Selector;

#[derive(Debug, Clone, Default)]
pub struct SelectorPoset {
    /// Distinct selector labels, in first-seen order
    nodes: IndexSet<String>,
    /// Adjacency by node index
    edges: IndexMap<usize, Vec<usize>>,
}

impl SelectorPoset {
    pub fn build(selectors: &[Selector]) -> Self {
        let mut nodes = IndexSet::new();
        let mut representatives: Vec<&Selector> = Vec::new();
        for selector in selectors {
            if nodes.insert(selector.to_string()) {
                representatives.push(selector);
            }
        }

        let mut edges: IndexMap<usize, Vec<usize>> = IndexMap::new();
        for (i, a) in representatives.iter().enumerate() {
            for (j, b) in representatives.iter().enumerate() {
                if i != j && a.generic_compare(b) == Some(Ordering::Less) {
                    edges.entry(i).or_default().push(j);
                }
            }
        }

        let mut poset = Self { nodes, edges };
        poset.reduce();
        poset
    }

    /// Drop every edge implied by a longer path
    fn reduce(&mut self) {
        let count = self.nodes.len();
        let reach: Vec<Vec<bool>> = (0..count).map(|n| self.reachable(n)).collect();

        for targets in self.edges.values_mut() {
            let direct = targets.clone();
            targets.retain(|&to| !direct.iter().any(|&via| via != to && reach[via][to]));
        }
        self.edges.retain(|_, targets| !targets.is_empty());
    }

    fn reachable(&self, start: usize) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut pending = self.successors(start).to_vec();
        while let Some(node) = pending.pop() {
            if !seen[node] {
                seen[node] = true;
                pending.extend_from_slice(self.successors(node));
            }
        }
        seen
    }

    fn successors(&self, node: usize) -> &[usize] {
        self.edges.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Direct refinement edges as label pairs
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = Vec::new();
        for (&from, targets) in &self.edges {
            for &to in targets {
                edges.push((self.nodes[from].as_str(), self.nodes[to].as_str()));
            }
        }
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Selectors nothing else generalizes
    pub fn roots(&self) -> Vec<&str> {
        (0..self.nodes.len())
            .filter(|node| !self.edges.values().any(|targets| targets.contains(node)))
            .map(|node| self.nodes[node].as_str())
            .collect()
    }

    /// Indented tree, one selector per line, refinements nested under their base
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn render_node(&self, f: &mut fmt::Formatter<'_>, node: usize, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.nodes[node], indent = depth * 2)?;
        for &child in self.successors(node) {
            self.render_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectorPoset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in self.roots() {
            if let Some(node) = self.nodes.get_index_of(root) {
                self.render_node(f, node, 0)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{selector::SelectorItem, stack::CallableRef};

    fn sel(items: &[&CallableRef]) -> Selector {
        Selector::new(items.iter().map(|c| SelectorItem::callable(c)).collect())
    }

    #[test]
    fn test_transitive_reduction() {
        let foo = CallableRef::new("foo");
        let bar = CallableRef::new("bar");
        let baz = CallableRef::new("baz");
        let selectors = vec![
            sel(&[&foo]),
            sel(&[&bar, &foo]),
            sel(&[&baz, &bar, &foo]),
            sel(&[&baz, &foo]),
        ];

        let poset = SelectorPoset::build(&selectors);
        assert_eq!(poset.node_count(), 4);
        assert_eq!(poset.edge_count(), 3);
        assert!(poset.edges().contains(&("bar > foo", "baz > bar > foo")));
        assert!(!poset.edges().contains(&("foo", "baz > bar > foo")));
        assert_eq!(poset.roots(), vec!["foo"]);
    }

    #[test]
    fn test_duplicate_selectors_collapse() {
        let foo = CallableRef::new("foo");
        let poset = SelectorPoset::build(&[sel(&[&foo]), sel(&[&foo])]);
        assert_eq!(poset.node_count(), 1);
        assert_eq!(poset.edge_count(), 0);
    }

    #[test]
    fn test_render_nests_refinements() {
        let foo = CallableRef::new("foo");
        let bar = CallableRef::new("bar");
        let other = CallableRef::new("other");
        let poset = SelectorPoset::build(&[sel(&[&foo]), sel(&[&bar, &foo]), sel(&[&other])]);
        assert_eq!(poset.render(), "foo\n  bar > foo\nother\n");
    }
}
