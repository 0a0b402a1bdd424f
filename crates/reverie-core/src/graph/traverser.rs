//! Graph traversal
//!
//! BFS over the undirected projection of the link graph, plus directed
//! chain-following for BUILDS_ON reasoning. Both take lookup closures so the
//! traversal stays independent of the storage layer.

use std::collections::HashSet;

use super::{LinkKind, MemoryLink};

/// A memory reached by traversal, with the edge that reached it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedMemory {
    pub memory_id: String,
    pub content: String,
    pub kind: LinkKind,
    pub similarity: Option<f32>,
    /// Hops from the source (1 = directly linked)
    pub depth: usize,
}

/// Collect all memories linked to a source, up to `max_depth` hops.
///
/// The graph is treated as undirected; `link_kinds` (when given) filters
/// which edge kinds may be followed.
pub fn get_linked_memories(
    source_id: &str,
    get_links: impl Fn(&str) -> Vec<MemoryLink>,
    get_memory: impl Fn(&str) -> Option<(String, String)>,
    max_depth: usize,
    link_kinds: Option<&HashSet<LinkKind>>,
) -> Vec<LinkedMemory> {
    let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);
    let mut results: Vec<LinkedMemory> = Vec::new();
    let mut current_ids: Vec<String> = vec![source_id.to_string()];

    for depth in 1..=max_depth {
        let mut next_ids: Vec<String> = Vec::new();

        for memory_id in &current_ids {
            for link in get_links(memory_id) {
                let other = link.other_end(memory_id).to_string();

                if visited.contains(&other) {
                    continue;
                }
                if let Some(kinds) = link_kinds {
                    if !kinds.contains(&link.kind) {
                        continue;
                    }
                }
                let Some((_, content)) = get_memory(&other) else {
                    continue;
                };

                results.push(LinkedMemory {
                    memory_id: other.clone(),
                    content,
                    kind: link.kind,
                    similarity: link.similarity,
                    depth,
                });
                visited.insert(other.clone());
                next_ids.push(other);
            }
        }

        current_ids = next_ids;
        if current_ids.is_empty() {
            break;
        }
    }

    results
}

/// Follow outgoing edges of one kind to trace a memory's evolution.
///
/// Returns (id, content) pairs in chain order, starting from the source.
/// Cycles terminate the walk; `max_length` bounds it.
pub fn get_memory_chain(
    source_id: &str,
    get_links: impl Fn(&str) -> Vec<MemoryLink>,
    get_memory: impl Fn(&str) -> Option<(String, String)>,
    link_kind: LinkKind,
    max_length: usize,
) -> Vec<(String, String)> {
    let mut chain: Vec<(String, String)> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut current_id = source_id.to_string();

    while chain.len() < max_length {
        if !visited.insert(current_id.clone()) {
            break;
        }

        let Some(memory) = get_memory(&current_id) else {
            break;
        };
        chain.push(memory);

        let next = get_links(&current_id)
            .into_iter()
            .find(|link| link.kind == link_kind && link.source_id == current_id)
            .map(|link| link.target_id);

        match next {
            Some(next_id) => current_id = next_id,
            None => break,
        }
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn link(source: &str, target: &str, kind: LinkKind) -> MemoryLink {
        MemoryLink::new(source, target, kind, Some(0.7))
    }

    fn graph_lookups(
        links: Vec<MemoryLink>,
    ) -> (
        impl Fn(&str) -> Vec<MemoryLink>,
        impl Fn(&str) -> Option<(String, String)>,
    ) {
        let mut by_id: HashMap<String, Vec<MemoryLink>> = HashMap::new();
        let mut ids: HashSet<String> = HashSet::new();
        for l in links {
            ids.insert(l.source_id.clone());
            ids.insert(l.target_id.clone());
            by_id.entry(l.source_id.clone()).or_default().push(l.clone());
            by_id.entry(l.target_id.clone()).or_default().push(l);
        }
        let get_links = move |id: &str| by_id.get(id).cloned().unwrap_or_default();
        let get_memory =
            move |id: &str| ids.contains(id).then(|| (id.to_string(), format!("content {id}")));
        (get_links, get_memory)
    }

    #[test]
    fn test_linked_memories_direct() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("a", "b", LinkKind::RelatesTo),
            link("a", "c", LinkKind::BuildsOn),
        ]);
        let result = get_linked_memories("a", get_links, get_memory, 1, None);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|m| m.depth == 1));
    }

    #[test]
    fn test_linked_memories_depth_two() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("a", "b", LinkKind::RelatesTo),
            link("b", "c", LinkKind::RelatesTo),
        ]);
        let result = get_linked_memories("a", get_links, get_memory, 2, None);
        assert_eq!(result.len(), 2);
        let c = result.iter().find(|m| m.memory_id == "c").unwrap();
        assert_eq!(c.depth, 2);
    }

    #[test]
    fn test_linked_memories_is_bidirectional() {
        let (get_links, get_memory) = graph_lookups(vec![link("a", "b", LinkKind::RelatesTo)]);
        let result = get_linked_memories("b", get_links, get_memory, 1, None);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].memory_id, "a");
    }

    #[test]
    fn test_linked_memories_kind_filter() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("a", "b", LinkKind::RelatesTo),
            link("a", "c", LinkKind::BuildsOn),
        ]);
        let kinds: HashSet<LinkKind> = [LinkKind::BuildsOn].into();
        let result = get_linked_memories("a", get_links, get_memory, 1, Some(&kinds));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].memory_id, "c");
    }

    #[test]
    fn test_chain_follows_direction() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("c", "b", LinkKind::BuildsOn),
            link("b", "a", LinkKind::BuildsOn),
        ]);
        let chain = get_memory_chain("c", get_links, get_memory, LinkKind::BuildsOn, 10);
        let ids: Vec<&str> = chain.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_chain_detects_cycle() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("a", "b", LinkKind::BuildsOn),
            link("b", "a", LinkKind::BuildsOn),
        ]);
        let chain = get_memory_chain("a", get_links, get_memory, LinkKind::BuildsOn, 10);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_chain_respects_max_length() {
        let (get_links, get_memory) = graph_lookups(vec![
            link("d", "c", LinkKind::BuildsOn),
            link("c", "b", LinkKind::BuildsOn),
            link("b", "a", LinkKind::BuildsOn),
        ]);
        let chain = get_memory_chain("d", get_links, get_memory, LinkKind::BuildsOn, 2);
        assert_eq!(chain.len(), 2);
    }
}
