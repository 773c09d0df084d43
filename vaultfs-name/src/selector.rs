//! Upload target selection

use rand::Rng;

/// A live data service as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    pub address: String,
    pub free_space: i64,
}

/// Weighted-random pick over free space.
///
/// Nodes reporting no (or negative) free space carry zero weight; when
/// every node does, the pick degrades to uniform so a cluster of full
/// nodes still answers.
#[must_use]
pub fn pick_upload_target(nodes: &[DataNode]) -> Option<&DataNode> {
    if nodes.is_empty() {
        return None;
    }
    let weights: Vec<u64> = nodes
        .iter()
        .map(|n| u64::try_from(n.free_space).unwrap_or(0))
        .collect();
    let total: u64 = weights.iter().sum();
    let mut rng = rand::thread_rng();
    if total == 0 {
        return nodes.get(rng.gen_range(0..nodes.len()));
    }
    let mut remaining = rng.gen_range(0..total);
    for (node, weight) in nodes.iter().zip(weights) {
        if remaining < weight {
            return Some(node);
        }
        remaining -= weight;
    }
    nodes.last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(address: &str, free_space: i64) -> DataNode {
        DataNode {
            address: address.to_owned(),
            free_space,
        }
    }

    #[test]
    fn test_empty_set() {
        assert!(pick_upload_target(&[]).is_none());
    }

    #[test]
    fn test_all_zero_falls_back_to_uniform() {
        let nodes = vec![node("a:1", 0), node("b:2", -5)];
        for _ in 0..50 {
            assert!(pick_upload_target(&nodes).is_some());
        }
    }

    #[test]
    fn test_weighting_prefers_free_space() {
        let nodes = vec![node("big:1", 1_000_000), node("small:2", 1)];
        let mut big = 0;
        for _ in 0..1000 {
            if pick_upload_target(&nodes).unwrap().address == "big:1" {
                big += 1;
            }
        }
        assert!(big > 950, "big node picked only {big}/1000 times");
    }

    #[test]
    fn test_single_node() {
        let nodes = vec![node("only:1", 0)];
        assert_eq!(pick_upload_target(&nodes).unwrap().address, "only:1");
    }
}
