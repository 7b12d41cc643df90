use analysis_core::price_to_pips;

/// Keep only the most relevant structures: 50% proximity to price, 30%
/// recency, 20% size.
pub(crate) fn prune_relevant<T>(
    structures: Vec<T>,
    current_price: f64,
    max_count: usize,
    mid_and_size: impl Fn(&T) -> (f64, f64),
    index_of: impl Fn(&T) -> usize,
) -> Vec<T> {
    if structures.len() <= max_count {
        return structures;
    }

    let max_index = structures.iter().map(&index_of).max().unwrap_or(1).max(1);
    let mut scored: Vec<(f64, T)> = structures
        .into_iter()
        .map(|s| {
            let (mid, size) = mid_and_size(&s);
            let distance_pips = price_to_pips((current_price - mid).abs());
            let proximity = 1.0 / (1.0 + distance_pips / 100.0);
            let recency = index_of(&s) as f64 / max_index as f64;
            let size_score = price_to_pips(size).min(100.0) / 100.0;
            (proximity * 0.5 + recency * 0.3 + size_score * 0.2, s)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_count);
    scored.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Zone {
        mid: f64,
        size: f64,
        index: usize,
    }

    #[test]
    fn keeps_the_nearest_structures() {
        let zones: Vec<Zone> = (0..10)
            .map(|i| Zone {
                mid: 1.1000 + i as f64 * 0.0050,
                size: 0.0010,
                index: i,
            })
            .collect();
        let pruned = prune_relevant(zones, 1.1000, 3, |z| (z.mid, z.size), |z| z.index);
        assert_eq!(pruned.len(), 3);
        // The structure sitting on the current price must survive.
        assert!(pruned.iter().any(|z| z.index == 0));
    }

    #[test]
    fn small_sets_pass_through_untouched() {
        let zones = vec![Zone { mid: 1.2, size: 0.001, index: 0 }];
        let pruned = prune_relevant(zones.clone(), 1.1, 5, |z| (z.mid, z.size), |z| z.index);
        assert_eq!(pruned, zones);
    }
}
