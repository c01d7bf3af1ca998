//! The Stop Index (spec §4.3): exact and fuzzy stop-name lookup, built once
//! at load time from the catalogue and read-mostly thereafter.

use std::collections::HashMap;

use crate::ids::StopId;

/// One candidate name in the index: a stop name together with every stop
/// id it resolves to (names need not be unique, spec §4.3).
struct NameEntry {
    name: String,
    normalised: String,
    stop_ids: Vec<StopId>,
}

/// Default `min_score` for [`StopIndex::lookup_fuzzy`] (spec §4.3).
pub const DEFAULT_MIN_SCORE: u8 = 60;

pub struct StopIndex {
    entries: Vec<NameEntry>,
    exact: HashMap<String, Vec<StopId>>,
}

impl StopIndex {
    /// Build the index from every `(stop_id, name)` pair in the merged
    /// catalogue.
    pub fn build<'a>(stops: impl Iterator<Item = (&'a StopId, &'a str)>) -> StopIndex {
        let mut by_name: HashMap<String, Vec<StopId>> = HashMap::new();
        for (stop_id, name) in stops {
            by_name.entry(name.to_string()).or_default().push(stop_id.clone());
        }

        let entries = by_name
            .iter()
            .map(|(name, stop_ids)| NameEntry {
                name: name.clone(),
                normalised: token_sort(name),
                stop_ids: stop_ids.clone(),
            })
            .collect();

        StopIndex {
            entries,
            exact: by_name,
        }
    }

    /// Every stop id registered under exactly this name (spec §4.3).
    pub fn lookup_exact(&self, name: &str) -> Vec<StopId> {
        self.exact.get(name).cloned().unwrap_or_default()
    }

    /// Token-sort fuzzy match, scored `[0,100]`, descending by score with
    /// ties broken by name ascending (spec §4.3).
    pub fn lookup_fuzzy(
        &self,
        query: &str,
        limit: usize,
        min_score: Option<u8>,
    ) -> Vec<(StopId, String, u8)> {
        let min_score = min_score.unwrap_or(DEFAULT_MIN_SCORE);
        let normalised_query = token_sort(query);

        let mut scored: Vec<(&NameEntry, u8)> = self
            .entries
            .iter()
            .map(|entry| (entry, score(&normalised_query, &entry.normalised)))
            .filter(|(_, score)| *score >= min_score)
            .collect();

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score.cmp(a_score).then_with(|| a.name.cmp(&b.name))
        });

        scored
            .into_iter()
            .flat_map(|(entry, score)| {
                entry
                    .stop_ids
                    .iter()
                    .cloned()
                    .map(move |id| (id, entry.name.clone(), score))
            })
            .take(limit)
            .collect()
    }
}

/// Lowercase, whitespace-tokenise, sort tokens, rejoin — so word order
/// doesn't affect the match (spec §4.3's "independent of word order").
fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ").to_lowercase()
}

/// Score two token-sorted, lowercased strings in `[0,100]` via normalised
/// Levenshtein similarity (see SPEC_FULL.md §4.3 for why `strsim` is the
/// chosen metric).
fn score(a: &str, b: &str) -> u8 {
    let similarity = strsim::normalized_levenshtein(a, b);
    (similarity * 100.0).round() as u8
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_stops() -> Vec<(StopId, String)> {
        vec![
            (StopId::from("1"), "Central Station".to_string()),
            (StopId::from("2"), "Station Central".to_string()),
            (StopId::from("3"), "North Quay".to_string()),
        ]
    }

    #[test]
    fn exact_lookup_is_case_sensitive_by_name() {
        let stops = sample_stops();
        let index = StopIndex::build(stops.iter().map(|(id, name)| (id, name.as_str())));
        assert_eq!(index.lookup_exact("North Quay"), vec![StopId::from("3")]);
        assert!(index.lookup_exact("north quay").is_empty());
    }

    #[test]
    fn fuzzy_lookup_is_independent_of_word_order() {
        let stops = sample_stops();
        let index = StopIndex::build(stops.iter().map(|(id, name)| (id, name.as_str())));
        let results = index.lookup_fuzzy("central station", 10, None);
        let ids: Vec<_> = results.iter().map(|(id, _, _)| id.clone()).collect();
        assert!(ids.contains(&StopId::from("1")));
        assert!(ids.contains(&StopId::from("2")));
        for (_, _, s) in &results {
            assert_eq!(*s, 100);
        }
    }

    #[test]
    fn fuzzy_lookup_respects_min_score_and_limit() {
        let stops = sample_stops();
        let index = StopIndex::build(stops.iter().map(|(id, name)| (id, name.as_str())));
        let results = index.lookup_fuzzy("north quay", 1, Some(80));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, StopId::from("3"));

        let none = index.lookup_fuzzy("completely unrelated text", 10, Some(80));
        assert!(none.is_empty());
    }
}
