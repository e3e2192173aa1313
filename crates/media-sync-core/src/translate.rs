use media_sync_models::{BreakpointMap, EpisodeRef, OverrideSet};

/// Map an absolute episode number to a destination (season, episode).
///
/// An override for the episode wins outright. Otherwise the entry with the
/// largest `starts_at` not above the episode is used, preferring the higher
/// season when two entries start at the same episode. Inputs no entry covers
/// fall back to season 1 episode 1. Defined for every input.
pub fn translate(absolute_episode: i64, map: &BreakpointMap, overrides: &OverrideSet) -> EpisodeRef {
    if let Ok(key) = u32::try_from(absolute_episode) {
        if let Some(target) = overrides.get(key) {
            return target;
        }
    }

    let best = map
        .entries()
        .iter()
        .filter(|b| i64::from(b.starts_at) <= absolute_episode)
        .max_by_key(|b| (b.starts_at, b.season));

    match best {
        Some(entry) => {
            let episode = absolute_episode - i64::from(entry.starts_at) + 1;
            EpisodeRef::new(entry.season, u32::try_from(episode).unwrap_or(u32::MAX))
        }
        None => EpisodeRef::new(1, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_sync_models::Breakpoint;

    fn map(entries: &[(u32, u32)]) -> BreakpointMap {
        BreakpointMap::new(
            entries
                .iter()
                .map(|(season, starts_at)| Breakpoint {
                    season: *season,
                    starts_at: *starts_at,
                })
                .collect(),
        )
    }

    #[test]
    fn test_second_season() {
        let m = map(&[(1, 1), (2, 26)]);
        assert_eq!(translate(30, &m, &OverrideSet::new()), EpisodeRef::new(2, 5));
        assert_eq!(translate(25, &m, &OverrideSet::new()), EpisodeRef::new(1, 25));
    }

    #[test]
    fn test_below_every_start_falls_back() {
        let m = map(&[(1, 1)]);
        assert_eq!(translate(0, &m, &OverrideSet::new()), EpisodeRef::new(1, 1));
        assert_eq!(translate(-5, &m, &OverrideSet::new()), EpisodeRef::new(1, 1));
        assert_eq!(translate(3, &BreakpointMap::default(), &OverrideSet::new()), EpisodeRef::new(1, 1));
    }

    #[test]
    fn test_tie_prefers_higher_season() {
        let m = map(&[(0, 1), (1, 1)]);
        assert_eq!(translate(1, &m, &OverrideSet::new()), EpisodeRef::new(1, 1));
        // Entry order does not matter
        let m = map(&[(1, 1), (0, 1)]);
        assert_eq!(translate(4, &m, &OverrideSet::new()), EpisodeRef::new(1, 4));
    }

    #[test]
    fn test_override_wins_regardless_of_map() {
        let overrides: OverrideSet = [(30, EpisodeRef::new(0, 3))].into_iter().collect();
        let m = map(&[(1, 1), (2, 26)]);
        assert_eq!(translate(30, &m, &overrides), EpisodeRef::new(0, 3));
        assert_eq!(translate(30, &BreakpointMap::default(), &overrides), EpisodeRef::new(0, 3));
        assert_eq!(translate(31, &m, &overrides), EpisodeRef::new(2, 6));
    }

    #[test]
    fn test_season_start_is_episode_one() {
        let m = map(&[(1, 1), (2, 13), (3, 26), (4, 38)]);
        for entry in m.entries() {
            assert_eq!(
                translate(i64::from(entry.starts_at), &m, &OverrideSet::new()),
                EpisodeRef::new(entry.season, 1)
            );
        }
    }

    #[test]
    fn test_monotonic_over_range() {
        let m = map(&[(1, 1), (2, 13), (3, 26), (4, 38)]);
        let mut previous = translate(1, &m, &OverrideSet::new());
        for abs in 2..=60 {
            let current = translate(abs, &m, &OverrideSet::new());
            assert!(current.season >= previous.season);
            if current.season == previous.season {
                assert_eq!(current.episode, previous.episode + 1);
            } else {
                assert_eq!(current.episode, 1);
            }
            previous = current;
        }
    }

    #[test]
    fn test_extreme_inputs_do_not_panic() {
        let m = map(&[(1, 1)]);
        assert_eq!(translate(i64::MAX, &m, &OverrideSet::new()).season, 1);
        assert_eq!(translate(i64::MAX, &m, &OverrideSet::new()).episode, u32::MAX);
        assert_eq!(translate(i64::MIN, &m, &OverrideSet::new()), EpisodeRef::new(1, 1));
    }
}
