//! Survivor pruning and ranking between trial rounds.

use crate::stats::TrialStat;

/// Keep the `top_n` fastest good candidates alive and clear the rest.
///
/// Candidates are ranked by cumulative time. Every candidate whose time does
/// not exceed that of the `top_n`-th fastest stays alive, so a tie at the
/// boundary keeps the whole tie group. Candidates that already failed or were
/// pruned are never revived. Returns the number of candidates still alive.
pub fn mark_survivors(top_n: usize, stats: &mut [TrialStat]) -> usize {
    let mut times: Vec<u64> = stats
        .iter()
        .filter(|stat| stat.is_good())
        .map(|stat| stat.time_us)
        .collect();
    times.sort_unstable();

    let cutoff = match top_n {
        0 => None,
        n => times.get(n - 1).or(times.last()).copied(),
    };

    let mut alive = 0;
    for stat in stats.iter_mut() {
        let keep = stat.is_good() && cutoff.is_some_and(|limit| stat.time_us <= limit);
        if keep {
            alive += 1;
        } else {
            stat.alive = false;
        }
    }
    alive
}

pub fn count_alive(stats: &[TrialStat]) -> usize {
    stats.iter().filter(|stat| stat.alive).count()
}

pub fn count_good(stats: &[TrialStat]) -> usize {
    stats.iter().filter(|stat| stat.is_good()).count()
}

/// Index of the candidate with the lowest running average time.
///
/// Pruned candidates are eligible; failed candidates and candidates that
/// never completed a trial are not. Ties go to the earliest candidate.
pub fn rank_best<'a>(stats: impl IntoIterator<Item = &'a TrialStat>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, stat) in stats.into_iter().enumerate() {
        if !stat.ok || stat.rounds == 0 {
            continue;
        }
        match best {
            Some((_, average)) if stat.average_us >= average => {}
            _ => best = Some((index, stat.average_us)),
        }
    }
    best.map(|(index, _)| index)
}
