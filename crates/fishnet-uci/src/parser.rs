//! Parses `info` and `bestmove` lines into the typed [`SearchInfo`]/[`Score`] model.

use fishnet_core::{Score, ScoreValue, SearchInfo};

/// Apply one `info ...` line onto an accumulating [`SearchInfo`] snapshot.
///
/// Fields not present on this line are left untouched, so a caller can feed every `info`
/// line from a search into the same accumulator and always hold the latest-known value
/// for each field, except `score`, which follows the replacement rule below.
pub fn apply_info_line(acc: &mut SearchInfo, line: &str) {
    if !line.starts_with("info") {
        return;
    }
    let mut tokens = line.split_whitespace().peekable();
    tokens.next(); // "info"

    while let Some(tok) = tokens.next() {
        match tok {
            "depth" => acc.depth = next_u32(&mut tokens),
            "seldepth" => acc.seldepth = next_u32(&mut tokens),
            "time" => acc.time_ms = next_u64(&mut tokens),
            "nodes" => acc.nodes = next_u64(&mut tokens),
            "nps" => acc.nps = next_u64(&mut tokens),
            "tbhits" => acc.tbhits = next_u64(&mut tokens),
            "hashfull" => acc.hashfull = next_u32(&mut tokens),
            "cpuload" => acc.cpuload = next_u32(&mut tokens),
            "multipv" => acc.multipv = next_u32(&mut tokens),
            "currmove" => acc.currmove = tokens.next().map(str::to_string),
            "score" => {
                if let Some(score) = parse_score(&mut tokens) {
                    apply_score(acc, score);
                }
            }
            "pv" => {
                let rest: Vec<&str> = tokens.by_ref().collect();
                // Only multipv 1 (or an engine that never mentions multipv at all) is the
                // line we actually care about; other lines are alternate PVs we ignore.
                if acc.multipv.unwrap_or(1) == 1 && !rest.is_empty() {
                    acc.pv = Some(rest.join(" "));
                }
                break;
            }
            "string" => {
                let rest: Vec<&str> = tokens.by_ref().collect();
                acc.string = Some(rest.join(" "));
                break;
            }
            _ => {}
        }
    }
}

/// A new score replaces the stored one unless the stored one is exact and the new one is
/// only a bound: a fail-high/fail-low report never overwrites a completed, exact result
/// for the same depth.
fn apply_score(acc: &mut SearchInfo, new: Score) {
    let replace = match acc.score {
        None => true,
        Some(old) => !old.is_exact() || new.is_exact(),
    };
    if replace {
        acc.score = Some(new);
    }
}

fn parse_score<'a>(tokens: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> Option<Score> {
    let kind = tokens.next()?;
    let value: i64 = tokens.next()?.parse().ok()?;
    let mut score = match kind {
        "cp" => Score { value: ScoreValue::Cp(value), lowerbound: false, upperbound: false },
        "mate" => Score { value: ScoreValue::Mate(value), lowerbound: false, upperbound: false },
        _ => return None,
    };
    loop {
        match tokens.peek() {
            Some(&"lowerbound") => {
                score.lowerbound = true;
                tokens.next();
            }
            Some(&"upperbound") => {
                score.upperbound = true;
                tokens.next();
            }
            _ => break,
        }
    }
    Some(score)
}

fn next_u32<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<u32> {
    tokens.next()?.parse().ok()
}

fn next_u64<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<u64> {
    tokens.next()?.parse().ok()
}

/// Parse a `bestmove <move> [ponder <move>]` line. The literal `(none)` bestmove token is
/// normalized to `None`, matching an engine reporting no legal move.
pub fn parse_bestmove_line(line: &str) -> Option<(Option<String>, Option<String>)> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "bestmove" {
        return None;
    }
    let bestmove = tokens.next().filter(|m| *m != "(none)").map(str::to_string);
    let ponder = match tokens.next() {
        Some("ponder") => tokens.next().map(str::to_string),
        _ => None,
    };
    Some((bestmove, ponder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_fields_across_lines() {
        let mut acc = SearchInfo::default();
        apply_info_line(&mut acc, "info depth 10 seldepth 14 nodes 12345 nps 500000 time 25");
        apply_info_line(&mut acc, "info score cp 34 pv e2e4 e7e5");
        assert_eq!(acc.depth, Some(10));
        assert_eq!(acc.nodes, Some(12345));
        assert_eq!(acc.score, Some(Score::cp(34)));
        assert_eq!(acc.pv.as_deref(), Some("e2e4 e7e5"));
    }

    #[test]
    fn exact_score_is_not_overwritten_by_a_later_bound() {
        let mut acc = SearchInfo::default();
        apply_info_line(&mut acc, "info depth 12 score cp 40");
        apply_info_line(&mut acc, "info depth 12 score cp 999 lowerbound");
        assert_eq!(acc.score, Some(Score::cp(40)));
    }

    #[test]
    fn a_bound_is_overwritten_once_the_search_resolves_it() {
        let mut acc = SearchInfo::default();
        apply_info_line(&mut acc, "info depth 12 score cp 999 lowerbound");
        apply_info_line(&mut acc, "info depth 12 score cp 55");
        assert_eq!(acc.score, Some(Score::cp(55)));
    }

    #[test]
    fn mate_score_parses() {
        let mut acc = SearchInfo::default();
        apply_info_line(&mut acc, "info depth 5 score mate 3");
        assert_eq!(acc.score, Some(Score::mate(3)));
    }

    #[test]
    fn bestmove_none_normalizes_to_none() {
        assert_eq!(parse_bestmove_line("bestmove (none)"), Some((None, None)));
    }

    #[test]
    fn pv_is_ignored_for_secondary_multipv_lines() {
        let mut acc = SearchInfo::default();
        apply_info_line(&mut acc, "info multipv 1 depth 10 score cp 20 pv e2e4 e7e5");
        apply_info_line(&mut acc, "info multipv 2 depth 10 score cp 10 pv d2d4 d7d5");
        assert_eq!(acc.pv.as_deref(), Some("e2e4 e7e5"));
    }

    #[test]
    fn bestmove_with_ponder() {
        assert_eq!(
            parse_bestmove_line("bestmove e2e4 ponder e7e5"),
            Some((Some("e2e4".to_string()), Some("e7e5".to_string())))
        );
    }
}
