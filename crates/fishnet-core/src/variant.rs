//! Effective-variant computation.
//!
//! A handful of variant names are umbrella terms for more than one underlying castling
//! convention. `capablanca`/`capahouse` are dealt as an Embassy-chess game instead, for
//! the purpose of castling only, when the starting position has castling rights and the
//! king sits on the e-file rather than capablanca's native d-file. `modded_variant` folds
//! that starting-position signal into a single effective variant name before the engine
//! is configured, so the rest of the pipeline only ever has to reason about one name per
//! game.

/// 0-based file of `piece` in `rank` (a single FEN rank string), or `None` if absent.
fn file_of(piece: char, rank: &str) -> Option<usize> {
    let mut file = 0usize;
    for c in rank.chars() {
        if c == piece {
            return Some(file);
        }
        if let Some(skip) = c.to_digit(10) {
            file += skip as usize;
        } else {
            file += 1;
        }
    }
    None
}

/// Deterministic, idempotent effective-variant mapping.
///
/// Only `capablanca`/`capahouse` starting positions are inspected; every other variant
/// name passes through unchanged, which is also what keeps the mapping idempotent (the
/// remapped names `embassy`/`embassyhouse` never match the `capablanca`/`capahouse` arms
/// again).
pub fn modded_variant(variant: &str, chess960: bool, initial_fen: &str) -> String {
    if chess960 || !matches!(variant, "capablanca" | "capahouse") {
        return variant.to_string();
    }

    let mut parts = initial_fen.split_whitespace();
    let board = match parts.next() {
        Some(b) => b,
        None => return variant.to_string(),
    };
    let castling = match parts.nth(1) {
        Some(c) => c,
        None => return variant.to_string(),
    };
    if castling == "-" {
        return variant.to_string();
    }

    let ranks: Vec<&str> = board.split('/').collect();
    if ranks.len() != 8 {
        return variant.to_string();
    }

    let white_castles = castling.contains('K') || castling.contains('Q');
    let black_castles = castling.contains('k') || castling.contains('q');
    let white_e_file = file_of('K', ranks[7]) == Some(4);
    let black_e_file = file_of('k', ranks[0]) == Some(4);

    if white_castles && white_e_file && black_castles && black_e_file {
        if variant.contains("house") {
            "embassyhouse".to_string()
        } else {
            "embassy".to_string()
        }
    } else {
        variant.to_string()
    }
}

/// `UCI_Variant` value to send for an already-effective variant name (post-[`modded_variant`]):
/// `standard`/`fromposition`/`chess960` all drive the engine's plain `chess` variant, since
/// they differ only in the starting FEN and the `UCI_Chess960` flag, not in the rules.
pub fn uci_variant_name(effective_variant: &str) -> &str {
    match effective_variant {
        "standard" | "fromposition" | "chess960" => "chess",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABLANCA_D_FILE_KING: &str =
        "rnabqkbcnr/pppppppppp/10/10/10/10/PPPPPPPPPP/RNABQKBCNR w KQkq - 0 1";
    const CAPABLANCA_E_FILE_KING: &str =
        "rnbqckabnr/pppppppppp/10/10/10/10/PPPPPPPPPP/RNBQCKABNR w KQkq - 0 1";

    #[test]
    fn standard_is_never_remapped() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(modded_variant("standard", false, fen), "standard");
        assert_eq!(modded_variant("standard", true, fen), "standard");
    }

    #[test]
    fn capablanca_with_native_d_file_king_is_unchanged() {
        assert_eq!(
            modded_variant("capablanca", false, CAPABLANCA_D_FILE_KING),
            "capablanca"
        );
    }

    #[test]
    fn capablanca_with_e_file_king_and_castling_rights_becomes_embassy() {
        assert_eq!(
            modded_variant("capablanca", false, CAPABLANCA_E_FILE_KING),
            "embassy"
        );
    }

    #[test]
    fn capahouse_with_e_file_king_becomes_embassyhouse() {
        assert_eq!(
            modded_variant("capahouse", false, CAPABLANCA_E_FILE_KING),
            "embassyhouse"
        );
    }

    #[test]
    fn chess960_flag_suppresses_the_remap() {
        assert_eq!(
            modded_variant("capablanca", true, CAPABLANCA_E_FILE_KING),
            "capablanca"
        );
    }

    #[test]
    fn no_castling_rights_suppresses_the_remap() {
        let fen = "rnbqckabnr/pppppppppp/10/10/10/10/PPPPPPPPPP/RNBQCKABNR w - - 0 1";
        assert_eq!(modded_variant("capablanca", false, fen), "capablanca");
    }

    #[test]
    fn uci_variant_name_maps_standard_family_to_chess() {
        assert_eq!(uci_variant_name("standard"), "chess");
        assert_eq!(uci_variant_name("fromposition"), "chess");
        assert_eq!(uci_variant_name("chess960"), "chess");
        assert_eq!(uci_variant_name("crazyhouse"), "crazyhouse");
    }

    #[test]
    fn unrelated_variants_pass_through() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(modded_variant("crazyhouse", false, fen), "crazyhouse");
    }

    #[test]
    fn modded_variant_is_idempotent() {
        for (variant, fen) in [
            ("capablanca", CAPABLANCA_E_FILE_KING),
            ("capahouse", CAPABLANCA_E_FILE_KING),
            ("capablanca", CAPABLANCA_D_FILE_KING),
            ("crazyhouse", CAPABLANCA_E_FILE_KING),
        ] {
            let once = modded_variant(variant, false, fen);
            let twice = modded_variant(&once, false, fen);
            assert_eq!(once, twice);
        }
    }
}
