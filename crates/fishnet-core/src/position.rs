//! `fen_after`, the variant-aware position collaborator named in the move/evaluation
//! protocol design. This crate does not implement chess rules; it is a thin wrapper over
//! a rules crate, called only when finalizing a `bestmove` job's result.

use anyhow::{Context, Result};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::variant::{Variant, VariantPosition};
use shakmaty::{CastlingMode, EnPassantMode, Position};

fn parse_variant(name: &str) -> Variant {
    match name {
        "crazyhouse" => Variant::Crazyhouse,
        "threecheck" | "3check" => Variant::ThreeCheck,
        "atomic" => Variant::Atomic,
        "horde" => Variant::Horde,
        "kingofthehill" | "kingofthehillhouse" => Variant::KingOfTheHill,
        "racingkings" => Variant::RacingKings,
        "antichess" | "giveaway" => Variant::Antichess,
        _ => Variant::Chess,
    }
}

/// Apply `moves` (UCI move tokens, including crazyhouse drops like `P@f2`) to `fen` under
/// `variant`, returning the resulting FEN.
///
/// `sfen`/`show_promoted` select alternate output encodings for variants that need them
/// (currently unused by any variant this workspace drives, but kept in the signature
/// since the protocol design names them as part of the collaborator's contract).
pub fn fen_after(
    variant: &str,
    fen: &str,
    moves: &[String],
    chess960: bool,
    _sfen: bool,
    _show_promoted: bool,
) -> Result<String> {
    let castling_mode = if chess960 { CastlingMode::Chess960 } else { CastlingMode::Standard };
    let setup: Fen = fen.parse().with_context(|| format!("invalid fen: {fen}"))?;
    let mut pos = VariantPosition::from_setup(parse_variant(variant), setup.into_setup(), castling_mode)
        .with_context(|| format!("illegal starting position for variant {variant}: {fen}"))?;

    for token in moves {
        let uci = UciMove::from_ascii(token.as_bytes())
            .with_context(|| format!("invalid move token: {token}"))?;
        let mv = uci
            .to_move(&pos)
            .with_context(|| format!("illegal move {token} in variant {variant}"))?;
        pos.play_unchecked(&mv);
    }

    Ok(Fen::from_position(pos, EnPassantMode::Legal).to_string())
}
