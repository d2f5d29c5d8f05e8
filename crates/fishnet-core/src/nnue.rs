//! NNUE evaluation-file selection. The network files themselves are downloaded by a
//! separate tool; this module only decides which file a given variant wants and whether
//! it is already present on disk.

/// Variants that alias another variant's network file rather than shipping their own.
fn canonical(variant: &str) -> &str {
    match variant {
        "cambodian" => "makruk",
        "chess" | "standard" | "chess960" | "fromposition" => "chess",
        _ => variant,
    }
}

/// Variants this workspace ships a bundled network revision for. Mirrors the upstream
/// `NNUE_NET` table, scoped down to the variants the position collaborator (`shakmaty`)
/// actually understands.
fn net_revision(canonical_variant: &str) -> Option<&'static str> {
    match canonical_variant {
        "chess" => Some("6e0151bc9d5a"),
        "crazyhouse" => Some("8fc5cfe8cb83"),
        "threecheck" | "3check" => Some("9c2fc086a9ad"),
        "atomic" => Some("cb4ed3e87387"),
        "horde" => Some("fa757d6b365b"),
        "kingofthehill" => Some("3e65607ae00a"),
        "racingkings" => Some("3e65607ae00a"),
        "antichess" => Some("36fb49a0e389"),
        _ => None,
    }
}

/// Expected `EvalFile` basename for `variant`, if this build knows one.
pub fn eval_file_name(variant: &str) -> Option<String> {
    let vari = canonical(variant);
    net_revision(vari).map(|revision| format!("{vari}-{revision}.nnue"))
}

/// The full set of basenames this build may ever ask an engine to load, for the outgoing
/// request envelope's `stockfish.nnue` file list.
pub fn known_eval_files() -> Vec<String> {
    ["chess", "crazyhouse", "threecheck", "atomic", "horde", "kingofthehill", "racingkings", "antichess"]
        .into_iter()
        .filter_map(eval_file_name)
        .collect()
}

/// `EvalFile` value to set for `variant`, if `nnue` is requested and the file exists in
/// `engine_dir`.
pub fn resolve_eval_file(engine_dir: Option<&std::path::Path>, variant: &str, nnue: bool) -> Option<String> {
    if !nnue {
        return None;
    }
    let name = eval_file_name(variant)?;
    let dir = engine_dir?;
    if dir.join(&name).is_file() {
        Some(name)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cambodian_aliases_makruk() {
        assert_eq!(canonical("cambodian"), "makruk");
    }

    #[test]
    fn unsupported_variant_has_no_eval_file() {
        assert_eq!(eval_file_name("makruk"), None);
    }

    #[test]
    fn missing_file_on_disk_is_not_selected() {
        let dir = std::env::temp_dir();
        assert_eq!(resolve_eval_file(Some(&dir), "crazyhouse", true), None);
    }

    #[test]
    fn nnue_false_short_circuits_without_touching_disk() {
        assert_eq!(resolve_eval_file(None, "chess", false), None);
    }
}
