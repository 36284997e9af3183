// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

/// Tokens that carry no identity when comparing channel names. Matched as
/// whole words only, so "shdtv" is untouched.
const NOISE_TOKENS: &[&str] = &["hd", "sd", "channel", "tv"];

/// Canonical comparable form of a display name: lowercase, word characters
/// and single spaces only, noise tokens removed.
///
/// Idempotent: normalizing an already-normalized string is a no-op.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize_name("  CNN  "), "cnn");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize_name("Fox   Sports    1"), "fox sports 1");
    }

    #[test]
    fn strips_non_word_characters() {
        assert_eq!(normalize_name("BBC-One (UK)!"), "bbcone uk");
        assert_eq!(normalize_name("a_b c"), "a_b c");
    }

    #[test]
    fn removes_noise_tokens_as_whole_words_only() {
        assert_eq!(normalize_name("ESPN HD"), "espn");
        assert_eq!(normalize_name("Discovery Channel"), "discovery");
        assert_eq!(normalize_name("MTV"), "mtv");
        assert_eq!(normalize_name("shdtv"), "shdtv");
    }

    #[test]
    fn noise_removal_leaves_no_double_spaces() {
        assert_eq!(normalize_name("Sky Sports HD Main Event"), "sky sports main event");
    }

    #[test]
    fn espn_hd_equals_espn() {
        // normalize("ESPN HD") == normalize("espn") == "espn"
        assert_eq!(normalize_name("ESPN HD"), normalize_name("espn"));
        assert_eq!(normalize_name("ESPN HD"), "espn");
    }

    #[test]
    fn idempotent() {
        for s in [
            "ESPN HD",
            "  Fox   Sports 1  ",
            "BBC-One (UK)",
            "Discovery Channel TV",
            "",
            "hd sd channel tv",
            "çilek TV",
        ] {
            let once = normalize_name(s);
            assert_eq!(normalize_name(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn all_noise_collapses_to_empty() {
        assert_eq!(normalize_name("HD TV"), "");
    }
}
