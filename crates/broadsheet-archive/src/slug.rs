// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Script-preserving slugs.
//
// Letters, combining marks and digits of every script survive untouched;
// Devanagari, Arabic or CJK titles are never transliterated. Markup,
// punctuation and symbols are dropped, and separator runs become one hyphen.

use std::sync::LazyLock;

use broadsheet_core::config::SlugConfig;
use broadsheet_core::error::Result;
use broadsheet_core::types::EditionId;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Slugs shorter than this many UTF-8 bytes are replaced by the fallback
/// token. Counted in bytes so one- and two-letter titles in non-Latin
/// scripts keep their own text.
const MIN_LEN: usize = 3;

/// Prefix used when the configured fallback prefix is blank.
const DEFAULT_PREFIX: &str = "edition";

/// Fallback hash digits kept.
const HASH_DIGITS: usize = 8;

/// Markup tags.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static pattern"));

/// Anything that is not a letter, mark, digit, separator, or zero-width joiner.
static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{M}\p{N}\s\u{200C}\u{200D}_-]").expect("static pattern")
});

/// Runs of whitespace, underscores and hyphens.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("static pattern"));

/// Answers "is this slug already used by another edition?".
pub trait SlugProbe {
    fn slug_taken(&self, slug: &str, exclude: Option<EditionId>) -> Result<bool>;
}

/// Derive a slug from free text. Deterministic.
///
/// ```ignore
/// assert_eq!(generate("आज का <b>समाचार</b>!", &cfg), "आज-का-समाचार");
/// ```
pub fn generate(text: &str, config: &SlugConfig) -> String {
    let without_tags = TAG_RE.replace_all(text, "");
    let kept = DISALLOWED_RE.replace_all(&without_tags, "");
    let lowered = kept.to_lowercase();
    let joined = SEPARATOR_RE.replace_all(&lowered, "-");
    let slug = joined.trim_matches('-');

    let slug = if slug.len() < MIN_LEN {
        let token = fallback_token(text, &config.fallback_prefix);
        debug!(%token, "slug too short, using fallback token");
        truncate(&token, config.max_len)
    } else {
        truncate(slug, config.max_len)
    };

    if looks_like_identifier(&slug) {
        let prefixed = format!("{}-{slug}", prefix_or_default(&config.fallback_prefix));
        debug!(%slug, %prefixed, "slug would parse as an edition id, prefixing");
        return truncate(&prefixed, config.max_len);
    }
    slug
}

/// Whether an identifier lookup would read `slug` as a numeric id or a
/// native id instead of a slug.
fn looks_like_identifier(slug: &str) -> bool {
    slug.bytes().all(|b| b.is_ascii_digit()) || Uuid::parse_str(slug).is_ok()
}

fn prefix_or_default(prefix: &str) -> &str {
    match prefix.trim_matches('-') {
        "" => DEFAULT_PREFIX,
        trimmed => trimmed,
    }
}

/// Derive a slug and make it unique against `probe`.
///
/// Tries the base slug, then `-1`, `-2`, ... up to `max_probes`, then a
/// millisecond timestamp suffix so the search always ends. Two writers can
/// still pick the same candidate; the store's unique index catches that and
/// the caller probes again.
pub fn generate_unique(
    probe: &dyn SlugProbe,
    text: &str,
    exclude: Option<EditionId>,
    config: &SlugConfig,
) -> Result<String> {
    let base = generate(text, config);
    if !probe.slug_taken(&base, exclude)? {
        return Ok(base);
    }

    for n in 1..=config.max_probes {
        let candidate = with_suffix(&base, &n.to_string(), config.max_len);
        if !probe.slug_taken(&candidate, exclude)? {
            debug!(%candidate, probes = n, "slug collision resolved");
            return Ok(candidate);
        }
    }

    let stamped = with_suffix(&base, &Utc::now().timestamp_millis().to_string(), config.max_len);
    warn!(%base, %stamped, max_probes = config.max_probes, "slug probes exhausted");
    Ok(stamped)
}

/// `"{prefix}-{hash}"` where the hash is the lowest base-36 digits of a
/// 32-bit shift-and-add hash over the UTF-16 units of `text`.
fn fallback_token(text: &str, prefix: &str) -> String {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit)));

    let digits = to_base36(hash.unsigned_abs());
    let start = digits.len().saturating_sub(HASH_DIGITS);
    let prefix = prefix.trim_matches('-');
    if prefix.is_empty() {
        digits[start..].to_string()
    } else {
        format!("{prefix}-{}", &digits[start..])
    }
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Keep at most `max_len` chars and drop hyphens left dangling by the cut.
fn truncate(slug: &str, max_len: usize) -> String {
    let cut: String = slug.chars().take(max_len).collect();
    cut.trim_end_matches('-').to_string()
}

/// Append `-{suffix}`, shortening `base` so the result fits `max_len`.
fn with_suffix(base: &str, suffix: &str, max_len: usize) -> String {
    let room = max_len.saturating_sub(suffix.chars().count() + 1);
    let head = truncate(base, room);
    if head.is_empty() {
        suffix.to_string()
    } else {
        format!("{head}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    fn cfg() -> SlugConfig {
        SlugConfig::default()
    }

    /// Slugs owned by edition ids.
    struct Taken(RefCell<HashMap<String, i64>>);

    impl Taken {
        fn new(slugs: &[(&str, i64)]) -> Self {
            Self(RefCell::new(
                slugs.iter().map(|(s, id)| (s.to_string(), *id)).collect(),
            ))
        }
    }

    impl SlugProbe for Taken {
        fn slug_taken(&self, slug: &str, exclude: Option<EditionId>) -> Result<bool> {
            Ok(self
                .0
                .borrow()
                .get(slug)
                .is_some_and(|owner| Some(EditionId(*owner)) != exclude))
        }
    }

    #[test]
    fn latin_text_is_lowercased_and_hyphenated() {
        assert_eq!(generate("Hello, World!", &cfg()), "hello-world");
        assert_eq!(generate("  Multiple   Spaces__and--dashes ", &cfg()), "multiple-spaces-and-dashes");
    }

    #[test]
    fn devanagari_is_preserved() {
        assert_eq!(generate("आज का समाचार", &cfg()), "आज-का-समाचार");
        // Virama and vowel signs are combining marks and must survive.
        assert_eq!(generate("क्रिकेट: भारत जीता!", &cfg()), "क्रिकेट-भारत-जीता");
    }

    #[test]
    fn other_scripts_are_preserved() {
        assert_eq!(generate("東京 ニュース", &cfg()), "東京-ニュース");
        assert_eq!(generate("أخبار اليوم", &cfg()), "أخبار-اليوم");
        assert_eq!(generate("Привет, мир", &cfg()), "привет-мир");
    }

    #[test]
    fn markup_and_symbols_are_removed() {
        assert_eq!(generate("<b>Budget</b> 2024 — “big” day’s news", &cfg()), "budget-2024-big-days-news");
        assert_eq!(generate("$100 & €50 @ 5%", &cfg()), "100-50-5");
    }

    #[test]
    fn short_or_empty_input_uses_fallback_token() {
        assert_eq!(generate("!!!", &cfg()), "लेख-pa9");
        assert_eq!(generate("", &cfg()), "लेख-0");
        assert_eq!(generate("?!", &cfg()), "लेख-1j6");
        assert!(generate("ab", &cfg()).starts_with("लेख-"));
    }

    #[test]
    fn identifier_shaped_slugs_get_a_prefix() {
        assert_eq!(generate("1947", &cfg()), "लेख-1947");
        assert_eq!(generate("<i>2024</i>!", &cfg()), "लेख-2024");
        let uuid = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(generate(uuid, &cfg()), format!("लेख-{uuid}"));
        // Digits mixed with words stay as they are.
        assert_eq!(generate("1947 Partition", &cfg()), "1947-partition");

        let bare = SlugConfig {
            fallback_prefix: String::new(),
            ..cfg()
        };
        assert_eq!(generate("1947", &bare), "edition-1947");
        assert!(!looks_like_identifier(&generate("!!", &bare)));
    }

    #[test]
    fn short_non_latin_titles_are_kept() {
        assert_eq!(generate("आज", &cfg()), "आज");
        assert_eq!(generate("東", &cfg()), "東");
    }

    #[test]
    fn fallback_keeps_lowest_eight_digits() {
        let text = "a very long punctuation string !!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!";
        assert_eq!(fallback_token(text, "लेख"), "लेख-urg5db");
        assert_eq!(fallback_token("x", ""), to_base36(u32::from(b'x')));
    }

    #[test]
    fn generate_is_deterministic() {
        let text = "मुख्य समाचार: बजट 2024";
        assert_eq!(generate(text, &cfg()), generate(text, &cfg()));
    }

    #[test]
    fn long_titles_are_capped_without_trailing_hyphen() {
        let title = format!("{} tail", "x".repeat(99));
        let slug = generate(&title, &cfg());
        assert_eq!(slug.chars().count(), 99);
        assert!(!slug.ends_with('-'));

        let devanagari = "समाचार ".repeat(40);
        let slug = generate(&devanagari, &cfg());
        assert!(slug.chars().count() <= 100);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn unique_slug_appends_counter() {
        let probe = Taken::new(&[("aaj", 1), ("aaj-1", 2)]);
        let slug = generate_unique(&probe, "Aaj", None, &cfg()).expect("slug");
        assert_eq!(slug, "aaj-2");
    }

    #[test]
    fn own_slug_is_not_a_collision() {
        let probe = Taken::new(&[("aaj", 7)]);
        let slug = generate_unique(&probe, "Aaj", Some(EditionId(7)), &cfg()).expect("slug");
        assert_eq!(slug, "aaj");
    }

    #[test]
    fn exhausted_probes_fall_back_to_timestamp() {
        struct Everything;
        impl SlugProbe for Everything {
            fn slug_taken(&self, _: &str, _: Option<EditionId>) -> Result<bool> {
                Ok(true)
            }
        }

        let config = SlugConfig {
            max_probes: 3,
            ..cfg()
        };
        let slug = generate_unique(&Everything, "Aaj", None, &config).expect("slug");
        let suffix = slug.strip_prefix("aaj-").expect("base kept");
        assert!(suffix.len() >= 13 && suffix.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn suffixed_slugs_respect_max_len() {
        let config = SlugConfig {
            max_len: 10,
            ..cfg()
        };
        let base = generate("abcdefghij", &config);
        let probe = Taken::new(&[(&base, 1)]);
        let slug = generate_unique(&probe, "abcdefghij", None, &config).expect("slug");
        assert_eq!(slug, "abcdefgh-1");
    }
}
