//! Text derived from blog content: slugs, excerpts and reading time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Words per minute used for the reading-time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Default excerpt length, in characters.
pub const EXCERPT_LEN: usize = 160;

/// Used when a title contains nothing slug-worthy.
const FALLBACK_SLUG: &str = "post";

static SLUG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]\([^)]*\)").unwrap());

/// Lowercase letters, digits and single hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// ASCII spelling of a lowercase Latin letter or a named symbol.
fn fold_char(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => "s",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        'þ' => "th",
        '&' => "and",
        '$' => "dollar",
        '%' => "percent",
        '<' => "less",
        '>' => "greater",
        '|' => "or",
        '¢' => "cent",
        '£' => "pound",
        '¥' => "yen",
        '€' => "euro",
        _ => return None,
    };
    Some(folded)
}

/// Builds the base slug for a title. Latin accents fold to ASCII and a few
/// symbols are spelled out (`&` reads as "and"). Hyphens and whitespace
/// separate words; any other character, `_` included, is dropped.
pub fn slugify(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    for ch in title.chars().flat_map(char::to_lowercase) {
        match ch {
            c if c.is_ascii_alphanumeric() => cleaned.push(c),
            c if c == '-' || c.is_whitespace() => cleaned.push(' '),
            c => {
                if let Some(folded) = fold_char(c) {
                    cleaned.push_str(folded);
                }
            }
        }
    }

    let slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Candidate slugs in probing order: `base`, `base-1`, `base-2`, ...
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1u64..).map(move |i| format!("{}-{}", base, i)))
}

/// Drops markdown images and links entirely.
fn strip_links(text: &str) -> String {
    let text = MD_IMAGE.replace_all(text, "");
    MD_LINK.replace_all(&text, "").into_owned()
}

/// Plain-text preview of a markdown body, cut at `len` characters.
pub fn excerpt(markdown: &str, len: usize) -> String {
    let stripped: String = markdown
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '_' | '>' | '`' | '-'))
        .collect();
    let text = strip_links(&stripped);

    if text.chars().count() > len {
        let cut: String = text.chars().take(len).collect();
        format!("{}…", cut.trim())
    } else {
        text
    }
}

pub fn count_words(markdown: &str) -> usize {
    let spaced: String = markdown
        .chars()
        .map(|c| match c {
            '`' | '#' | '*' | '_' | '>' | '-' => ' ',
            c => c,
        })
        .collect();
    strip_links(&spaced).split_whitespace().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingTime {
    pub words: usize,
    pub minutes: usize,
}

/// Words / 200 rounded up, never less than one minute.
pub fn reading_time(markdown: &str) -> ReadingTime {
    let words = count_words(markdown);
    ReadingTime {
        words,
        minutes: words.div_ceil(WORDS_PER_MINUTE).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify_basic_titles() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust: Ownership, Borrowing!  "), "rust-ownership-borrowing");
        assert_eq!(slugify("C++ & Rust"), "c-and-rust");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("snake_case_title"), "snakecasetitle");
    }

    #[test]
    fn test_slugify_folds_accents_and_symbols() {
        assert_eq!(slugify("Café Ünïcode"), "cafe-unicode");
        assert_eq!(slugify("Straße & Œuvre"), "strasse-and-oeuvre");
        assert_eq!(slugify("Łódź, Kraków"), "lodz-krakow");
        assert_eq!(slugify("100% off $5"), "100percent-off-dollar5");
    }

    #[test]
    fn test_slugify_drops_unmapped_and_falls_back() {
        assert_eq!(slugify("Rust 日本語 notes"), "rust-notes");
        assert_eq!(slugify("!!!"), "post");
        assert_eq!(slugify(""), "post");
    }

    #[test]
    fn test_slugify_output_is_valid() {
        for title in ["A -- B", "x", "Many    spaces here", "2024 recap"] {
            assert!(is_valid_slug(&slugify(title)), "{}", title);
        }
    }

    #[test]
    fn test_slug_probing_skips_taken() {
        let taken: HashSet<&str> = ["hello", "hello-1", "hello-2"].into_iter().collect();
        let slug = slug_candidates("hello")
            .find(|s| !taken.contains(s.as_str()))
            .unwrap();
        assert_eq!(slug, "hello-3");

        let first = slug_candidates("fresh").next().unwrap();
        assert_eq!(first, "fresh");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("my-post-2"));
        assert!(!is_valid_slug("My-Post"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("../etc"));
    }

    #[test]
    fn test_reading_time_rounds_up_with_minimum() {
        assert_eq!(reading_time("").minutes, 1);
        assert_eq!(reading_time("one two three").minutes, 1);

        let words_200 = vec!["word"; 200].join(" ");
        assert_eq!(reading_time(&words_200), ReadingTime { words: 200, minutes: 1 });

        let words_201 = vec!["word"; 201].join(" ");
        assert_eq!(reading_time(&words_201).minutes, 2);
    }

    #[test]
    fn test_count_words_ignores_markup_and_links() {
        let md = "# Title\n\nSome *bold* text ![img](a.png) and [a link](http://x)";
        // Title, Some, bold, text, and
        assert_eq!(count_words(md), 5);
    }

    #[test]
    fn test_excerpt_truncates_with_ellipsis() {
        let md = format!("**{}**", "a".repeat(300));
        let out = excerpt(&md, EXCERPT_LEN);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), EXCERPT_LEN + 1);
    }

    #[test]
    fn test_excerpt_short_text_untouched_except_markup() {
        assert_eq!(excerpt("**hi** [x](y)", EXCERPT_LEN), "hi ");
        assert_eq!(excerpt("plain", EXCERPT_LEN), "plain");
    }
}
