//! Property-based tests for identifier safety
//!
//! - Generated ids always pass the safety check
//! - Ids containing a forbidden character are always rejected
//! - slugify output stays within `[a-z0-9_-]`
//! - Run with ProptestConfig::with_cases(100)

use expbox::id::{ensure_safe_exp_id, generate_exp_id, slugify, IdOptions, IdStyle, LinkStyle, FORBIDDEN_CHARS};
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn arb_style() -> impl Strategy<Value = IdStyle> {
    prop_oneof![
        Just(IdStyle::Datetime),
        Just(IdStyle::Date),
        Just(IdStyle::Seq),
        Just(IdStyle::Rand),
    ]
}

fn arb_link_style() -> impl Strategy<Value = LinkStyle> {
    prop_oneof![Just(LinkStyle::Kebab), Just(LinkStyle::Snake)]
}

fn arb_forbidden() -> impl Strategy<Value = char> {
    proptest::sample::select(FORBIDDEN_CHARS.to_vec())
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every policy produces an id that passes the safety check unchanged
    #[test]
    fn prop_generated_ids_are_safe(
        project in ".{0,24}",
        prefix in proptest::option::of(".{0,12}"),
        suffix in proptest::option::of(".{0,12}"),
        style in arb_style(),
        link_style in arb_link_style(),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut opts = IdOptions::new(style).link_style(link_style);
        if let Some(prefix) = prefix {
            opts = opts.prefix(prefix);
        }
        if let Some(suffix) = suffix {
            opts = opts.suffix(suffix);
        }

        let exp_id = generate_exp_id(&project, tmp.path(), &opts).unwrap();
        prop_assert_eq!(ensure_safe_exp_id(&exp_id).unwrap(), exp_id);
    }

    /// Property: any forbidden character anywhere makes the id invalid
    #[test]
    fn prop_forbidden_chars_rejected(
        head in "[a-z0-9]{0,8}",
        bad in arb_forbidden(),
        tail in "[a-z0-9]{0,8}",
    ) {
        let candidate = format!("{head}{bad}{tail}");
        prop_assert!(ensure_safe_exp_id(&candidate).is_err());
    }

    /// Property: whitespace-only ids are rejected
    #[test]
    fn prop_blank_rejected(blank in "[ \t]{0,6}") {
        prop_assert!(ensure_safe_exp_id(&blank).is_err());
    }

    /// Property: slugify output is non-empty and uses only the slug alphabet
    #[test]
    fn prop_slugify_alphabet(text in ".{0,40}") {
        let slug = slugify(&text);
        prop_assert!(!slug.is_empty());
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
        prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
    }
}
