//! Path and text-content rewriting for a single prefix rule.
//!
//! Path rewriting is anchored: only a leading occurrence of the source prefix
//! moves. Content rewriting is global: references may sit anywhere inside
//! markup or script.

use crate::types::{EncodingVariant, RewriteRule};

/// Map an entry path through the rule.
///
/// Returns the path with its leading `source_prefix` replaced by
/// `dest_prefix`, or the path unchanged when it does not start with the
/// source prefix.
///
/// # Examples
///
/// ```
/// use relocator::rewrite::rewrite_path;
/// use relocator::RewriteRule;
///
/// let rule = RewriteRule::new("public/", "img/").unwrap();
/// assert_eq!(rewrite_path("public/logo.png", &rule), "img/logo.png");
/// assert_eq!(rewrite_path("assets/public/x", &rule), "assets/public/x");
/// ```
pub fn rewrite_path(path: &str, rule: &RewriteRule) -> String {
    match path.strip_prefix(rule.source_prefix()) {
        Some(rest) => {
            let mut out = String::with_capacity(rule.dest_prefix().len() + rest.len());
            out.push_str(rule.dest_prefix());
            out.push_str(rest);
            out
        }
        None => path.to_string(),
    }
}

impl EncodingVariant {
    /// Render `prefix` in this variant's literal form.
    pub fn encode(self, prefix: &str) -> String {
        match self {
            EncodingVariant::Raw => prefix.to_string(),
            EncodingVariant::PercentEncoded => prefix.replace('/', "%2F"),
            EncodingVariant::PercentEncodedLower => prefix.replace('/', "%2f"),
        }
    }
}

/// Rewrites every configured literal form of the rule's source prefix.
///
/// Patterns are computed once per rule and reused for every entry. All forms
/// are matched in a single left-to-right scan of the input (leftmost match
/// first, longest on ties), so replacement text is never searched again and
/// the result does not depend on the variant order.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    patterns: Vec<(String, String)>,
}

/// Rewritten text plus the number of replacements made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    pub replacements: usize,
}

impl ContentRewriter {
    pub fn new(rule: &RewriteRule, variants: &[EncodingVariant]) -> Self {
        let mut patterns: Vec<(String, String)> = Vec::with_capacity(variants.len());
        for variant in variants {
            let pattern = (
                variant.encode(rule.source_prefix()),
                variant.encode(rule.dest_prefix()),
            );
            // Repeated variants
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        Self { patterns }
    }

    /// Replace all occurrences of every source form in `text`.
    pub fn rewrite(&self, text: &str) -> Rewritten {
        let mut out = String::with_capacity(text.len());
        let mut replacements = 0;
        let mut pos = 0;
        // Next match start of each pattern at or after `pos`
        let mut next: Vec<Option<usize>> = self
            .patterns
            .iter()
            .map(|(from, _)| text.find(from.as_str()))
            .collect();

        loop {
            let best = next
                .iter()
                .enumerate()
                .filter_map(|(i, start)| start.map(|start| (start, i)))
                .min_by_key(|&(start, i)| (start, std::cmp::Reverse(self.patterns[i].0.len())));
            let Some((start, i)) = best else { break };

            let (from, to) = &self.patterns[i];
            out.push_str(&text[pos..start]);
            out.push_str(to);
            pos = start + from.len();
            replacements += 1;

            for (slot, (from, _)) in next.iter_mut().zip(&self.patterns) {
                if matches!(*slot, Some(s) if s < pos) {
                    *slot = text[pos..].find(from.as_str()).map(|s| s + pos);
                }
            }
        }
        out.push_str(&text[pos..]);

        Rewritten {
            text: out,
            replacements,
        }
    }
}

/// Convenience wrapper rewriting `text` with the default variant order
/// (percent-encoded, then raw).
pub fn rewrite_text(text: &str, rule: &RewriteRule) -> String {
    ContentRewriter::new(
        rule,
        &[EncodingVariant::PercentEncoded, EncodingVariant::Raw],
    )
    .rewrite(text)
    .text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> RewriteRule {
        RewriteRule::new("public/", "img/").unwrap()
    }

    #[test]
    fn test_rewrite_path_anchored() {
        let rule = rule();
        assert_eq!(rewrite_path("public/a.html", &rule), "img/a.html");
        assert_eq!(rewrite_path("public/", &rule), "img/");
        assert_eq!(rewrite_path("public/deep/er/x.png", &rule), "img/deep/er/x.png");

        // Not at the start
        assert_eq!(rewrite_path("assets/public/x", &rule), "assets/public/x");
        // Partial segment
        assert_eq!(rewrite_path("publicx/a.html", &rule), "publicx/a.html");
        assert_eq!(rewrite_path("public", &rule), "public");
        assert_eq!(rewrite_path("", &rule), "");
    }

    #[test]
    fn test_rewrite_path_only_leading_occurrence() {
        let rule = rule();
        assert_eq!(
            rewrite_path("public/public/x.css", &rule),
            "img/public/x.css"
        );
    }

    #[test]
    fn test_rewrite_path_suffix_preserved() {
        let rule = rule();
        for path in ["public/a", "public/ü/ß.txt", "public/a b/c%2Fd", "other/x"] {
            let out = rewrite_path(path, &rule);
            match path.strip_prefix("public/") {
                Some(rest) => {
                    assert!(out.starts_with("img/"));
                    assert_eq!(&out["img/".len()..], rest);
                }
                None => assert_eq!(out, path),
            }
        }
    }

    #[test]
    fn test_rewrite_path_idempotent() {
        let rule = rule();
        for path in ["public/a.html", "img/a.html", "other/public/a", "public/public/b"] {
            let once = rewrite_path(path, &rule);
            assert_eq!(rewrite_path(&once, &rule), once);
        }
    }

    #[test]
    fn test_encode_variants() {
        assert_eq!(EncodingVariant::Raw.encode("a/b/"), "a/b/");
        assert_eq!(EncodingVariant::PercentEncoded.encode("a/b/"), "a%2Fb%2F");
        assert_eq!(EncodingVariant::PercentEncodedLower.encode("a/b/"), "a%2fb%2f");
    }

    #[test]
    fn test_content_rewrite_total() {
        let rewriter = ContentRewriter::new(
            &rule(),
            &[EncodingVariant::PercentEncoded, EncodingVariant::Raw],
        );
        let text = r#"<img src="public/b.png"><a href="/x?f=public%2Fb.png">public/</a> public/c"#;
        let out = rewriter.rewrite(text);

        assert_eq!(out.replacements, 4);
        assert!(!out.text.contains("public/"));
        assert!(!out.text.contains("public%2F"));
        assert_eq!(out.text.matches("img/").count(), 3);
        assert_eq!(out.text.matches("img%2F").count(), 1);
        assert_eq!(
            out.text,
            r#"<img src="img/b.png"><a href="/x?f=img%2Fb.png">img/</a> img/c"#
        );
    }

    #[test]
    fn test_content_rewrite_not_anchored_to_segments() {
        // Inside text every literal occurrence is rewritten, including ones
        // preceded by other path segments
        let out = rewrite_text("url(../public/x.png) assets/public/y", &rule());
        assert_eq!(out, "url(../img/x.png) assets/img/y");
    }

    #[test]
    fn test_content_rewrite_order_independent() {
        let rule = rule();
        let text = "public/a public%2Fb public%2fc";
        let a = ContentRewriter::new(
            &rule,
            &[
                EncodingVariant::PercentEncoded,
                EncodingVariant::Raw,
                EncodingVariant::PercentEncodedLower,
            ],
        )
        .rewrite(text);
        let b = ContentRewriter::new(
            &rule,
            &[
                EncodingVariant::Raw,
                EncodingVariant::PercentEncodedLower,
                EncodingVariant::PercentEncoded,
            ],
        )
        .rewrite(text);
        assert_eq!(a, b);
        assert_eq!(a.text, "img/a img%2Fb img%2fc");
        assert_eq!(a.replacements, 3);
    }

    #[test]
    fn test_content_rewrite_replacement_not_rescanned() {
        // Replacement output is not matched again, even where it completes
        // an encoded form together with the preceding "%2"
        let rule = RewriteRule::new("public/", "Fonts/").unwrap();
        let text = "public%2public/x";
        let encoded_first = ContentRewriter::new(
            &rule,
            &[EncodingVariant::PercentEncoded, EncodingVariant::Raw],
        )
        .rewrite(text);
        let raw_first = ContentRewriter::new(
            &rule,
            &[EncodingVariant::Raw, EncodingVariant::PercentEncoded],
        )
        .rewrite(text);

        assert_eq!(encoded_first, raw_first);
        assert_eq!(encoded_first.text, "public%2Fonts/x");
        assert_eq!(encoded_first.replacements, 1);
    }

    #[test]
    fn test_content_rewrite_lowercase_needs_variant() {
        let text = "public%2fb.png";
        assert_eq!(rewrite_text(text, &rule()), text);
    }

    #[test]
    fn test_content_rewrite_no_matches() {
        let rewriter = ContentRewriter::new(&rule(), &[EncodingVariant::Raw]);
        let out = rewriter.rewrite("nothing to see in pub lic/");
        assert_eq!(out.replacements, 0);
        assert_eq!(out.text, "nothing to see in pub lic/");
    }

    #[test]
    fn test_content_rewrite_duplicate_variant() {
        let rewriter =
            ContentRewriter::new(&rule(), &[EncodingVariant::Raw, EncodingVariant::Raw]);
        let out = rewriter.rewrite("public/a");
        assert_eq!(out.replacements, 1);
    }
}
