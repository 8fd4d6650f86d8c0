use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

// Shortest span from `/*` to `*/`; an unterminated comment runs to end of input.
static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?(?:\*/|\z)").unwrap());
// `//` through the terminating newline (or end of input).
static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[^\n]*(?:\n|\z)").unwrap());

/// Strip block comments, then line comments, from source text.
///
/// Everything outside a comment is left untouched, including whitespace.
/// Matching is purely textual, so markers inside string literals count as
/// comments too. The two substitutions are repeated until nothing changes,
/// which keeps `normalize` idempotent when a removal glues two slashes
/// together.
pub fn normalize(text: &str) -> String {
    let mut current = match strip_once(text) {
        Some(stripped) => stripped,
        None => return text.to_string(),
    };
    while let Some(stripped) = strip_once(&current) {
        current = stripped;
    }
    current
}

/// One round of both substitutions. `None` when the text had no comments.
fn strip_once(text: &str) -> Option<String> {
    let without_blocks = BLOCK_COMMENT_RE.replace_all(text, "");
    let without_lines = LINE_COMMENT_RE.replace_all(&without_blocks, "");
    let unchanged = matches!(without_blocks, Cow::Borrowed(_))
        && matches!(without_lines, Cow::Borrowed(_));
    if unchanged {
        None
    } else {
        Some(without_lines.into_owned())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_block_comments() {
        let src = "class A {\n/* first */ int x;\n/*\n * second\n */\n}\n";
        let out = normalize(src);
        assert_eq!(out, "class A {\n int x;\n\n}\n");
        assert!(!out.contains("first"));
        assert!(!out.contains("second"));
    }

    #[test]
    fn block_comment_is_shortest_match() {
        let out = normalize("a /* x */ b /* y */ c");
        assert_eq!(out, "a  b  c");
    }

    #[test]
    fn javadoc_removed() {
        let src = "/**\n * Docs.\n * @param x value\n */\npublic class A {}\n";
        assert_eq!(normalize(src), "\npublic class A {}\n");
    }

    #[test]
    fn removes_line_comments_with_newline() {
        let src = "int a = 1; // one\nint b = 2;\n// whole line\nint c = 3;\n";
        assert_eq!(normalize(src), "int a = 1; int b = 2;\nint c = 3;\n");
    }

    #[test]
    fn line_comment_at_end_of_input() {
        assert_eq!(normalize("int a; // trailing"), "int a; ");
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        assert_eq!(normalize("int a;\n/* never closed\nint b;\n"), "int a;\n");
    }

    #[test]
    fn text_without_comments_unchanged() {
        let src = "package p;\n\nclass A {\n    int x = 4 / 2 * 3;\n}\n";
        assert_eq!(normalize(src), src);
    }

    #[test]
    fn markers_in_strings_are_stripped_too() {
        let out = normalize("String u = \"http://example.com\";\nint x;\n");
        assert_eq!(out, "String u = \"http:int x;\n");
    }

    #[test]
    fn idempotent_on_mixed_source() {
        let src = "/* header */\npackage p; // pkg\nclass A {\n  /** doc */ void f() {} // f\n}\n";
        let once = normalize(src);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn idempotent_when_removal_forms_new_marker() {
        let src = "x = 1 //* c *// tail\ny = 2;\n";
        let once = normalize(src);
        assert_eq!(normalize(&once), once);
        assert!(!once.contains("tail"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(normalize(""), "");
    }
}
