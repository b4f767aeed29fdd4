//! Math notation normalization.
//!
//! Quiz documents written in word processors often carry equations in the
//! linear equation-script notation (`left ( matrix{1 # 2 ## 3 # 4} right )`,
//! `{1} over {2}`, `sqrt{x}`). This module rewrites those constructs into LaTeX
//! so that they can be rendered later. Everything it does not recognize is left
//! untouched.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A brace group allowing one level of nested braces inside.
const BRACED: &str = r"\{((?:[^{}]|\{[^{}]*\})*)\}";

/// `[left (|[] [p|b]matrix { rows } [right )|]]`
static MATRIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:\bleft\s*([(\[])\s*)?\b([pb]?)matrix\s*{}(?:\s*right\s*([)\]]))?",
        BRACED
    ))
    .unwrap()
});

/// `{a} over {b} [over {c} ...]`, possibly continuing an existing `\frac{..}{..}`
static FRACTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:\\frac\s*{b}\s*{b}|{b})(?:\s*\bover\b\s*{b})+",
        b = BRACED
    ))
    .unwrap()
});

static BRACE_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(BRACED).unwrap());

/// `sqrt {radicand}`; a preceding backslash or letter means it is not the keyword.
static ROOT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(^|[^\\A-Za-z])sqrt\s*{}", BRACED)).unwrap());

/// Delimiter style of a rendered matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixStyle {
    Plain,
    Paren,
    Bracket,
}

impl MatrixStyle {
    fn environment(&self) -> &'static str {
        match self {
            MatrixStyle::Plain => "matrix",
            MatrixStyle::Paren => "pmatrix",
            MatrixStyle::Bracket => "bmatrix",
        }
    }

    fn from_hint(hint: &str) -> Option<MatrixStyle> {
        match hint {
            "p" | "(" | ")" => Some(MatrixStyle::Paren),
            "b" | "[" | "]" => Some(MatrixStyle::Bracket),
            _ => None,
        }
    }
}

fn render_matrix(caps: &Captures) -> String {
    let hint = |idx: usize| caps.get(idx).and_then(|m| MatrixStyle::from_hint(m.as_str()));
    // keyword prefix, then the left bracket, then the right one
    let style = hint(2).or_else(|| hint(1)).or_else(|| hint(4)).unwrap_or(MatrixStyle::Plain);

    let rows: Vec<String> = caps[3]
        .split("##")
        .filter(|row| !row.trim().is_empty())
        .map(|row| row.split('#').map(|cell| cell.trim()).collect::<Vec<&str>>().join(" & "))
        .collect();

    let env = style.environment();
    if rows.is_empty() {
        return format!("\\begin{{{}}} \\end{{{}}}", env, env);
    }
    format!("\\begin{{{}}} {} \\end{{{}}}", env, rows.join(" \\\\ "), env)
}

fn brace_inner(group: &str) -> &str {
    group[1..group.len() - 1].trim()
}

/// Folds a chain of `over` operands left to right: `a over b over c` is `(a/b)/c`.
fn render_fraction(caps: &Captures) -> String {
    let whole = &caps[0];
    let groups: Vec<regex::Match> = BRACE_GROUP.find_iter(whole).collect();
    let (mut acc, rest) = match (whole.starts_with("\\frac"), groups.as_slice()) {
        (true, [_, denominator, rest @ ..]) => (whole[..denominator.end()].to_string(), rest),
        (false, [first, rest @ ..]) => (brace_inner(first.as_str()).to_string(), rest),
        _ => return whole.to_string(),
    };
    for group in rest {
        acc = format!("\\frac{{{}}}{{{}}}", acc, brace_inner(group.as_str()));
    }
    acc
}

fn normalize_pass(text: &str) -> String {
    let text = MATRIX_PATTERN.replace_all(text, |caps: &Captures| render_matrix(caps));
    let text = FRACTION_PATTERN.replace_all(&text, |caps: &Captures| render_fraction(caps));
    let text = ROOT_PATTERN.replace_all(&text, |caps: &Captures| {
        format!("{}\\sqrt{{{}}}", &caps[1], caps[2].trim())
    });
    text.into_owned()
}

/// Rewrites equation-script matrices, fractions and roots into LaTeX.
///
/// Every substitution removes one `matrix`/`over`/`sqrt` keyword, so repeated
/// passes reach a fixpoint; the result is returned only once a pass changes
/// nothing. Applying the function twice therefore yields the same output as
/// applying it once.
///
/// # Arguments
///
/// * `text` - Extracted document text.
///
/// # Returns
///
/// The text with recognized constructs converted, everything else unchanged.
pub fn normalize_math(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paren_matrix() {
        let text = "A = left ( matrix{1 # 2 ## 3 # 4} right )";
        assert_eq!(
            normalize_math(text),
            r"A = \begin{pmatrix} 1 & 2 \\ 3 & 4 \end{pmatrix}"
        );
    }

    #[test]
    fn test_bracket_matrix() {
        let text = "left [ matrix { a # b ## c # d } right ]";
        assert_eq!(
            normalize_math(text),
            r"\begin{bmatrix} a & b \\ c & d \end{bmatrix}"
        );
    }

    #[test]
    fn test_plain_and_keyword_matrices() {
        assert_eq!(
            normalize_math("I = matrix{1 # 0 ## 0 # 1}"),
            r"I = \begin{matrix} 1 & 0 \\ 0 & 1 \end{matrix}"
        );
        assert_eq!(
            normalize_math("pmatrix{x ## y}"),
            r"\begin{pmatrix} x \\ y \end{pmatrix}"
        );
        assert_eq!(
            normalize_math("bmatrix{1 # 2}"),
            r"\begin{bmatrix} 1 & 2 \end{bmatrix}"
        );
    }

    #[test]
    fn test_only_right_hint() {
        assert_eq!(
            normalize_math("matrix{1 # 2} right )"),
            r"\begin{pmatrix} 1 & 2 \end{pmatrix}"
        );
    }

    #[test]
    fn test_fraction_and_root() {
        assert_eq!(normalize_math("x = {1} over {2}"), r"x = \frac{1}{2}");
        assert_eq!(normalize_math("sqrt {x + 1}"), r"\sqrt{x + 1}");
        assert_eq!(
            normalize_math("{ {a} over {b} } over {c}"),
            r"\frac{\frac{a}{b}}{c}"
        );
    }

    #[test]
    fn test_fraction_chain_folds_left() {
        assert_eq!(normalize_math("{a} over {b} over {c}"), r"\frac{\frac{a}{b}}{c}");
        assert_eq!(
            normalize_math("y = {1} over {2} over {3} over {4}"),
            r"y = \frac{\frac{\frac{1}{2}}{3}}{4}"
        );
        assert_eq!(normalize_math(r"\frac{a}{b} over {c}"), r"\frac{\frac{a}{b}}{c}");
        assert_eq!(
            normalize_math("{a} over {b} and {c} over {d}"),
            r"\frac{a}{b} and \frac{c}{d}"
        );
    }

    #[test]
    fn test_unmatched_left_untouched() {
        for text in [
            "The matrix is singular.",
            "left ( x right )",
            "matrix without braces",
            "sqrt of two",
            "1. What is 2+2?\nA) 3\nB) 4+++",
            "",
        ] {
            assert_eq!(normalize_math(text), text);
        }
    }

    #[test]
    fn test_latex_input_is_stable() {
        for text in [
            r"\begin{pmatrix} 1 & 2 \end{pmatrix}",
            r"\begin{matrix} a \\ b \end{matrix}",
            r"\sqrt{2} + \frac{1}{2}",
        ] {
            assert_eq!(normalize_math(text), text);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "left ( matrix{1 # 2 ## 3 # 4} right ) and {1} over {2}",
            "{a} over {b} over {c} over {d}",
            "sqrt{ sqrt{x} } + matrix{ {1} over {2} # 3 }",
            "Q: left [ bmatrix{1#2##3#4} right ] ==== #sqrt{4}",
            "plain text with # and ## signs",
        ];
        for text in samples {
            let once = normalize_math(text);
            assert_eq!(normalize_math(&once), once, "not idempotent for {:?}", text);
        }
    }
}
