// Input normalization for formula strings
//
// Runs before any parse strategy: strips redundant delimiters, unifies the
// alternate spellings of common operators and fraction/root macros, and
// repairs the brace-less shorthand forms LLMs and users both produce.

use once_cell::sync::Lazy;
use regex::Regex;

static FRAC_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\frac\s*(\d)\s*(\d)").unwrap());
static FRAC_BRACE_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\frac\s*\{([^{}]*)\}\s*(\d)").unwrap());
static FRAC_DIGIT_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\frac\s*(\d)\s*\{").unwrap());
static SQRT_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\sqrt\s*(\d)").unwrap());
static CARET_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^\s*\(([^()]*)\)").unwrap());
static MULTI_BACKSLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\{2,}").unwrap());

/// Normalize a formula string for parsing.
pub fn normalize(input: &str) -> String {
    let mut s = input.trim().to_string();

    // Delimiters and spacing macros that carry no meaning for parsing
    for junk in ["$", "\\!", "\\,", "\\;", "\\left", "\\right.", "\\right", "\""] {
        s = s.replace(junk, "");
    }

    // Unicode operators to their ASCII/LaTeX spellings
    s = s
        .replace('\u{2212}', "-") // minus sign
        .replace('\u{00d7}', "*")
        .replace('\u{00f7}', "/")
        .replace('\u{03c0}', "\\pi")
        .replace('\u{221a}', "\\sqrt")
        .replace('\u{00b2}', "^{2}")
        .replace('\u{00b3}', "^{3}")
        .replace('\u{2265}', ">=")
        .replace('\u{2264}', "<=")
        .replace('\u{2260}', "!=");

    // Operator spellings
    s = s
        .replace("**", "^")
        .replace("\\cdot", "*")
        .replace("\\times", "*")
        .replace("\\div", "/")
        .replace("dfrac", "frac")
        .replace("tfrac", "frac");

    // Comparison operators to a single ASCII form (ordering matters:
    // longer spellings first)
    s = s
        .replace("\\geq", ">=")
        .replace("\\leq", "<=")
        .replace("\\neq", "!=")
        .replace("\\ge", ">=")
        .replace("\\le", "<=")
        .replace("\\ne", "!=");

    // Degree notation
    s = s
        .replace("^\\circ", "*\\pi/180")
        .replace('\u{00b0}', "*\\pi/180");

    s = MULTI_BACKSLASH.replace_all(&s, "\\").into_owned();

    // Brace repair for shorthand forms
    s = FRAC_DIGITS.replace_all(&s, "\\frac{$1}{$2}").into_owned();
    s = FRAC_BRACE_DIGIT
        .replace_all(&s, "\\frac{$1}{$2}")
        .into_owned();
    s = FRAC_DIGIT_BRACE.replace_all(&s, "\\frac{$1}{").into_owned();
    s = SQRT_DIGIT.replace_all(&s, "\\sqrt{$1}").into_owned();
    s = CARET_PAREN.replace_all(&s, "^{$1}").into_owned();

    s.trim().to_string()
}

/// Extract the content of `\boxed{...}`, handling nested braces. Returns
/// `None` when the text contains no boxed answer.
pub fn find_boxed_answer(text: &str) -> Option<String> {
    let start = text.rfind("boxed")? + "boxed".len();
    let rest = &text[start..];
    let mut chars = rest.chars();

    match chars.next() {
        Some('{') => {
            let mut depth = 1;
            let mut answer = String::new();
            for c in chars {
                match c {
                    '{' => {
                        depth += 1;
                        answer.push(c);
                    }
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(answer);
                        }
                        answer.push(c);
                    }
                    _ => answer.push(c),
                }
            }
            None
        }
        Some(_) => {
            let answer = rest.split('$').next().unwrap_or("").trim();
            if answer.is_empty() {
                None
            } else {
                Some(answer.to_string())
            }
        }
        None => None,
    }
}
