//! Answer grading: deciding whether a typed reply matches an accepted answer.
//!
//! A question's answer field lists alternatives separated by `" or "`, e.g.
//! `"5 or x=5"`. A candidate matches when any alternative accepts it through
//! one of three strategies, tried cheapest first:
//!
//! 1. literal comparison of normalized text,
//! 2. numeric comparison under tolerance, with constant expressions such as
//!    `15/4` or `sqrt(144)` folded to their value,
//! 3. symbolic equivalence, for candidates and alternatives that look
//!    algebraic.

use std::collections::HashMap;

use crate::algebra::{self, Expr};

/// Relative and absolute tolerance for numeric comparison.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Canonical form used for all textual comparison: trimmed, lowercased, with
/// digit-grouping commas removed (`1,024` becomes `1024`). Commas that do not
/// sit between two digits survive, so `x=3, y=2` keeps its separator.
/// Applying the function twice changes nothing.
pub fn normalize(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();
    let mut out = String::with_capacity(lowered.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let after_digit = out.chars().last().is_some_and(|p| p.is_ascii_digit());
            let before_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if after_digit && before_digit {
                continue;
            }
        }
        out.push(c);
    }
    out
}

// Mirrors the gate used when deciding whether symbolic comparison is worth
// attempting: anything with a letter or an operator-ish character.
fn looks_algebraic(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_alphabetic() || "()^*/+-=".contains(c))
}

/// An expression ready for equivalence checks. Equations are reduced to the
/// difference of their sides, and remember that they were equations so the
/// opposite orientation (`5=x` vs `x=5`) still matches.
#[derive(Debug, Clone)]
struct Comparable {
    expr: Expr,
    from_equation: bool,
}

impl Comparable {
    fn matches(&self, other: &Comparable, tolerance: f64) -> bool {
        if algebra::equivalent(&self.expr, &other.expr, tolerance) {
            return true;
        }
        (self.from_equation || other.from_equation)
            && algebra::equivalent(
                &self.expr,
                &Expr::Neg(Box::new(other.expr.clone())),
                tolerance,
            )
    }
}

/// One alternative from the answer field, with everything the grading loop
/// needs precomputed at load time.
#[derive(Debug, Clone)]
struct AcceptedForm {
    text: String,
    numeric: Option<f64>,
    /// Digits after the decimal point in the written form; `78.54` has 2.
    decimals: u32,
    algebraic: bool,
    expr: Option<Comparable>,
}

impl AcceptedForm {
    fn new(text: &str) -> Self {
        let numeric = text.parse::<f64>().ok().filter(|v| v.is_finite());
        let decimals = match (numeric, text.split_once('.')) {
            (Some(_), Some((_, fraction))) => {
                fraction.chars().take_while(|c| c.is_ascii_digit()).count() as u32
            }
            _ => 0,
        };
        let algebraic = looks_algebraic(text);
        let expr = if algebraic { parse_comparable(text) } else { None };
        AcceptedForm {
            text: text.to_string(),
            numeric,
            decimals,
            algebraic,
            expr,
        }
    }

    /// Numeric acceptance around this form. Decimal forms additionally admit
    /// anything that rounds to the written precision, so `78.5399` passes
    /// for `78.54`; integer forms stay strict.
    fn accepts_number(&self, value: f64, tolerance: f64) -> bool {
        let Some(expected) = self.numeric else {
            return false;
        };
        if algebra::is_close(value, expected, tolerance) {
            return true;
        }
        self.decimals >= 1
            && (value - expected).abs() <= 0.5 * 10f64.powi(-(self.decimals as i32))
    }
}

/// A parsed answer field: the original text for display plus its normalized
/// alternatives ready for grading.
#[derive(Debug, Clone)]
pub struct AnswerSpec {
    raw: String,
    forms: Vec<AcceptedForm>,
}

impl AnswerSpec {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize(raw);
        let forms = normalized
            .split(" or ")
            .map(str::trim)
            .filter(|form| !form.is_empty())
            .map(AcceptedForm::new)
            .collect();
        AnswerSpec {
            raw: raw.trim().to_string(),
            forms,
        }
    }

    /// The answer as written, for revealing after a miss.
    pub fn display(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

fn parse_comparable(text: &str) -> Option<Comparable> {
    if let Some((lhs, rhs)) = text.split_once('=') {
        let left = algebra::parse(lhs).ok()?;
        let right = algebra::parse(rhs).ok()?;
        return Some(Comparable {
            expr: Expr::Sub(Box::new(left), Box::new(right)),
            from_equation: true,
        });
    }
    algebra::parse(text).ok().map(|expr| Comparable {
        expr,
        from_equation: false,
    })
}

// A candidate's numeric value: a plain float literal, or a variable-free
// expression folded to one.
fn candidate_number(normalized: &str) -> Option<f64> {
    if let Ok(value) = normalized.parse::<f64>() {
        return value.is_finite().then_some(value);
    }
    let expr = algebra::parse(normalized).ok()?;
    if !expr.variables().is_empty() {
        return None;
    }
    let value = expr.eval(&HashMap::new()).ok()?;
    value.is_finite().then_some(value)
}

/// Grades `candidate` against `spec`. Never errors: anything unparseable
/// simply fails the strategies that needed parsing.
pub fn is_correct(candidate: &str, spec: &AnswerSpec, tolerance: f64) -> bool {
    let normalized = normalize(candidate);
    if normalized.is_empty() {
        return false;
    }

    if spec.forms.iter().any(|form| form.text == normalized) {
        return true;
    }

    if let Some(value) = candidate_number(&normalized) {
        if spec
            .forms
            .iter()
            .any(|form| form.accepts_number(value, tolerance))
        {
            return true;
        }
    }

    if looks_algebraic(&normalized) && spec.forms.iter().any(|form| form.algebraic) {
        if let Some(parsed) = parse_comparable(&normalized) {
            return spec
                .forms
                .iter()
                .filter_map(|form| form.expr.as_ref())
                .any(|expr| parsed.matches(expr, tolerance));
        }
    }

    false
}
