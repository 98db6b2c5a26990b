//! A small expression engine for grading math answers: parsing, numeric
//! evaluation, polynomial expansion and a symbolic-equivalence check.
//!
//! Two expressions count as equivalent when their difference expands to the
//! zero polynomial, or, for non-polynomial shapes like `sin(x)^2 + cos(x)^2`,
//! when they agree at every point of a fixed sample table.

pub mod parser;
pub mod poly;

pub use parser::{parse, ParseError};
pub use poly::Polynomial;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Log,
    Exp,
    Abs,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "sqrt" => Func::Sqrt,
            "log" | "ln" => Func::Log,
            "exp" => Func::Exp,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Sqrt => "sqrt",
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Abs => "abs",
        }
    }

    fn apply(&self, value: f64) -> f64 {
        match self {
            Func::Sin => value.sin(),
            Func::Cos => value.cos(),
            Func::Tan => value.tan(),
            Func::Sqrt => value.sqrt(),
            Func::Log => value.ln(),
            Func::Exp => value.exp(),
            Func::Abs => value.abs(),
        }
    }
}

impl Expr {
    /// Evaluates the expression with the given variable assignment.
    ///
    /// Domain misses (division by zero, `sqrt` of a negative) surface as
    /// non-finite values rather than errors; callers filter on `is_finite`.
    pub fn eval(&self, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
        Ok(match self {
            Expr::Num(value) => *value,
            Expr::Var(name) => *vars
                .get(name)
                .ok_or_else(|| EvalError::UnknownVariable(name.clone()))?,
            Expr::Neg(inner) => -inner.eval(vars)?,
            Expr::Add(a, b) => a.eval(vars)? + b.eval(vars)?,
            Expr::Sub(a, b) => a.eval(vars)? - b.eval(vars)?,
            Expr::Mul(a, b) => a.eval(vars)? * b.eval(vars)?,
            Expr::Div(a, b) => a.eval(vars)? / b.eval(vars)?,
            Expr::Pow(a, b) => a.eval(vars)?.powf(b.eval(vars)?),
            Expr::Call(func, arg) => func.apply(arg.eval(vars)?),
        })
    }

    /// All variable names appearing in the expression, sorted.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                names.insert(name.clone());
            }
            Expr::Neg(inner) | Expr::Call(_, inner) => inner.collect_variables(names),
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Pow(a, b) => {
                a.collect_variables(names);
                b.collect_variables(names);
            }
        }
    }

    /// Symbolic derivative with respect to `var`.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Num(_) => Expr::Num(0.0),
            Expr::Var(name) => {
                if name == var {
                    Expr::Num(1.0)
                } else {
                    Expr::Num(0.0)
                }
            }
            Expr::Neg(inner) => neg(inner.diff(var)),
            Expr::Add(a, b) => add(a.diff(var), b.diff(var)),
            Expr::Sub(a, b) => sub(a.diff(var), b.diff(var)),
            Expr::Mul(a, b) => add(
                mul(a.diff(var), (**b).clone()),
                mul((**a).clone(), b.diff(var)),
            ),
            Expr::Div(a, b) => div(
                sub(
                    mul(a.diff(var), (**b).clone()),
                    mul((**a).clone(), b.diff(var)),
                ),
                pow((**b).clone(), Expr::Num(2.0)),
            ),
            Expr::Pow(base, exponent) => match (&**base, &**exponent) {
                // power rule with the chain rule folded in
                (_, Expr::Num(n)) => mul(
                    mul(Expr::Num(*n), pow((**base).clone(), Expr::Num(n - 1.0))),
                    base.diff(var),
                ),
                // constant base: d/dx c^u = c^u * ln(c) * u'
                (Expr::Num(c), _) => {
                    let ln_c = if *c == std::f64::consts::E {
                        1.0
                    } else {
                        c.ln()
                    };
                    mul(
                        mul(
                            pow((**base).clone(), (**exponent).clone()),
                            Expr::Num(ln_c),
                        ),
                        exponent.diff(var),
                    )
                }
                // general a^b = a^b * (b' ln a + b a'/a)
                _ => mul(
                    pow((**base).clone(), (**exponent).clone()),
                    add(
                        mul(
                            exponent.diff(var),
                            Expr::Call(Func::Log, base.clone()),
                        ),
                        div(
                            mul((**exponent).clone(), base.diff(var)),
                            (**base).clone(),
                        ),
                    ),
                ),
            },
            Expr::Call(func, arg) => {
                let outer = match func {
                    Func::Sin => Expr::Call(Func::Cos, arg.clone()),
                    Func::Cos => neg(Expr::Call(Func::Sin, arg.clone())),
                    Func::Tan => div(
                        Expr::Num(1.0),
                        pow(Expr::Call(Func::Cos, arg.clone()), Expr::Num(2.0)),
                    ),
                    Func::Sqrt => div(
                        Expr::Num(1.0),
                        mul(Expr::Num(2.0), Expr::Call(Func::Sqrt, arg.clone())),
                    ),
                    Func::Log => div(Expr::Num(1.0), (**arg).clone()),
                    Func::Exp => Expr::Call(Func::Exp, arg.clone()),
                    Func::Abs => div((**arg).clone(), Expr::Call(Func::Abs, arg.clone())),
                };
                mul(outer, arg.diff(var))
            }
        }
    }

    fn level(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Mul(..) | Expr::Div(..) | Expr::Neg(..) => 2,
            Expr::Pow(..) => 3,
            Expr::Num(value) if *value < 0.0 => 1,
            Expr::Num(_) | Expr::Var(_) | Expr::Call(..) => 4,
        }
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.level() < min {
            write!(f, "(")?;
            self.fmt_level(f, 0)?;
            return write!(f, ")");
        }
        match self {
            Expr::Num(value) => write!(f, "{}", format_number(*value)),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_level(f, 3)
            }
            Expr::Add(a, b) => {
                a.fmt_level(f, 1)?;
                write!(f, " + ")?;
                b.fmt_level(f, 1)
            }
            Expr::Sub(a, b) => {
                a.fmt_level(f, 1)?;
                write!(f, " - ")?;
                b.fmt_level(f, 2)
            }
            Expr::Mul(a, b) => {
                a.fmt_level(f, 2)?;
                write!(f, "*")?;
                b.fmt_level(f, 2)
            }
            Expr::Div(a, b) => {
                a.fmt_level(f, 2)?;
                write!(f, " / ")?;
                b.fmt_level(f, 3)
            }
            Expr::Pow(a, b) => {
                a.fmt_level(f, 4)?;
                write!(f, "^")?;
                b.fmt_level(f, 3)
            }
            Expr::Call(func, arg) => {
                write!(f, "{}(", func.name())?;
                arg.fmt_level(f, 0)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_level(f, 0)
    }
}

// Folding constructors so derivatives come out readable instead of littered
// with `0*…` and `^1` noise.

fn add(a: Expr, b: Expr) -> Expr {
    if a == Expr::Num(0.0) {
        return b;
    }
    if b == Expr::Num(0.0) {
        return a;
    }
    Expr::Add(Box::new(a), Box::new(b))
}

fn sub(a: Expr, b: Expr) -> Expr {
    if b == Expr::Num(0.0) {
        return a;
    }
    if a == Expr::Num(0.0) {
        return neg(b);
    }
    Expr::Sub(Box::new(a), Box::new(b))
}

fn neg(a: Expr) -> Expr {
    match a {
        Expr::Num(value) => Expr::Num(-value),
        other => Expr::Neg(Box::new(other)),
    }
}

fn mul(a: Expr, b: Expr) -> Expr {
    if a == Expr::Num(0.0) || b == Expr::Num(0.0) {
        return Expr::Num(0.0);
    }
    if a == Expr::Num(1.0) {
        return b;
    }
    if b == Expr::Num(1.0) {
        return a;
    }
    Expr::Mul(Box::new(a), Box::new(b))
}

fn div(a: Expr, b: Expr) -> Expr {
    if a == Expr::Num(0.0) {
        return Expr::Num(0.0);
    }
    if b == Expr::Num(1.0) {
        return a;
    }
    Expr::Div(Box::new(a), Box::new(b))
}

fn pow(a: Expr, b: Expr) -> Expr {
    if b == Expr::Num(1.0) {
        return a;
    }
    if b == Expr::Num(0.0) {
        return Expr::Num(1.0);
    }
    Expr::Pow(Box::new(a), Box::new(b))
}

/// Formats a value the short way: integers without a trailing `.0`.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Combined relative and absolute closeness, `|a-b| <= max(tol*max(|a|,|b|), tol)`.
pub fn is_close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= (tolerance * a.abs().max(b.abs())).max(tolerance)
}

/// Fixed assignments used when the difference of two expressions cannot be
/// expanded to a polynomial. Mixed signs and non-integers, so that shapes
/// like `abs(x)` vs `x` or `sqrt(x)^2` vs `x` behave sensibly.
const SAMPLE_ROUNDS: [[f64; 4]; 6] = [
    [0.37, -1.19, 2.53, 0.71],
    [1.93, 0.41, -0.67, 2.29],
    [-2.11, 1.57, 0.83, -0.29],
    [2.71, -0.58, 1.31, 3.17],
    [0.13, 2.87, -1.73, 0.59],
    [-0.97, 3.41, 2.03, 1.07],
];

const MIN_VALID_SAMPLES: usize = 3;

/// Whether `a` and `b` denote the same function of their variables.
///
/// Polynomial difference decides exactly when it applies; otherwise both
/// sides are evaluated over [`SAMPLE_ROUNDS`]. Rounds where either side
/// fails to produce a finite value (poles, domain misses) are skipped, and
/// at least [`MIN_VALID_SAMPLES`] surviving rounds are required.
pub fn equivalent(a: &Expr, b: &Expr, tolerance: f64) -> bool {
    let difference = Expr::Sub(Box::new(a.clone()), Box::new(b.clone()));
    if let Some(poly) = Polynomial::from_expr(&difference) {
        return poly.is_zero(tolerance.max(1e-9));
    }
    sampled_equivalent(a, b, tolerance)
}

fn sampled_equivalent(a: &Expr, b: &Expr, tolerance: f64) -> bool {
    let mut names = a.variables();
    names.extend(b.variables());
    let names: Vec<String> = names.into_iter().collect();

    let mut valid_rounds = 0;
    for round in &SAMPLE_ROUNDS {
        let assignment: HashMap<String, f64> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), sample_value(round, i)))
            .collect();
        let (Ok(left), Ok(right)) = (a.eval(&assignment), b.eval(&assignment)) else {
            continue;
        };
        if !left.is_finite() || !right.is_finite() {
            continue;
        }
        if !is_close(left, right, tolerance) {
            return false;
        }
        valid_rounds += 1;
    }
    valid_rounds >= MIN_VALID_SAMPLES
}

fn sample_value(round: &[f64; 4], index: usize) -> f64 {
    round[index % round.len()] + (index / round.len()) as f64 * 0.77
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(input: &str) -> Expr {
        parse(input).expect("expression should parse")
    }

    fn eval_at(input: &str, x: f64) -> f64 {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), x);
        expr(input).eval(&vars).expect("expression should evaluate")
    }

    #[test]
    fn polynomial_equivalence() {
        assert!(equivalent(&expr("(x-3)(x+3)"), &expr("x^2 - 9"), 1e-6));
        assert!(equivalent(&expr("x**2 - x - 6"), &expr("x^2 - x - 6"), 1e-6));
        assert!(!equivalent(&expr("x**2 + x - 6"), &expr("x^2 - x - 6"), 1e-6));
        assert!(equivalent(&expr("2(x + 3) + 4x"), &expr("6x + 6"), 1e-6));
    }

    #[test]
    fn constant_equivalence() {
        assert!(equivalent(&expr("2^10"), &expr("1024"), 1e-6));
        assert!(equivalent(&expr("15/4"), &expr("3.75"), 1e-6));
        assert!(!equivalent(&expr("15/4"), &expr("3.76"), 1e-6));
    }

    #[test]
    fn sampled_equivalence_for_non_polynomials() {
        assert!(equivalent(&expr("sin(x)^2 + cos(x)^2"), &expr("1"), 1e-6));
        assert!(equivalent(&expr("exp(x)"), &expr("e^x"), 1e-6));
        assert!(equivalent(&expr("sqrt(x)*sqrt(x)"), &expr("x"), 1e-6));
        assert!(!equivalent(&expr("abs(x)"), &expr("x"), 1e-6));
        assert!(!equivalent(&expr("sin(x)"), &expr("cos(x)"), 1e-6));
    }

    #[test]
    fn equations_of_one_variable_dont_match_constants() {
        // x - 5 is zero only at x = 5, not everywhere
        assert!(!equivalent(&expr("x - 5"), &expr("0"), 1e-6));
    }

    #[test]
    fn rational_expressions_compare_by_sampling() {
        assert!(equivalent(
            &expr("(x^2 - 1)/(x - 1)"),
            &expr("x + 1"),
            1e-6
        ));
        assert!(!equivalent(&expr("1/(x+1)"), &expr("1/(x-1)"), 1e-6));
    }

    #[test]
    fn derivative_of_polynomials() {
        let d = expr("x^3").diff("x");
        assert!(equivalent(&d, &expr("3x^2"), 1e-6));
        let d = expr("x^2 - 4x + 3").diff("x");
        assert!(equivalent(&d, &expr("2x - 4"), 1e-6));
    }

    #[test]
    fn derivative_of_functions() {
        assert_eq!(expr("sin(x)").diff("x").to_string(), "cos(x)");
        assert_eq!(expr("exp(x)").diff("x").to_string(), "exp(x)");
        // d/dx e^x folds ln(e) away
        assert_eq!(expr("e^x").diff("x").to_string(), "2.718281828459045^x");
    }

    #[test]
    fn derivative_matches_finite_differences() {
        for input in ["x*sin(x)", "sqrt(x)", "log(x)", "x^2 / (x + 1)", "tan(x)"] {
            let d = expr(input).diff("x");
            let mut vars = HashMap::new();
            for x in [0.7, 1.3, 2.1] {
                vars.insert("x".to_string(), x);
                let symbolic = d.eval(&vars).expect("derivative should evaluate");
                let h = 1e-6;
                let numeric = (eval_at(input, x + h) - eval_at(input, x - h)) / (2.0 * h);
                assert!(
                    (symbolic - numeric).abs() < 1e-4,
                    "d/dx {input} at {x}: {symbolic} vs {numeric}"
                );
            }
        }
    }

    #[test]
    fn display_is_reparseable() {
        for input in [
            "x^2 - x - 6",
            "-(x + 1)*(x - 2)",
            "1/(x + 3)",
            "2^x^2",
            "sin(x)*cos(x)",
        ] {
            let original = expr(input);
            let reparsed = expr(&original.to_string());
            assert!(
                equivalent(&original, &reparsed, 1e-9),
                "{input} changed meaning through display"
            );
        }
    }

    #[test]
    fn close_combines_relative_and_absolute() {
        assert!(is_close(1024.0, 1024.000001, 1e-6));
        assert!(is_close(0.0, 1e-7, 1e-6));
        assert!(!is_close(78.54, 79.0, 1e-6));
    }
}
