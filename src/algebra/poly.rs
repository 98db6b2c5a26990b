//! Multivariate polynomials in canonical form.
//!
//! Expanding an expression to a map from monomials to coefficients gives an
//! exact equality test for the polynomial fragment of the grammar: two
//! expressions agree iff their difference expands to (near) zero everywhere.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{format_number, Expr};

/// Variable name to exponent, e.g. `x^2*y` is `{x: 2, y: 1}`.
type Monomial = BTreeMap<String, u32>;

/// Highest integer power `from_expr` will expand. Anything above this is
/// handed to the sampling fallback instead of blowing up term counts.
const MAX_EXPANSION_POWER: u32 = 16;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, f64>,
}

impl Polynomial {
    fn constant(value: f64) -> Self {
        let mut poly = Polynomial::default();
        poly.insert(Monomial::new(), value);
        poly
    }

    fn variable(name: &str) -> Self {
        let mut poly = Polynomial::default();
        let mut monomial = Monomial::new();
        monomial.insert(name.to_string(), 1);
        poly.insert(monomial, 1.0);
        poly
    }

    fn insert(&mut self, monomial: Monomial, coefficient: f64) {
        let updated = {
            let entry = self.terms.entry(monomial.clone()).or_insert(0.0);
            *entry += coefficient;
            *entry
        };
        if updated == 0.0 {
            self.terms.remove(&monomial);
        }
    }

    /// Expands `expr` into canonical form, or `None` when it is not a
    /// polynomial: division by a non-constant, non-integer or oversized
    /// exponents, and function calls all fall outside the fragment.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Num(value) => Some(Polynomial::constant(*value)),
            Expr::Var(name) => Some(Polynomial::variable(name)),
            Expr::Neg(inner) => Some(Polynomial::from_expr(inner)?.neg()),
            Expr::Add(a, b) => Some(Polynomial::from_expr(a)?.add(&Polynomial::from_expr(b)?)),
            Expr::Sub(a, b) => Some(Polynomial::from_expr(a)?.sub(&Polynomial::from_expr(b)?)),
            Expr::Mul(a, b) => Some(Polynomial::from_expr(a)?.mul(&Polynomial::from_expr(b)?)),
            Expr::Div(a, b) => {
                let divisor = Polynomial::from_expr(b)?.as_constant()?;
                if divisor == 0.0 {
                    return None;
                }
                Some(Polynomial::from_expr(a)?.scale(1.0 / divisor))
            }
            Expr::Pow(base, exponent) => {
                let power = Polynomial::from_expr(exponent)?.as_constant()?;
                if power < 0.0 || power.fract() != 0.0 || power > MAX_EXPANSION_POWER as f64 {
                    return None;
                }
                Some(Polynomial::from_expr(base)?.pow(power as u32))
            }
            Expr::Call(..) => None,
        }
    }

    /// The constant value when the polynomial has no variable terms.
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.len() {
            0 => Some(0.0),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(monomial, _)| monomial.is_empty())
                .map(|(_, coefficient)| *coefficient),
            _ => None,
        }
    }

    pub fn is_zero(&self, epsilon: f64) -> bool {
        self.terms.values().all(|c| c.abs() <= epsilon)
    }

    fn add(&self, other: &Polynomial) -> Polynomial {
        let mut result = self.clone();
        for (monomial, coefficient) in &other.terms {
            result.insert(monomial.clone(), *coefficient);
        }
        result
    }

    fn sub(&self, other: &Polynomial) -> Polynomial {
        self.add(&other.neg())
    }

    fn neg(&self) -> Polynomial {
        self.scale(-1.0)
    }

    fn scale(&self, factor: f64) -> Polynomial {
        let mut result = Polynomial::default();
        for (monomial, coefficient) in &self.terms {
            result.insert(monomial.clone(), coefficient * factor);
        }
        result
    }

    fn mul(&self, other: &Polynomial) -> Polynomial {
        let mut result = Polynomial::default();
        for (left, left_coefficient) in &self.terms {
            for (right, right_coefficient) in &other.terms {
                let mut merged = left.clone();
                for (name, power) in right {
                    *merged.entry(name.clone()).or_insert(0) += power;
                }
                result.insert(merged, left_coefficient * right_coefficient);
            }
        }
        result
    }

    fn pow(&self, power: u32) -> Polynomial {
        let mut result = Polynomial::constant(1.0);
        for _ in 0..power {
            result = result.mul(self);
        }
        result
    }
}

fn total_degree(monomial: &Monomial) -> u32 {
    monomial.values().sum()
}

// Graded lexicographic order: within one degree, the higher power of the
// alphabetically earliest variable comes first, so x^2 precedes x*y.
fn monomial_order(a: &Monomial, b: &Monomial) -> Ordering {
    let mut names: BTreeSet<&String> = a.keys().collect();
    names.extend(b.keys());
    for name in names {
        let left = a.get(name).copied().unwrap_or(0);
        let right = b.get(name).copied().unwrap_or(0);
        match right.cmp(&left) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        let mut terms: Vec<(&Monomial, f64)> =
            self.terms.iter().map(|(m, c)| (m, *c)).collect();
        terms.sort_by(|(a, _), (b, _)| {
            total_degree(b)
                .cmp(&total_degree(a))
                .then_with(|| monomial_order(a, b))
        });

        for (index, (monomial, coefficient)) in terms.iter().enumerate() {
            if index == 0 {
                if *coefficient < 0.0 {
                    write!(f, "-")?;
                }
            } else if *coefficient < 0.0 {
                write!(f, " - ")?;
            } else {
                write!(f, " + ")?;
            }
            let magnitude = coefficient.abs();
            if monomial.is_empty() {
                write!(f, "{}", format_number(magnitude))?;
                continue;
            }
            if magnitude != 1.0 {
                write!(f, "{}", format_number(magnitude))?;
            }
            for (position, (name, power)) in monomial.iter().enumerate() {
                if position > 0 {
                    write!(f, "*")?;
                }
                if *power == 1 {
                    write!(f, "{name}")?;
                } else {
                    write!(f, "{name}^{power}")?;
                }
            }
        }
        Ok(())
    }
}
