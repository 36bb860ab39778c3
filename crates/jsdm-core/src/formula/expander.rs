//! Expansion of a parsed right-hand side into an ordered term list
//!
//! Crossings, powers of sums, `.` and parenthesized sums are multiplied out,
//! duplicate terms removed (first occurrence wins) and the result ordered
//! stably by interaction order, so the term list is a pure function of the
//! formula and the available column names.

use super::parser::Expr;
use super::term::{Factor, Term};
use crate::formula::error::FormulaResult;

/// Expands formula expressions into terms
pub struct FormulaExpander<'a> {
    columns: &'a [&'a str],
    response: Option<&'a str>,
}

/// Result of expanding a right-hand side
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub has_intercept: bool,
    pub terms: Vec<Term>,
}

impl<'a> FormulaExpander<'a> {
    /// Create an expander resolving `.` against `columns`
    pub fn new(columns: &'a [&'a str], response: Option<&'a str>) -> Self {
        Self { columns, response }
    }

    /// Fully expand a right-hand side
    pub fn expand(&self, rhs: &Expr) -> FormulaResult<Expansion> {
        let mut has_intercept = true;
        let mut terms = Vec::new();
        let mut removed = Vec::new();

        let items: &[Expr] = match rhs {
            Expr::Sum(items) => items,
            other => std::slice::from_ref(other),
        };

        for item in items {
            match item {
                Expr::Intercept(keep) => has_intercept = *keep,
                Expr::Remove(inner) => match inner.as_ref() {
                    Expr::Intercept(keep) => has_intercept = !keep,
                    other => removed.extend(self.terms(other)?),
                },
                other => terms.extend(self.terms(other)?),
            }
        }

        let mut terms = dedup(terms);
        terms.retain(|t| !removed.iter().any(|r| r.same_as(t)));
        // Stable: main effects first, then two-way interactions, ...
        terms.sort_by_key(|t| t.order());

        Ok(Expansion {
            has_intercept,
            terms,
        })
    }

    /// Terms generated by an expression, ignoring intercept literals
    fn terms(&self, expr: &Expr) -> FormulaResult<Vec<Term>> {
        let terms = match expr {
            Expr::Factor(factor) => vec![Term::main(factor.clone())],
            Expr::Dot => self
                .columns
                .iter()
                .filter(|c| Some(**c) != self.response)
                .map(|c| Term::main(Factor::variable(c)))
                .collect(),
            Expr::Intercept(_) => Vec::new(),
            Expr::Sum(items) => {
                let mut terms = Vec::new();
                let mut removed = Vec::new();
                for item in items {
                    match item {
                        Expr::Remove(inner) => removed.extend(self.terms(inner)?),
                        other => terms.extend(self.terms(other)?),
                    }
                }
                terms.retain(|t| !removed.iter().any(|r: &Term| r.same_as(t)));
                terms
            }
            // A removal outside a sum has nothing to remove from
            Expr::Remove(_) => Vec::new(),
            Expr::Interaction(left, right) => interact(&self.terms(left)?, &self.terms(right)?),
            Expr::Crossing(left, right) => {
                let left = self.terms(left)?;
                let right = self.terms(right)?;
                let products = interact(&left, &right);
                left.into_iter().chain(right).chain(products).collect()
            }
            Expr::CrossPower(base, degree) => {
                let base = self.terms(base)?;
                let mut result = base.clone();
                for _ in 1..*degree {
                    let products: Vec<Term> = result
                        .iter()
                        .flat_map(|l| base.iter().map(move |r| l.merge(r)))
                        .collect();
                    let grown = dedup(result.iter().cloned().chain(products).collect());
                    // Every product of the base terms is already present
                    if grown.len() == result.len() {
                        break;
                    }
                    result = grown;
                }
                result
            }
        };

        Ok(dedup(terms))
    }
}

/// Every pairwise product; the right-hand term varies slowest
fn interact(left: &[Term], right: &[Term]) -> Vec<Term> {
    right
        .iter()
        .flat_map(|r| left.iter().map(move |l| l.merge(r)))
        .collect()
}

/// Drop repeated terms, keeping the first occurrence
fn dedup(terms: Vec<Term>) -> Vec<Term> {
    let mut unique: Vec<Term> = Vec::with_capacity(terms.len());
    for term in terms {
        if !unique.iter().any(|u| u.same_as(&term)) {
            unique.push(term);
        }
    }
    unique
}
