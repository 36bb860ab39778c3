//! Formula parser for R-style formulas
//!
//! This parser implements R-style formula syntax with support for:
//! - Optional response: y ~ x1 + x2, ~ x1 + x2
//! - Intercept control: ~ 0 + x1, ~ x1 - 1, ~ 1
//! - Interactions: x1:x2, x1:x2:x3
//! - Crossing: x1*x2 (x1 + x2 + x1:x2)
//! - Powers: x^2, and (x1 + x2 + x3)^2 for all interactions up to order 2
//! - All remaining columns: ~ .
//! - Term removal: ~ . - x3
//! - Function calls: log(x), sqrt(x), I(x^2), poly(x, 2)
//!
//! Operator precedence follows R: `^` binds tightest, then `:`, then `*`,
//! then `+` and `-`.

use crate::formula::error::{FormulaError, FormulaResult};
use crate::formula::term::Factor;
use crate::formula::Formula;
use std::iter::Peekable;
use std::str::Chars;

/// Right-hand side expression tree, before expansion into terms
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A variable, power or function application
    Factor(Factor),
    /// `.`: every column except the response
    Dot,
    /// Literal `1` (intercept) or `0` (no intercept)
    Intercept(bool),
    /// Terms joined by `+`
    Sum(Vec<Expr>),
    /// A term preceded by `-`
    Remove(Box<Expr>),
    /// `a:b`
    Interaction(Box<Expr>, Box<Expr>),
    /// `a*b`
    Crossing(Box<Expr>, Box<Expr>),
    /// `(a + b)^k`
    CrossPower(Box<Expr>, u32),
}

/// Formula parser
pub struct FormulaParser<'a> {
    chars: Peekable<Chars<'a>>,
    original: String,
    position: usize,
}

impl<'a> FormulaParser<'a> {
    /// Create a new parser
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            original: input.to_string(),
            position: 0,
        }
    }

    /// Parse a formula
    pub fn parse(formula: &str) -> FormulaResult<Formula> {
        let mut parser = FormulaParser::new(formula);
        parser.parse_formula()
    }

    /// Parse the entire formula
    fn parse_formula(&mut self) -> FormulaResult<Formula> {
        self.skip_whitespace();

        if self.chars.peek().is_none() {
            return Err(FormulaError::syntax(self.position, "Empty formula"));
        }

        let response = self.parse_response()?;
        self.parse_tilde()?;

        self.skip_whitespace();
        let rhs = if self.chars.peek().is_none() {
            Expr::Sum(Vec::new())
        } else {
            self.parse_sum()?
        };

        self.skip_whitespace();
        if self.chars.peek().is_some() {
            let remaining: String = self.chars.clone().collect();
            return Err(FormulaError::syntax_with_context(
                self.position,
                "Trailing characters after formula",
                format!("Unexpected: '{}'", remaining),
            ));
        }

        Ok(Formula {
            response,
            rhs,
            original: self.original.trim().to_string(),
        })
    }

    /// Parse response variable (left side of ~)
    fn parse_response(&mut self) -> FormulaResult<Option<String>> {
        self.skip_whitespace();

        if self.peek_char() == Some('~') {
            return Ok(None);
        }

        let ident = self.parse_identifier()?;

        self.skip_whitespace();
        if self.peek_char() == Some('~') {
            Ok(Some(ident))
        } else {
            Err(FormulaError::syntax_with_context(
                self.position,
                "Expected '~' after response variable",
                format!("Found '{}' instead", self.peek_char().unwrap_or(' ')),
            ))
        }
    }

    /// Parse terms separated by `+` or `-`
    fn parse_sum(&mut self) -> FormulaResult<Expr> {
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            let negative = match self.peek_char() {
                Some('+') if items.is_empty() => {
                    return Err(FormulaError::syntax(
                        self.position,
                        "Expected term before '+'",
                    ));
                }
                Some('+') => {
                    self.advance();
                    false
                }
                Some('-') => {
                    self.advance();
                    true
                }
                _ if items.is_empty() => false,
                _ => break,
            };

            self.skip_whitespace();
            match self.peek_char() {
                None | Some(')') | Some('+') | Some('-') => {
                    return Err(FormulaError::syntax(
                        self.position,
                        "Expected term after operator",
                    ));
                }
                _ => {}
            }

            let term = self.parse_crossing()?;
            items.push(if negative {
                Expr::Remove(Box::new(term))
            } else {
                term
            });

            self.skip_whitespace();
            if !matches!(self.peek_char(), Some('+') | Some('-')) {
                break;
            }
        }

        Ok(Expr::Sum(items))
    }

    /// Parse `a*b*c`
    fn parse_crossing(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_interaction()?;

        loop {
            self.skip_whitespace();
            if self.peek_char() != Some('*') {
                break;
            }
            self.advance();
            let right = self.parse_interaction()?;
            left = Expr::Crossing(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// Parse `a:b:c`
    fn parse_interaction(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_power()?;

        loop {
            self.skip_whitespace();
            if self.peek_char() != Some(':') {
                break;
            }
            self.advance();
            let right = self.parse_power()?;
            left = Expr::Interaction(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// Parse `x^k` or `(a + b)^k`
    fn parse_power(&mut self) -> FormulaResult<Expr> {
        let base = self.parse_primary()?;

        self.skip_whitespace();
        if self.peek_char() != Some('^') {
            return Ok(base);
        }

        let caret = self.position;
        self.advance();
        self.skip_whitespace();
        let exponent = self.parse_exponent(caret)?;

        match base {
            Expr::Factor(Factor::Variable(name)) => Ok(Expr::Factor(Factor::power(&name, exponent))),
            sum @ Expr::Sum(_) => Ok(Expr::CrossPower(Box::new(sum), exponent)),
            _ => Err(FormulaError::syntax(
                caret,
                "'^' applies to a variable or a parenthesized sum of terms",
            )),
        }
    }

    /// Parse a variable, function call, literal, `.` or parenthesized sum
    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        self.skip_whitespace();

        match self.peek_char() {
            Some('(') => self.parse_parenthesized_expression(),
            Some('.') => {
                self.advance();
                Ok(Expr::Dot)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.position;
                match self.parse_integer()? {
                    0 => Ok(Expr::Intercept(false)),
                    1 => Ok(Expr::Intercept(true)),
                    n => Err(FormulaError::syntax(
                        start,
                        format!("Numeric literal {} is not a term; only 0 or 1 allowed", n),
                    )),
                }
            }
            Some(c) if c.is_alphabetic() => self.parse_identifier_or_function(),
            Some(c) => Err(FormulaError::syntax(
                self.position,
                format!("Unexpected character '{}' in term", c),
            )),
            None => Err(FormulaError::syntax(
                self.position,
                "Unexpected end of input, expected term",
            )),
        }
    }

    /// Parse a parenthesized expression
    fn parse_parenthesized_expression(&mut self) -> FormulaResult<Expr> {
        self.advance(); // Skip '('

        let inner = self.parse_sum()?;

        self.skip_whitespace();
        match self.chars.next() {
            Some(')') => {
                self.position += 1;
                Ok(inner)
            }
            Some(c) => Err(FormulaError::syntax(
                self.position,
                format!("Expected ')', found '{}'", c),
            )),
            None => Err(FormulaError::syntax(
                self.position,
                "Unexpected end of input, expected ')'",
            )),
        }
    }

    /// Parse an identifier or function call
    fn parse_identifier_or_function(&mut self) -> FormulaResult<Expr> {
        let ident = self.parse_identifier()?;

        self.skip_whitespace();
        if self.peek_char() == Some('(') {
            self.parse_function_call(&ident).map(Expr::Factor)
        } else {
            Ok(Expr::Factor(Factor::variable(&ident)))
        }
    }

    /// Parse a function call: `f(x)`, `I(x^2)`, `poly(x, 2)`
    fn parse_function_call(&mut self, func_name: &str) -> FormulaResult<Factor> {
        let start = self.position;
        self.advance(); // Skip '('

        let argument = match self.parse_power()? {
            Expr::Factor(factor) => factor,
            _ => {
                return Err(FormulaError::syntax(
                    start,
                    format!(
                        "Function '{}' expects a variable, power or function argument",
                        func_name
                    ),
                ));
            }
        };

        self.skip_whitespace();
        let degree = if self.peek_char() == Some(',') {
            self.advance();
            self.skip_whitespace();
            Some(self.parse_exponent(start)?)
        } else {
            None
        };

        self.skip_whitespace();
        match self.chars.next() {
            Some(')') => self.position += 1,
            Some(c) => {
                return Err(FormulaError::syntax(
                    self.position,
                    format!("Expected ',' or ')', found '{}'", c),
                ));
            }
            None => {
                return Err(FormulaError::syntax(
                    self.position,
                    "Unexpected end of input, expected ')'",
                ));
            }
        }

        Factor::function(func_name, argument, degree)
    }

    /// Parse an unsigned integer literal
    fn parse_integer(&mut self) -> FormulaResult<u32> {
        let start = self.position;
        let mut literal = String::new();

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                literal.push(c);
                self.advance();
            } else {
                break;
            }
        }

        literal
            .parse::<u32>()
            .map_err(|_| FormulaError::syntax(start, "Expected an integer"))
    }

    /// Parse a power or polynomial degree in `1..=i32::MAX`
    fn parse_exponent(&mut self, at: usize) -> FormulaResult<u32> {
        let exponent = self.parse_integer()?;
        if exponent < 1 {
            return Err(FormulaError::syntax(at, "Exponent must be >= 1"));
        }
        if i32::try_from(exponent).is_err() {
            return Err(FormulaError::syntax(
                at,
                format!("Exponent {} is too large", exponent),
            ));
        }
        Ok(exponent)
    }

    /// Parse an identifier
    fn parse_identifier(&mut self) -> FormulaResult<String> {
        let mut ident = String::new();
        let start_pos = self.position;

        // First character must be alphabetic
        match self.chars.next() {
            Some(c) if c.is_alphabetic() => {
                self.position += 1;
                ident.push(c);
            }
            Some(c) => {
                return Err(FormulaError::syntax(
                    start_pos,
                    format!("Identifier must start with a letter, found '{}'", c),
                ));
            }
            None => {
                return Err(FormulaError::syntax(
                    start_pos,
                    "Unexpected end of input, expected identifier",
                ));
            }
        }

        // Subsequent characters can be alphanumeric, underscore, or period
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        Ok(ident)
    }

    /// Parse tilde operator
    fn parse_tilde(&mut self) -> FormulaResult<()> {
        self.skip_whitespace();

        match self.chars.next() {
            Some('~') => {
                self.position += 1;
                Ok(())
            }
            Some(c) => Err(FormulaError::syntax(
                self.position,
                format!("Expected '~', found '{}'", c),
            )),
            None => Err(FormulaError::syntax(
                self.position,
                "Unexpected end of formula, expected '~'",
            )),
        }
    }

    /// Skip whitespace
    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) {
        if self.chars.next().is_some() {
            self.position += 1;
        }
    }

    /// Peek at next character
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }
}
