//! Formula data model: the parser interface, parsed terms, and errors.

use std::fmt;

use polars::prelude::Expr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing a formula.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// The formula text is not valid formula syntax.
    #[error("parse error at position {position}: {message}")]
    Parse {
        /// Byte offset into the formula where the problem was found.
        position: usize,
        /// What was expected or what went wrong.
        message: String,
    },

    /// A call names a function the parser does not know.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A known function was called with bad arguments.
    #[error("invalid argument to {function}: {reason}")]
    InvalidArgument {
        /// The function name, e.g. `poly`.
        function: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// The left-hand side of `~` did not reduce to exactly one term.
    #[error("response must be a single term, found {0}")]
    InvalidResponse(usize),

    /// A response was requested but the formula has none (e.g. `~ x`).
    #[error("formula has no response term")]
    MissingResponse,
}

impl FormulaError {
    /// Creates a [`FormulaError::Parse`] at the given byte offset.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Creates a [`FormulaError::InvalidArgument`] for the given function.
    pub fn invalid_argument(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the formula crate.
pub type Result<T> = std::result::Result<T, FormulaError>;

// ---------------------------------------------------------------------------
// Parser interface
// ---------------------------------------------------------------------------

/// The result of parsing a formula: response, predictors, intercept flag.
#[derive(Debug, Clone)]
pub struct ParsedFormula<T = Expr> {
    /// The response term. `None` when the formula has no left-hand side or
    /// the response was not requested.
    pub response: Option<T>,
    /// Predictor terms in the order the parser produced them.
    pub predictors: Vec<T>,
    /// Whether the design matrix should start with an intercept column.
    pub has_intercept: bool,
}

/// A formula-parsing collaborator.
///
/// Consumers depend on this trait rather than on [`crate::PatsyParser`] so
/// that another grammar can be plugged in without touching the adapter.
pub trait FormulaParser {
    /// The expression type produced for each term.
    type Term: NamedOutput + Into<Expr>;

    /// Parse `formula`. When `include_response` is false the response term,
    /// if any, is dropped from the result.
    fn parse(&self, formula: &str, include_response: bool)
    -> Result<ParsedFormula<Self::Term>>;
}

/// Capability to report the column name an expression would produce when
/// evaluated on its own.
pub trait NamedOutput {
    /// The output name, or `None` when it cannot be determined or is empty.
    fn output_name(&self) -> Option<String>;
}

impl NamedOutput for Expr {
    fn output_name(&self) -> Option<String> {
        self.clone()
            .meta()
            .output_name()
            .ok()
            .map(|name| name.to_string())
            .filter(|name| !name.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// Element-wise transforms accepted as calls in a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Log,
    Log10,
    Log2,
    Log1p,
    Exp,
    Sqrt,
    Abs,
}

impl Transform {
    /// Look up a transform by the name used in formulas. A leading `np.` is
    /// accepted so patsy-style formulas parse unchanged.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("np.").unwrap_or(name);
        match name {
            "log" | "ln" => Some(Self::Log),
            "log10" => Some(Self::Log10),
            "log2" => Some(Self::Log2),
            "log1p" => Some(Self::Log1p),
            "exp" => Some(Self::Exp),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }

    /// The canonical name used when rendering term names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Log1p => "log1p",
            Self::Exp => "exp",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
        }
    }
}

/// Binary arithmetic operators inside `I(...)` and call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl ArithOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 3,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
        }
    }
}

/// A numeric expression over columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Arith {
    Column(String),
    /// A numeric literal with the text it was written as.
    Number { value: f64, text: String },
    Neg(Box<Arith>),
    Binary {
        op: ArithOp,
        lhs: Box<Arith>,
        rhs: Box<Arith>,
    },
    Call {
        transform: Transform,
        arg: Box<Arith>,
    },
    /// Column `order` of the orthogonal polynomial basis of `column` up to
    /// `degree`. Its values depend on the whole column.
    Poly {
        column: String,
        degree: u32,
        order: u32,
    },
}

impl Arith {
    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            // Unary minus binds looser than `**`: `-x ** 2` is `-(x ** 2)`.
            Self::Neg(_) => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for Arith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => f.write_str(name),
            Self::Number { text, .. } => f.write_str(text),
            Self::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                // `**` is right-associative, the rest are left-associative.
                let (lhs_paren, rhs_paren) = if *op == ArithOp::Pow {
                    (lhs.precedence() <= prec, rhs.precedence() < prec)
                } else {
                    (lhs.precedence() < prec, rhs.precedence() <= prec)
                };
                write_operand(f, lhs, lhs_paren)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, rhs_paren)
            }
            Self::Call { transform, arg } => write!(f, "{}({})", transform.name(), arg),
            Self::Poly { column, order, .. } => write!(f, "poly_{column}_{order}"),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Arith, paren: bool) -> fmt::Result {
    if paren {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

/// One factor of a term: a named numeric expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    /// Display name, e.g. `x`, `log(x)`, `I(x ** 2)`, `x_2`, `poly_x_2`.
    pub name: String,
    pub value: Arith,
}

impl Factor {
    /// A factor that reads a single column.
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: Arith::Column(name.clone()),
            name,
        }
    }
}

/// A product of factors. The empty term is the intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub factors: Vec<Factor>,
}

impl Term {
    /// A single-factor term.
    pub fn single(factor: Factor) -> Self {
        Self {
            factors: vec![factor],
        }
    }

    /// Number of factors in the term.
    pub fn degree(&self) -> usize {
        self.factors.len()
    }

    /// The interaction of `self` and `other`: the union of their factors,
    /// keeping first-appearance order.
    pub fn interact(&self, other: &Term) -> Term {
        let mut factors = self.factors.clone();
        for factor in &other.factors {
            if !factors.iter().any(|f| f.name == factor.name) {
                factors.push(factor.clone());
            }
        }
        Term { factors }
    }

    /// Two terms are the same term when they have the same factor set,
    /// regardless of order (`a:b` == `b:a`).
    pub fn same_as(&self, other: &Term) -> bool {
        self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .all(|f| other.factors.iter().any(|g| g.name == f.name))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.factors.is_empty() {
            return f.write_str("1");
        }
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            f.write_str(&factor.name)?;
        }
        Ok(())
    }
}

/// A model description: the terms on each side of `~`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDesc {
    /// Response terms (left of `~`); empty when there is no left-hand side.
    pub lhs: Vec<Term>,
    /// Predictor terms, excluding the intercept.
    pub rhs: Vec<Term>,
    /// Whether the intercept is part of the right-hand side.
    pub intercept: bool,
}
