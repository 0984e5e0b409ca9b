//! Expand formula syntax into terms and lower terms to polars expressions.

use polars::prelude::*;
use tracing::debug;

use crate::parser::{FormulaAst, Node, TermOp, parse_formula};
use crate::poly::orthogonal_column;
use crate::types::{
    Arith, ArithOp, Factor, FormulaError, FormulaParser, ModelDesc, ParsedFormula, Result, Term,
    Transform,
};

/// The default formula parser, following patsy/R formula conventions.
///
/// Each term becomes one expression: the product of its factors, aliased to
/// the term's name (`x`, `a:b`, `log(x)`, `I(x ** 2)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PatsyParser;

impl PatsyParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self
    }
}

impl FormulaParser for PatsyParser {
    type Term = Expr;

    fn parse(&self, formula: &str, include_response: bool) -> Result<ParsedFormula<Expr>> {
        let desc = describe(formula)?;
        debug!(
            formula,
            predictors = desc.rhs.len(),
            intercept = desc.intercept,
            "parsed formula"
        );

        let response = if include_response {
            desc.lhs.first().map(lower_term)
        } else {
            None
        };
        Ok(ParsedFormula {
            response,
            predictors: desc.rhs.iter().map(lower_term).collect(),
            has_intercept: desc.intercept,
        })
    }
}

/// Parse a formula and expand it into a [`ModelDesc`].
///
/// The response side must reduce to at most one term. The intercept is on
/// unless removed with `0` or `- 1`.
pub fn describe(formula: &str) -> Result<ModelDesc> {
    let FormulaAst { lhs, rhs } = parse_formula(formula)?;

    let lhs = match lhs {
        Some(node) => {
            let terms = expand(&node).terms;
            if terms.len() != 1 {
                return Err(FormulaError::InvalidResponse(terms.len()));
            }
            terms
        }
        None => Vec::new(),
    };

    let rhs = expand(&rhs);
    Ok(ModelDesc {
        lhs,
        intercept: !rhs.intercept_removed,
        rhs: rhs.terms,
    })
}

/// Lower a term to a polars expression named after the term.
pub fn lower_term(term: &Term) -> Expr {
    term.factors
        .iter()
        .map(|f| lower_arith(&f.value))
        .reduce(|acc, e| acc * e)
        .unwrap_or_else(|| lit(1.0))
        .alias(term.to_string())
}

/// Lower a numeric expression to polars. Division, powers and transforms
/// work in `Float64` so integer columns behave like real numbers.
pub fn lower_arith(value: &Arith) -> Expr {
    match value {
        Arith::Column(name) => col(name.as_str()),
        Arith::Number { value, .. } => lit(*value),
        Arith::Neg(inner) => lower_arith(inner) * lit(-1.0),
        Arith::Binary { op, lhs, rhs } => {
            let lhs = lower_arith(lhs);
            let rhs = lower_arith(rhs);
            match op {
                ArithOp::Add => lhs + rhs,
                ArithOp::Sub => lhs - rhs,
                ArithOp::Mul => lhs * rhs,
                ArithOp::Div => lhs.cast(DataType::Float64) / rhs.cast(DataType::Float64),
                ArithOp::Pow => lhs.cast(DataType::Float64).pow(rhs),
            }
        }
        Arith::Call { transform, arg } => {
            let x = lower_arith(arg).cast(DataType::Float64);
            match transform {
                Transform::Log => x.log(std::f64::consts::E),
                Transform::Log10 => x.log(10.0),
                Transform::Log2 => x.log(2.0),
                Transform::Log1p => x.log1p(),
                Transform::Exp => x.exp(),
                Transform::Sqrt => x.sqrt(),
                Transform::Abs => x.abs(),
            }
        }
        Arith::Poly {
            column,
            degree,
            order,
        } => {
            let (degree, order) = (*degree as usize, *order as usize);
            col(column.as_str()).map(
                move |c| orthogonal_column(c, degree, order),
                GetOutput::from_type(DataType::Float64),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Term algebra
// ---------------------------------------------------------------------------

/// Terms produced by a sub-expression plus its effect on the intercept.
#[derive(Debug, Clone, Default)]
struct TermSet {
    intercept: bool,
    intercept_removed: bool,
    terms: Vec<Term>,
}

impl TermSet {
    fn terms(terms: Vec<Term>) -> Self {
        Self {
            terms,
            ..Self::default()
        }
    }

    fn with_intercept(terms: Vec<Term>) -> Self {
        Self {
            intercept: true,
            intercept_removed: false,
            terms,
        }
    }

    fn without_intercept(terms: Vec<Term>) -> Self {
        Self {
            intercept: false,
            intercept_removed: true,
            terms,
        }
    }
}

fn expand(node: &Node) -> TermSet {
    match node {
        Node::Zero => TermSet::without_intercept(Vec::new()),
        Node::One => TermSet::with_intercept(Vec::new()),
        Node::Factor(factor) => TermSet::terms(vec![Term::single(factor.clone())]),
        Node::Poly {
            column,
            degree,
            raw,
        } => TermSet::terms(poly_terms(column, *degree, *raw)),
        Node::Neg(inner) => match **inner {
            Node::Zero => TermSet::with_intercept(Vec::new()),
            _ => TermSet::without_intercept(Vec::new()),
        },
        Node::Binary { op, lhs, rhs } => expand_binary(*op, lhs, rhs),
        Node::Power { base, exponent } => {
            let base = expand(base).terms;
            let mut terms = base.clone();
            // No interaction has more factors than the base has terms.
            let rounds = (*exponent as usize).min(base.len());
            for _ in 1..rounds {
                let before = terms.len();
                let next = interact(&terms, &base);
                terms = union(terms, next);
                if terms.len() == before {
                    break;
                }
            }
            TermSet::terms(terms)
        }
    }
}

fn expand_binary(op: TermOp, lhs: &Node, rhs: &Node) -> TermSet {
    let left = expand(lhs);
    match op {
        TermOp::Add => {
            if matches!(rhs, Node::Zero) {
                return TermSet::without_intercept(left.terms);
            }
            let right = expand(rhs);
            let terms = union(left.terms, right.terms);
            if right.intercept {
                TermSet::with_intercept(terms)
            } else if right.intercept_removed {
                TermSet::without_intercept(terms)
            } else {
                TermSet {
                    intercept: left.intercept,
                    intercept_removed: left.intercept_removed,
                    terms,
                }
            }
        }
        TermOp::Sub => match rhs {
            Node::Zero => TermSet::with_intercept(left.terms),
            Node::One => TermSet::without_intercept(left.terms),
            _ => {
                let right = expand(rhs);
                let terms: Vec<Term> = left
                    .terms
                    .into_iter()
                    .filter(|t| !right.terms.iter().any(|r| r.same_as(t)))
                    .collect();
                if right.intercept {
                    TermSet::without_intercept(terms)
                } else {
                    TermSet {
                        intercept: left.intercept,
                        intercept_removed: left.intercept_removed,
                        terms,
                    }
                }
            }
        },
        TermOp::Interact => {
            let right = expand(rhs);
            TermSet::terms(interact(&left.terms, &right.terms))
        }
        TermOp::Cross => {
            let right = expand(rhs);
            let crossed = interact(&left.terms, &right.terms);
            let terms = union(union(left.terms, right.terms), crossed);
            TermSet::terms(terms)
        }
        TermOp::Nest => {
            let right = expand(rhs);
            let outer = left
                .terms
                .iter()
                .fold(Term { factors: Vec::new() }, |acc, t| acc.interact(t));
            let nested = interact(&[outer], &right.terms);
            TermSet::terms(union(left.terms, nested))
        }
    }
}

/// Append `extra` to `base`, skipping terms already present.
fn union(mut base: Vec<Term>, extra: Vec<Term>) -> Vec<Term> {
    for term in extra {
        if !base.iter().any(|t| t.same_as(&term)) {
            base.push(term);
        }
    }
    base
}

/// Pairwise interactions of two term lists, deduplicated.
fn interact(left: &[Term], right: &[Term]) -> Vec<Term> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            out = union(out, vec![l.interact(r)]);
        }
    }
    out
}

/// Terms of `poly(column, degree)`. Raw powers are named `x`, `x_2`, ..;
/// orthogonal columns `poly_x_1`, `poly_x_2`, ...
fn poly_terms(column: &str, degree: u32, raw: bool) -> Vec<Term> {
    (1..=degree)
        .map(|k| {
            let factor = if !raw {
                let value = Arith::Poly {
                    column: column.to_string(),
                    degree,
                    order: k,
                };
                Factor {
                    name: value.to_string(),
                    value,
                }
            } else if k == 1 {
                Factor::column(column)
            } else {
                Factor {
                    name: format!("{column}_{k}"),
                    value: Arith::Binary {
                        op: ArithOp::Pow,
                        lhs: Box::new(Arith::Column(column.to_string())),
                        rhs: Box::new(Arith::Number {
                            value: f64::from(k),
                            text: k.to_string(),
                        }),
                    },
                }
            };
            Term::single(factor)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NamedOutput;
    use pretty_assertions::assert_eq;

    fn rhs_names(formula: &str) -> Vec<String> {
        describe(formula)
            .unwrap()
            .rhs
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn intercept_is_implicit() {
        let desc = describe("y ~ x1 + x2").unwrap();
        assert!(desc.intercept);
        assert_eq!(desc.lhs.len(), 1);
        assert_eq!(rhs_names("y ~ x1 + x2"), vec!["x1", "x2"]);
    }

    #[test]
    fn intercept_removal_forms() {
        for formula in ["y ~ x - 1", "y ~ -1 + x", "y ~ 0 + x", "y ~ x + 0"] {
            let desc = describe(formula).unwrap();
            assert!(!desc.intercept, "{formula} should drop the intercept");
            assert_eq!(rhs_names(formula), vec!["x"]);
        }
    }

    #[test]
    fn intercept_can_be_restored() {
        assert!(describe("y ~ x - 1 + 1").unwrap().intercept);
        assert!(describe("y ~ 0 + x - 0").unwrap().intercept);
    }

    #[test]
    fn cross_expands_to_main_effects_and_interaction() {
        assert_eq!(rhs_names("y ~ a * b"), vec!["a", "b", "a:b"]);
        assert_eq!(
            rhs_names("y ~ a * b * c"),
            vec!["a", "b", "a:b", "c", "a:c", "b:c", "a:b:c"]
        );
    }

    #[test]
    fn nesting() {
        assert_eq!(rhs_names("y ~ a / b"), vec!["a", "a:b"]);
    }

    #[test]
    fn duplicate_terms_collapse() {
        assert_eq!(rhs_names("y ~ x + x"), vec!["x"]);
        assert_eq!(rhs_names("y ~ a:b + b:a"), vec!["a:b"]);
        assert_eq!(rhs_names("y ~ a:a"), vec!["a"]);
    }

    #[test]
    fn subtraction_removes_terms() {
        assert_eq!(rhs_names("y ~ a * b - a:b"), vec!["a", "b"]);
    }

    #[test]
    fn power_builds_interactions_up_to_order() {
        assert_eq!(rhs_names("y ~ (a + b + c) ** 2"), vec![
            "a", "b", "c", "a:b", "a:c", "b:c"
        ]);
    }

    #[test]
    fn large_power_stops_once_terms_stop_growing() {
        assert_eq!(rhs_names("y ~ (a + b) ** 3000000000"), vec![
            "a", "b", "a:b"
        ]);
    }

    #[test]
    fn orthogonal_poly_names() {
        assert_eq!(rhs_names("y ~ poly(x, 3)"), vec![
            "poly_x_1", "poly_x_2", "poly_x_3"
        ]);
    }

    #[test]
    fn raw_poly_names() {
        assert_eq!(rhs_names("y ~ poly(x, 3, raw = TRUE)"), vec![
            "x", "x_2", "x_3"
        ]);
        // The first raw power is the column itself.
        assert_eq!(rhs_names("y ~ x + poly(x, 2, raw = TRUE)"), vec![
            "x", "x_2"
        ]);
    }

    #[test]
    fn response_must_be_one_term() {
        assert_eq!(
            describe("a + b ~ x").unwrap_err(),
            FormulaError::InvalidResponse(2)
        );
    }

    #[test]
    fn parse_splits_response_and_predictors() {
        let parsed = PatsyParser::new().parse("y ~ x1 + log(x2)", true).unwrap();
        let response = parsed.response.unwrap();
        assert_eq!(response.output_name().as_deref(), Some("y"));
        let names: Vec<_> = parsed
            .predictors
            .iter()
            .map(|e| e.output_name().unwrap())
            .collect();
        assert_eq!(names, vec!["x1", "log(x2)"]);
        assert!(parsed.has_intercept);
    }

    #[test]
    fn parse_can_drop_response() {
        let parsed = PatsyParser::new().parse("y ~ x", false).unwrap();
        assert!(parsed.response.is_none());
        assert_eq!(parsed.predictors.len(), 1);
    }

    #[test]
    fn lowered_terms_evaluate() {
        let df = df! {
            "a" => [1.0, 2.0, 3.0],
            "b" => [4.0, 5.0, 6.0],
            "x" => [1i64, 2, 4],
        }
        .unwrap();
        let parsed = PatsyParser::new()
            .parse("~ a:b + I(x ** 2) + I(x / 2) + sqrt(x)", false)
            .unwrap();
        let out = df.lazy().select(parsed.predictors).collect().unwrap();

        let values = |name: &str| -> Vec<f64> {
            out.column(name)
                .unwrap()
                .as_materialized_series()
                .f64()
                .unwrap()
                .into_no_null_iter()
                .collect()
        };
        assert_eq!(values("a:b"), vec![4.0, 10.0, 18.0]);
        assert_eq!(values("I(x ** 2)"), vec![1.0, 4.0, 16.0]);
        assert_eq!(values("I(x / 2)"), vec![0.5, 1.0, 2.0]);
        assert_eq!(values("sqrt(x)"), vec![1.0, 2.0_f64.sqrt(), 2.0]);
    }

    #[test]
    fn poly_terms_evaluate() {
        let df = df! { "x" => [1.0, 2.0, 3.0] }.unwrap();
        let parsed = PatsyParser::new()
            .parse("~ poly(x, 2) + poly(x, 2, raw = TRUE)", false)
            .unwrap();
        let out = df.lazy().select(parsed.predictors).collect().unwrap();

        let values = |name: &str| -> Vec<f64> {
            out.column(name)
                .unwrap()
                .as_materialized_series()
                .f64()
                .unwrap()
                .into_no_null_iter()
                .collect()
        };
        let r2 = 2.0_f64.sqrt();
        let linear = values("poly_x_1");
        assert!((linear[0] + 1.0 / r2).abs() < 1e-12);
        assert!(linear[1].abs() < 1e-12);
        assert!((linear[2] - 1.0 / r2).abs() < 1e-12);
        assert_eq!(values("x_2"), vec![1.0, 4.0, 9.0]);
        assert_eq!(values("x"), vec![1.0, 2.0, 3.0]);
    }
}
