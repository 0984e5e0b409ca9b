//! Parse formula strings into a syntax tree.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! formula := [sum] '~' sum
//! sum     := product (('+' | '-') product)*
//! product := inter (('*' | '/') inter)*
//! inter   := unary (':' unary)*
//! unary   := ('-' | '+') unary | power
//! power   := atom (('**' | '^') INTEGER)?
//! atom    := '(' sum ')' | '0' | '1' | name | name '(' args ')'
//! ```
//!
//! Arithmetic inside `I(...)` and transform calls has its own, conventional
//! grammar (see [`Parser::arith_sum`]).

use crate::types::{Arith, ArithOp, Factor, FormulaError, Result, Transform};

/// Highest degree accepted by `poly(x, d)`.
pub const MAX_POLY_DEGREE: u32 = 32;

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

/// Operators between terms on either side of `~`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOp {
    /// `a + b`: union of terms.
    Add,
    /// `a - b`: remove terms.
    Sub,
    /// `a:b`: interaction.
    Interact,
    /// `a * b`: `a + b + a:b`.
    Cross,
    /// `a / b`: `a + a:b`.
    Nest,
}

/// A node of the formula syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `0`: removes the intercept.
    Zero,
    /// `1`: the intercept.
    One,
    Factor(Factor),
    /// `poly(x, d)`: orthogonal polynomials of degree 1..=d, or the raw
    /// powers `x, x**2, .., x**d` when `raw` is set.
    Poly {
        column: String,
        degree: u32,
        raw: bool,
    },
    Binary {
        op: TermOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// Unary minus; only valid on `0` and `1`.
    Neg(Box<Node>),
    /// `(a + b) ** n`: all interactions up to order `n`.
    Power { base: Box<Node>, exponent: u32 },
}

/// Both sides of a formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaAst {
    pub lhs: Option<Node>,
    pub rhs: Node,
}

/// Parse a formula string into its syntax tree.
pub fn parse_formula(input: &str) -> Result<FormulaAst> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };

    let lhs = if parser.peek() == &TokenKind::Tilde {
        None
    } else {
        Some(parser.sum()?)
    };
    parser.expect(&TokenKind::Tilde, "'~'")?;
    let rhs = parser.sum()?;
    if parser.peek() != &TokenKind::Eof {
        return Err(parser.unexpected("end of formula"));
    }
    Ok(FormulaAst { lhs, rhs })
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    /// A back-quoted column name; never treated as a function.
    Quoted(String),
    Number { value: f64, text: String },
    Tilde,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Caret,
    Slash,
    Colon,
    Comma,
    Equals,
    LParen,
    RParen,
    Eof,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Quoted(name) => format!("`{name}`"),
            Self::Number { text, .. } => format!("number {text}"),
            Self::Tilde => "'~'".into(),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::DoubleStar => "'**'".into(),
            Self::Caret => "'^'".into(),
            Self::Slash => "'/'".into(),
            Self::Colon => "':'".into(),
            Self::Comma => "','".into(),
            Self::Equals => "'='".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Eof => "end of formula".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = if is_ident_start(c) {
            let mut name = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !is_ident_cont(c) {
                    break;
                }
                name.push(c);
                chars.next();
            }
            TokenKind::Ident(name)
        } else if c.is_ascii_digit() || c == '.' {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !(c.is_ascii_digit() || c == '.') {
                    break;
                }
                text.push(c);
                chars.next();
            }
            let value = text
                .parse::<f64>()
                .map_err(|_| FormulaError::parse(pos, format!("invalid number '{text}'")))?;
            TokenKind::Number { value, text }
        } else if c == '`' {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '`' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(FormulaError::parse(pos, "unterminated back-quoted name"));
            }
            if name.is_empty() {
                return Err(FormulaError::parse(pos, "empty back-quoted name"));
            }
            TokenKind::Quoted(name)
        } else {
            chars.next();
            match c {
                '~' => TokenKind::Tilde,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => {
                    if matches!(chars.peek(), Some(&(_, '*'))) {
                        chars.next();
                        TokenKind::DoubleStar
                    } else {
                        TokenKind::Star
                    }
                }
                '^' => TokenKind::Caret,
                '/' => TokenKind::Slash,
                ':' => TokenKind::Colon,
                ',' => TokenKind::Comma,
                '=' => TokenKind::Equals,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                other => {
                    return Err(FormulaError::parse(
                        pos,
                        format!("unexpected character '{other}'"),
                    ));
                }
            }
        };
        tokens.push(Token { kind, pos });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: input.len(),
    });
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Recursive descent
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> FormulaError {
        FormulaError::parse(
            self.position(),
            format!("expected {}, found {}", expected, self.peek().describe()),
        )
    }

    // -- Term level -----------------------------------------------------------

    fn sum(&mut self) -> Result<Node> {
        let mut node = self.product()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => TermOp::Add,
                TokenKind::Minus => TermOp::Sub,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.product()?;
            node = binary(op, node, rhs);
        }
    }

    fn product(&mut self) -> Result<Node> {
        let mut node = self.interaction()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => TermOp::Cross,
                TokenKind::Slash => TermOp::Nest,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.interaction()?;
            node = binary(op, node, rhs);
        }
    }

    fn interaction(&mut self) -> Result<Node> {
        let mut node = self.unary()?;
        while self.eat(&TokenKind::Colon) {
            let rhs = self.unary()?;
            node = binary(TermOp::Interact, node, rhs);
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node> {
        let pos = self.position();
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            return match operand {
                Node::Zero | Node::One => Ok(Node::Neg(Box::new(operand))),
                _ => Err(FormulaError::parse(
                    pos,
                    "unary minus is only allowed on 0 and 1",
                )),
            };
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.atom()?;
        if !matches!(self.peek(), TokenKind::DoubleStar | TokenKind::Caret) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.integer("interaction order")?;
        if exponent == 0 {
            return Err(FormulaError::parse(
                self.tokens[self.pos.saturating_sub(1)].pos,
                "interaction order must be at least 1",
            ));
        }
        Ok(Node::Power {
            base: Box::new(base),
            exponent,
        })
    }

    fn atom(&mut self) -> Result<Node> {
        let token = self.advance();
        match token.kind {
            TokenKind::LParen => {
                let inner = self.sum()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Number { value, .. } if value == 0.0 => Ok(Node::Zero),
            TokenKind::Number { value, .. } if value == 1.0 => Ok(Node::One),
            TokenKind::Number { text, .. } => Err(FormulaError::parse(
                token.pos,
                format!("number {text} is not a term; wrap arithmetic in I(...)"),
            )),
            TokenKind::Quoted(name) => Ok(Node::Factor(Factor::column(name))),
            TokenKind::Ident(name) => {
                if self.peek() == &TokenKind::LParen {
                    self.advance();
                    self.call(&name)
                } else {
                    Ok(Node::Factor(Factor::column(name)))
                }
            }
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(FormulaError::parse(
                    token.pos,
                    format!("expected a term, found {}", other.describe()),
                ))
            }
        }
    }

    /// Parse the arguments of `name(` up to and including the closing paren.
    fn call(&mut self, name: &str) -> Result<Node> {
        match name {
            "I" => {
                let value = self.arith_sum()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Node::Factor(Factor {
                    name: format!("I({value})"),
                    value,
                }))
            }
            "poly" => self.poly(),
            _ => {
                let transform = Transform::from_name(name)
                    .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
                let arg = self.arith_sum()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let value = Arith::Call {
                    transform,
                    arg: Box::new(arg),
                };
                Ok(Node::Factor(Factor {
                    name: value.to_string(),
                    value,
                }))
            }
        }
    }

    /// `poly(x, d)` or `poly(x, degree = d)`, optionally followed by
    /// `raw = TRUE` (or a bare `TRUE`/`FALSE`).
    fn poly(&mut self) -> Result<Node> {
        let column = match self.advance().kind {
            TokenKind::Ident(name) | TokenKind::Quoted(name) => name,
            _ => {
                return Err(FormulaError::invalid_argument(
                    "poly",
                    "first argument must be a column name",
                ));
            }
        };
        if !self.eat(&TokenKind::Comma) {
            return Err(FormulaError::invalid_argument("poly", "missing degree"));
        }
        if matches!(self.peek(), TokenKind::Ident(k) if k == "degree") {
            self.advance();
            self.expect(&TokenKind::Equals, "'='")?;
        }
        let degree = match self.advance().kind {
            TokenKind::Number { value, .. }
                if value.fract() == 0.0
                    && (1.0..=f64::from(MAX_POLY_DEGREE)).contains(&value) =>
            {
                value as u32
            }
            _ => {
                return Err(FormulaError::invalid_argument(
                    "poly",
                    format!("degree must be an integer between 1 and {MAX_POLY_DEGREE}"),
                ));
            }
        };
        let mut raw = false;
        if self.eat(&TokenKind::Comma) {
            if matches!(self.peek(), TokenKind::Ident(k) if k == "raw")
                && self.peek_at(1) == &TokenKind::Equals
            {
                self.advance();
                self.advance();
            }
            raw = match self.advance().kind {
                TokenKind::Ident(v) => parse_bool(&v).ok_or_else(|| {
                    FormulaError::invalid_argument("poly", "raw must be TRUE or FALSE")
                })?,
                _ => {
                    return Err(FormulaError::invalid_argument(
                        "poly",
                        "raw must be TRUE or FALSE",
                    ));
                }
            };
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Node::Poly {
            column,
            degree,
            raw,
        })
    }

    fn integer(&mut self, what: &str) -> Result<u32> {
        let pos = self.position();
        match self.advance().kind {
            TokenKind::Number { value, .. }
                if value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value) =>
            {
                Ok(value as u32)
            }
            TokenKind::Number { text, .. } => Err(FormulaError::parse(
                pos,
                format!("{what} must be an integer no larger than {}, found {text}", u32::MAX),
            )),
            _ => Err(FormulaError::parse(pos, format!("{what} must be an integer"))),
        }
    }

    // -- Arithmetic -----------------------------------------------------------

    /// Arithmetic inside `I(...)` and transform calls:
    ///
    /// ```text
    /// arith_sum   := arith_prod (('+' | '-') arith_prod)*
    /// arith_prod  := arith_unary (('*' | '/') arith_unary)*
    /// arith_unary := ('-' | '+') arith_unary | arith_pow
    /// arith_pow   := arith_atom (('**' | '^') arith_unary)?
    /// ```
    fn arith_sum(&mut self) -> Result<Arith> {
        let mut node = self.arith_prod()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.arith_prod()?;
            node = arith(op, node, rhs);
        }
    }

    fn arith_prod(&mut self) -> Result<Arith> {
        let mut node = self.arith_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => return Ok(node),
            };
            self.advance();
            let rhs = self.arith_unary()?;
            node = arith(op, node, rhs);
        }
    }

    fn arith_unary(&mut self) -> Result<Arith> {
        if self.eat(&TokenKind::Plus) {
            return self.arith_unary();
        }
        if self.eat(&TokenKind::Minus) {
            return Ok(Arith::Neg(Box::new(self.arith_unary()?)));
        }
        self.arith_pow()
    }

    fn arith_pow(&mut self) -> Result<Arith> {
        let base = self.arith_atom()?;
        if matches!(self.peek(), TokenKind::DoubleStar | TokenKind::Caret) {
            self.advance();
            let exponent = self.arith_unary()?;
            return Ok(arith(ArithOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn arith_atom(&mut self) -> Result<Arith> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number { value, text } => Ok(Arith::Number { value, text }),
            TokenKind::Quoted(name) => Ok(Arith::Column(name)),
            TokenKind::Ident(name) => {
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Arith::Column(name));
                }
                let transform = Transform::from_name(&name)
                    .ok_or(FormulaError::UnknownFunction(name))?;
                let arg = self.arith_sum()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Arith::Call {
                    transform,
                    arg: Box::new(arg),
                })
            }
            TokenKind::LParen => {
                let inner = self.arith_sum()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(FormulaError::parse(
                    token.pos,
                    format!("expected a value, found {}", other.describe()),
                ))
            }
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "TRUE" | "True" | "true" | "T" => Some(true),
        "FALSE" | "False" | "false" | "F" => Some(false),
        _ => None,
    }
}

fn binary(op: TermOp, lhs: Node, rhs: Node) -> Node {
    Node::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn arith(op: ArithOp, lhs: Arith, rhs: Arith) -> Arith {
    Arith::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Node {
        Node::Factor(Factor::column(name))
    }

    #[test]
    fn parse_simple_sum() {
        let ast = parse_formula("y ~ x1 + x2").unwrap();
        assert_eq!(ast.lhs, Some(var("y")));
        assert_eq!(ast.rhs, binary(TermOp::Add, var("x1"), var("x2")));
    }

    #[test]
    fn parse_intercept_removal() {
        let ast = parse_formula("y ~ x1 + x2 - 1").unwrap();
        assert_eq!(
            ast.rhs,
            binary(
                TermOp::Sub,
                binary(TermOp::Add, var("x1"), var("x2")),
                Node::One
            )
        );
    }

    #[test]
    fn parse_leading_unary_minus() {
        let ast = parse_formula("y ~ -1 + x").unwrap();
        assert_eq!(
            ast.rhs,
            binary(TermOp::Add, Node::Neg(Box::new(Node::One)), var("x"))
        );
    }

    #[test]
    fn parse_without_response() {
        let ast = parse_formula("~ x").unwrap();
        assert_eq!(ast.lhs, None);
        assert_eq!(ast.rhs, var("x"));
    }

    #[test]
    fn interaction_binds_tighter_than_cross() {
        let ast = parse_formula("y ~ a * b:c").unwrap();
        assert_eq!(
            ast.rhs,
            binary(
                TermOp::Cross,
                var("a"),
                binary(TermOp::Interact, var("b"), var("c"))
            )
        );
    }

    #[test]
    fn parse_transform_and_identity() {
        let ast = parse_formula("y ~ np.log(x) + I(x ** 2)").unwrap();
        let Node::Binary { lhs, rhs, .. } = ast.rhs else {
            panic!("expected a binary node");
        };
        let Node::Factor(log) = *lhs else {
            panic!("expected a factor");
        };
        let Node::Factor(square) = *rhs else {
            panic!("expected a factor");
        };
        assert_eq!(log.name, "log(x)");
        assert_eq!(square.name, "I(x ** 2)");
    }

    #[test]
    fn identity_name_is_normalized() {
        let ast = parse_formula("y ~ I((a+b)*2)").unwrap();
        let Node::Factor(f) = ast.rhs else {
            panic!("expected a factor");
        };
        assert_eq!(f.name, "I((a + b) * 2)");
    }

    #[test]
    fn parse_poly() {
        let ast = parse_formula("y ~ poly(x, 3)").unwrap();
        assert_eq!(
            ast.rhs,
            Node::Poly {
                column: "x".into(),
                degree: 3,
                raw: false
            }
        );
        let ast = parse_formula("y ~ poly(x, degree = 2, raw = TRUE)").unwrap();
        assert_eq!(
            ast.rhs,
            Node::Poly {
                column: "x".into(),
                degree: 2,
                raw: true
            }
        );
        let ast = parse_formula("y ~ poly(x, 2, FALSE)").unwrap();
        assert!(matches!(ast.rhs, Node::Poly { raw: false, .. }));
    }

    #[test]
    fn poly_rejects_bad_degree() {
        for formula in [
            "y ~ poly(x, 0)",
            "y ~ poly(x, 1.5)",
            "y ~ poly(x, 33)",
            "y ~ poly(x, 1000000000)",
        ] {
            let err = parse_formula(formula).unwrap_err();
            assert!(
                matches!(err, FormulaError::InvalidArgument { .. }),
                "{formula}: {err}"
            );
        }
    }

    #[test]
    fn poly_rejects_unknown_raw_flag() {
        let err = parse_formula("y ~ poly(x, 2, raw = maybe)").unwrap_err();
        assert!(matches!(err, FormulaError::InvalidArgument { .. }));
    }

    #[test]
    fn interaction_order_must_fit_in_u32() {
        let err = parse_formula("y ~ (a + b) ** 99999999999").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { .. }));
    }

    #[test]
    fn identifiers_may_be_unicode() {
        let ast = parse_formula("größe ~ höhe + 体重").unwrap();
        assert_eq!(ast.lhs, Some(var("größe")));
        assert_eq!(ast.rhs, binary(TermOp::Add, var("höhe"), var("体重")));
    }

    #[test]
    fn parse_backquoted_name() {
        let ast = parse_formula("`sale price` ~ `floor area`").unwrap();
        assert_eq!(ast.lhs, Some(var("sale price")));
        assert_eq!(ast.rhs, var("floor area"));
    }

    #[test]
    fn parse_power() {
        let ast = parse_formula("y ~ (a + b) ** 2").unwrap();
        assert_eq!(
            ast.rhs,
            Node::Power {
                base: Box::new(binary(TermOp::Add, var("a"), var("b"))),
                exponent: 2
            }
        );
    }

    #[test]
    fn reject_double_tilde() {
        let err = parse_formula("y ~~ x").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { position: 3, .. }));
    }

    #[test]
    fn reject_missing_tilde() {
        assert!(matches!(
            parse_formula("y x").unwrap_err(),
            FormulaError::Parse { .. }
        ));
    }

    #[test]
    fn reject_unclosed_paren() {
        assert!(matches!(
            parse_formula("y ~ (x").unwrap_err(),
            FormulaError::Parse { .. }
        ));
    }

    #[test]
    fn reject_unknown_function() {
        assert_eq!(
            parse_formula("y ~ center(x)").unwrap_err(),
            FormulaError::UnknownFunction("center".into())
        );
    }

    #[test]
    fn reject_bare_number() {
        assert!(matches!(
            parse_formula("y ~ 2").unwrap_err(),
            FormulaError::Parse { .. }
        ));
    }

    #[test]
    fn reject_negated_variable() {
        assert!(matches!(
            parse_formula("y ~ -x").unwrap_err(),
            FormulaError::Parse { .. }
        ));
    }
}
