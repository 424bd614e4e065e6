//! Tokenizer and recursive-descent parser for formula strings.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Empty formula")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("Unexpected end of formula")]
    UnexpectedEnd,
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{function} expects {expected} argument(s), got {got}")]
    WrongArity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("Formula nests deeper than {MAX_NESTING} levels at position {position}")]
    TooDeep { position: usize },
    #[error("Formula has more than {MAX_TOKENS} tokens")]
    TooLong,
}

/// Deepest chain of parentheses, signs and dice operands a formula may use.
pub const MAX_NESTING: usize = 64;

/// Longest formula, in tokens. Evaluation recurses once per operator.
pub const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Floor,
    Ceil,
    Round,
    Abs,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        match name.to_ascii_lowercase().as_str() {
            "floor" => Some(Function::Floor),
            "ceil" => Some(Function::Ceil),
            "round" => Some(Function::Round),
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    fn check_arity(&self, got: usize) -> Result<(), FormulaError> {
        let (ok, expected) = match self {
            Function::Min | Function::Max => (got >= 1, "at least 1"),
            _ => (got == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::WrongArity {
                function: self.name(),
                expected,
                got,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keep {
    pub highest: bool,
    pub count: u32,
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Dice {
        count: Box<Expr>,
        sides: Box<Expr>,
        keep: Option<Keep>,
    },
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn contains_dice(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::Variable(_) => false,
            Expr::Dice { .. } => true,
            Expr::Negate(inner) => inner.contains_dice(),
            Expr::Binary { left, right, .. } => left.contains_dice() || right.contains_dice(),
            Expr::Call { args, .. } => args.iter().any(Expr::contains_dice),
        }
    }

    /// Every variable name referenced, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => names.push(name),
            Expr::Dice { count, sides, .. } => {
                count.collect_variables(names);
                sides.collect_variables(names);
            }
            Expr::Negate(inner) => inner.collect_variables(names),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable(name) => write!(f, "@{name}"),
            Expr::Dice { count, sides, keep } => {
                write_dice_operand(f, count)?;
                write!(f, "d")?;
                write_dice_operand(f, sides)?;
                if let Some(keep) = keep {
                    write!(f, "{}{}", if keep.highest { "kh" } else { "kl" }, keep.count)?;
                }
                Ok(())
            }
            Expr::Negate(inner) => write!(f, "-({inner})"),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_dice_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Number(_) => write!(f, "{expr}"),
        other => write!(f, "({other})"),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Variable(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    DiceSeparator,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::Ident(s) => write!(f, "identifier '{s}'"),
            TokenKind::Variable(s) => write!(f, "variable '@{s}'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::DiceSeparator => write!(f, "'d'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn is_variable_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let position = i;

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match ch {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, position });
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| FormulaError::InvalidNumber(text.clone()))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position,
            });
            continue;
        }

        if ch == '@' {
            let start = i + 1;
            i = start;
            while i < chars.len() {
                let c = chars[i];
                let hyphen_in_name =
                    c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic());
                if is_variable_char(c) || hyphen_in_name {
                    i += 1;
                } else {
                    break;
                }
            }
            let name: String = chars[start..i].iter().collect();
            let name = name.trim_end_matches('.').to_string();
            if name.is_empty() {
                return Err(FormulaError::UnexpectedChar { ch, position });
            }
            tokens.push(Token {
                kind: TokenKind::Variable(name),
                position,
            });
            continue;
        }

        if ch.is_ascii_alphabetic() {
            // `2d6`, `(x)d6`: a `d` right after a count separates it from the sides.
            let after_count = matches!(
                tokens.last().map(|t| &t.kind),
                Some(TokenKind::Number(_)) | Some(TokenKind::RParen)
            );
            let next_starts_sides = chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_digit() || *n == '(' || *n == '@');
            if (ch == 'd' || ch == 'D') && after_count && next_starts_sides {
                tokens.push(Token {
                    kind: TokenKind::DiceSeparator,
                    position,
                });
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                position,
            });
            continue;
        }

        return Err(FormulaError::UnexpectedChar { ch, position });
    }

    Ok(tokens)
}

/// Parse a formula into an expression tree.
pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::TooLong);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(FormulaError::UnexpectedToken {
            found: token.kind.to_string(),
            position: token.position,
        }),
    }
}

/// Variable names referenced by a formula. Unparseable formulas reference nothing.
pub fn extract_variable_references(source: &str) -> Vec<String> {
    match tokenize(source) {
        Ok(tokens) => tokens
            .into_iter()
            .filter_map(|t| match t.kind {
                TokenKind::Variable(name) => Some(name),
                _ => None,
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Result<Token, FormulaError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), FormulaError> {
        let token = self.next()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&token))
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        self.depth += 1;
        let result = if self.depth > MAX_NESTING {
            Err(FormulaError::TooDeep {
                position: self.peek().map_or(0, |t| t.position),
            })
        } else {
            self.signed()
        };
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<Expr, FormulaError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, FormulaError> {
        let mut expr = self.atom()?;
        while self.peek_kind() == Some(&TokenKind::DiceSeparator) {
            self.pos += 1;
            let sides = self.dice_operand()?;
            let keep = self.keep_suffix()?;
            expr = Expr::Dice {
                count: Box::new(expr),
                sides: Box::new(sides),
                keep,
            };
        }
        Ok(expr)
    }

    fn dice_operand(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Variable(name) => Ok(Expr::Variable(name)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(unexpected(&token)),
        }
    }

    fn keep_suffix(&mut self) -> Result<Option<Keep>, FormulaError> {
        let Some(Token {
            kind: TokenKind::Ident(ident),
            position,
        }) = self.peek().cloned()
        else {
            return Ok(None);
        };
        let keep = parse_keep(&ident).ok_or(FormulaError::UnexpectedToken {
            found: format!("identifier '{ident}'"),
            position,
        })?;
        self.pos += 1;
        Ok(Some(keep))
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Variable(name) => Ok(Expr::Variable(name)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    let function =
                        Function::from_name(&name).ok_or(FormulaError::UnknownFunction(name))?;
                    self.pos += 1;
                    let args = self.arguments()?;
                    function.check_arity(args.len())?;
                    Ok(Expr::Call { function, args })
                } else if let Some(dice) = parse_bare_dice(&name) {
                    Ok(dice)
                } else {
                    Err(FormulaError::UnexpectedToken {
                        found: format!("identifier '{name}'"),
                        position: token.position,
                    })
                }
            }
            _ => Err(unexpected(&token)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek_kind() == Some(&TokenKind::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            let token = self.next()?;
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(unexpected(&token)),
            }
        }
    }
}

fn unexpected(token: &Token) -> FormulaError {
    FormulaError::UnexpectedToken {
        found: token.kind.to_string(),
        position: token.position,
    }
}

/// `kh`, `kh2`, `kl`, `kl1`.
fn parse_keep(ident: &str) -> Option<Keep> {
    let lower = ident.to_ascii_lowercase();
    let (highest, rest) = if let Some(rest) = lower.strip_prefix("kh") {
        (true, rest)
    } else if let Some(rest) = lower.strip_prefix("kl") {
        (false, rest)
    } else {
        return None;
    };
    let count = if rest.is_empty() { 1 } else { rest.parse().ok()? };
    Some(Keep { highest, count })
}

/// `d6` or `d20kh1` written without a count.
fn parse_bare_dice(ident: &str) -> Option<Expr> {
    let rest = ident.strip_prefix('d').or_else(|| ident.strip_prefix('D'))?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let sides: f64 = rest[..digits_end].parse().ok()?;
    let keep = match &rest[digits_end..] {
        "" => None,
        suffix => Some(parse_keep(suffix)?),
    };
    Some(Expr::Dice {
        count: Box::new(Expr::Number(1.0)),
        sides: Box::new(Expr::Number(sides)),
        keep,
    })
}
