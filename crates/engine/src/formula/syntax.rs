// Arithmetic syntax - converts plain arithmetic text into a generic syntax tree
// Supports: numbers, identifiers, function calls (Sum(x), add(a, b)), + - * /, unary -, parentheses
// Metric token delimiters are NOT understood here; strip them first (see parser.rs)

use std::fmt;

/// Deepest nesting of parentheses, calls and unary signs accepted.
pub const MAX_DEPTH: usize = 64;

/// Longest token stream accepted. Bounds the height of flat operator chains.
pub const MAX_TOKENS: usize = 1024;

/// Generic syntax tree. Mirrors the node kinds of a general-purpose
/// arithmetic parser; the domain mapping happens in `tree.rs`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxNode {
    Constant(f64),
    /// Bare identifier
    Symbol(String),
    Function {
        name: String,
        args: Vec<SyntaxNode>,
    },
    /// Operator application. Binary operators carry two args, `Negate` one.
    Operator {
        op: Operator,
        args: Vec<SyntaxNode>,
    },
    Parenthesis(Box<SyntaxNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
}

impl Operator {
    /// Function-style name, the same vocabulary used by 2-ary calls.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::Negate => "unaryMinus",
        }
    }
}

impl SyntaxNode {
    /// Visit every node depth-first, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a SyntaxNode)) {
        visit(self);
        match self {
            SyntaxNode::Constant(_) | SyntaxNode::Symbol(_) => {}
            SyntaxNode::Function { args, .. } | SyntaxNode::Operator { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            SyntaxNode::Parenthesis(inner) => inner.walk(visit),
        }
    }
}

/// Error returned by an [`ArithmeticParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Turns plain arithmetic text into a [`SyntaxNode`] tree.
///
/// Implementations must return a finite, acyclic tree for every `Ok`.
pub trait ArithmeticParser {
    fn parse(&self, source: &str) -> Result<SyntaxNode, SyntaxError>;
}

/// Built-in recursive-descent parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardParser;

impl ArithmeticParser for StandardParser {
    fn parse(&self, source: &str) -> Result<SyntaxNode, SyntaxError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(SyntaxError::new("Empty expression"));
        }
        if tokens.len() > MAX_TOKENS {
            return Err(SyntaxError::new(format!("Expression too long ({} tokens, max {})", tokens.len(), MAX_TOKENS)));
        }
        let (node, pos) = parse_add_sub(&tokens, 0, 0)?;
        if pos < tokens.len() {
            return Err(SyntaxError::new(format!("Unexpected {} at token {}", tokens[pos], pos)));
        }
        Ok(node)
    }
}

/// True if `s` is a single identifier the parser accepts as a symbol.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_continue),
        _ => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Ident(name) => write!(f, "identifier {}", name),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| SyntaxError::new(format!("Invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if is_ident_continue(ch) {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            _ => return Err(SyntaxError::new(format!("Unexpected character: {}", c))),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize, depth: usize) -> Result<(SyntaxNode, usize), SyntaxError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Operator::Add,
            Token::Minus => Operator::Subtract,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        left = SyntaxNode::Operator { op, args: vec![left, right] };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, depth: usize) -> Result<(SyntaxNode, usize), SyntaxError> {
    let (mut left, mut pos) = parse_unary(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Operator::Multiply,
            Token::Slash => Operator::Divide,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        left = SyntaxNode::Operator { op, args: vec![left, right] };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn check_depth(depth: usize) -> Result<(), SyntaxError> {
    if depth > MAX_DEPTH {
        return Err(SyntaxError::new(format!("Expression nested too deeply (max {})", MAX_DEPTH)));
    }
    Ok(())
}

fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> Result<(SyntaxNode, usize), SyntaxError> {
    check_depth(depth)?;
    match tokens.get(pos) {
        // Unary plus is a no-op
        Some(Token::Plus) => parse_unary(tokens, pos + 1, depth + 1),
        Some(Token::Minus) => {
            let (operand, pos) = parse_unary(tokens, pos + 1, depth + 1)?;
            Ok((SyntaxNode::Operator { op: Operator::Negate, args: vec![operand] }, pos))
        }
        _ => parse_primary(tokens, pos, depth),
    }
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<(SyntaxNode, usize), SyntaxError> {
    let Some(token) = tokens.get(pos) else {
        return Err(SyntaxError::new("Unexpected end of expression"));
    };

    match token {
        Token::Number(n) => Ok((SyntaxNode::Constant(*n), pos + 1)),
        Token::Ident(name) => {
            if let Some(Token::LParen) = tokens.get(pos + 1) {
                let (args, new_pos) = parse_call_args(tokens, pos + 2, depth + 1)?;
                return Ok((SyntaxNode::Function { name: name.clone(), args }, new_pos));
            }
            Ok((SyntaxNode::Symbol(name.clone()), pos + 1))
        }
        Token::LParen => {
            let (inner, pos) = parse_add_sub(tokens, pos + 1, depth + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((SyntaxNode::Parenthesis(Box::new(inner)), pos + 1)),
                Some(other) => Err(SyntaxError::new(format!("Expected closing parenthesis, found {}", other))),
                None => Err(SyntaxError::new("Missing closing parenthesis")),
            }
        }
        other => Err(SyntaxError::new(format!("Unexpected {} at token {}", other, pos))),
    }
}

fn parse_call_args(tokens: &[Token], pos: usize, depth: usize) -> Result<(Vec<SyntaxNode>, usize), SyntaxError> {
    let mut args = Vec::new();
    let mut pos = pos;

    // Empty call: f()
    if let Some(Token::RParen) = tokens.get(pos) {
        return Ok((args, pos + 1));
    }

    loop {
        let (arg, new_pos) = parse_add_sub(tokens, pos, depth)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(Token::Comma) => pos += 1,
            Some(other) => {
                return Err(SyntaxError::new(format!("Expected comma or closing parenthesis, found {}", other)))
            }
            None => return Err(SyntaxError::new("Missing closing parenthesis in function call")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<SyntaxNode, SyntaxError> {
        StandardParser.parse(s)
    }

    fn sym(name: &str) -> SyntaxNode {
        SyntaxNode::Symbol(name.to_string())
    }

    #[test]
    fn test_parse_number_and_symbol() {
        assert_eq!(parse("42").unwrap(), SyntaxNode::Constant(42.0));
        assert_eq!(parse(" .5 ").unwrap(), SyntaxNode::Constant(0.5));
        assert_eq!(parse("revenue").unwrap(), sym("revenue"));
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * x  =>  add(1, multiply(2, x))
        let node = parse("1 + 2 * x").unwrap();
        assert_eq!(node, SyntaxNode::Operator {
            op: Operator::Add,
            args: vec![
                SyntaxNode::Constant(1.0),
                SyntaxNode::Operator {
                    op: Operator::Multiply,
                    args: vec![SyntaxNode::Constant(2.0), sym("x")],
                },
            ],
        });
    }

    #[test]
    fn test_parse_left_associative() {
        // a - b - c  =>  subtract(subtract(a, b), c)
        match parse("a - b - c").unwrap() {
            SyntaxNode::Operator { op: Operator::Subtract, args } => {
                assert_eq!(args[1], sym("c"));
                assert!(matches!(&args[0], SyntaxNode::Operator { op: Operator::Subtract, .. }));
            }
            other => panic!("Expected subtract, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_calls() {
        assert_eq!(parse("Sum(revenue)").unwrap(), SyntaxNode::Function {
            name: "Sum".to_string(),
            args: vec![sym("revenue")],
        });
        assert_eq!(parse("add(1, x)").unwrap(), SyntaxNode::Function {
            name: "add".to_string(),
            args: vec![SyntaxNode::Constant(1.0), sym("x")],
        });
        assert_eq!(parse("f()").unwrap(), SyntaxNode::Function { name: "f".to_string(), args: vec![] });
    }

    #[test]
    fn test_parse_unary() {
        assert_eq!(parse("-x").unwrap(), SyntaxNode::Operator {
            op: Operator::Negate,
            args: vec![sym("x")],
        });
        assert_eq!(parse("+x").unwrap(), sym("x"));
        assert!(parse("2 * -x").is_ok());
    }

    #[test]
    fn test_parse_parenthesis_kept() {
        let node = parse("(a + b) / 2").unwrap();
        match node {
            SyntaxNode::Operator { op: Operator::Divide, args } => {
                assert!(matches!(&args[0], SyntaxNode::Parenthesis(_)));
            }
            other => panic!("Expected divide, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("1 + 2)").is_err());
        assert!(parse("1..2").is_err());
        assert!(parse("a b").is_err(), "implicit multiplication is not supported");
        assert!(parse("1 % 2").is_err());
        assert!(parse("Sum(a b)").is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let nested = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(parse(&nested).is_err());
        assert!(parse(&format!("{}x", "-".repeat(10_000))).is_err());

        // Under the token limit, the depth limit is what trips
        let err = parse(&format!("{}x{}", "(".repeat(100), ")".repeat(100))).unwrap_err();
        assert!(err.message.contains("nested too deeply"), "{}", err);
        let err = parse(&format!("{}x", "-".repeat(100))).unwrap_err();
        assert!(err.message.contains("nested too deeply"), "{}", err);
        let err = parse(&format!("{}x{}", "f(".repeat(100), ")".repeat(100))).unwrap_err();
        assert!(err.message.contains("nested too deeply"), "{}", err);
    }

    #[test]
    fn test_nesting_at_limit_accepted() {
        let nested = format!("{}x{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&nested).is_ok());
        assert!(parse(&format!("{}x", "-".repeat(MAX_DEPTH))).is_ok());
    }

    #[test]
    fn test_long_chain_rejected() {
        let chain = vec!["1"; 5_000].join(" + ");
        let err = parse(&chain).unwrap_err();
        assert!(err.message.contains("too long"), "{}", err);

        let chain = vec!["1"; 200].join(" + ");
        assert!(parse(&chain).is_ok());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("revenue"));
        assert!(is_identifier("calls_2024"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a b"));
    }

    #[test]
    fn test_walk_visits_all_nodes() {
        let node = parse("Sum(a) + (b * 2)").unwrap();
        let mut symbols = Vec::new();
        node.walk(&mut |n| {
            if let SyntaxNode::Symbol(name) = n {
                symbols.push(name.as_str());
            }
        });
        assert_eq!(symbols, vec!["a", "b"]);
    }
}
