//! Object runtime script syntax
//!
//! A line-oriented, indentation-scoped language:
//!
//! ```text
//! import pkg.mod
//! greeting = "hello"
//! def join(a, b):
//!     sep = " "
//!     return a + sep + b
//! result = join(greeting, pkg.mod.name)
//! raise ValueError("bad input")
//! ```

use std::rc::Rc;

use num_bigint::BigInt;

/// Syntax errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("invalid syntax (line {line})")]
    Invalid { line: usize },
    #[error("unterminated string literal (line {line})")]
    UnterminatedString { line: usize },
    #[error("invalid escape sequence '\\{seq}' (line {line})")]
    InvalidEscape { seq: char, line: usize },
    #[error("unindent does not match any outer indentation level (line {line})")]
    BadDedent { line: usize },
    #[error("expected an indented block (line {line})")]
    ExpectedIndent { line: usize },
    #[error("unexpected indent (line {line})")]
    UnexpectedIndent { line: usize },
    #[error("cannot assign to expression (line {line})")]
    InvalidTarget { line: usize },
    #[error("'return' outside function (line {line})")]
    ReturnOutsideFunction { line: usize },
}

impl SyntaxError {
    /// Line the error was detected on
    pub fn line(&self) -> usize {
        match self {
            SyntaxError::Invalid { line }
            | SyntaxError::UnterminatedString { line }
            | SyntaxError::InvalidEscape { line, .. }
            | SyntaxError::BadDedent { line }
            | SyntaxError::ExpectedIndent { line }
            | SyntaxError::UnexpectedIndent { line }
            | SyntaxError::InvalidTarget { line }
            | SyntaxError::ReturnOutsideFunction { line } => *line,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

/// Expressions
#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Imag(f64),
    Str(String),
    Bytes(Vec<u8>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Assignment targets
#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Attr(Expr, String),
    Index(Expr, Expr),
}

/// A statement with its source line
#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Assign(Target, Expr),
    Import(String),
    Def {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
    },
    Return(Option<Expr>),
    Raise(Option<Expr>),
    Pass,
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    Int(BigInt),
    Float(f64),
    Imag(f64),
    Str(String),
    Bytes(Vec<u8>),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

const OPERATORS: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "+", "-", "*", "/", "%",
];

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn push(
        &mut self,
        tok: Tok,
    ) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if !self.handle_indentation()? {
                    break;
                }
                continue;
            }
            let Some(&c) = self.chars.peek() else {
                break;
            };
            match c {
                '\n' => {
                    self.chars.next();
                    if self.depth == 0 {
                        self.push(Tok::Newline);
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                '#' => {
                    while matches!(self.chars.peek(), Some(c) if *c != '\n') {
                        self.chars.next();
                    }
                }
                '\\' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'\n') {
                        self.chars.next();
                        self.line += 1;
                    } else {
                        return Err(SyntaxError::Invalid { line: self.line });
                    }
                }
                '\'' | '"' => {
                    let s = self.string_body()?;
                    self.push(Tok::Str(s));
                }
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            name.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    if name == "b" && matches!(self.chars.peek(), Some('\'') | Some('"')) {
                        let s = self.string_body()?;
                        let bytes = s
                            .chars()
                            .map(|c| u8::try_from(u32::from(c)))
                            .collect::<Result<Vec<u8>, _>>()
                            .map_err(|_| SyntaxError::Invalid { line: self.line })?;
                        self.push(Tok::Bytes(bytes));
                    } else {
                        self.push(Tok::Name(name));
                    }
                }
                _ => {
                    self.chars.next();
                    let op = OPERATORS
                        .iter()
                        .find(|op| op.starts_with(c))
                        .copied()
                        .ok_or(SyntaxError::Invalid { line: self.line })?;
                    match op {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => {
                            self.depth = self
                                .depth
                                .checked_sub(1)
                                .ok_or(SyntaxError::Invalid { line: self.line })?
                        }
                        _ => {}
                    }
                    self.push(Tok::Op(op));
                }
            }
        }
        if self.depth > 0 {
            return Err(SyntaxError::Invalid { line: self.line });
        }
        if !matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline) | Some(Tok::Dedent)
        ) {
            self.push(Tok::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    /// Measure the indentation of the next non-blank line. Returns `false` at end of input.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        loop {
            let mut width = 0;
            while let Some(&c) = self.chars.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width += 8 - width % 8,
                    '\r' => {}
                    _ => break,
                }
                self.chars.next();
            }
            match self.chars.peek() {
                None => return Ok(false),
                Some('\n') => {
                    self.chars.next();
                    self.line += 1;
                }
                Some('#') => {
                    while matches!(self.chars.peek(), Some(c) if *c != '\n') {
                        self.chars.next();
                    }
                }
                Some(_) => {
                    self.at_line_start = false;
                    let current = *self.indents.last().unwrap_or(&0);
                    if width > current {
                        self.indents.push(width);
                        self.push(Tok::Indent);
                    } else {
                        while width < *self.indents.last().unwrap_or(&0) {
                            self.indents.pop();
                            self.push(Tok::Dedent);
                        }
                        if width != *self.indents.last().unwrap_or(&0) {
                            return Err(SyntaxError::BadDedent { line: self.line });
                        }
                    }
                    return Ok(true);
                }
            }
        }
    }

    fn string_body(&mut self) -> Result<String, SyntaxError> {
        let quote = self.chars.next().unwrap_or('\'');
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None | Some('\n') => {
                    return Err(SyntaxError::UnterminatedString { line: self.line })
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let esc = self
                        .chars
                        .next()
                        .ok_or(SyntaxError::UnterminatedString { line: self.line })?;
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(esc),
                        'x' => {
                            let hex: String = (0..2).filter_map(|_| self.chars.next()).collect();
                            let code = u8::from_str_radix(&hex, 16).map_err(|_| {
                                SyntaxError::InvalidEscape {
                                    seq: 'x',
                                    line: self.line,
                                }
                            })?;
                            out.push(char::from(code));
                        }
                        other => {
                            return Err(SyntaxError::InvalidEscape {
                                seq: other,
                                line: self.line,
                            })
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
            } else if (c == 'e' || c == 'E') && !text.contains(['e', 'E']) {
                is_float = true;
                text.push(c);
                self.chars.next();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.chars.next();
                    }
                }
                continue;
            } else {
                break;
            }
            self.chars.next();
        }
        let text = text.replace('_', "");
        let invalid = SyntaxError::Invalid { line: self.line };
        if matches!(self.chars.peek(), Some('j') | Some('J')) {
            self.chars.next();
            let value: f64 = text.parse().map_err(|_| invalid)?;
            self.push(Tok::Imag(value));
        } else if is_float {
            let value: f64 = text.parse().map_err(|_| invalid)?;
            self.push(Tok::Float(value));
        } else {
            let value: BigInt = text.parse().map_err(|_| invalid)?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse a script into statements
pub fn parse(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = Tokenizer::new(source).run()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        fn_depth: 0,
    };
    let mut stmts = Vec::new();
    while !parser.at(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        if parser.at(&Tok::Indent) {
            return Err(SyntaxError::UnexpectedIndent {
                line: parser.line(),
            });
        }
        parser.statement_line(&mut stmts)?;
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    fn_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn at(
        &self,
        tok: &Tok,
    ) -> bool {
        self.peek() == tok
    }

    fn at_op(
        &self,
        op: &str,
    ) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(
        &self,
        kw: &str,
    ) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(
        &mut self,
        tok: &Tok,
    ) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(
        &mut self,
        op: &str,
    ) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn invalid(&self) -> SyntaxError {
        SyntaxError::Invalid { line: self.line() }
    }

    fn expect_op(
        &mut self,
        op: &str,
    ) -> Result<(), SyntaxError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn name(&mut self) -> Result<String, SyntaxError> {
        match self.bump() {
            Tok::Name(n) => Ok(n),
            _ => {
                self.pos -= 1;
                Err(self.invalid())
            }
        }
    }

    /// One physical line: statements separated by `;`, or a compound `def`.
    fn statement_line(
        &mut self,
        out: &mut Vec<Stmt>,
    ) -> Result<(), SyntaxError> {
        if self.at_keyword("def") {
            out.push(self.def()?);
            return Ok(());
        }
        loop {
            out.push(self.simple_statement()?);
            if self.eat_op(";") {
                if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        if !self.eat(&Tok::Newline) && !self.at(&Tok::Eof) && !self.at(&Tok::Dedent) {
            return Err(self.invalid());
        }
        Ok(())
    }

    fn def(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.bump();
        let name = self.name()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.at_op(")") {
            params.push(self.name()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        self.expect_op(":")?;
        self.fn_depth += 1;
        let body = if self.eat(&Tok::Newline) {
            if !self.eat(&Tok::Indent) {
                self.fn_depth -= 1;
                return Err(SyntaxError::ExpectedIndent { line: self.line() });
            }
            let mut body = Vec::new();
            while !self.eat(&Tok::Dedent) {
                if self.at(&Tok::Eof) {
                    break;
                }
                if self.eat(&Tok::Newline) {
                    continue;
                }
                self.statement_line(&mut body)?;
            }
            body
        } else {
            let mut body = Vec::new();
            self.statement_line(&mut body)?;
            body
        };
        self.fn_depth -= 1;
        Ok(Stmt {
            line,
            kind: StmtKind::Def {
                name,
                params,
                body: Rc::new(body),
            },
        })
    }

    fn simple_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        let kind = if self.at_keyword("pass") {
            self.bump();
            StmtKind::Pass
        } else if self.at_keyword("import") {
            self.bump();
            let mut path = self.name()?;
            while self.eat_op(".") {
                path.push('.');
                path.push_str(&self.name()?);
            }
            StmtKind::Import(path)
        } else if self.at_keyword("return") {
            if self.fn_depth == 0 {
                return Err(SyntaxError::ReturnOutsideFunction { line });
            }
            self.bump();
            if self.at_statement_end() {
                StmtKind::Return(None)
            } else {
                StmtKind::Return(Some(self.expr()?))
            }
        } else if self.at_keyword("raise") {
            self.bump();
            if self.at_statement_end() {
                StmtKind::Raise(None)
            } else {
                StmtKind::Raise(Some(self.expr()?))
            }
        } else {
            let expr = self.expr()?;
            if self.eat_op("=") {
                let target = match expr {
                    Expr::Name(n) => Target::Name(n),
                    Expr::Attr(obj, attr) => Target::Attr(*obj, attr),
                    Expr::Index(obj, key) => Target::Index(*obj, *key),
                    _ => return Err(SyntaxError::InvalidTarget { line }),
                };
                StmtKind::Assign(target, self.expr()?)
            } else {
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { line, kind })
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Dedent) || self.at_op(";")
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op(".") {
                let attr = self.name()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else if self.eat_op("(") {
                let args = self.comma_list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op("[") {
                let key = self.expr()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to `close`, which is consumed
    fn comma_list(
        &mut self,
        close: &str,
    ) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        while !self.at_op(close) {
            items.push(self.expr()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let expr = match self.bump() {
            Tok::Int(i) => Expr::Int(i),
            Tok::Float(f) => Expr::Float(f),
            Tok::Imag(f) => Expr::Imag(f),
            Tok::Str(mut s) => {
                // adjacent literals concatenate
                while let Tok::Str(next) = self.peek().clone() {
                    self.bump();
                    s.push_str(&next);
                }
                Expr::Str(s)
            }
            Tok::Bytes(b) => Expr::Bytes(b),
            Tok::Name(n) => match n.as_str() {
                "None" => Expr::None,
                "True" => Expr::Bool(true),
                "False" => Expr::Bool(false),
                "def" | "import" | "return" | "raise" | "pass" => {
                    self.pos -= 1;
                    return Err(self.invalid());
                }
                _ => Expr::Name(n),
            },
            Tok::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                self.expect_op(",")?;
                let mut items = vec![first];
                items.extend(self.comma_list(")")?);
                Expr::Tuple(items)
            }
            Tok::Op("[") => Expr::List(self.comma_list("]")?),
            Tok::Op("{") => {
                let mut pairs = Vec::new();
                while !self.at_op("}") {
                    let key = self.expr()?;
                    self.expect_op(":")?;
                    let value = self.expr()?;
                    pairs.push((key, value));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Expr::Dict(pairs)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.invalid());
            }
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_and_call() {
        let stmts = parse("x = f(1, 'a')\n").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign(Target::Name(n), Expr::Call(_, args)) if n == "x" && args.len() == 2
        ));
    }

    #[test]
    fn test_parse_indented_def() {
        let src = "def f(a, b):\n    c = a + b\n    return c\ny = 1\n";
        let stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts[0].kind {
            StmtKind::Def { name, params, body } => {
                assert_eq!(name, "f");
                assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(body.len(), 2);
                assert_eq!(body[1].line, 3);
            }
            other => panic!("expected def, got {:?}", other),
        }
        assert_eq!(stmts[1].line, 4);
    }

    #[test]
    fn test_parse_single_line_def_and_semicolons() {
        let stmts = parse("def f(): return 1\na = 1; b = 2").unwrap();
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn test_parse_literals() {
        let stmts = parse("v = [None, True, 2.5, 3j, b'\\x00ab', {'k': (1,)}]").unwrap();
        match &stmts[0].kind {
            StmtKind::Assign(_, Expr::List(items)) => assert_eq!(items.len(), 6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiline_brackets() {
        let stmts = parse("d = {\n  'a': 1,\n  'b': 2,\n}\nx = 1").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse("x = "), Err(SyntaxError::Invalid { .. })));
        assert!(matches!(
            parse("s = 'abc"),
            Err(SyntaxError::UnterminatedString { line: 1 })
        ));
        assert!(matches!(
            parse("return 1"),
            Err(SyntaxError::ReturnOutsideFunction { line: 1 })
        ));
        assert!(matches!(
            parse("def f():\nx = 1"),
            Err(SyntaxError::ExpectedIndent { .. })
        ));
        assert!(matches!(
            parse("1 = x"),
            Err(SyntaxError::InvalidTarget { .. })
        ));
        assert!(matches!(
            parse("  x = 1"),
            Err(SyntaxError::UnexpectedIndent { .. })
        ));
    }
}
