//! Integer expressions for the `expr` command

use super::{CmdError, CommandInterp};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Op(&'static str),
    Open,
    Close,
}

const OPERATORS: [&str; 11] = ["==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%"];

/// Evaluate `source`, substituting `$name` from the current frame
pub fn evaluate(
    interp: &CommandInterp,
    source: &str,
) -> Result<i64, CmdError> {
    let tokens = tokenize(interp, source)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source,
    };
    let value = parser.comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.invalid());
    }
    Ok(value)
}

fn tokenize(
    interp: &CommandInterp,
    source: &str,
) -> Result<Vec<Token>, CmdError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    'outer: while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            tokens.push(Token::Int(parse_int(&digits)?));
            continue;
        }
        if c == '$' {
            let start = i + 1;
            i = start;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            let value = interp.get_var(&name)?;
            tokens.push(Token::Int(value.as_int()?));
            continue;
        }
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            _ => {
                for op in OPERATORS {
                    let len = op.len();
                    if i + len <= chars.len() && chars[i..i + len].iter().copied().eq(op.chars()) {
                        tokens.push(Token::Op(op));
                        i += len;
                        continue 'outer;
                    }
                }
                return Err(CmdError::failed(format!("invalid expression \"{}\"", source)));
            }
        }
        i += 1;
    }
    Ok(tokens)
}

fn parse_int(digits: &str) -> Result<i64, CmdError> {
    digits
        .parse()
        .map_err(|_| CmdError::failed("integer value too large to represent"))
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl ExprParser<'_> {
    fn invalid(&self) -> CmdError {
        CmdError::failed(format!("invalid expression \"{}\"", self.source))
    }

    fn eat_op(
        &mut self,
        ops: &[&str],
    ) -> Option<&'static str> {
        let found = match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        };
        if found.is_some() {
            self.pos += 1;
        }
        found
    }

    fn comparison(&mut self) -> Result<i64, CmdError> {
        let lhs = self.additive()?;
        match self.eat_op(&["==", "!=", "<=", ">=", "<", ">"]) {
            Some(op) => {
                let rhs = self.additive()?;
                let truth = match op {
                    "==" => lhs == rhs,
                    "!=" => lhs != rhs,
                    "<=" => lhs <= rhs,
                    ">=" => lhs >= rhs,
                    "<" => lhs < rhs,
                    _ => lhs > rhs,
                };
                Ok(i64::from(truth))
            }
            None => Ok(lhs),
        }
    }

    fn additive(&mut self) -> Result<i64, CmdError> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.term()?;
            value = if op == "+" {
                value.checked_add(rhs)
            } else {
                value.checked_sub(rhs)
            }
            .ok_or_else(|| CmdError::failed("integer overflow"))?;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<i64, CmdError> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            if op != "*" && rhs == 0 {
                return Err(CmdError::failed("divide by zero"));
            }
            value = match op {
                "*" => value.checked_mul(rhs),
                "/" => floor_div(value, rhs),
                _ => floor_div(value, rhs).map(|q| value - q * rhs),
            }
            .ok_or_else(|| CmdError::failed("integer overflow"))?;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<i64, CmdError> {
        if self.eat_op(&["-"]).is_some() {
            return self
                .unary()?
                .checked_neg()
                .ok_or_else(|| CmdError::failed("integer overflow"));
        }
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::Open) => {
                self.pos += 1;
                let value = self.comparison()?;
                if self.tokens.get(self.pos) != Some(&Token::Close) {
                    return Err(self.invalid());
                }
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.invalid()),
        }
    }
}

/// Division rounding toward negative infinity
fn floor_div(
    a: i64,
    b: i64,
) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}
