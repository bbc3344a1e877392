//! Script parser for the command runtime
//!
//! A script is a sequence of commands separated by newlines or `;`. Each
//! command is a list of words; a word is built from literal text, `$name`
//! variable references and `[script]` command substitutions. Braces quote a
//! word verbatim.

use super::CmdError;

/// One piece of a word
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Literal text
    Literal(String),
    /// `$name` or `${name}`
    Var(String),
    /// `[script]`
    Script(Vec<Command>),
}

/// A word made of parts
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub parts: Vec<Part>,
}

/// A parsed command with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub words: Vec<Word>,
    pub text: String,
}

pub fn parse(script: &str) -> Result<Vec<Command>, CmdError> {
    let mut parser = Parser {
        chars: script.chars().collect(),
        pos: 0,
    };
    parser.script(false)
}

/// Whether `script` ends outside any brace, bracket or quote
pub fn is_complete(script: &str) -> bool {
    match parse(script) {
        Err(CmdError::Syntax(message)) => !message.starts_with("missing"),
        _ => true,
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_word_end(
        &self,
        nested: bool,
    ) -> bool {
        match self.peek() {
            None => true,
            Some(c) => c.is_whitespace() || c == ';' || (nested && c == ']'),
        }
    }

    fn script(
        &mut self,
        nested: bool,
    ) -> Result<Vec<Command>, CmdError> {
        let mut commands = Vec::new();
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace() || c == ';') {
                self.pos += 1;
            }
            match self.peek() {
                None if nested => return Err(CmdError::Syntax("missing close-bracket".into())),
                None => break,
                Some(']') if nested => {
                    self.pos += 1;
                    break;
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                Some(_) => {
                    let command = self.command(nested)?;
                    if !command.words.is_empty() {
                        commands.push(command);
                    }
                }
            }
        }
        Ok(commands)
    }

    fn command(
        &mut self,
        nested: bool,
    ) -> Result<Command, CmdError> {
        let start = self.pos;
        let mut words = Vec::new();
        loop {
            loop {
                match self.peek() {
                    Some(' ' | '\t' | '\r') => self.pos += 1,
                    Some('\\') if self.chars.get(self.pos + 1) == Some(&'\n') => self.pos += 2,
                    _ => break,
                }
            }
            match self.peek() {
                None | Some('\n') | Some(';') => break,
                Some(']') if nested => break,
                Some(_) => words.push(self.word(nested)?),
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Command {
            words,
            text: text.trim().to_string(),
        })
    }

    fn word(
        &mut self,
        nested: bool,
    ) -> Result<Word, CmdError> {
        match self.peek() {
            Some('{') => {
                let text = self.braced()?;
                if !self.at_word_end(nested) {
                    return Err(CmdError::Syntax("extra characters after close-brace".into()));
                }
                Ok(Word {
                    parts: vec![Part::Literal(text)],
                })
            }
            Some('"') => {
                self.pos += 1;
                let parts = self.parts(|c| c == '"', true)?;
                if self.peek() != Some('"') {
                    return Err(CmdError::Syntax("missing \"".into()));
                }
                self.pos += 1;
                if !self.at_word_end(nested) {
                    return Err(CmdError::Syntax("extra characters after close-quote".into()));
                }
                Ok(Word { parts })
            }
            _ => {
                let parts = self.parts(
                    |c| c.is_whitespace() || c == ';' || (nested && c == ']'),
                    false,
                )?;
                Ok(Word { parts })
            }
        }
    }

    fn braced(&mut self) -> Result<String, CmdError> {
        self.pos += 1;
        let mut depth = 1;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    text.push(c);
                    self.pos += 1;
                    if let Some(next) = self.peek() {
                        text.push(next);
                        self.pos += 1;
                    }
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push(c);
            self.pos += 1;
        }
        Err(CmdError::Syntax("missing close-brace".into()))
    }

    fn parts(
        &mut self,
        stop: impl Fn(char) -> bool,
        quoted: bool,
    ) -> Result<Vec<Part>, CmdError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        while let Some(c) = self.peek() {
            if stop(c) {
                break;
            }
            match c {
                '$' => {
                    self.pos += 1;
                    match self.var_name()? {
                        Some(name) => {
                            flush(&mut parts, &mut literal);
                            parts.push(Part::Var(name));
                        }
                        None => literal.push('$'),
                    }
                }
                '[' => {
                    self.pos += 1;
                    flush(&mut parts, &mut literal);
                    parts.push(Part::Script(self.script(true)?));
                }
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\n') => {
                            self.pos += 1;
                            while matches!(self.peek(), Some(' ' | '\t')) {
                                self.pos += 1;
                            }
                            literal.push(' ');
                        }
                        Some(next) => {
                            self.pos += 1;
                            literal.push(match next {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                        }
                        None => literal.push('\\'),
                    }
                }
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }
        if quoted && self.peek().is_none() {
            return Err(CmdError::Syntax("missing \"".into()));
        }
        flush(&mut parts, &mut literal);
        Ok(parts)
    }

    fn var_name(&mut self) -> Result<Option<String>, CmdError> {
        if self.peek() == Some('{') {
            self.pos += 1;
            let mut name = String::new();
            loop {
                match self.peek() {
                    None => {
                        return Err(CmdError::Syntax(
                            "missing close-brace for variable name".into(),
                        ))
                    }
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Some(name));
                    }
                    Some(c) => {
                        name.push(c);
                        self.pos += 1;
                    }
                }
            }
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(if name.is_empty() { None } else { Some(name) })
    }
}

fn flush(
    parts: &mut Vec<Part>,
    literal: &mut String,
) {
    if !literal.is_empty() {
        parts.push(Part::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_and_separators() {
        let commands = parse("set a 1; set b 2\nputs $a").unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[2].text, "puts $a");
        assert_eq!(commands[2].words[1].parts, vec![Part::Var("a".into())]);
    }

    #[test]
    fn test_braces_are_verbatim() {
        let commands = parse("set a {x $y [z] {n}}").unwrap();
        assert_eq!(
            commands[0].words[2].parts,
            vec![Part::Literal("x $y [z] {n}".into())]
        );
    }

    #[test]
    fn test_command_substitution_nests() {
        let commands = parse("set a [list [llength {1 2}] b]").unwrap();
        match &commands[0].words[2].parts[0] {
            Part::Script(inner) => {
                assert_eq!(inner.len(), 1);
                assert!(matches!(&inner[0].words[1].parts[0], Part::Script(_)));
            }
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn test_comments_and_escapes() {
        let commands = parse("# note\nputs \"a\\tb\"").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].words[1].parts, vec![Part::Literal("a\tb".into())]);
    }

    #[test]
    fn test_unbalanced_input() {
        assert!(parse("set a {x").is_err());
        assert!(parse("set a [list").is_err());
        assert!(parse("set a \"x").is_err());
        assert!(parse("set a {x}y").is_err());
    }

    #[test]
    fn test_is_complete() {
        assert!(is_complete("set a 1"));
        assert!(!is_complete("proc f {} {"));
        assert!(!is_complete("set a [list 1"));
        assert!(!is_complete("puts \"open"));
        assert!(is_complete("set a {x}y"));
    }
}
