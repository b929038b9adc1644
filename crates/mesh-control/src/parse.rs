//! Tokenizer for control lines
//!
//! A control line is an address followed by whitespace-separated
//! arguments:
//!
//! ```text
//! /create_ex 1001 player "loops/intro.wav" 0.25 0.5 1.0 sync gain=0.8
//! ```
//!
//! The leading `/` is optional. Arguments are typed by their spelling:
//! integers (`12`, `-3`), floats (`0.5`, `1e-3`, `.5`), double-quoted
//! strings with `\"` and `\\` escapes, and bare words (strings).

use mesh_engine::error::ProtocolError;

/// One typed argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Arg {
    /// Type name as used in signatures and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "int",
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
        }
    }

    fn from_word(word: String) -> Self {
        if let Ok(value) = word.parse::<i64>() {
            return Arg::Int(value);
        }
        let numeric = word
            .chars()
            .next()
            .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
            .unwrap_or(false);
        if numeric {
            match word.parse::<f64>() {
                Ok(value) if value.is_finite() => return Arg::Float(value),
                _ => {}
            }
        }
        Arg::Str(word)
    }
}

/// An address with untyped-checked arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub address: String,
    pub args: Vec<Arg>,
}

/// Split a line into address and arguments
///
/// Returns `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<RawMessage>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = tokenize(line)?.into_iter();
    let address = match tokens.next() {
        Some(Token::Word(word)) => word.trim_start_matches('/').to_string(),
        Some(Token::Quoted(_)) | None => {
            return Err(ProtocolError::Malformed(format!("missing address in {:?}", line)))
        }
    };
    if address.is_empty() {
        return Err(ProtocolError::Malformed(format!("empty address in {:?}", line)));
    }

    let args = tokens
        .map(|token| match token {
            Token::Word(word) => Arg::from_word(word),
            Token::Quoted(text) => Arg::Str(text),
        })
        .collect();
    Ok(Some(RawMessage { address, args }))
}

enum Token {
    Word(String),
    Quoted(String),
}

fn tokenize(line: &str) -> Result<Vec<Token>, ProtocolError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => break,
                    },
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(ProtocolError::Malformed("unterminated string".to_string()));
            }
            tokens.push(Token::Quoted(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}
