//! Keyvalues Module
//!
//! Reader and writer for the brace-delimited keyvalues text that map files,
//! manifests and instance files are stored in:
//!
//! ```text
//! entity
//! {
//!     "classname" "func_instance"
//!     connections { "OnTrigger" "door,Open,,0,-1" }
//! }
//! ```
//!
//! Keys are compared case-insensitively; their original spelling is kept for output.

use std::fmt::Write as _;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Pair(String, String),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub name: String,
    pub items: Vec<Item>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Block {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().filter_map(|item| match item {
            Item::Pair(k, v) => Some((k.as_str(), v.as_str())),
            Item::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            Item::Block(b) => Some(b),
            Item::Pair(..) => None,
        })
    }

    /// Child blocks with the given name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks().filter(move |b| b.name.eq_ignore_ascii_case(name))
    }

    pub fn find_block<'a>(&'a self, name: &'a str) -> Option<&'a Block> {
        self.find_all(name).next()
    }

    /// Value of the last pair with this key, like the engine's lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .last()
            .map(|(_, v)| v)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1") | Some("true") | Some("yes")
        )
    }

    pub fn push_pair(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push(Item::Pair(key.into(), value.into()));
    }

    pub fn push_block(&mut self, block: Block) {
        self.items.push(Item::Block(block));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENIZER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Open,
    Close,
    /// `[$X360]`-style platform conditional trailing a key or value.
    Conditional,
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    file: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        Tokenizer {
            chars: source.chars().peekable(),
            file,
            line: 1,
            column: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.file, self.line, self.column, message)
    }

    fn next_token(&mut self) -> Result<Option<(Token, u32, u32)>, ParseError> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(None);
            };
            match c {
                c if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                '/' => {
                    self.bump();
                    if self.chars.peek() == Some(&'/') {
                        while let Some(&c) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        let (line, column) = (self.line, self.column);
                        let mut text = String::from("/");
                        self.read_bare(&mut text);
                        return Ok(Some((Token::Str(text), line, column)));
                    }
                }
                '{' => {
                    self.bump();
                    return Ok(Some((Token::Open, self.line, self.column)));
                }
                '}' => {
                    self.bump();
                    return Ok(Some((Token::Close, self.line, self.column)));
                }
                '"' => {
                    self.bump();
                    let (line, column) = (self.line, self.column);
                    let mut text = String::new();
                    loop {
                        match self.bump() {
                            Some('"') => break,
                            Some(c) => text.push(c),
                            None => return Err(self.error("unterminated string")),
                        }
                    }
                    return Ok(Some((Token::Str(text), line, column)));
                }
                '[' => {
                    self.bump();
                    loop {
                        match self.bump() {
                            Some(']') => break,
                            Some('\n') | None => {
                                return Err(self.error("unterminated conditional"))
                            }
                            Some(_) => {}
                        }
                    }
                    return Ok(Some((Token::Conditional, self.line, self.column)));
                }
                _ => {
                    let (line, column) = (self.line, self.column + 1);
                    let mut text = String::new();
                    self.read_bare(&mut text);
                    return Ok(Some((Token::Str(text), line, column)));
                }
            }
        }
    }

    fn read_bare(&mut self, text: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                break;
            }
            text.push(c);
            self.bump();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse keyvalues text into an unnamed root block holding the top-level items.
pub fn parse(source: &str, file: &str) -> Result<Block, ParseError> {
    let mut tokens = Tokenizer::new(source, file);
    // Stack of open blocks; the root sits at the bottom.
    let mut stack = vec![Block::new("")];
    let mut pending_key: Option<String> = None;

    while let Some((token, line, column)) = tokens.next_token()? {
        match token {
            Token::Conditional => {}
            Token::Str(text) => match pending_key.take() {
                Some(key) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_pair(key, text);
                    }
                }
                None => pending_key = Some(text),
            },
            Token::Open => {
                let name = pending_key
                    .take()
                    .ok_or_else(|| ParseError::new(file, line, column, "block has no name"))?;
                stack.push(Block::new(name));
            }
            Token::Close => {
                if let Some(key) = pending_key.take() {
                    return Err(ParseError::new(
                        file,
                        line,
                        column,
                        format!("key \"{}\" has no value", key),
                    ));
                }
                if stack.len() < 2 {
                    return Err(ParseError::new(file, line, column, "unexpected '}'"));
                }
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_block(done);
                    }
                }
            }
        }
    }

    if let Some(key) = pending_key {
        return Err(tokens.error(format!("key \"{}\" has no value", key)));
    }
    if stack.len() > 1 {
        let open = stack.last().map(|b| b.name.clone()).unwrap_or_default();
        return Err(tokens.error(format!("block \"{}\" is never closed", open)));
    }
    Ok(stack.pop().unwrap_or_default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITER
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialise the children of `root` (the root block's own name is not written).
pub fn write(root: &Block) -> String {
    let mut out = String::new();
    for item in &root.items {
        write_item(&mut out, item, 0);
    }
    out
}

fn write_item(out: &mut String, item: &Item, depth: usize) {
    let indent = "\t".repeat(depth);
    match item {
        Item::Pair(key, value) => {
            let _ = writeln!(out, "{}\"{}\" \"{}\"", indent, key, value);
        }
        Item::Block(block) => {
            let _ = writeln!(out, "{}{}", indent, block.name);
            let _ = writeln!(out, "{}{{", indent);
            for child in &block.items {
                write_item(out, child, depth + 1);
            }
            let _ = writeln!(out, "{}}}", indent);
        }
    }
}
