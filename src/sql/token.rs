//! SQL Tokens - the atomic units of SQL output.
//!
//! Statements are built as token streams and serialized for SQLite. Values
//! never appear as literals; every value position is a `?` placeholder and
//! is bound at execution time.

/// SQL Token - every element the loader emits.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    IsNull,
    Default,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    On,
    Conflict,
    Do,
    Update,
    Set,
    Nothing,
    Returning,
    /// The `excluded` pseudo-table of an upsert.
    Excluded,

    // === Punctuation ===
    Comma,
    Dot,
    LParen,
    RParen,

    // === Operators ===
    Eq,

    // === Whitespace ===
    Space,

    // === Dynamic Content ===
    /// Table or column name, always quoted.
    Ident(String),
    /// Bound parameter.
    Placeholder,
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Token {
    /// Serialize this token to SQLite text.
    pub fn serialize(&self) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::IsNull => "IS NULL".into(),
            Token::Default => "DEFAULT".into(),

            // DML keywords
            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::On => "ON".into(),
            Token::Conflict => "CONFLICT".into(),
            Token::Do => "DO".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Nothing => "NOTHING".into(),
            Token::Returning => "RETURNING".into(),
            Token::Excluded => "excluded".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            // Operators
            Token::Eq => "=".into(),

            // Whitespace
            Token::Space => " ".into(),

            // Dynamic
            Token::Ident(name) => quote_identifier(name),
            Token::Placeholder => "?".into(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Push `"a", "b", "c"`.
    pub fn ident_list<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) -> &mut Self {
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            self.push(Token::Ident(name.clone()));
        }
        self
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self) -> String {
        self.tokens.iter().map(Token::serialize).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
