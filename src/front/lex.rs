//! The lexer.

use derive_more::Display;
use regex::Regex;

/// A token together with the source slice it was matched from and its
/// position, for use in diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display, Debug)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub line: usize,
    pub col: usize,
}

/// Token classes recognised by the Penguin lexer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display, Debug)]
pub enum TokenKind {
    #[display("identifier")]
    Ident,
    #[display("integer literal")]
    Int,
    #[display("string literal")]
    Str,

    #[display("'int'")]
    KwInt,
    #[display("'string'")]
    KwString,
    #[display("'void'")]
    KwVoid,
    #[display("'tileset'")]
    KwTileset,
    #[display("'tilemap'")]
    KwTilemap,
    #[display("'sprite'")]
    KwSprite,
    #[display("'oamentry'")]
    KwOamEntry,
    #[display("'list'")]
    KwList,
    #[display("'procedure'")]
    KwProcedure,
    #[display("'if'")]
    KwIf,
    #[display("'else'")]
    KwElse,
    #[display("'loop'")]
    KwLoop,
    #[display("'return'")]
    KwReturn,
    #[display("'and'")]
    KwAnd,
    #[display("'or'")]
    KwOr,
    #[display("'not'")]
    KwNot,

    #[display(":=")]
    Assign,
    #[display("=")]
    Equals,
    #[display("==")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("<<")]
    Shl,
    #[display(">>")]
    Shr,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("&")]
    Amp,
    #[display("|")]
    Pipe,
    #[display("^")]
    Caret,
    #[display("~")]
    Tilde,
    #[display(".")]
    Dot,
    #[display(",")]
    Comma,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display(";")]
    Semi,
}

pub struct LexError {
    pub line: usize,
    pub col: usize,
    pub ch: char,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lex error: unexpected character {:?} at {}:{}",
            self.ch, self.line, self.col
        )
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        "int" => KwInt,
        "string" => KwString,
        "void" => KwVoid,
        "tileset" => KwTileset,
        "tilemap" => KwTilemap,
        "sprite" => KwSprite,
        "oamentry" => KwOamEntry,
        "list" => KwList,
        "procedure" => KwProcedure,
        "if" => KwIf,
        "else" => KwElse,
        "loop" => KwLoop,
        "return" => KwReturn,
        "and" => KwAnd,
        "or" => KwOr,
        "not" => KwNot,
        _ => return None,
    })
}

/// Fixed-text operators and punctuation, longest match first so `:=` is not
/// split into `:` and `=` (the latter isn't even a token on its own), and
/// `<=`/`==` etc. are not split into their one-character prefixes.
const SYMBOLS: &[(&str, TokenKind)] = {
    use TokenKind::*;
    &[
        (":=", Assign),
        ("==", Eq),
        ("=", Equals),
        ("!=", Ne),
        ("<=", Le),
        (">=", Ge),
        ("<<", Shl),
        (">>", Shr),
        ("<", Lt),
        (">", Gt),
        ("+", Plus),
        ("-", Minus),
        ("*", Star),
        ("/", Slash),
        ("&", Amp),
        ("|", Pipe),
        ("^", Caret),
        ("~", Tilde),
        (".", Dot),
        (",", Comma),
        ("(", LParen),
        (")", RParen),
        ("{", LBrace),
        ("}", RBrace),
        ("[", LBracket),
        ("]", RBracket),
        (";", Semi),
    ]
};

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: usize,
    col: usize,
    whitespace: Regex,
    ident_re: Regex,
    int_re: Regex,
    str_re: Regex,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            col: 1,
            whitespace: Regex::new(r"\A(?:[ \t\r\n]|(?://[^\n]*))*").unwrap(),
            ident_re: Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            int_re: Regex::new(r"\A[0-9]+").unwrap(),
            str_re: Regex::new(r#"\A"(?:[^"\\]|\\.)*""#).unwrap(),
        }
    }

    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn advance(&mut self, n: usize) {
        for ch in self.input[self.pos..self.pos + n].chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += n;
    }

    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }

        let (line, col) = (self.line, self.col);
        let rest = &self.input[self.pos..];

        if let Some(m) = self.str_re.find(rest) {
            let text = m.as_str();
            self.advance(m.end());
            return Ok(Some(Token { kind: TokenKind::Str, text, line, col }));
        }
        if let Some(m) = self.ident_re.find(rest) {
            let text = m.as_str();
            self.advance(m.end());
            let kind = keyword(text).unwrap_or(TokenKind::Ident);
            return Ok(Some(Token { kind, text, line, col }));
        }
        if let Some(m) = self.int_re.find(rest) {
            let text = m.as_str();
            self.advance(m.end());
            return Ok(Some(Token { kind: TokenKind::Int, text, line, col }));
        }
        for (sym, kind) in SYMBOLS {
            if rest.starts_with(sym) {
                let text = &rest[..sym.len()];
                self.advance(sym.len());
                return Ok(Some(Token { kind: *kind, text, line, col }));
            }
        }

        let ch = rest.chars().next().unwrap();
        Err(LexError { line, col, ch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = vec![];
        while let Some(tok) = lexer.next().unwrap() {
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_declaration() {
        use TokenKind::*;
        assert_eq!(kinds("int x := 5;"), vec![KwInt, Ident, Assign, Int, Semi]);
    }

    #[test]
    fn lexes_dotted_call() {
        use TokenKind::*;
        assert_eq!(
            kinds("control.LCDon();"),
            vec![Ident, Dot, Ident, LParen, RParen, Semi]
        );
    }

    #[test]
    fn skips_comments() {
        use TokenKind::*;
        assert_eq!(kinds("// hi\nint x; // trailing"), vec![KwInt, Ident, Semi]);
    }

    #[test]
    fn reports_position() {
        let mut lexer = Lexer::new("int\n  @");
        lexer.next().unwrap();
        lexer.next().unwrap();
        let err = lexer.next().unwrap_err();
        assert_eq!((err.line, err.col), (2, 3));
    }

    #[test]
    fn string_literal_text() {
        let mut lexer = Lexer::new(r#""tileset.2bpp""#);
        let tok = lexer.next().unwrap().unwrap();
        assert_eq!(tok.kind, TokenKind::Str);
        assert_eq!(tok.text, r#""tileset.2bpp""#);
    }
}
