use core::fmt;

use memchr::{memchr, memchr2, memmem};

/// The default maximum number of characters a single row may contain.
const DEFAULT_MAX_LEN: u64 = 512;

/// The strategy used to split a line into fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// A character level state machine following RFC 4180 quoting.
    ///
    /// Quoted fields may contain commas, doubled quotes and line
    /// terminators. This is the default.
    Rfc4180,
    /// Splits on the literal sequence `","` after trimming one leading and
    /// one trailing quote.
    ///
    /// This only works on input where every field is quoted and no field
    /// contains a quote, a `","` sequence or a line terminator. A row is
    /// always complete after one line.
    Simple,
}

impl Default for Strategy {
    fn default() -> Strategy {
        Strategy::Rfc4180
    }
}

/// The result of tokenizing one physical line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenizeResult {
    /// The line ended outside of a quoted field and the row is complete.
    Complete,
    /// The line ended inside a quoted field. The caller must pass the next
    /// physical line to the same tokenizer.
    Incomplete,
}

/// An error that occurs while tokenizing a row.
///
/// After an error, the tokenizer is reset and ready for a new row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenizeError {
    /// A character other than a quote, comma or line terminator followed a
    /// closing quote.
    Encoding {
        /// The 1-based character column of the offending character,
        /// counted from the start of the row.
        column: u64,
    },
    /// The row has more characters than the configured maximum.
    TooLong {
        /// The number of characters accumulated for the row, line
        /// terminators excluded.
        len: u64,
        /// The configured maximum.
        max: u64,
    },
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TokenizeError::Encoding { column } => {
                write!(f, "CSV parsing/encoding error at column {}", column)
            }
            TokenizeError::TooLong { len, max } => write!(
                f,
                "row length ({}) exceeded maximum configured ({}), \
                 possible encoding problem",
                len, max
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TokenizeError {}

/// A receiver of field text produced by a [`Tokenizer`].
///
/// The text of a single field may arrive through several calls to `push`,
/// possibly spread over several physical lines. `end_field` marks the end of
/// the current field.
pub trait FieldSink {
    /// Append text to the current field.
    fn push(&mut self, text: &str);
    /// Finish the current field.
    fn end_field(&mut self);
}

/// Builds a tokenizer with a particular strategy and row length limit.
#[derive(Debug)]
pub struct TokenizerBuilder {
    tok: Tokenizer,
}

impl Default for TokenizerBuilder {
    fn default() -> TokenizerBuilder {
        TokenizerBuilder::new()
    }
}

impl TokenizerBuilder {
    /// Create a new builder.
    pub fn new() -> TokenizerBuilder {
        TokenizerBuilder { tok: Tokenizer::default() }
    }

    /// Build a tokenizer from this configuration.
    pub fn build(&self) -> Tokenizer {
        self.tok.clone()
    }

    /// The strategy used to split lines.
    ///
    /// The default is `Strategy::Rfc4180`.
    pub fn strategy(&mut self, strategy: Strategy) -> &mut TokenizerBuilder {
        self.tok.strategy = strategy;
        self
    }

    /// The maximum number of characters a row may contain, not counting
    /// line terminators.
    ///
    /// The default is `512`.
    pub fn max_len(&mut self, max: u64) -> &mut TokenizerBuilder {
        self.tok.max_len = max;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    /// Outside of any quotes.
    Unquoted,
    /// Inside a quoted section.
    InQuote,
    /// A quote just closed a quoted section. Another quote here is an
    /// escaped literal quote.
    QuoteClosed,
}

/// A line oriented tokenizer for comma separated text.
///
/// The tokenizer is driven one physical line at a time. Its state (whether
/// it is inside a quote and how much of the row has been consumed) is kept
/// between calls while a row is incomplete, and cleared when a row
/// completes, when an error occurs or when `reset` is called.
#[derive(Clone, Debug)]
pub struct Tokenizer {
    strategy: Strategy,
    max_len: u64,
    state: State,
    /// Characters of row content seen so far, terminators excluded.
    len: u64,
    /// Characters of row text seen so far, terminators included.
    chars: u64,
}

impl Default for Tokenizer {
    fn default() -> Tokenizer {
        Tokenizer {
            strategy: Strategy::default(),
            max_len: DEFAULT_MAX_LEN,
            state: State::Unquoted,
            len: 0,
            chars: 0,
        }
    }
}

impl Tokenizer {
    /// Create a new tokenizer with the default configuration.
    pub fn new() -> Tokenizer {
        TokenizerBuilder::new().build()
    }

    /// The strategy this tokenizer uses.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The maximum row length this tokenizer accepts.
    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    /// Returns true if the tokenizer is in the middle of a quoted field.
    pub fn is_in_quote(&self) -> bool {
        self.state == State::InQuote
    }

    /// Forget any partially tokenized row.
    pub fn reset(&mut self) {
        self.state = State::Unquoted;
        self.len = 0;
        self.chars = 0;
    }

    /// Tokenize one physical line, including its terminator, into `sink`.
    ///
    /// When this returns `TokenizeResult::Complete`, every field of the row
    /// has been ended on `sink`. When it returns
    /// `TokenizeResult::Incomplete`, the last field is still open and its
    /// text so far (including the line terminator) has been pushed.
    pub fn tokenize<S: FieldSink>(
        &mut self,
        line: &str,
        sink: &mut S,
    ) -> Result<TokenizeResult, TokenizeError> {
        let (content, term) = split_terminator(line);
        let line_len = content.chars().count() as u64;
        if self.len + line_len > self.max_len {
            let len = self.len + line_len;
            self.reset();
            return Err(TokenizeError::TooLong { len, max: self.max_len });
        }
        self.len += line_len;
        let res = match self.strategy {
            Strategy::Rfc4180 => self.tokenize_rfc(content, term, sink),
            Strategy::Simple => {
                tokenize_simple(content, sink);
                Ok(TokenizeResult::Complete)
            }
        };
        match res {
            Ok(TokenizeResult::Incomplete) => {
                self.chars += line.chars().count() as u64;
            }
            Ok(TokenizeResult::Complete) | Err(_) => self.reset(),
        }
        res
    }

    fn tokenize_rfc<S: FieldSink>(
        &mut self,
        content: &str,
        term: &str,
        sink: &mut S,
    ) -> Result<TokenizeResult, TokenizeError> {
        let bytes = content.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            match self.state {
                State::Unquoted => match memchr2(b',', b'"', &bytes[pos..]) {
                    None => {
                        sink.push(&content[pos..]);
                        pos = bytes.len();
                    }
                    Some(i) => {
                        let at = pos + i;
                        sink.push(&content[pos..at]);
                        if bytes[at] == b',' {
                            sink.end_field();
                        } else {
                            self.state = State::InQuote;
                        }
                        pos = at + 1;
                    }
                },
                State::InQuote => match memchr(b'"', &bytes[pos..]) {
                    None => {
                        sink.push(&content[pos..]);
                        pos = bytes.len();
                    }
                    Some(i) => {
                        let at = pos + i;
                        sink.push(&content[pos..at]);
                        self.state = State::QuoteClosed;
                        pos = at + 1;
                    }
                },
                State::QuoteClosed => {
                    match bytes[pos] {
                        b'"' => {
                            sink.push("\"");
                            self.state = State::InQuote;
                        }
                        b',' => {
                            sink.end_field();
                            self.state = State::Unquoted;
                        }
                        _ => {
                            let column = self.chars
                                + content[..pos].chars().count() as u64
                                + 1;
                            return Err(TokenizeError::Encoding { column });
                        }
                    }
                    pos += 1;
                }
            }
        }
        if self.state == State::InQuote {
            sink.push(term);
            return Ok(TokenizeResult::Incomplete);
        }
        sink.end_field();
        Ok(TokenizeResult::Complete)
    }
}

/// Split `"","` separated content, trimming one quote on either side.
fn tokenize_simple<S: FieldSink>(content: &str, sink: &mut S) {
    let trimmed = content.strip_prefix('"').unwrap_or(content);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    let mut start = 0;
    for at in memmem::find_iter(trimmed.as_bytes(), b"\",\"") {
        sink.push(&trimmed[start..at]);
        sink.end_field();
        start = at + 3;
    }
    sink.push(&trimmed[start..]);
    sink.end_field();
}

/// Split a physical line into its content and its terminator.
fn split_terminator(line: &str) -> (&str, &str) {
    if line.ends_with("\r\n") {
        line.split_at(line.len() - 2)
    } else if line.ends_with('\n') {
        line.split_at(line.len() - 1)
    } else {
        (line, "")
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FieldSink, Strategy, TokenizeError, TokenizeResult, Tokenizer,
        TokenizerBuilder,
    };

    #[derive(Debug, Default)]
    struct Fields {
        done: Vec<String>,
        cur: String,
    }

    impl FieldSink for Fields {
        fn push(&mut self, text: &str) {
            self.cur.push_str(text);
        }

        fn end_field(&mut self) {
            self.done.push(std::mem::replace(&mut self.cur, String::new()));
        }
    }

    fn tokenize_lines(
        tok: &mut Tokenizer,
        lines: &[&str],
    ) -> Result<(Vec<String>, TokenizeResult), TokenizeError> {
        let mut fields = Fields::default();
        let mut res = TokenizeResult::Incomplete;
        for line in lines {
            res = tok.tokenize(line, &mut fields)?;
        }
        Ok((fields.done, res))
    }

    macro_rules! tokenizes_to {
        ($name:ident, $lines:expr, $fields:expr) => {
            tokenizes_to!($name, $lines, $fields, Strategy::Rfc4180);
        };
        ($name:ident, $lines:expr, $fields:expr, $strategy:expr) => {
            #[test]
            fn $name() {
                let mut tok =
                    TokenizerBuilder::new().strategy($strategy).build();
                let (got, res) = tokenize_lines(&mut tok, &$lines).unwrap();
                let expected: Vec<&str> = $fields;
                assert_eq!(res, TokenizeResult::Complete);
                assert_eq!(got, expected);
            }
        };
    }

    tokenizes_to!(one_field, ["abc\n"], vec!["abc"]);
    tokenizes_to!(no_terminator, ["abc"], vec!["abc"]);
    tokenizes_to!(crlf, ["a,b\r\n"], vec!["a", "b"]);
    tokenizes_to!(empty_line, ["\n"], vec![""]);
    tokenizes_to!(empty_fields, [",,\n"], vec!["", "", ""]);
    tokenizes_to!(unquoted, ["a,b,c\n"], vec!["a", "b", "c"]);
    tokenizes_to!(quoted, ["\"a\",\"b\"\n"], vec!["a", "b"]);
    tokenizes_to!(quoted_empty, ["\"\",\"\"\n"], vec!["", ""]);
    tokenizes_to!(quoted_comma, ["\"a,b\",c\n"], vec!["a,b", "c"]);
    tokenizes_to!(doubled_quote, ["\"a\"\"b\"\n"], vec!["a\"b"]);
    tokenizes_to!(only_doubled_quote, ["\"\"\"\"\n"], vec!["\""]);
    tokenizes_to!(
        doubled_quote_edges,
        ["\"\"\"x\"\"\",y\n"],
        vec!["\"x\"", "y"]
    );
    tokenizes_to!(unicode, ["\"héllo\",wörld\n"], vec!["héllo", "wörld"]);
    tokenizes_to!(
        multi_line,
        ["\"a\",\"b\n", "c\",d\n"],
        vec!["a", "b\nc", "d"]
    );
    tokenizes_to!(
        multi_line_crlf,
        ["\"b\r\n", "\r\n", "c\"\r\n"],
        vec!["b\r\n\r\nc"]
    );
    tokenizes_to!(
        simple,
        ["\"a\",\"b, c\",\"\"\n"],
        vec!["a", "b, c", ""],
        Strategy::Simple
    );
    tokenizes_to!(simple_single, ["\"abc\"\n"], vec!["abc"], Strategy::Simple);
    tokenizes_to!(simple_unquoted, ["abc"], vec!["abc"], Strategy::Simple);

    #[test]
    fn incomplete_then_complete() {
        let mut tok = Tokenizer::new();
        let mut fields = Fields::default();
        assert_eq!(
            tok.tokenize("x,\"open\n", &mut fields),
            Ok(TokenizeResult::Incomplete)
        );
        assert!(tok.is_in_quote());
        assert_eq!(fields.done, vec!["x"]);
        assert_eq!(fields.cur, "open\n");
        assert_eq!(
            tok.tokenize("closed\"\n", &mut fields),
            Ok(TokenizeResult::Complete)
        );
        assert!(!tok.is_in_quote());
        assert_eq!(fields.done, vec!["x", "open\nclosed"]);
    }

    #[test]
    fn encoding_error_column() {
        let mut tok = Tokenizer::new();
        let err = tokenize_lines(&mut tok, &["\"ab\"c\n"]).unwrap_err();
        assert_eq!(err, TokenizeError::Encoding { column: 5 });
    }

    #[test]
    fn encoding_error_column_counts_previous_lines() {
        let mut tok = Tokenizer::new();
        let err = tokenize_lines(&mut tok, &["\"a\n", "b\"z\n"]).unwrap_err();
        // "a\n is three characters, then b and the quote.
        assert_eq!(err, TokenizeError::Encoding { column: 6 });
    }

    #[test]
    fn encoding_error_resets() {
        let mut tok = Tokenizer::new();
        assert!(tokenize_lines(&mut tok, &["\"a\"b\n"]).is_err());
        let (got, _) = tokenize_lines(&mut tok, &["c,d\n"]).unwrap();
        assert_eq!(got, vec!["c", "d"]);
    }

    #[test]
    fn too_long() {
        let mut tok = TokenizerBuilder::new().max_len(5).build();
        let err = tokenize_lines(&mut tok, &["abcdef\n"]).unwrap_err();
        assert_eq!(err, TokenizeError::TooLong { len: 6, max: 5 });
    }

    #[test]
    fn too_long_terminators_not_counted() {
        let mut tok = TokenizerBuilder::new().max_len(5).build();
        let (got, _) = tokenize_lines(&mut tok, &["abcde\r\n"]).unwrap();
        assert_eq!(got, vec!["abcde"]);
    }

    #[test]
    fn too_long_across_lines() {
        let mut tok = TokenizerBuilder::new().max_len(6).build();
        let err =
            tokenize_lines(&mut tok, &["\"abcd\n", "efg\"\n"]).unwrap_err();
        assert_eq!(err, TokenizeError::TooLong { len: 9, max: 6 });
    }

    #[test]
    fn unterminated_quote_stays_incomplete() {
        let mut tok = Tokenizer::new();
        let (got, res) =
            tokenize_lines(&mut tok, &["a,\"b\n", "c\n"]).unwrap();
        assert_eq!(res, TokenizeResult::Incomplete);
        assert_eq!(got, vec!["a"]);
    }
}
