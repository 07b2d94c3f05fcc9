/*!
`csvmap-core` provides the two text state machines used by `csvmap`: a line
oriented tokenizer that splits comma separated text into unescaped fields,
and a field encoder that quote wraps fields into caller provided buffers.

Neither machine allocates. The tokenizer hands field text to a caller
supplied [`FieldSink`], and the encoder writes into `&mut [u8]` slices and
reports when it ran out of room, so the caller decides how memory is managed.

# Tokenizing

A physical line is passed *with* its line terminator. If the line ends while
a quoted field is still open, the tokenizer reports
[`TokenizeResult::Incomplete`] and keeps its state, and the caller passes the
next physical line.

```
use csvmap_core::{FieldSink, TokenizeResult, Tokenizer};

#[derive(Default)]
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

let mut tok = Tokenizer::new();
let mut fields = Fields::default();
assert_eq!(
    tok.tokenize("\"a\",\"multi\n", &mut fields),
    Ok(TokenizeResult::Incomplete),
);
assert_eq!(
    tok.tokenize("line\"\n", &mut fields),
    Ok(TokenizeResult::Complete),
);
assert_eq!(fields.done, vec!["a", "multi\nline"]);
```
*/

#![deny(missing_docs)]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub use crate::tokenizer::{
    FieldSink, Strategy, TokenizeError, TokenizeResult, Tokenizer,
    TokenizerBuilder,
};
pub use crate::writer::{Terminator, WriteResult, Writer};

mod tokenizer;
mod writer;
