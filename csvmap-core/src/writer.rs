use memchr::memchr;

/// A record terminator.
///
/// Use this to specify the line terminator written after every row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Terminator {
    /// Writes `\r\n`.
    CRLF,
    /// Writes the byte given.
    Any(u8),
}

impl Default for Terminator {
    fn default() -> Terminator {
        Terminator::Any(b'\n')
    }
}

/// The result of writing CSV data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteResult {
    /// All of the input given was written.
    InputEmpty,
    /// The output buffer was filled before all input could be written. The
    /// caller should provide a bigger (or an emptied) buffer and call again
    /// with the remaining input.
    OutputFull,
}

/// An encoder for comma separated text.
///
/// Every field is wrapped in quotes and every quote inside a field is
/// doubled. Fields are written in pieces with `field` and closed with
/// `finish`; `delimiter` and `terminator` write the separators in between.
///
/// # RFC 4180
///
/// This writer conforms to RFC 4180 with one exception: it doesn't guarantee
/// that all records written are of the same length. Instead, the onus is on
/// the caller to ensure that all records written are of the same length.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    term: Terminator,
    /// Whether the opening quote of the current field was written.
    in_field: bool,
    /// Whether the second quote of an escaped quote is still owed.
    pending_quote: bool,
}

impl Writer {
    /// Creates a new encoder that terminates rows with `\n`.
    pub fn new() -> Writer {
        Writer::default()
    }

    /// Creates a new encoder with the given row terminator.
    pub fn with_terminator(term: Terminator) -> Writer {
        Writer { term, ..Writer::default() }
    }

    /// The terminator written by `terminator`.
    pub fn term(&self) -> Terminator {
        self.term
    }

    /// Write some of a field's text to `output`.
    ///
    /// The opening quote is written on the first call for a field. Returns
    /// the result, the number of input bytes consumed and the number of
    /// output bytes written.
    pub fn field(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> (WriteResult, usize, usize) {
        let mut nout = 0;
        if !self.in_field {
            if output.is_empty() {
                return (WriteResult::OutputFull, 0, 0);
            }
            output[0] = b'"';
            nout += 1;
            self.in_field = true;
        }
        if self.pending_quote {
            if nout >= output.len() {
                return (WriteResult::OutputFull, 0, nout);
            }
            output[nout] = b'"';
            nout += 1;
            self.pending_quote = false;
        }
        let mut nin = 0;
        while nin < input.len() {
            let rest = &input[nin..];
            let (chunk, quote) = match memchr(b'"', rest) {
                None => (rest.len(), false),
                Some(i) => (i, true),
            };
            let room = output.len() - nout;
            if chunk > room {
                output[nout..].copy_from_slice(&rest[..room]);
                return (WriteResult::OutputFull, nin + room, output.len());
            }
            output[nout..nout + chunk].copy_from_slice(&rest[..chunk]);
            nin += chunk;
            nout += chunk;
            if !quote {
                break;
            }
            if nout >= output.len() {
                return (WriteResult::OutputFull, nin, nout);
            }
            output[nout] = b'"';
            nout += 1;
            nin += 1;
            if nout >= output.len() {
                self.pending_quote = true;
                return (WriteResult::OutputFull, nin, nout);
            }
            output[nout] = b'"';
            nout += 1;
        }
        (WriteResult::InputEmpty, nin, nout)
    }

    /// Close the current field.
    ///
    /// A field that never saw a call to `field` is written as `""`. Either
    /// everything needed to close the field is written, or nothing is.
    pub fn finish(&mut self, output: &mut [u8]) -> (WriteResult, usize) {
        let mut buf = [0u8; 3];
        let mut len = 0;
        if !self.in_field {
            buf[len] = b'"';
            len += 1;
        }
        if self.pending_quote {
            buf[len] = b'"';
            len += 1;
        }
        buf[len] = b'"';
        len += 1;
        let (res, nout) = write(&buf[..len], output);
        if res == WriteResult::InputEmpty {
            self.in_field = false;
            self.pending_quote = false;
        }
        (res, nout)
    }

    /// Write a field delimiter.
    pub fn delimiter(&mut self, output: &mut [u8]) -> (WriteResult, usize) {
        write(b",", output)
    }

    /// Write a row terminator.
    pub fn terminator(&mut self, output: &mut [u8]) -> (WriteResult, usize) {
        match self.term {
            Terminator::CRLF => write(b"\r\n", output),
            Terminator::Any(b) => write(&[b], output),
        }
    }
}

fn write(data: &[u8], output: &mut [u8]) -> (WriteResult, usize) {
    if data.len() > output.len() {
        (WriteResult::OutputFull, 0)
    } else {
        output[..data.len()].copy_from_slice(data);
        (WriteResult::InputEmpty, data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::{Terminator, WriteResult, Writer};

    /// Encode one field into output buffers of `cap` bytes, draining each
    /// buffer into the returned vector.
    fn encode(field: &[u8], cap: usize) -> Vec<u8> {
        let mut wtr = Writer::new();
        let mut out = vec![0; cap];
        let mut got = vec![];
        let mut input = field;
        loop {
            let (res, nin, nout) = wtr.field(input, &mut out);
            input = &input[nin..];
            got.extend_from_slice(&out[..nout]);
            if res == WriteResult::InputEmpty {
                break;
            }
        }
        loop {
            let (res, nout) = wtr.finish(&mut out);
            got.extend_from_slice(&out[..nout]);
            if res == WriteResult::InputEmpty {
                break;
            }
        }
        got
    }

    macro_rules! encodes_to {
        ($name:ident, $field:expr, $expected:expr) => {
            #[test]
            fn $name() {
                for &cap in &[3, 4, 5, 64] {
                    let got = encode($field, cap);
                    assert_eq!(
                        String::from_utf8(got).unwrap(),
                        $expected,
                        "output capacity {}",
                        cap
                    );
                }
            }
        };
    }

    encodes_to!(plain, b"abc", "\"abc\"");
    encodes_to!(empty, b"", "\"\"");
    encodes_to!(comma, b"a,b", "\"a,b\"");
    encodes_to!(one_quote, b"\"", "\"\"\"\"");
    encodes_to!(inner_quotes, b"say \"hi\"", "\"say \"\"hi\"\"\"");
    encodes_to!(newline, b"a\nb", "\"a\nb\"");
    encodes_to!(long, b"abcdefghijklmnop", "\"abcdefghijklmnop\"");

    #[test]
    fn empty_field_never_started() {
        let mut wtr = Writer::new();
        let mut out = [0u8; 8];
        assert_eq!(wtr.finish(&mut out), (WriteResult::InputEmpty, 2));
        assert_eq!(&out[..2], b"\"\"");
    }

    #[test]
    fn finish_is_all_or_nothing() {
        let mut wtr = Writer::new();
        let mut out = [0u8; 1];
        assert_eq!(wtr.finish(&mut out), (WriteResult::OutputFull, 0));
    }

    #[test]
    fn terminators() {
        let mut out = [0u8; 4];
        let mut wtr = Writer::new();
        assert_eq!(wtr.terminator(&mut out), (WriteResult::InputEmpty, 1));
        assert_eq!(out[0], b'\n');

        let mut wtr = Writer::with_terminator(Terminator::CRLF);
        assert_eq!(wtr.terminator(&mut out), (WriteResult::InputEmpty, 2));
        assert_eq!(&out[..2], b"\r\n");
    }

    #[test]
    fn delimiter_needs_room() {
        let mut wtr = Writer::new();
        assert_eq!(wtr.delimiter(&mut []), (WriteResult::OutputFull, 0));
    }
}
