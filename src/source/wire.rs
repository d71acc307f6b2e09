//! Tokenizer for the quoted output of store command-line clients
//!
//! Quoted fields use backslash escapes (`\"`, `\\`, `\n`, `\r`, `\t`,
//! `\a`, `\b`, `\xHH`). Unquoted fields run until the next separator.

/// Split `input` into fields separated by `sep`, unquoting as needed
///
/// Returns `None` on an unterminated quote or a stray character after a
/// closing quote.
pub fn split_fields(input: &str, sep: char) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = input.trim().chars().peekable();

    while chars.peek().is_some() {
        // Collapse runs of whitespace separators
        if sep == ' ' {
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }
        }

        if chars.peek() == Some(&'"') {
            chars.next();
            // Escapes carry raw bytes; a multi-byte key arrives as several `\xHH`
            let mut bytes = Vec::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => unescape(&mut chars, &mut bytes)?,
                    other => push_char(&mut bytes, other),
                }
            }
            if !closed {
                return None;
            }
            match chars.next() {
                None => {}
                Some(c) if c == sep => {}
                Some(_) => return None,
            }
            fields.push(String::from_utf8_lossy(&bytes).into_owned());
        } else {
            let mut field = String::new();
            for c in chars.by_ref() {
                if c == sep {
                    break;
                }
                field.push(c);
            }
            fields.push(field);
        }
    }

    Some(fields)
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn unescape(chars: &mut Chars<'_>, bytes: &mut Vec<u8>) -> Option<()> {
    let c = chars.next()?;
    match c {
        'n' => bytes.push(b'\n'),
        'r' => bytes.push(b'\r'),
        't' => bytes.push(b'\t'),
        'a' => bytes.push(0x07),
        'b' => bytes.push(0x08),
        'x' => {
            let hi = chars.next()?.to_digit(16)?;
            let lo = chars.next()?.to_digit(16)?;
            bytes.push((hi * 16 + lo) as u8);
        }
        other => push_char(bytes, other),
    }
    Some(())
}
