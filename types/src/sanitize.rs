//! Terminal hygiene for untrusted text.
//!
//! Model output and wire error messages go straight to a terminal. Escape
//! sequences in that text could move the cursor, rewrite earlier output, or
//! touch the clipboard, so everything from the network is stripped down to
//! printable characters plus `\n`, `\t`, `\r` before display.

use std::borrow::Cow;

const ESC: char = '\x1b';

/// Strip ANSI escape sequences and control characters from untrusted text.
///
/// Returns `Cow::Borrowed` when the input is already clean, which is the
/// common case for model output.
#[must_use]
pub fn sanitize_terminal_text(input: &str) -> Cow<'_, str> {
    if !input.chars().any(is_suspect) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESC {
            skip_escape_sequence(&mut chars);
        } else if !is_suspect(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

fn is_suspect(c: char) -> bool {
    let keep = matches!(c, '\n' | '\t' | '\r');
    let c0 = c <= '\x1f';
    let c1 = ('\u{0080}'..='\u{009f}').contains(&c);
    (c0 && !keep) || c1 || c == '\x7f'
}

/// Consume one escape sequence following an ESC byte.
///
/// CSI sequences run to a final byte in `@`..=`~`; OSC sequences run to BEL
/// or ESC `\`. Anything else is a two-character sequence.
fn skip_escape_sequence<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '\x07' {
                    break;
                }
                if c == ESC {
                    // ESC \ is the string terminator
                    chars.next();
                    break;
                }
            }
        }
        Some(_) => {
            chars.next();
        }
        None => {}
    }
}
