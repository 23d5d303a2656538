// src/io/slcan/splitter.rs
//
// Token extraction for the inbound slcan text stream.
//
// A token is a run of ASCII alphanumerics closed by the `\r` terminator.
// The run may be empty (a bare `\r` is a token). Anything that is not
// alphanumeric and not a terminator (BEL, '\n', noise) breaks the run.

use super::codec::TERMINATOR;

/// Extract every complete token from `chunk`, in order, terminator included.
///
/// A trailing run without a terminator is dropped.
///
///   "t1230\rz\r" -> ["t1230\r", "z\r"]
///   "t1230\rza"  -> ["t1230\r"]
pub fn split_frames(chunk: &str) -> Vec<&str> {
    split_with_tail(chunk).0
}

/// Like [`split_frames`], but also returns the unterminated alphanumeric run
/// at the end of `chunk` so a caller can prepend it to the next chunk.
pub fn split_with_tail(chunk: &str) -> (Vec<&str>, &str) {
    let mut tokens = Vec::new();
    let mut run_start = 0;

    for (i, c) in chunk.char_indices() {
        if c == TERMINATOR {
            tokens.push(&chunk[run_start..=i]);
            run_start = i + 1;
        } else if !c.is_ascii_alphanumeric() {
            run_start = i + c.len_utf8();
        }
    }

    (tokens, &chunk[run_start..])
}
