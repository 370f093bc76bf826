//! Subject helpers.
//!
//! Subjects are `.` separated tokens. In patterns `*` matches exactly one
//! token and a trailing `>` matches one or more.

use md5::{Digest, Md5};

/// Lower case hex MD5 of `value`, the token used in private reply subjects.
pub fn reply_hash(value: &str) -> String {
    hex::encode(Md5::digest(value.as_bytes()))
}

/// Reply subject pattern a caller may subscribe to.
///
/// An empty caller gets every reply subject.
pub fn private_reply_subject(caller: &str) -> String {
    if caller.is_empty() {
        return "*.reply.>".to_string();
    }

    format!("*.reply.{}.>", reply_hash(caller))
}

/// Whether `subject` matches `pattern`.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    if pattern.is_empty() || subject.is_empty() {
        return false;
    }

    let mut want = pattern.split('.').peekable();
    let mut have = subject.split('.');

    while let Some(p) = want.next() {
        if p == ">" && want.peek().is_none() {
            return have.next().is_some();
        }

        match have.next() {
            Some(token) if p == "*" || p == token => continue,
            _ => return false,
        }
    }

    have.next().is_none()
}
