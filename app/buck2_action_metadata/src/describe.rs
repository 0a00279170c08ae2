/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Human-readable descriptions of cache key inputs, as printed by `--explain`.

use std::borrow::Cow;
use std::fmt;
use std::fmt::Write;

/// Description of the inputs to an action's cache key:
///
/// ```text
/// Compiling foo.cc
///   Command: /usr/bin/gcc
///   Argument: -c
///   Argument: foo.cc
/// ```
///
/// The summary is always a single non-indented line and every field is one
/// line indented by two spaces. Values are escaped so that they can never
/// introduce a line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    summary: String,
    fields: Vec<(Cow<'static, str>, String)>,
}

impl KeyDescription {
    pub fn new(summary: impl AsRef<str>) -> KeyDescription {
        let summary = summary
            .as_ref()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        KeyDescription {
            summary,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<Cow<'static, str>>, value: impl AsRef<str>) -> Self {
        self.add_field(name, value);
        self
    }

    /// Adds one `name: value` line per value.
    pub fn fields<S: AsRef<str>>(
        mut self,
        name: &'static str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        for value in values {
            self.add_field(name, value);
        }
        self
    }

    pub fn add_field(&mut self, name: impl Into<Cow<'static, str>>, value: impl AsRef<str>) {
        self.fields
            .push((name.into(), escape_value(value.as_ref()).into_owned()));
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for KeyDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)?;
        for (name, value) in &self.fields {
            write!(f, "\n  {}: {}", name, value)?;
        }
        Ok(())
    }
}

/// Escapes a value for shell-like display.
///
/// Safe strings are returned as is, other strings are quoted the way a POSIX
/// shell would need them. Strings with control characters use `$'...'`
/// quoting so the result stays on one line.
pub fn escape_value(value: &str) -> Cow<'_, str> {
    if value.chars().any(char::is_control) {
        return Cow::Owned(ansi_c_quote(value));
    }
    match shlex::try_quote(value) {
        Ok(quoted) => quoted,
        Err(_) => Cow::Owned(ansi_c_quote(value)),
    }
}

fn ansi_c_quote(value: &str) -> String {
    let mut res = String::with_capacity(value.len() + 3);
    res.push_str("$'");
    for c in value.chars() {
        match c {
            '\n' => res.push_str("\\n"),
            '\t' => res.push_str("\\t"),
            '\r' => res.push_str("\\r"),
            '\\' => res.push_str("\\\\"),
            '\'' => res.push_str("\\'"),
            c if c.is_control() => {
                let mut buf = [0; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    // Writing to a String cannot fail.
                    let _ = write!(res, "\\x{:02x}", b);
                }
            }
            c => res.push(c),
        }
    }
    res.push('\'');
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_layout(text: &str) {
        let mut lines = text.split('\n');
        let first = lines.next().unwrap();
        assert!(!first.starts_with(' '), "summary indented: {:?}", text);
        for line in lines.filter(|l| !l.is_empty()) {
            assert!(line.starts_with("  "), "not indented: {:?}", line);
            assert!(!line.starts_with("   "), "over-indented: {:?}", line);
        }
    }

    #[test]
    fn renders_summary_and_fields() {
        let d = KeyDescription::new("Compiling foo.cc")
            .field("Command", "/usr/bin/gcc")
            .fields("Argument", ["-c", "foo.cc"]);
        assert_eq!(
            d.render(),
            "Compiling foo.cc\n  Command: /usr/bin/gcc\n  Argument: -c\n  Argument: foo.cc"
        );
        assert_layout(&d.render());
    }

    #[test]
    fn summary_is_flattened() {
        let d = KeyDescription::new("  Compiling\n   foo.cc  \n");
        assert_eq!(d.summary(), "Compiling foo.cc");
    }

    #[test]
    fn newlines_in_values_do_not_break_layout() {
        let d = KeyDescription::new("Writing file out.txt").field("Content", "line 1\nline 2");
        let text = d.render();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(text, "Writing file out.txt\n  Content: $'line 1\\nline 2'");
        assert_layout(&text);
    }

    #[test]
    fn safe_values_are_unchanged() {
        assert_eq!(escape_value("foo.cc"), "foo.cc");
        assert_eq!(escape_value("buck-out/gen/a_b.o"), "buck-out/gen/a_b.o");
    }

    #[test]
    fn unsafe_values_are_quoted() {
        let quoted = escape_value("a b");
        assert_ne!(quoted, "a b");
        assert_eq!(shlex::split(&quoted), Some(vec!["a b".to_owned()]));
    }

    #[test]
    fn ansi_c_escapes() {
        assert_eq!(escape_value("it's\t\u{1}"), "$'it\\'s\\t\\x01'");
    }
}
