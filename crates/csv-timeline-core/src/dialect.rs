//! Parsing rules for delimited text and the field tokenizer.
//!
//! A [`Dialect`] is shared by a file descriptor and a group descriptor and
//! fully determines how a physical line is classified (blank, comment,
//! header, data) and split into fields.
//!
//! Tokenizing is a pure function of the line: there is no scanner object
//! carried between lines.
//!
//! ```
//! use csv_timeline_core::dialect::{Dialect, tokenize};
//!
//! assert_eq!(tokenize(r#"a,"b,c",d\,e"#, ",", '"', '\\'), ["a", "b,c", "d,e"]);
//!
//! let spaced = Dialect {
//!     delimiter: " ".to_string(),
//!     multi_delimiter: true,
//!     ..Dialect::default()
//! };
//! assert_eq!(spaced.split_fields("250101  120000.5   7"), ["250101", "120000.5", "7"]);
//! ```

use serde::{Deserialize, Serialize};

/// Quote character recognised by the tokenizer.
pub const QUOTE: char = '"';

/// Escape character recognised by the tokenizer.
pub const ESCAPE: char = '\\';

/// How lines of a delimited text file are classified and split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Comment markers. A line whose first non-whitespace character is any of
    /// these characters is skipped.
    pub comment: String,

    /// Field separators. Every character is a separator on its own.
    pub delimiter: String,

    /// Treat runs of separators as one (empty fields are dropped).
    pub multi_delimiter: bool,

    /// The first non-blank, non-comment line is a header, not data.
    pub header: bool,

    /// Reject data rows whose field count differs from the column count.
    pub strict_columns: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            comment: "#".to_string(),
            delimiter: ",".to_string(),
            multi_delimiter: false,
            header: true,
            strict_columns: false,
        }
    }
}

impl Dialect {
    /// Whether an already trimmed line starts with a comment marker.
    pub fn is_comment(&self, trimmed: &str) -> bool {
        trimmed
            .chars()
            .next()
            .is_some_and(|first| self.comment.contains(first))
    }

    /// Whether a raw line carries no row: blank after trimming, or a comment.
    pub fn is_skipped(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || self.is_comment(trimmed)
    }

    /// Split a line into trimmed fields.
    ///
    /// In multi-delimiter mode empty fields are dropped, so consecutive
    /// separators collapse into one.
    pub fn split_fields(&self, line: &str) -> Vec<String> {
        tokenize(line, &self.delimiter, QUOTE, ESCAPE)
            .into_iter()
            .map(|field| field.trim().to_string())
            .filter(|field| !(self.multi_delimiter && field.is_empty()))
            .collect()
    }
}

/// Split `line` at any character of `delimiters`.
///
/// - Text between `quote` characters is taken literally, separators
///   included; the quotes themselves are removed.
/// - `escape` followed by `n` yields a newline; followed by any other
///   character it yields that character (so `\,` is a literal comma). A
///   trailing lone escape is kept as is.
/// - `k` separators always produce `k + 1` fields, empty ones included.
pub fn tokenize(line: &str, delimiters: &str, quote: char, escape: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if c == escape {
            match chars.next() {
                Some('n') => field.push('\n'),
                Some(next) => field.push(next),
                None => field.push(c),
            }
        } else if c == quote {
            in_quotes = !in_quotes;
        } else if !in_quotes && delimiters.contains(c) {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    fields.push(field);

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keeps_empty_fields() {
        assert_eq!(tokenize("a,,b,", ",", QUOTE, ESCAPE), ["a", "", "b", ""]);
        assert_eq!(tokenize("", ",", QUOTE, ESCAPE), [""]);
    }

    #[test]
    fn quoted_separators_are_literal() {
        assert_eq!(
            tokenize(r#""x, y",z"#, ",", QUOTE, ESCAPE),
            ["x, y", "z"]
        );
    }

    #[test]
    fn escapes_are_resolved() {
        assert_eq!(
            tokenize(r#"a\,b,c\nd,e\"#, ",", QUOTE, ESCAPE),
            ["a,b", "c\nd", "e\\"]
        );
        assert_eq!(tokenize(r#"say \"hi\""#, ",", QUOTE, ESCAPE), [r#"say "hi""#]);
    }

    #[test]
    fn every_delimiter_character_separates() {
        assert_eq!(tokenize("a;b\tc", ";\t", QUOTE, ESCAPE), ["a", "b", "c"]);
    }

    #[test]
    fn split_fields_trims_and_optionally_collapses() {
        let plain = Dialect::default();
        assert_eq!(plain.split_fields(" a , ,b "), ["a", "", "b"]);

        let collapsing = Dialect {
            delimiter: " ".to_string(),
            multi_delimiter: true,
            ..Dialect::default()
        };
        assert_eq!(collapsing.split_fields("  1   2 3  "), ["1", "2", "3"]);
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let dialect = Dialect {
            comment: "#%".to_string(),
            ..Dialect::default()
        };
        assert!(dialect.is_skipped("   "));
        assert!(dialect.is_skipped("  # note"));
        assert!(dialect.is_skipped("%matlab style"));
        assert!(!dialect.is_skipped("1,2 # trailing is data"));

        let no_comments = Dialect {
            comment: String::new(),
            ..Dialect::default()
        };
        assert!(!no_comments.is_skipped("#1,2"));
    }
}
