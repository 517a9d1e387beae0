//! Placeholder numbering for drivers that want positional markers.
//!
//! Compiled SQL always uses bare `?` markers; a driver may prefer `?N` or `$N`.

use std::borrow::Cow;

use serde::Deserialize;

mod lexer;

use lexer::MarkerScanner;

/// Marker style handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// Bare `?` markers, left untouched.
    #[default]
    Plain,
    /// SQLite-style `?1`, `?2`, ...
    Sqlite,
    /// PostgreSQL-style `$1`, `$2`, ...
    Postgres,
}

impl PlaceholderStyle {
    fn prefix(self) -> Option<char> {
        match self {
            PlaceholderStyle::Plain => None,
            PlaceholderStyle::Sqlite => Some('?'),
            PlaceholderStyle::Postgres => Some('$'),
        }
    }
}

/// Number every bare `?` marker in `sql` in order of appearance.
///
/// Markers already carrying a position are left alone and do not advance the
/// counter. Returns the input unchanged when there is nothing to number.
#[must_use]
pub fn number_placeholders(sql: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    let Some(prefix) = style.prefix() else {
        return Cow::Borrowed(sql);
    };
    let mut markers = MarkerScanner::new(sql).peekable();
    if markers.peek().is_none() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut copied = 0;
    for (position, at) in (1usize..).zip(markers) {
        out.push_str(&sql[copied..at]);
        out.push(prefix);
        out.push_str(&position.to_string());
        copied = at + 1;
    }
    out.push_str(&sql[copied..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_markers_for_sqlite() {
        let sql = "select * from t where a = ? and b = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Sqlite);
        assert_eq!(res, "select * from t where a = ?1 and b = ?2");
    }

    #[test]
    fn numbers_markers_for_postgres() {
        let res = number_placeholders("insert into t values(?, ?)", PlaceholderStyle::Postgres);
        assert_eq!(res, "insert into t values($1, $2)");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?', ? -- ?\n/* ? */ from t where a = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Postgres);
        assert_eq!(res, "select '?', $1 -- ?\n/* ? */ from t where a = $2");
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "$foo$ select ? from t $foo$ where a = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Sqlite);
        assert_eq!(res, "$foo$ select ? from t $foo$ where a = ?1");
    }

    #[test]
    fn existing_positions_and_nested_comments() {
        let sql = "select ?2, ? /* a /* ? */ ? */ from t where b = \"?\"";
        let res = number_placeholders(sql, PlaceholderStyle::Sqlite);
        assert_eq!(res, "select ?2, ?1 /* a /* ? */ ? */ from t where b = \"?\"");
        let res = number_placeholders("select 'it''s ?', ?", PlaceholderStyle::Postgres);
        assert_eq!(res, "select 'it''s ?', $1");
    }

    #[test]
    fn keeps_non_ascii_text_intact() {
        let res = number_placeholders("select 'é', ? as «x»", PlaceholderStyle::Sqlite);
        assert_eq!(res, "select 'é', ?1 as «x»");
    }

    #[test]
    fn plain_style_borrows() {
        let sql = "select * from t where a = ?";
        let res = number_placeholders(sql, PlaceholderStyle::Plain);
        assert!(matches!(res, Cow::Borrowed(_)));
        let res = number_placeholders("select 1", PlaceholderStyle::Sqlite);
        assert!(matches!(res, Cow::Borrowed(_)));
    }
}
