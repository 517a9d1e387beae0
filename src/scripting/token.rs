use crate::error::Result;

/// Replace every `open ... close` token in `text` with the handler's output.
///
/// A backslash before `open` emits the token literally. Inside a token a backslash
/// before `close` keeps the close marker as part of the expression. An unterminated
/// token is copied through unchanged.
pub(crate) fn replace_tokens<F>(text: &str, open: &str, close: &str, mut handler: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let Some(mut start) = text.find(open) else {
        return Ok(text.to_string());
    };
    let mut out = String::with_capacity(text.len());
    let mut offset = 0;
    loop {
        if start > 0 && text[..start].ends_with('\\') {
            out.push_str(&text[offset..start - 1]);
            out.push_str(open);
            offset = start + open.len();
        } else {
            out.push_str(&text[offset..start]);
            let mut expression = String::new();
            let mut cursor = start + open.len();
            let mut end = None;
            while let Some(rel) = text[cursor..].find(close) {
                let at = cursor + rel;
                if at > cursor && text[..at].ends_with('\\') {
                    expression.push_str(&text[cursor..at - 1]);
                    expression.push_str(close);
                    cursor = at + close.len();
                } else {
                    expression.push_str(&text[cursor..at]);
                    end = Some(at);
                    break;
                }
            }
            match end {
                Some(at) => {
                    out.push_str(&handler(&expression)?);
                    offset = at + close.len();
                }
                None => {
                    out.push_str(&text[start..]);
                    offset = text.len();
                }
            }
        }
        match text[offset..].find(open) {
            Some(rel) => start = offset + rel,
            None => break,
        }
    }
    out.push_str(&text[offset..]);
    Ok(out)
}

/// Whether `text` holds at least one unescaped, terminated `open ... close` token.
pub(crate) fn contains_token(text: &str, open: &str, close: &str) -> bool {
    let mut found = false;
    // the handler never fails
    let _ = replace_tokens(text, open, close, |_| {
        found = true;
        Ok(String::new())
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(text: &str) -> String {
        replace_tokens(text, "${", "}", |expr| Ok(expr.to_uppercase())).unwrap()
    }

    #[test]
    fn replaces_each_token() {
        assert_eq!(upper("select ${a} from ${b}"), "select A from B");
        assert_eq!(upper("no tokens"), "no tokens");
    }

    #[test]
    fn escaped_open_is_literal() {
        assert_eq!(upper(r"cost \${a} and ${b}"), "cost ${a} and B");
    }

    #[test]
    fn escaped_close_stays_in_expression() {
        assert_eq!(upper(r"${a\}b}"), "A}B");
    }

    #[test]
    fn unterminated_token_is_copied() {
        assert_eq!(upper("x ${a"), "x ${a");
        assert!(!contains_token("x ${a", "${", "}"));
        assert!(contains_token("x ${a}", "${", "}"));
    }
}
