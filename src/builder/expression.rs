use crate::error::{Result, SqlMapperError};

/// The parsed content of one `#{...}` placeholder.
///
/// Accepted forms: `prop`, `prop:JDBC_TYPE`, `prop, attr=value, ...` and
/// `(expression), attr=value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderSpec {
    pub property: Option<String>,
    pub expression: Option<String>,
    /// Attributes in source order, including a `jdbcType` given with `:`.
    pub attributes: Vec<(String, String)>,
}

impl PlaceholderSpec {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn parse_error(content: &str, position: usize, detail: &str) -> SqlMapperError {
    SqlMapperError::ConfigError(format!(
        "Parsing error in {{{content}}} in position {position}: {detail}"
    ))
}

/// Parse placeholder content (without the surrounding `#{` `}`).
///
/// # Errors
///
/// `ConfigError` for unbalanced parentheses, an empty property, or an attribute
/// without `=`.
pub fn parse_placeholder(content: &str) -> Result<PlaceholderSpec> {
    let mut spec = PlaceholderSpec::default();
    let chars: Vec<char> = content.chars().collect();
    let mut pos = skip_ws(&chars, 0);

    if chars.get(pos) == Some(&'(') {
        let mut depth = 1;
        let start = pos + 1;
        pos += 1;
        while depth > 0 {
            match chars.get(pos) {
                Some('(') => depth += 1,
                Some(')') => depth -= 1,
                Some(_) => {}
                None => return Err(parse_error(content, pos, "unbalanced parentheses")),
            }
            pos += 1;
        }
        let expression: String = chars[start..pos - 1].iter().collect();
        spec.expression = Some(expression.trim().to_string());
    } else {
        let start = pos;
        while pos < chars.len() && chars[pos] != ',' && chars[pos] != ':' {
            pos += 1;
        }
        let property: String = chars[start..pos].iter().collect();
        let property = property.trim();
        if property.is_empty() {
            return Err(parse_error(content, start, "missing property name"));
        }
        spec.property = Some(property.to_string());
    }

    pos = skip_ws(&chars, pos);
    if chars.get(pos) == Some(&':') {
        let start = pos + 1;
        pos = start;
        while pos < chars.len() && chars[pos] != ',' {
            pos += 1;
        }
        let jdbc_type: String = chars[start..pos].iter().collect();
        let jdbc_type = jdbc_type.trim();
        if jdbc_type.is_empty() {
            return Err(parse_error(content, start, "missing jdbcType after `:`"));
        }
        spec.attributes.push(("jdbcType".into(), jdbc_type.to_string()));
    }

    pos = skip_ws(&chars, pos);
    match chars.get(pos) {
        None => return Ok(spec),
        Some(',') => pos += 1,
        Some(other) => {
            return Err(parse_error(content, pos, &format!("unexpected `{other}`")));
        }
    }

    let rest: String = chars[pos..].iter().collect();
    for option in rest.split(',') {
        if option.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = option.split_once('=') else {
            return Err(parse_error(
                content,
                pos,
                &format!("attribute `{}` has no value", option.trim()),
            ));
        };
        spec.attributes
            .push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(spec)
}

fn skip_ws(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_property() {
        let spec = parse_placeholder(" name ").unwrap();
        assert_eq!(spec.property.as_deref(), Some("name"));
        assert!(spec.attributes.is_empty());
    }

    #[test]
    fn jdbc_type_shorthand_and_attributes() {
        let spec = parse_placeholder("id:INTEGER, mode=OUT, numericScale=2").unwrap();
        assert_eq!(spec.property.as_deref(), Some("id"));
        assert_eq!(spec.attribute("jdbcType"), Some("INTEGER"));
        assert_eq!(spec.attribute("mode"), Some("OUT"));
        assert_eq!(spec.attribute("numericScale"), Some("2"));
    }

    #[test]
    fn expression_form() {
        let spec = parse_placeholder("(id + 1), jdbcType=INTEGER").unwrap();
        assert_eq!(spec.expression.as_deref(), Some("id + 1"));
        assert_eq!(spec.property, None);
    }

    #[test]
    fn malformed_specs_fail() {
        assert!(parse_placeholder("(id + 1").is_err());
        assert!(parse_placeholder("id, mode").is_err());
        assert!(parse_placeholder(", mode=IN").is_err());
        assert!(parse_placeholder("id:").is_err());
    }
}
