//! Predicate Parser
//!
//! Parses single textual predicates into [`Condition`]s, as typed on the
//! command line.
//!
//! # Supported Syntax
//!
//! ```text
//! key OP value
//! key exists
//! key missing
//! ```
//!
//! | OP | Operator |
//! |---|---|
//! | `==` `=` | equal to |
//! | `!=` | not equal to |
//! | `<` `<=` `>` `>=` | ordering comparisons |
//! | `in` `nin` | contained / not contained in a list |
//! | `all` | array contains every listed value |
//! | `~` `matches` | regex match, `/pattern/flags` |
//! | `contains` `prefix` `suffix` | substring checks |
//!
//! Values are JSON literals (`18`, `true`, `"New York"`, `null`) or bare
//! words, which are taken as strings. Lists are JSON arrays or comma
//! separated values.
//!
//! # Examples
//!
//! ```text
//! age >= 18
//! city in NYC,LA
//! tags all ["a", "b"]
//! name ~ /^ad/i
//! address.zip exists
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, multispace0},
    combinator::{map_opt, value},
    sequence::{pair, preceded},
    IResult,
};
use serde_json::Value;

use crate::query::ast::*;
use crate::query::builder::Predicates;
use crate::query::error::ParseError;

/// Parse a predicate string into a validated condition
pub fn parse_predicate(input: &str) -> Result<Condition, ParseError> {
    let trimmed = input.trim();

    let (remaining, (key, operator)) = parse_head(trimmed).map_err(|_| ParseError::Syntax {
        input: input.to_string(),
        reason: "expected `key OP value`, `key exists` or `key missing`".to_string(),
    })?;

    let operand = parse_operand(operator, remaining.trim()).map_err(|reason| {
        ParseError::Syntax {
            input: input.to_string(),
            reason,
        }
    })?;

    Ok(Condition::new(key, operator, operand)?)
}

/// Parse a predicate and add it to a query or scope
pub fn apply_predicate<P: Predicates>(target: &mut P, input: &str) -> Result<(), ParseError> {
    let condition = parse_predicate(input)?;
    target.add_condition(&condition.key, condition.operator, condition.operand)?;
    Ok(())
}

/// Key followed by the operator
fn parse_head(input: &str) -> IResult<&str, (&str, Operator)> {
    pair(parse_key, preceded(multispace0, parse_operator))(input)
}

/// Entity key, possibly a dotted path
fn parse_key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '$'))(input)
}

fn parse_operator(input: &str) -> IResult<&str, Operator> {
    alt((parse_symbol_operator, map_opt(alpha1, word_operator)))(input)
}

fn parse_symbol_operator(input: &str) -> IResult<&str, Operator> {
    // Two-character symbols first so `<=` is not read as `<`
    alt((
        value(Operator::EqualTo, tag("==")),
        value(Operator::NotEqualTo, tag("!=")),
        value(Operator::LessThanOrEqualTo, tag("<=")),
        value(Operator::GreaterThanOrEqualTo, tag(">=")),
        value(Operator::LessThan, tag("<")),
        value(Operator::GreaterThan, tag(">")),
        value(Operator::EqualTo, tag("=")),
        value(Operator::MatchesRegex, tag("~")),
    ))(input)
}

fn word_operator(word: &str) -> Option<Operator> {
    let operator = match word.to_ascii_lowercase().as_str() {
        "in" => Operator::ContainedIn,
        "nin" => Operator::NotContainedIn,
        "all" => Operator::ContainsAllIn,
        "matches" => Operator::MatchesRegex,
        "contains" => Operator::ContainsString,
        "prefix" => Operator::HasPrefix,
        "suffix" => Operator::HasSuffix,
        "exists" => Operator::Exists,
        "missing" => Operator::NotExists,
        _ => return None,
    };
    Some(operator)
}

/// Parse the text after the operator according to the operator's shape
fn parse_operand(operator: Operator, text: &str) -> Result<Operand, String> {
    let shape = operator.shape();
    match shape {
        OperandShape::None if text.is_empty() => Ok(Operand::None),
        OperandShape::None => Err(format!("{} takes no value, found '{}'", operator, text)),
        _ if text.is_empty() => Err(format!("{} needs {}", operator, shape)),
        OperandShape::Value => Ok(Operand::Value(parse_value(text))),
        OperandShape::Text => Ok(Operand::Value(Value::String(parse_text(text)))),
        OperandShape::List => parse_list(text).map(Operand::List),
        OperandShape::Regex => parse_regex(text),
    }
}

/// JSON literal, or the bare text as a string
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Quoted JSON string, or the bare text
fn parse_text(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(s)) => s,
        _ => text.to_string(),
    }
}

fn parse_list(text: &str) -> Result<Vec<Value>, String> {
    if text.starts_with('[') {
        return serde_json::from_str(text).map_err(|e| format!("invalid JSON array: {}", e));
    }

    Ok(text.split(',').map(|item| parse_value(item.trim())).collect())
}

/// `/pattern/flags`, or a bare pattern without options
fn parse_regex(text: &str) -> Result<Operand, String> {
    let (pattern, options) = match text.strip_prefix('/') {
        Some(body) => {
            let (pattern, flags) = body
                .rsplit_once('/')
                .ok_or_else(|| "unterminated regex literal".to_string())?;
            let options = RegexOptions::from_flags(flags)
                .ok_or_else(|| format!("unknown regex flags '{}'", flags))?;
            (pattern, options)
        }
        None => (text, RegexOptions::default()),
    };

    // Flags change what parses, e.g. `x` allows `#` comments
    regex::RegexBuilder::new(pattern)
        .case_insensitive(options.case_insensitive)
        .multi_line(options.multi_line)
        .dot_matches_new_line(options.dot_all)
        .ignore_whitespace(options.extended)
        .build()
        .map_err(|e| format!("invalid regex: {}", e))?;

    Ok(Operand::Regex {
        pattern: pattern.to_string(),
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Query, UsageError};
    use serde_json::json;

    fn parse(input: &str) -> Condition {
        parse_predicate(input).unwrap()
    }

    #[test]
    fn test_parse_comparisons() {
        let c = parse("age >= 18");
        assert_eq!(c.key, "age");
        assert_eq!(c.operator, Operator::GreaterThanOrEqualTo);
        assert_eq!(c.operand, Operand::Value(json!(18)));

        assert_eq!(parse("age<18").operator, Operator::LessThan);
        assert_eq!(parse("age <= 18").operator, Operator::LessThanOrEqualTo);
        assert_eq!(parse("age > 18").operator, Operator::GreaterThan);
        assert_eq!(parse("age != 18").operator, Operator::NotEqualTo);
        assert_eq!(parse("age = 18").operator, Operator::EqualTo);
        assert_eq!(parse("age == 18").operator, Operator::EqualTo);
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse("city == NYC").operand, Operand::Value(json!("NYC")));
        assert_eq!(
            parse(r#"city == "New York""#).operand,
            Operand::Value(json!("New York"))
        );
        assert_eq!(parse("active = true").operand, Operand::Value(json!(true)));
        assert_eq!(parse("score = 1.5").operand, Operand::Value(json!(1.5)));
        assert_eq!(parse("owner = null").operand, Operand::Value(Value::Null));
    }

    #[test]
    fn test_parse_dotted_key() {
        let c = parse("address.zip exists");
        assert_eq!(c.key, "address.zip");
        assert_eq!(c.operator, Operator::Exists);
        assert_eq!(c.operand, Operand::None);

        assert_eq!(parse("nickname MISSING").operator, Operator::NotExists);
    }

    #[test]
    fn test_parse_lists() {
        let c = parse("city in NYC, LA");
        assert_eq!(c.operator, Operator::ContainedIn);
        assert_eq!(c.operand, Operand::List(vec![json!("NYC"), json!("LA")]));

        let c = parse(r#"tags all ["a", 2]"#);
        assert_eq!(c.operator, Operator::ContainsAllIn);
        assert_eq!(c.operand, Operand::List(vec![json!("a"), json!(2)]));

        assert_eq!(parse("age nin 1,2").operator, Operator::NotContainedIn);
    }

    #[test]
    fn test_parse_text_operators() {
        let c = parse("name prefix Ad");
        assert_eq!(c.operator, Operator::HasPrefix);
        assert_eq!(c.operand, Operand::Value(json!("Ad")));

        // Numbers stay text for substring checks
        let c = parse("phone contains 555");
        assert_eq!(c.operand, Operand::Value(json!("555")));

        assert_eq!(parse("name suffix son").operator, Operator::HasSuffix);
    }

    #[test]
    fn test_parse_regex() {
        let c = parse("name ~ /^ad/i");
        assert_eq!(c.operator, Operator::MatchesRegex);
        match c.operand {
            Operand::Regex { pattern, options } => {
                assert_eq!(pattern, "^ad");
                assert!(options.case_insensitive);
                assert!(!options.multi_line);
            }
            other => panic!("unexpected operand {:?}", other),
        }

        let c = parse("path matches /a/b/");
        assert_eq!(
            c.operand,
            Operand::Regex {
                pattern: "a/b".to_string(),
                options: RegexOptions::default(),
            }
        );

        let c = parse("name ~ ^A");
        assert!(matches!(c.operand, Operand::Regex { ref pattern, .. } if pattern == "^A"));
    }

    #[test]
    fn test_regex_validated_with_flags() {
        let c = parse("note ~ /a # (comment/x");
        match c.operand {
            Operand::Regex { pattern, options } => {
                assert_eq!(pattern, "a # (comment");
                assert!(options.extended);
            }
            other => panic!("unexpected operand {:?}", other),
        }

        assert!(matches!(
            parse_predicate("note ~ /a # (comment/"),
            Err(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        for input in [
            "",
            "age",
            ">= 18",
            "age between 1",
            "age >=",
            "age exists now",
            "name ~ /x/q",
            "name ~ /(/",
            "tags in [1,",
        ] {
            assert!(
                matches!(parse_predicate(input), Err(ParseError::Syntax { .. })),
                "expected syntax error for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_apply_predicate() {
        let mut query = Query::new("Person").unwrap();
        apply_predicate(&mut query, "age >= 18").unwrap();
        apply_predicate(&mut query.or(), "city == NYC").unwrap();

        let compiled = query.compile();
        assert_eq!(compiled.conditions.len(), 1);
        assert_eq!(compiled.groups.len(), 1);
        assert_eq!(compiled.groups[0].members[0].key, "city");
    }

    #[test]
    fn test_error_display() {
        let err = parse_predicate("age between 1").unwrap_err();
        assert!(err.to_string().starts_with("Invalid predicate 'age between 1'"));

        let err: ParseError = UsageError::EmptyKey.into();
        assert_eq!(err.to_string(), "Condition key must not be empty");
    }
}
