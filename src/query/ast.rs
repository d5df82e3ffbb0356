//! Query Building Blocks
//!
//! Defines the vocabulary queries are made of: the fixed operator set, the
//! operand shapes each operator accepts, leaf conditions, group logic,
//! ordering and cache policies.
//!
//! # Example Conditions
//!
//! ```text
//! age greater_than 18
//! city contained_in ["NYC", "LA"]
//! name matches_regex /^jo/i
//! email exists
//! ```

use crate::query::error::UsageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-key predicate operators supported by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Value equals the operand
    EqualTo,
    /// Value is less than the operand
    LessThan,
    /// Value is less than or equal to the operand
    LessThanOrEqualTo,
    /// Value is greater than the operand
    GreaterThan,
    /// Value is greater than or equal to the operand
    GreaterThanOrEqualTo,
    /// Value differs from the operand
    NotEqualTo,
    /// Value is one of the listed values
    ContainedIn,
    /// Value is none of the listed values
    NotContainedIn,
    /// Array value contains every listed value
    ContainsAllIn,
    /// String value matches a regular expression
    MatchesRegex,
    /// String value contains a substring
    ContainsString,
    /// String value starts with a prefix
    HasPrefix,
    /// String value ends with a suffix
    HasSuffix,
    /// Key is present on the entity
    Exists,
    /// Key is absent from the entity
    NotExists,
}

impl Operator {
    /// Every operator, in declaration order
    pub const ALL: [Operator; 15] = [
        Self::EqualTo,
        Self::LessThan,
        Self::LessThanOrEqualTo,
        Self::GreaterThan,
        Self::GreaterThanOrEqualTo,
        Self::NotEqualTo,
        Self::ContainedIn,
        Self::NotContainedIn,
        Self::ContainsAllIn,
        Self::MatchesRegex,
        Self::ContainsString,
        Self::HasPrefix,
        Self::HasSuffix,
        Self::Exists,
        Self::NotExists,
    ];

    /// The operand shape this operator requires
    pub fn shape(&self) -> OperandShape {
        match self {
            Self::EqualTo
            | Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::NotEqualTo => OperandShape::Value,
            Self::ContainedIn | Self::NotContainedIn | Self::ContainsAllIn => OperandShape::List,
            Self::MatchesRegex => OperandShape::Regex,
            Self::ContainsString | Self::HasPrefix | Self::HasSuffix => OperandShape::Text,
            Self::Exists | Self::NotExists => OperandShape::None,
        }
    }

    /// Name used in the wire description
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EqualTo => "equal_to",
            Self::LessThan => "less_than",
            Self::LessThanOrEqualTo => "less_than_or_equal_to",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqualTo => "greater_than_or_equal_to",
            Self::NotEqualTo => "not_equal_to",
            Self::ContainedIn => "contained_in",
            Self::NotContainedIn => "not_contained_in",
            Self::ContainsAllIn => "contains_all_in",
            Self::MatchesRegex => "matches_regex",
            Self::ContainsString => "contains_string",
            Self::HasPrefix => "has_prefix",
            Self::HasSuffix => "has_suffix",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operand arity/type an operator expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// A single JSON value
    Value,
    /// An array of JSON values
    List,
    /// A single JSON string
    Text,
    /// A regex pattern with options
    Regex,
    /// No operand at all
    None,
}

impl std::fmt::Display for OperandShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value => write!(f, "a single value"),
            Self::List => write!(f, "an array of values"),
            Self::Text => write!(f, "a string"),
            Self::Regex => write!(f, "a regex pattern"),
            Self::None => write!(f, "no operand"),
        }
    }
}

/// Regex matching options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegexOptions {
    /// Match letters regardless of case (`i`)
    pub case_insensitive: bool,
    /// `^` and `$` match at line boundaries (`m`)
    pub multi_line: bool,
    /// `.` also matches newlines (`s`)
    pub dot_all: bool,
    /// Ignore whitespace and allow comments in the pattern (`x`)
    pub extended: bool,
}

impl RegexOptions {
    /// Options with case-insensitive matching enabled
    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
            ..Self::default()
        }
    }

    /// Render as an option string, always in `imsx` order
    pub fn flags(&self) -> String {
        let mut flags = String::with_capacity(4);
        if self.case_insensitive {
            flags.push('i');
        }
        if self.multi_line {
            flags.push('m');
        }
        if self.dot_all {
            flags.push('s');
        }
        if self.extended {
            flags.push('x');
        }
        flags
    }

    /// Parse an option string such as `"im"`
    ///
    /// Returns `None` on any unknown flag character.
    pub fn from_flags(flags: &str) -> Option<Self> {
        let mut options = Self::default();
        for c in flags.chars() {
            match c {
                'i' => options.case_insensitive = true,
                'm' => options.multi_line = true,
                's' => options.dot_all = true,
                'x' => options.extended = true,
                _ => return None,
            }
        }
        Some(options)
    }
}

/// The right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (existence checks)
    None,
    /// A single JSON value
    Value(Value),
    /// A list of JSON values
    List(Vec<Value>),
    /// A regex pattern with options
    Regex {
        pattern: String,
        options: RegexOptions,
    },
}

impl Operand {
    /// Check whether this operand fits the given shape
    pub fn fits(&self, shape: OperandShape) -> bool {
        match (self, shape) {
            (Self::Value(_), OperandShape::Value) => true,
            (Self::Value(Value::String(_)), OperandShape::Text) => true,
            (Self::List(_), OperandShape::List) => true,
            (Self::Regex { .. }, OperandShape::Regex) => true,
            (Self::None, OperandShape::None) => true,
            _ => false,
        }
    }

    /// Wire representation of the operand
    pub fn to_wire(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Value(v) => v.clone(),
            Self::List(items) => Value::Array(items.clone()),
            Self::Regex { pattern, options } => serde_json::json!({
                "pattern": pattern,
                "options": options.flags(),
            }),
        }
    }
}

/// A single per-key predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Entity key the predicate applies to
    pub key: String,
    /// Comparison operator
    pub operator: Operator,
    /// Value(s) to compare against
    pub operand: Operand,
}

impl Condition {
    /// Create a condition, validating the key and operand shape
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        operand: Operand,
    ) -> Result<Self, UsageError> {
        let key = key.into();
        if key.is_empty() {
            return Err(UsageError::EmptyKey);
        }

        let expected = operator.shape();
        if !operand.fits(expected) {
            return Err(UsageError::InvalidOperand { operator, expected });
        }

        Ok(Self {
            key,
            operator,
            operand,
        })
    }
}

/// How the members of a group combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLogic {
    /// Every member must match
    And,
    /// At least one member must match
    Or,
}

impl std::fmt::Display for GroupLogic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// A one-level group of conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Combination logic
    pub logic: GroupLogic,
    /// Members in insertion order
    pub members: Vec<Condition>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

/// The single active ordering of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub key: String,
    #[serde(rename = "dir")]
    pub direction: SortDirection,
}

/// How local cached results interact with a live remote fetch
///
/// The default is [`CachePolicy::IgnoreCache`]: every execution goes to the
/// remote store and the local cache is neither read nor written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Always consult the remote store, never touch the cache
    #[default]
    IgnoreCache,
    /// Consult the local cache only and fail if nothing is cached
    CacheOnly,
    /// Prefer the cache, fall back to the remote store on a miss
    CacheElseNetwork,
    /// Consult the remote store and refresh the cache with the result
    NetworkThenCache,
}

impl CachePolicy {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ignore_cache" | "ignore" | "network" => Some(Self::IgnoreCache),
            "cache_only" => Some(Self::CacheOnly),
            "cache_else_network" | "cache_else_load" => Some(Self::CacheElseNetwork),
            "network_then_cache" | "refresh" => Some(Self::NetworkThenCache),
            _ => None,
        }
    }

    /// Whether a successful remote result is written back to the cache
    pub fn stores_results(&self) -> bool {
        matches!(self, Self::CacheElseNetwork | Self::NetworkThenCache)
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IgnoreCache => write!(f, "ignore_cache"),
            Self::CacheOnly => write!(f, "cache_only"),
            Self::CacheElseNetwork => write!(f, "cache_else_network"),
            Self::NetworkThenCache => write!(f, "network_then_cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_operand(shape: OperandShape) -> Operand {
        match shape {
            OperandShape::Value => Operand::Value(json!(18)),
            OperandShape::Text => Operand::Value(json!("abc")),
            OperandShape::List => Operand::List(vec![json!(1), json!(2)]),
            OperandShape::Regex => Operand::Regex {
                pattern: "^a".to_string(),
                options: RegexOptions::default(),
            },
            OperandShape::None => Operand::None,
        }
    }

    #[test]
    fn test_valid_operands_accepted() {
        for op in Operator::ALL {
            let operand = valid_operand(op.shape());
            assert!(Condition::new("key", op, operand).is_ok(), "{op} rejected");
        }
    }

    #[test]
    fn test_mismatched_operands_rejected() {
        let wrong = [
            Operand::None,
            Operand::Value(json!(1)),
            Operand::List(vec![json!(1)]),
            Operand::Regex {
                pattern: "x".to_string(),
                options: RegexOptions::default(),
            },
        ];

        for op in Operator::ALL {
            for operand in wrong.iter().filter(|o| !o.fits(op.shape())) {
                let err = Condition::new("key", op, operand.clone()).unwrap_err();
                assert_eq!(
                    err,
                    UsageError::InvalidOperand {
                        operator: op,
                        expected: op.shape()
                    }
                );
            }
        }
    }

    #[test]
    fn test_contained_in_requires_array() {
        let err = Condition::new("city", Operator::ContainedIn, Operand::Value(json!("NYC")));
        assert!(matches!(err, Err(UsageError::InvalidOperand { .. })));
    }

    #[test]
    fn test_text_operators_reject_numbers() {
        let err = Condition::new("name", Operator::HasPrefix, Operand::Value(json!(5)));
        assert!(matches!(err, Err(UsageError::InvalidOperand { .. })));
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = Condition::new("", Operator::Exists, Operand::None).unwrap_err();
        assert_eq!(err, UsageError::EmptyKey);
    }

    #[test]
    fn test_regex_flags() {
        let options = RegexOptions {
            case_insensitive: true,
            dot_all: true,
            ..RegexOptions::default()
        };
        assert_eq!(options.flags(), "is");
        assert_eq!(RegexOptions::from_flags("si"), Some(options));
        assert_eq!(RegexOptions::from_flags("q"), None);
    }

    #[test]
    fn test_operand_to_wire() {
        let regex = Operand::Regex {
            pattern: "^jo".to_string(),
            options: RegexOptions::case_insensitive(),
        };
        assert_eq!(regex.to_wire(), json!({"pattern": "^jo", "options": "i"}));
        assert_eq!(Operand::None.to_wire(), Value::Null);
        assert_eq!(Operand::List(vec![json!(1)]).to_wire(), json!([1]));
    }

    #[test]
    fn test_default_cache_policy() {
        assert_eq!(CachePolicy::default(), CachePolicy::IgnoreCache);
        assert!(!CachePolicy::default().stores_results());
    }

    #[test]
    fn test_cache_policy_from_str() {
        assert_eq!(CachePolicy::from_str("cache-only"), Some(CachePolicy::CacheOnly));
        assert_eq!(
            CachePolicy::from_str("cache_else_network"),
            Some(CachePolicy::CacheElseNetwork)
        );
        assert_eq!(CachePolicy::from_str("bogus"), None);
    }
}
