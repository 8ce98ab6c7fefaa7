//! Reverse-Polish boolean expressions over tags.
//!
//! A filter such as "tagged `cat` and `dog` but not `blurry`" is written as
//! the token sequence `cat dog AND blurry NOT AND`. Tag literals push whether
//! the item carries that tag; `NOT` pops one operand, `AND` and `OR` pop two.
//! An empty expression matches everything, so a filter is always optional.

use std::collections::HashSet;
use std::fmt;
use std::hash::BuildHasher;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tags::TagSource;

/// A single token of an RPN expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Tag literal; true when the item carries the tag.
    Tag(String),
    /// Logical AND of the two topmost operands.
    And,
    /// Logical OR of the two topmost operands.
    Or,
    /// Logical NOT of the topmost operand.
    Not,
}

impl Token {
    /// Classifies a raw token. Only the exact upper-case words `AND`, `OR`
    /// and `NOT` are operators; everything else is a tag literal.
    fn classify(raw: &str) -> Self {
        match raw {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            tag => Token::Tag(tag.to_string()),
        }
    }

    /// Number of operands the token consumes from the stack.
    fn arity(&self) -> usize {
        match self {
            Token::Tag(_) => 0,
            Token::Not => 1,
            Token::And | Token::Or => 2,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Token::Tag(tag) => tag,
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, validated RPN tag expression.
///
/// Parsing checks the stack discipline once; evaluation afterwards cannot
/// fail, and the same expression can be evaluated against any number of tag
/// sets.
///
/// # Example
///
/// ```
/// use mediavec_core::Expression;
/// use std::collections::HashSet;
///
/// let expr = Expression::parse(["cat", "dog", "AND"]).unwrap();
///
/// let cat: HashSet<String> = ["cat".to_string()].into();
/// let both: HashSet<String> = ["cat".to_string(), "dog".to_string()].into();
/// assert!(!expr.evaluate(&cat));
/// assert!(expr.evaluate(&both));
///
/// assert!(Expression::parse(["cat", "AND"]).is_err());
/// assert!(Expression::empty().evaluate(&cat));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Expression {
    tokens: Vec<Token>,
    /// Deepest operand stack reached during evaluation.
    max_depth: usize,
}

impl Expression {
    /// The empty expression, which matches every item.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a sequence of RPN tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedExpression`] if a token is blank, an operator
    /// is applied with too few operands on the stack, or the sequence does not
    /// leave exactly one value on the stack.
    pub fn parse<I, T>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut parsed = Vec::new();
        let mut depth = 0usize;
        let mut max_depth = 0usize;

        for (position, raw) in tokens.into_iter().enumerate() {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                return Err(Error::MalformedExpression(format!(
                    "blank token at position {}",
                    position
                )));
            }

            let token = Token::classify(raw);
            let arity = token.arity();
            if depth < arity {
                return Err(Error::MalformedExpression(format!(
                    "{} at position {} needs {} operand(s), found {}",
                    token, position, arity, depth
                )));
            }

            // Every token leaves exactly one result in place of its operands.
            depth = depth - arity + 1;
            max_depth = max_depth.max(depth);
            parsed.push(token);
        }

        if !parsed.is_empty() && depth != 1 {
            return Err(Error::MalformedExpression(format!(
                "expression leaves {} values on the stack, expected 1",
                depth
            )));
        }

        Ok(Self {
            tokens: parsed,
            max_depth,
        })
    }

    /// Parses a whitespace-separated RPN string such as `"beach sunset OR"`.
    pub fn parse_str(input: &str) -> Result<Self> {
        Self::parse(input.split_whitespace())
    }

    /// Returns true if this is the pass-all empty expression.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens.
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// The validated token sequence.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Renders the expression back into RPN strings.
    pub fn to_tokens(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.as_str().to_string()).collect()
    }

    /// Distinct tag literals referenced by the expression, in first-use order.
    pub fn tags(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Tag(tag) if seen.insert(tag.as_str()) => Some(tag.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Evaluates against an explicit tag set.
    pub fn evaluate<S: BuildHasher>(&self, tags: &HashSet<String, S>) -> bool {
        self.evaluate_with(|tag| tags.contains(tag))
    }

    /// Evaluates the tags of `path` as reported by a [`TagSource`].
    pub fn evaluate_for(&self, source: &dyn TagSource, path: &Path) -> bool {
        self.evaluate_with(|tag| source.has_tag(path, tag))
    }

    /// Evaluates with an arbitrary tag-membership predicate.
    pub fn evaluate_with<F>(&self, has_tag: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let mut stack: Vec<bool> = Vec::with_capacity(self.max_depth);

        for token in &self.tokens {
            let value = match token {
                Token::Tag(tag) => has_tag(tag),
                Token::Not => !pop(&mut stack),
                Token::And => {
                    let rhs = pop(&mut stack);
                    let lhs = pop(&mut stack);
                    lhs && rhs
                }
                Token::Or => {
                    let rhs = pop(&mut stack);
                    let lhs = pop(&mut stack);
                    lhs || rhs
                }
            };
            stack.push(value);
        }

        // Empty expression passes everything.
        stack.pop().unwrap_or(true)
    }
}

/// Pops an operand; parsing guarantees the stack is deep enough.
#[inline]
fn pop(stack: &mut Vec<bool>) -> bool {
    debug_assert!(!stack.is_empty(), "validated expression underflowed");
    stack.pop().unwrap_or(false)
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl TryFrom<Vec<String>> for Expression {
    type Error = Error;

    fn try_from(tokens: Vec<String>) -> Result<Self> {
        Self::parse(tokens)
    }
}

impl From<Expression> for Vec<String> {
    fn from(expr: Expression) -> Self {
        expr.to_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> HashSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_empty_expression_passes_all() {
        let expr = Expression::parse(Vec::<String>::new()).unwrap();
        assert!(expr.is_empty());
        assert!(expr.evaluate(&set(&[])));
        assert!(expr.evaluate(&set(&["cat"])));
    }

    #[test]
    fn test_single_tag() {
        let expr = Expression::parse(["beach"]).unwrap();
        assert!(expr.evaluate(&set(&["beach"])));
        assert!(!expr.evaluate(&set(&["forest"])));
    }

    #[test]
    fn test_and() {
        let expr = Expression::parse(["cat", "dog", "AND"]).unwrap();
        assert!(!expr.evaluate(&set(&["cat"])));
        assert!(expr.evaluate(&set(&["cat", "dog"])));
    }

    #[test]
    fn test_or() {
        let expr = Expression::parse(["cat", "dog", "OR"]).unwrap();
        assert!(expr.evaluate(&set(&["dog"])));
        assert!(!expr.evaluate(&set(&["bird"])));
    }

    #[test]
    fn test_not() {
        let expr = Expression::parse(["blurry", "NOT"]).unwrap();
        assert!(expr.evaluate(&set(&[])));
        assert!(!expr.evaluate(&set(&["blurry"])));
    }

    #[test]
    fn test_nested() {
        // (cat AND dog) OR NOT bird
        let expr = Expression::parse_str("cat dog AND bird NOT OR").unwrap();
        assert!(expr.evaluate(&set(&["cat", "dog", "bird"])));
        assert!(expr.evaluate(&set(&[])));
        assert!(!expr.evaluate(&set(&["cat", "bird"])));
    }

    #[test]
    fn test_leftover_operands_rejected() {
        let result = Expression::parse(["cat", "dog"]);
        assert!(matches!(result, Err(Error::MalformedExpression(_))));
    }

    #[test]
    fn test_operator_underflow_rejected() {
        assert!(matches!(
            Expression::parse(["AND"]),
            Err(Error::MalformedExpression(_))
        ));
        assert!(matches!(
            Expression::parse(["cat", "OR"]),
            Err(Error::MalformedExpression(_))
        ));
        assert!(matches!(
            Expression::parse(["NOT"]),
            Err(Error::MalformedExpression(_))
        ));
    }

    #[test]
    fn test_blank_token_rejected() {
        assert!(matches!(
            Expression::parse(["cat", " "]),
            Err(Error::MalformedExpression(_))
        ));
    }

    #[test]
    fn test_lowercase_words_are_tags() {
        let expr = Expression::parse(["and"]).unwrap();
        assert!(expr.evaluate(&set(&["and"])));
        assert_eq!(expr.tokens(), &[Token::Tag("and".into())]);
    }

    #[test]
    fn test_display_and_tags() {
        let expr = Expression::parse_str("cat dog AND cat NOT OR").unwrap();
        assert_eq!(expr.to_string(), "cat dog AND cat NOT OR");
        assert_eq!(expr.tags(), vec!["cat", "dog"]);
        assert_eq!(expr.len(), 6);
    }

    #[test]
    fn test_serde_validates() {
        let expr: Expression = serde_json::from_str(r#"["cat","dog","OR"]"#).unwrap();
        assert_eq!(expr, Expression::parse_str("cat dog OR").unwrap());
        assert_eq!(
            serde_json::to_string(&expr).unwrap(),
            r#"["cat","dog","OR"]"#
        );

        let bad: std::result::Result<Expression, _> = serde_json::from_str(r#"["OR"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_evaluate_for_source() {
        use crate::tags::TagMap;

        let tags = TagMap::new().with_tags("/p/a.jpg", ["beach"]);
        let expr = Expression::parse(["beach"]).unwrap();
        assert!(expr.evaluate_for(&tags, Path::new("/p/a.jpg")));
        assert!(!expr.evaluate_for(&tags, Path::new("/p/b.jpg")));
    }
}
