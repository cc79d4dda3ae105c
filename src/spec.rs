//! Producer spec parser using winnow.
//!
//! Parses the positional model tokens of an invocation:
//!
//! ```text
//! snort            one snort producer, weight 1
//! 10snort1000      ten snort producers sharing weight 1000
//! asa{file:///tmp/drop.map,ts-to-iso}
//!                  one asa producer with two per-producer mappings
//! ```
//!
//! # Syntax
//!
//! - `[count]title[weight][{uri[,uri]*}]`
//! - `count` and `weight` are optional positive integers, both default 1
//! - `title` is letters, `_` and `-` (digits delimit count/weight)
//! - the brace list attaches mapping URIs or titles to this producer only

use winnow::ascii::digit1;
use winnow::combinator::{delimited, opt, separated};
use winnow::error::ContextError;
use winnow::token::take_while;
use winnow::Parser;

use crate::error::{Error, Result};

type WResult<T> = std::result::Result<T, ContextError>;

/// A parsed producer spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerSpec {
    /// Number of parallel producer instances.
    pub count: u32,
    /// Model title.
    pub title: String,
    /// Relative emission weight of the whole group.
    pub weight: u32,
    /// Per-producer mapping URIs or titles, in declared order.
    pub mappings: Vec<String>,
}

impl ProducerSpec {
    /// Weight of a single instance: the group weight split evenly.
    pub fn instance_weight(&self) -> f64 {
        f64::from(self.weight) / f64::from(self.count)
    }
}

/// Parse one producer spec token.
///
/// # Example
///
/// ```rust
/// use avalon::spec::parse_producer_spec;
///
/// let spec = parse_producer_spec("2snort1000").unwrap();
/// assert_eq!(spec.count, 2);
/// assert_eq!(spec.title, "snort");
/// assert_eq!(spec.weight, 1000);
/// ```
pub fn parse_producer_spec(input: &str) -> Result<ProducerSpec> {
    let spec = producer_spec
        .parse(input.trim())
        .map_err(|e| Error::Spec {
            spec: input.to_string(),
            reason: format!("parse error: {e}"),
        })?;

    if spec.count == 0 {
        return Err(Error::Spec {
            spec: input.to_string(),
            reason: "instance count must be at least 1".to_string(),
        });
    }
    if spec.weight == 0 {
        return Err(Error::Spec {
            spec: input.to_string(),
            reason: "weight must be at least 1".to_string(),
        });
    }

    Ok(spec)
}

/// Parse a complete spec token.
fn producer_spec(input: &mut &str) -> WResult<ProducerSpec> {
    let count = opt(number).parse_next(input)?;
    let title = title.parse_next(input)?;
    let weight = opt(number).parse_next(input)?;
    let mappings: Option<Vec<String>> = opt(mapping_list).parse_next(input)?;

    Ok(ProducerSpec {
        count: count.unwrap_or(1),
        title,
        weight: weight.unwrap_or(1),
        mappings: mappings.unwrap_or_default(),
    })
}

/// Parse a model title (letters, underscores, dashes).
fn title(input: &mut &str) -> WResult<String> {
    take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_' || c == '-')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

/// Parse a decimal number.
fn number(input: &mut &str) -> WResult<u32> {
    let digits: &str = digit1.parse_next(input)?;
    digits.parse().map_err(|_| ContextError::new())
}

/// Parse the `{uri,uri}` mapping list.
fn mapping_list(input: &mut &str) -> WResult<Vec<String>> {
    delimited('{', separated(1.., mapping_uri, ','), '}').parse_next(input)
}

/// Parse one mapping URI or title.
fn mapping_uri(input: &mut &str) -> WResult<String> {
    take_while(1.., |c: char| c != ',' && c != '}')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_title() {
        let spec = parse_producer_spec("snort").unwrap();
        assert_eq!(spec.count, 1);
        assert_eq!(spec.title, "snort");
        assert_eq!(spec.weight, 1);
        assert!(spec.mappings.is_empty());
    }

    #[test]
    fn test_parse_count_and_weight() {
        let spec = parse_producer_spec("10snort1000").unwrap();
        assert_eq!(spec.count, 10);
        assert_eq!(spec.title, "snort");
        assert_eq!(spec.weight, 1000);
    }

    #[test]
    fn test_parse_weight_only() {
        let spec = parse_producer_spec("snort3").unwrap();
        assert_eq!(spec.count, 1);
        assert_eq!(spec.weight, 3);
    }

    #[test]
    fn test_parse_count_only() {
        let spec = parse_producer_spec("2asa").unwrap();
        assert_eq!(spec.count, 2);
        assert_eq!(spec.title, "asa");
        assert_eq!(spec.weight, 1);
    }

    #[test]
    fn test_parse_mapping_list() {
        let spec = parse_producer_spec("snort{file:///tmp/a.map}").unwrap();
        assert_eq!(spec.mappings, vec!["file:///tmp/a.map"]);
    }

    #[test]
    fn test_parse_multiple_mappings_keep_order() {
        let spec = parse_producer_spec("2snort5{file:///a.map,ts-to-iso}").unwrap();
        assert_eq!(spec.count, 2);
        assert_eq!(spec.weight, 5);
        assert_eq!(spec.mappings, vec!["file:///a.map", "ts-to-iso"]);
    }

    #[test]
    fn test_parse_underscore_and_dash_titles() {
        assert_eq!(parse_producer_spec("r_flow").unwrap().title, "r_flow");
        assert_eq!(parse_producer_spec("my-model").unwrap().title, "my-model");
    }

    #[test]
    fn test_instance_weight_splits_group() {
        let spec = parse_producer_spec("4snort1000").unwrap();
        assert!((spec.instance_weight() - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(parse_producer_spec("").is_err());
    }

    #[test]
    fn test_parse_digits_only_fails() {
        assert!(parse_producer_spec("123").is_err());
    }

    #[test]
    fn test_parse_unclosed_brace_fails() {
        assert!(parse_producer_spec("snort{file:///a").is_err());
    }

    #[test]
    fn test_parse_empty_brace_fails() {
        assert!(parse_producer_spec("snort{}").is_err());
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = parse_producer_spec("0snort").unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let err = parse_producer_spec("snort0").unwrap_err();
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_trailing_garbage_fails() {
        assert!(parse_producer_spec("snort!").is_err());
    }
}
