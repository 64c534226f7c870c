//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query    := or_expr EOF
//! or_expr  := and_expr (OR and_expr)*
//! and_expr := unary ((AND)? unary)*
//! unary    := (NOT | '-')* ('+')? primary ('^' number)?
//! primary  := '(' or_expr ')' | field ':' value | value | '*'
//! value    := WORD | WORD'*' | QUOTED | range
//! range    := ('[' | '{') bound TO bound (']' | '}')
//! bound    := WORD | '*'
//! ```
//!
//! Words and phrases are analyzed with the index analyzer, so the resulting
//! [`Query`] holds indexed terms.

use std::ops::Bound;

use super::lexer::{Lexer, Spanned, Token, SPECIAL_CHARS};
use crate::error::{Result, SearchError};
use crate::query::ast::{PhraseTerm, Query};
use crate::schema::{FieldKind, FieldMapping, Schema};
use crate::tokenizer::Analyzer;

/// Operator between adjacent clauses with no explicit operator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DefaultOperator {
    #[default]
    And,
    Or,
}

impl std::str::FromStr for DefaultOperator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "and" => Ok(DefaultOperator::And),
            "or" => Ok(DefaultOperator::Or),
            other => Err(SearchError::Config(format!("unknown default operator '{}'", other))),
        }
    }
}

/// Parser for Lucene-style query strings
///
/// Borrows the analyzer and schema of the index it parses for.
pub struct QueryStringParser<'a> {
    analyzer: &'a Analyzer,
    schema: &'a Schema,
    default_operator: DefaultOperator,
}

impl<'a> QueryStringParser<'a> {
    pub fn new(analyzer: &'a Analyzer, schema: &'a Schema) -> Self {
        Self {
            analyzer,
            schema,
            default_operator: DefaultOperator::default(),
        }
    }

    /// Set the operator between adjacent clauses
    pub fn with_default_operator(mut self, operator: DefaultOperator) -> Self {
        self.default_operator = operator;
        self
    }

    /// Parse a query string into a query tree
    pub fn parse(&self, input: &str) -> Result<Query> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut state = ParseState {
            parser: self,
            tokens,
            index: 0,
        };

        if state.peek() == &Token::Eof {
            return Err(SearchError::syntax(0, "Empty query"));
        }
        let query = state.parse_or_expr()?;
        match state.peek() {
            Token::Eof => Ok(query),
            Token::RightParen => Err(SearchError::syntax(
                state.position(),
                "Unbalanced parenthesis",
            )),
            other => Err(SearchError::syntax(
                state.position(),
                format!("Unexpected {}", describe(other)),
            )),
        }
    }

    /// Escape every operator character so `text` is searched literally
    pub fn escape(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for word in text.split_inclusive(char::is_whitespace) {
            let bare = word.trim_end();
            if ["AND", "OR", "NOT", "TO"]
                .iter()
                .any(|k| bare.eq_ignore_ascii_case(k))
            {
                escaped.push('\\');
            }
            for ch in word.chars() {
                if SPECIAL_CHARS.contains(&ch) {
                    escaped.push('\\');
                }
                escaped.push(ch);
            }
        }
        escaped
    }

    /// Fields an unqualified clause searches
    fn default_fields(&self) -> Vec<String> {
        self.schema.default_fields()
    }

    /// Mapping of a field named in the query
    ///
    /// Strict schemas reject unknown fields; other schemas treat them as
    /// unmapped text.
    fn lookup_field(&self, field: &str, position: usize) -> Result<Option<&'a FieldMapping>> {
        match self.schema.get_field(field) {
            Some(mapping) => Ok(Some(mapping)),
            None if self.schema.dynamic.should_reject_unmapped() && field != self.schema.id_field => {
                Err(SearchError::syntax(
                    position,
                    format!("Unknown field '{}'", field),
                ))
            }
            None => Ok(None),
        }
    }

    fn field_kind(&self, field: &str) -> Option<FieldKind> {
        if field == self.schema.id_field {
            return Some(FieldKind::Keyword);
        }
        self.schema.get_field(field).map(|m| m.kind)
    }

    fn value_query(&self, field: &str, value: &Value, position: usize) -> Result<Query> {
        match value {
            Value::Word { text, prefix: true } => self.prefix_query(field, text, position),
            Value::Word { text, .. } => self.word_query(field, text, position),
            Value::Phrase(text) => self.phrase_query(field, text, position),
            Value::Any => Ok(self.exists_query(field)),
            Value::Range(lower, upper) => self.range_query(field, lower, upper),
        }
    }

    /// Query for one word in one field
    fn word_query(&self, field: &str, text: &str, position: usize) -> Result<Query> {
        match self.field_kind(field) {
            Some(FieldKind::Keyword) => Ok(Query::term(field, text)),
            Some(FieldKind::Numeric) => {
                let value = parse_number(text, position, field)?;
                Ok(Query::numeric_range(
                    field,
                    Bound::Included(value),
                    Bound::Included(value),
                ))
            }
            Some(FieldKind::Text) | None => Ok(self.analyzed_query(field, text)),
        }
    }

    /// Term or phrase for analyzed text; `MatchNone` when nothing survives
    fn analyzed_query(&self, field: &str, text: &str) -> Query {
        let tokens: Vec<_> = self.analyzer.token_stream(text).collect();
        match tokens.as_slice() {
            [] => Query::MatchNone,
            [token] => Query::term(field, token.term.clone()),
            [first, ..] => {
                let base = first.position;
                Query::Phrase {
                    field: field.to_string(),
                    terms: tokens
                        .iter()
                        .map(|t| PhraseTerm {
                            term: t.term.clone(),
                            offset: t.position - base,
                        })
                        .collect(),
                }
            }
        }
    }

    fn prefix_query(&self, field: &str, text: &str, position: usize) -> Result<Query> {
        match self.field_kind(field) {
            Some(FieldKind::Keyword) => Ok(Query::prefix(field, text)),
            Some(FieldKind::Numeric) => Err(SearchError::syntax(
                position,
                format!("Prefix query on numeric field '{}'", field),
            )),
            Some(FieldKind::Text) | None => Ok(Query::prefix(field, self.fold_case(text))),
        }
    }

    /// `field:*`, every document with a value in the field
    fn exists_query(&self, field: &str) -> Query {
        match self.field_kind(field) {
            Some(FieldKind::Numeric) => {
                Query::numeric_range(field, Bound::Unbounded, Bound::Unbounded)
            }
            _ => Query::prefix(field, ""),
        }
    }

    fn phrase_query(&self, field: &str, text: &str, position: usize) -> Result<Query> {
        match self.field_kind(field) {
            Some(FieldKind::Keyword) => Ok(Query::term(field, text)),
            Some(FieldKind::Numeric) => self.word_query(field, text.trim(), position),
            Some(FieldKind::Text) | None => Ok(self.analyzed_query(field, text)),
        }
    }

    fn range_query(&self, field: &str, lower: &RawBound, upper: &RawBound) -> Result<Query> {
        let numeric = match self.field_kind(field) {
            Some(FieldKind::Numeric) => true,
            Some(_) => false,
            None => lower.parses_as_number() && upper.parses_as_number(),
        };

        if numeric {
            return Ok(Query::numeric_range(
                field,
                lower.to_number(field)?,
                upper.to_number(field)?,
            ));
        }

        let keyword = self.field_kind(field) == Some(FieldKind::Keyword);
        let fold = |text: &str| {
            if keyword {
                text.to_string()
            } else {
                self.fold_case(text)
            }
        };
        Ok(Query::text_range(field, lower.map(&fold), upper.map(&fold)))
    }

    /// Range bounds and prefixes are only lowercased, never stemmed
    fn fold_case(&self, text: &str) -> String {
        if self.analyzer.config().lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        }
    }
}

/// A range bound as written, before the field decides its type
struct RawBound {
    inclusive: bool,
    /// `None` for `*`
    value: Option<(String, usize)>,
}

impl RawBound {
    fn parses_as_number(&self) -> bool {
        match &self.value {
            Some((text, _)) => text.parse::<f64>().is_ok(),
            None => true,
        }
    }

    fn to_number(&self, field: &str) -> Result<Bound<f64>> {
        match &self.value {
            None => Ok(Bound::Unbounded),
            Some((text, position)) => {
                let value = parse_number(text, *position, field)?;
                Ok(if self.inclusive {
                    Bound::Included(value)
                } else {
                    Bound::Excluded(value)
                })
            }
        }
    }

    fn map<F: Fn(&str) -> String>(&self, f: F) -> Bound<String> {
        match &self.value {
            None => Bound::Unbounded,
            Some((text, _)) if self.inclusive => Bound::Included(f(text)),
            Some((text, _)) => Bound::Excluded(f(text)),
        }
    }
}

fn parse_number(text: &str, position: usize, field: &str) -> Result<f64> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SearchError::syntax(
            position,
            format!("Expected a number for numeric field '{}', got '{}'", field, text),
        )),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word { text, .. } => format!("term '{}'", text),
        Token::Quoted(text) => format!("phrase \"{}\"", text),
        Token::Caret(_) => "'^'".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::To => "TO".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::LeftBracket => "'['".to_string(),
        Token::RightBracket => "']'".to_string(),
        Token::LeftBrace => "'{'".to_string(),
        Token::RightBrace => "'}'".to_string(),
        Token::LeftParen => "'('".to_string(),
        Token::RightParen => "')'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Eof => "end of query".to_string(),
    }
}

/// A value as written after an optional `field:`
enum Value {
    Word { text: String, prefix: bool },
    Phrase(String),
    /// `*`
    Any,
    Range(RawBound, RawBound),
}

/// Where a clause searches
enum Target {
    Field(String),
    Defaults,
}

struct ParseState<'p, 'a> {
    parser: &'p QueryStringParser<'a>,
    tokens: Vec<Spanned>,
    index: usize,
}

impl<'p, 'a> ParseState<'p, 'a> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.index + offset)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.position)
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.tokens.get(self.index).cloned().unwrap_or(Spanned {
            token: Token::Eof,
            position: self.position(),
        });
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        spanned
    }

    /// Whether the current token can start a unary clause
    fn starts_clause(&self) -> bool {
        matches!(
            self.peek(),
            Token::Word { .. }
                | Token::Quoted(_)
                | Token::Star
                | Token::LeftParen
                | Token::LeftBracket
                | Token::LeftBrace
                | Token::Not
                | Token::Minus
                | Token::Plus
                | Token::To
        )
    }

    /// `OR` or `AND` must be followed by a clause
    fn expect_clause_after(&self, operator: &Spanned) -> Result<()> {
        if self.starts_clause() {
            Ok(())
        } else {
            Err(SearchError::syntax(
                operator.position,
                format!("Missing clause after {}", describe(&operator.token)),
            ))
        }
    }

    fn parse_or_expr(&mut self) -> Result<Query> {
        if self.peek() == &Token::Or {
            return Err(SearchError::syntax(self.position(), "Missing clause before OR"));
        }
        let mut clauses = vec![self.parse_and_expr()?];

        while self.peek() == &Token::Or {
            let operator = self.advance();
            self.expect_clause_after(&operator)?;
            clauses.push(self.parse_and_expr()?);
        }

        Ok(Query::or(clauses))
    }

    /// Explicit `AND` always conjoins; adjacency follows the default operator
    fn parse_and_expr(&mut self) -> Result<Query> {
        if self.peek() == &Token::And {
            return Err(SearchError::syntax(self.position(), "Missing clause before AND"));
        }
        let mut groups = vec![vec![self.parse_unary()?]];

        loop {
            if self.peek() == &Token::And {
                let operator = self.advance();
                self.expect_clause_after(&operator)?;
                groups.push(vec![self.parse_unary()?]);
            } else if self.starts_clause() {
                let clause = self.parse_unary()?;
                if let Some(group) = groups.last_mut() {
                    group.push(clause);
                }
            } else {
                break;
            }
        }

        let operator = self.parser.default_operator;
        let mut conjuncts = Vec::new();
        for group in groups {
            match operator {
                DefaultOperator::And => conjuncts.extend(group),
                DefaultOperator::Or => conjuncts.push(combine_optional(group)),
            }
        }
        Ok(Query::and(conjuncts))
    }

    fn parse_unary(&mut self) -> Result<Query> {
        let mut negations = 0usize;
        while matches!(self.peek(), Token::Not | Token::Minus) {
            self.advance();
            negations += 1;
        }
        if self.peek() == &Token::Plus {
            self.advance();
        }

        if !self.starts_clause() || matches!(self.peek(), Token::Not | Token::Minus | Token::Plus) {
            return Err(SearchError::syntax(
                self.position(),
                format!("Expected a clause, found {}", describe(self.peek())),
            ));
        }

        let mut query = self.parse_primary()?;
        if let Token::Caret(boost) = *self.peek() {
            self.advance();
            query = query.boost(boost);
        }

        for _ in 0..negations {
            query = Query::not(query);
        }
        Ok(query)
    }

    fn parse_primary(&mut self) -> Result<Query> {
        let start = self.position();
        match self.peek().clone() {
            Token::LeftParen => {
                self.advance();
                if self.peek() == &Token::RightParen {
                    return Err(SearchError::syntax(start, "Empty group"));
                }
                if self.peek() == &Token::Eof {
                    return Err(SearchError::syntax(start, "Unbalanced parenthesis"));
                }
                let inner = self.parse_or_expr()?;
                if self.peek() != &Token::RightParen {
                    return Err(SearchError::syntax(start, "Unbalanced parenthesis"));
                }
                self.advance();
                Ok(inner)
            }
            Token::Star => {
                self.advance();
                Ok(Query::MatchAll)
            }
            Token::Word { text, prefix: false } if self.peek_at(1) == &Token::Colon => {
                self.advance();
                self.advance();
                self.parser.lookup_field(&text, start)?;
                self.parse_value(Target::Field(text), start)
            }
            _ => self.parse_value(Target::Defaults, start),
        }
    }

    fn parse_value(&mut self, target: Target, field_position: usize) -> Result<Query> {
        let position = self.position();
        let spanned = self.advance();
        let value = match spanned.token {
            Token::Word { text, prefix } => Value::Word { text, prefix },
            // A bare TO outside a range is an ordinary word
            Token::To => Value::Word {
                text: "TO".to_string(),
                prefix: false,
            },
            Token::Quoted(text) => Value::Phrase(text),
            Token::Star => Value::Any,
            Token::LeftBracket => {
                let (lower, upper) = self.parse_range_bounds(true, spanned.position)?;
                Value::Range(lower, upper)
            }
            Token::LeftBrace => {
                let (lower, upper) = self.parse_range_bounds(false, spanned.position)?;
                Value::Range(lower, upper)
            }
            Token::LeftParen => {
                return Err(SearchError::syntax(
                    field_position,
                    "Grouping after a field name is not supported",
                ))
            }
            other => {
                return Err(SearchError::syntax(
                    spanned.position,
                    format!("Expected a value, found {}", describe(&other)),
                ))
            }
        };

        match target {
            Target::Field(field) => self.parser.value_query(&field, &value, position),
            Target::Defaults if matches!(value, Value::Any) => Ok(Query::MatchAll),
            Target::Defaults => {
                let clauses = self
                    .parser
                    .default_fields()
                    .iter()
                    .map(|field| self.parser.value_query(field, &value, position))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if clauses.is_empty() {
                    Query::MatchNone
                } else {
                    Query::or(clauses)
                })
            }
        }
    }

    fn parse_range_bounds(
        &mut self,
        lower_inclusive: bool,
        open_position: usize,
    ) -> Result<(RawBound, RawBound)> {
        let lower = self.parse_bound(lower_inclusive, open_position)?;

        if self.peek() != &Token::To {
            return Err(SearchError::syntax(
                self.position(),
                format!("Expected TO in range, found {}", describe(self.peek())),
            ));
        }
        self.advance();

        // Inclusivity of the upper bound is only known at the closing bracket
        let mut upper = self.parse_bound(true, open_position)?;
        match self.peek() {
            Token::RightBracket => upper.inclusive = true,
            Token::RightBrace => upper.inclusive = false,
            Token::Eof => {
                return Err(SearchError::syntax(open_position, "Unterminated range"))
            }
            other => {
                return Err(SearchError::syntax(
                    self.position(),
                    format!("Expected ']' or '}}' to close range, found {}", describe(other)),
                ))
            }
        }
        self.advance();
        Ok((lower, upper))
    }

    fn parse_bound(&mut self, inclusive: bool, open_position: usize) -> Result<RawBound> {
        let position = self.position();
        match self.peek().clone() {
            Token::Star => {
                self.advance();
                Ok(RawBound {
                    inclusive,
                    value: None,
                })
            }
            Token::Word {
                text,
                prefix: false,
            }
            | Token::Quoted(text) => {
                self.advance();
                Ok(RawBound {
                    inclusive,
                    value: Some((text, position)),
                })
            }
            // Negative numbers: `-` directly followed by a word
            Token::Minus => {
                self.advance();
                match self.peek().clone() {
                    Token::Word {
                        text,
                        prefix: false,
                    } => {
                        self.advance();
                        Ok(RawBound {
                            inclusive,
                            value: Some((format!("-{}", text), position)),
                        })
                    }
                    _ => Err(SearchError::syntax(position, "Expected a range bound")),
                }
            }
            Token::Eof => Err(SearchError::syntax(open_position, "Unterminated range")),
            other => Err(SearchError::syntax(
                position,
                format!("Expected a range bound, found {}", describe(&other)),
            )),
        }
    }
}

/// Adjacent clauses under the OR default operator
///
/// Negated clauses still exclude: `a b -c` is `(a OR b) AND NOT c`.
fn combine_optional(group: Vec<Query>) -> Query {
    let (negative, positive): (Vec<Query>, Vec<Query>) =
        group.into_iter().partition(Query::is_negative);
    if negative.is_empty() {
        return Query::or(positive);
    }
    let mut clauses = Vec::with_capacity(negative.len() + 1);
    if !positive.is_empty() {
        clauses.push(Query::or(positive));
    }
    clauses.extend(negative);
    Query::and(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::schema::{DynamicMapping, FieldMapping, FieldUsage};

    fn schema() -> Schema {
        Schema::new()
            .field("id", FieldMapping::keyword())
            .field("body", FieldMapping::text())
            .field("tag", FieldMapping::keyword())
            .field("year", FieldMapping::numeric())
            .with_default_field("body")
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(&AnalyzerConfig::default().with_stopwords(false)).unwrap()
    }

    fn english() -> Analyzer {
        Analyzer::new(&AnalyzerConfig::default()).unwrap()
    }

    fn parse(input: &str) -> Result<Query> {
        let analyzer = analyzer();
        let schema = schema();
        QueryStringParser::new(&analyzer, &schema).parse(input)
    }

    fn term(t: &str) -> Query {
        Query::term("body", t)
    }

    #[test]
    fn test_implicit_and_explicit_and() {
        assert_eq!(
            parse("quick fox").unwrap(),
            Query::And(vec![term("quick"), term("fox")])
        );
        assert_eq!(
            parse("fox AND quick").unwrap(),
            Query::And(vec![term("fox"), term("quick")])
        );
    }

    #[test]
    fn test_precedence() {
        // NOT > AND > OR
        assert_eq!(
            parse("cat OR dog AND NOT fox").unwrap(),
            Query::Or(vec![
                term("cat"),
                Query::And(vec![term("dog"), Query::not(term("fox"))])
            ])
        );
        assert_eq!(
            parse("(cat OR dog) fox").unwrap(),
            Query::And(vec![Query::Or(vec![term("cat"), term("dog")]), term("fox")])
        );
    }

    #[test]
    fn test_default_operator_or() {
        let analyzer = analyzer();
        let schema = schema();
        let parser =
            QueryStringParser::new(&analyzer, &schema).with_default_operator(DefaultOperator::Or);
        assert_eq!(
            parser.parse("quick fox").unwrap(),
            Query::Or(vec![term("quick"), term("fox")])
        );
        assert_eq!(
            parser.parse("quick fox -dog").unwrap(),
            Query::And(vec![
                Query::Or(vec![term("quick"), term("fox")]),
                Query::not(term("dog"))
            ])
        );
        assert_eq!(
            parser.parse("quick AND fox").unwrap(),
            Query::And(vec![term("quick"), term("fox")])
        );
    }

    #[test]
    fn test_minus_plus_and_boost() {
        assert_eq!(
            parse("+fox -dog^2").unwrap(),
            Query::And(vec![term("fox"), Query::not(term("dog").boost(2.0))])
        );
    }

    #[test]
    fn test_phrase_keeps_stopword_gaps() {
        assert_eq!(
            parse("\"quick fox\"").unwrap(),
            Query::phrase("body", ["quick", "fox"])
        );
        let english = english();
        let schema = schema();
        let parser = QueryStringParser::new(&english, &schema);
        match parser.parse("\"fox and the hound\"").unwrap() {
            Query::Phrase { terms, .. } => {
                assert_eq!(terms.first().map(|t| t.offset), Some(0));
                assert_eq!(terms.last().map(|t| t.offset), Some(3));
            }
            other => panic!("expected phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_terms_are_analyzed() {
        assert_eq!(parse("Running").unwrap(), term("run"));
        // A stopword analyzes to nothing
        let english = english();
        let schema = schema();
        assert_eq!(
            QueryStringParser::new(&english, &schema).parse("the").unwrap(),
            Query::MatchNone
        );
        // Keyword fields take the raw word
        assert_eq!(parse("tag:Rust").unwrap(), Query::term("tag", "Rust"));
    }

    #[test]
    fn test_prefix_and_match_all() {
        assert_eq!(parse("Prog*").unwrap(), Query::prefix("body", "prog"));
        assert_eq!(parse("*").unwrap(), Query::MatchAll);
        assert_eq!(parse("tag:*").unwrap(), Query::prefix("tag", ""));
        assert_eq!(
            parse("year:*").unwrap(),
            Query::numeric_range("year", Bound::Unbounded, Bound::Unbounded)
        );
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            parse("year:[2020 TO 2024}").unwrap(),
            Query::numeric_range("year", Bound::Included(2020.0), Bound::Excluded(2024.0))
        );
        assert_eq!(
            parse("year:{* TO -5]").unwrap(),
            Query::numeric_range("year", Bound::Unbounded, Bound::Included(-5.0))
        );
        assert_eq!(
            parse("body:[Apple TO banana]").unwrap(),
            Query::text_range(
                "body",
                Bound::Included("apple".to_string()),
                Bound::Included("banana".to_string())
            )
        );
        assert_eq!(
            parse("year:2021").unwrap(),
            Query::numeric_range("year", Bound::Included(2021.0), Bound::Included(2021.0))
        );
    }

    #[test]
    fn test_unqualified_searches_all_default_fields() {
        let analyzer = analyzer();
        let schema = Schema::new()
            .field("title", FieldMapping::text())
            .field("tag", FieldMapping::keyword())
            .field("hidden", FieldMapping::text().with_usage(FieldUsage::Stored))
            .field("year", FieldMapping::numeric());
        let query = QueryStringParser::new(&analyzer, &schema).parse("Rust").unwrap();
        assert_eq!(
            query,
            Query::Or(vec![Query::term("tag", "Rust"), Query::term("title", "rust")])
        );

        // Nothing to search yet
        let empty = Schema::new();
        assert_eq!(
            QueryStringParser::new(&analyzer, &empty).parse("rust").unwrap(),
            Query::MatchNone
        );
    }

    #[test]
    fn test_syntax_error_positions() {
        let cases = [
            ("quick \"brown fox", 6),
            ("(quick fox", 0),
            ("quick fox)", 9),
            ("quick AND", 6),
            ("OR quick", 0),
            ("quick OR", 6),
            ("()", 0),
            ("   ", 0),
            ("", 0),
            ("year:[abc TO 5]", 6),
            ("year:abc", 5),
            ("body:[a TO b", 5),
            ("fox~", 3),
            ("NOT", 3),
        ];
        for (input, position) in cases {
            let err = parse(input).unwrap_err();
            assert_eq!(err.position(), Some(position), "query {:?}: {}", input, err);
        }
    }

    #[test]
    fn test_strict_schema_rejects_unknown_field() {
        let analyzer = analyzer();
        let schema = schema().with_dynamic(DynamicMapping::Strict);
        let parser = QueryStringParser::new(&analyzer, &schema);
        let err = parser.parse("fox AND color:red").unwrap_err();
        assert_eq!(err.position(), Some(8));
        assert!(parser.parse("id:7").is_ok());
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            QueryStringParser::escape("c++ (draft): 50% off!"),
            r"c\+\+ \(draft\)\: 50% off\!"
        );
        assert_eq!(QueryStringParser::escape("this AND that"), r"this \AND that");

        let analyzer = Analyzer::new(&AnalyzerConfig::simple()).unwrap();
        let schema = Schema::new().field("body", FieldMapping::text());
        let parser = QueryStringParser::new(&analyzer, &schema);
        let query = parser
            .parse(&QueryStringParser::escape("a/b AND [x]"))
            .unwrap();
        assert_eq!(
            query,
            Query::And(vec![
                Query::phrase("body", ["a", "b"]),
                Query::term("body", "and"),
                Query::term("body", "x"),
            ])
        );
    }
}
