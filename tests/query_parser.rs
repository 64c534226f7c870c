//! Query string parsing against real schemas

use std::ops::Bound;

use eureka_search::{
    Analyzer, AnalyzerConfig, DefaultOperator, DynamicMapping, FieldMapping, FieldUsage, Query,
    QueryStringParser, Schema, SearchError,
};

fn analyzer() -> Analyzer {
    Analyzer::new(&AnalyzerConfig::default()).unwrap()
}

fn schema() -> Schema {
    Schema::new()
        .field("title", FieldMapping::text())
        .field("body", FieldMapping::text())
        .field("tag", FieldMapping::keyword())
        .field("year", FieldMapping::numeric())
        .field("raw", FieldMapping::text().with_usage(FieldUsage::Stored))
}

fn syntax_position(text: &str) -> usize {
    let analyzer = analyzer();
    let schema = schema();
    match QueryStringParser::new(&analyzer, &schema).parse(text) {
        Err(SearchError::Syntax { position, .. }) => position,
        other => panic!("expected syntax error for {:?}, got {:?}", text, other),
    }
}

#[test]
fn test_fielded_terms_are_analyzed() {
    let analyzer = analyzer();
    let schema = schema();
    let parser = QueryStringParser::new(&analyzer, &schema);

    assert_eq!(
        parser.parse("title:Jumping").unwrap(),
        Query::term("title", "jump")
    );
    assert_eq!(parser.parse("tag:Jumping").unwrap(), Query::term("tag", "Jumping"));
    assert_eq!(parser.parse("title:the").unwrap(), Query::MatchNone);
}

#[test]
fn test_unqualified_terms_cover_default_fields() {
    let analyzer = analyzer();
    let schema = schema();
    let query = QueryStringParser::new(&analyzer, &schema)
        .parse("jumping")
        .unwrap();
    assert_eq!(
        query,
        Query::Or(vec![
            Query::term("body", "jump"),
            Query::term("tag", "jumping"),
            Query::term("title", "jump"),
        ])
    );

    let single = schema.clone().with_default_field("body");
    let query = QueryStringParser::new(&analyzer, &single)
        .parse("jumping")
        .unwrap();
    assert_eq!(query, Query::term("body", "jump"));
}

#[test]
fn test_numeric_ranges() {
    let analyzer = analyzer();
    let schema = schema();
    let parser = QueryStringParser::new(&analyzer, &schema);

    assert_eq!(
        parser.parse("year:[2000 TO 2010}").unwrap(),
        Query::numeric_range("year", Bound::Included(2000.0), Bound::Excluded(2010.0))
    );
    assert_eq!(
        parser.parse("year:[-5 TO *]").unwrap(),
        Query::numeric_range("year", Bound::Included(-5.0), Bound::Unbounded)
    );
    assert_eq!(
        parser.parse("year:1999").unwrap(),
        Query::numeric_range("year", Bound::Included(1999.0), Bound::Included(1999.0))
    );
    assert_eq!(
        parser.parse("tag:[Alpha TO Beta]").unwrap(),
        Query::text_range(
            "tag",
            Bound::Included("Alpha".to_string()),
            Bound::Included("Beta".to_string())
        )
    );
    assert!(matches!(
        parser.parse("year:abc"),
        Err(SearchError::Syntax { position: 5, .. })
    ));
}

#[test]
fn test_default_operator_or() {
    let analyzer = Analyzer::new(&AnalyzerConfig::simple()).unwrap();
    let schema = schema().with_default_field("body");
    let parser =
        QueryStringParser::new(&analyzer, &schema).with_default_operator(DefaultOperator::Or);

    assert_eq!(
        parser.parse("cat dog").unwrap(),
        Query::Or(vec![Query::term("body", "cat"), Query::term("body", "dog")])
    );
    assert_eq!(
        parser.parse("cat AND dog").unwrap(),
        Query::And(vec![Query::term("body", "cat"), Query::term("body", "dog")])
    );
    assert_eq!("or".parse::<DefaultOperator>().unwrap(), DefaultOperator::Or);
    assert!("xor".parse::<DefaultOperator>().is_err());
}

#[test]
fn test_escaped_text_parses_as_plain_words() {
    let analyzer = Analyzer::new(&AnalyzerConfig::simple()).unwrap();
    let schema = schema().with_default_field("body");
    let parser = QueryStringParser::new(&analyzer, &schema);

    let raw = "cat: (dog) AND \"fox\" -bird*";
    let escaped = QueryStringParser::escape(raw);
    let query = parser.parse(&escaped).unwrap();
    assert_eq!(
        query,
        Query::And(vec![
            Query::term("body", "cat"),
            Query::term("body", "dog"),
            Query::term("body", "and"),
            Query::term("body", "fox"),
            Query::term("body", "bird"),
        ])
    );
}

#[test]
fn test_strict_schema_rejects_unknown_fields() {
    let analyzer = analyzer();
    let schema = schema().with_dynamic(DynamicMapping::Strict);
    let parser = QueryStringParser::new(&analyzer, &schema);

    match parser.parse("title:fox colour:red") {
        Err(SearchError::Syntax { position, .. }) => assert_eq!(position, 10),
        other => panic!("unexpected {:?}", other),
    }
    assert!(parser.parse("id:42").is_ok());

    let dynamic = self::schema();
    let query = QueryStringParser::new(&analyzer, &dynamic)
        .parse("colour:red")
        .unwrap();
    assert_eq!(query, Query::term("colour", "red"));
}

#[test]
fn test_syntax_error_positions() {
    let cases = [
        ("quick \"brown fox", 6),
        ("(quick fox", 0),
        ("quick fox)", 9),
        ("quick AND", 6),
        ("OR quick", 0),
        ("title:", 6),
        ("year:[1 TO", 5),
        ("quick (fox", 6),
        ("NOT", 3),
        ("", 0),
    ];
    for (text, expected) in cases {
        assert_eq!(syntax_position(text), expected, "query {:?}", text);
    }
}
