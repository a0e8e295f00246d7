mod common;

use common::{TestResult, XmlDocument, init_logger};
use sprig::{
    Axis, BinaryOperator, Context, Expression, ExpressionCache, LocationPath, NodeTest, Step,
    Value, XPathError, compile, parse_expression, parse_with_engine,
};
use std::sync::Arc;

#[test]
fn test_cache_returns_the_same_tree() -> TestResult {
    init_logger();
    let cache = ExpressionCache::new();
    let first = cache.get_or_parse("//item[@id = $wanted]")?;
    let second = cache.get_or_parse("//item[@id = $wanted]")?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    assert!(cache.get_or_parse("//[").is_err());
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());

    assert!(Arc::ptr_eq(&compile("a/b/c")?, &compile("a/b/c")?));
    Ok(())
}

#[test]
fn test_repeated_evaluation_is_stable() -> TestResult {
    let doc = XmlDocument::parse("<r><v>1</v><v>2</v></r>")?;
    let ctx = Context::new(doc.root_element());
    let expr = compile("sum(v) * count(v)")?;
    assert_eq!(expr.evaluate(&ctx)?, expr.evaluate(&ctx)?);
    assert_eq!(expr.evaluate(&ctx)?, Value::Number(6.0));
    Ok(())
}

#[test]
fn test_fast_paths_match_the_engine() -> TestResult {
    for text in ["name", "$var", "@attr", "a/b", "chapter/section/para", "x_1/y2"] {
        assert_eq!(parse_expression(text)?, parse_with_engine(text)?, "{}", text);
    }
    // digits are numbers, not names
    assert_eq!(parse_expression("42")?, Expression::number(42.0));
    Ok(())
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        parse_expression("//["),
        Err(XPathError::Parse { .. })
    ));
    assert!(matches!(parse_expression("a # b"), Err(XPathError::Lex { .. })));
    assert!(matches!(parse_expression("f(a,"), Err(XPathError::Parse { .. })));
    assert!(matches!(parse_expression(""), Err(XPathError::Parse { .. })));

    let err = parse_expression("a[").unwrap_err();
    assert!(err.is_compile_error());
    assert!(!XPathError::TypeError("x".into()).is_compile_error());
}

#[test]
fn test_operator_precedence() -> TestResult {
    let expected = Expression::binary(
        BinaryOperator::Or,
        Expression::binary(
            BinaryOperator::Equals,
            Expression::binary(
                BinaryOperator::Plus,
                Expression::number(1.0),
                Expression::binary(
                    BinaryOperator::Multiply,
                    Expression::number(2.0),
                    Expression::number(3.0),
                ),
            ),
            Expression::number(7.0),
        ),
        Expression::binary(
            BinaryOperator::And,
            Expression::number(0.0),
            Expression::number(1.0),
        ),
    );
    assert_eq!(parse_expression("1 + 2 * 3 = 7 or 0 and 1")?, expected);
    Ok(())
}

#[test]
fn test_keywords_as_names() -> TestResult {
    let names = |text: &str| -> Result<Expression, XPathError> { parse_expression(text) };
    let child = |name: &str| Step::new(Axis::Child, NodeTest::NameExact(name.into()));

    assert_eq!(
        names("div div mod")?,
        Expression::binary(
            BinaryOperator::Divide,
            Expression::location(LocationPath::relative(vec![child("div")])),
            Expression::location(LocationPath::relative(vec![child("mod")])),
        )
    );
    assert_eq!(
        names("and/or")?,
        Expression::location(LocationPath::relative(vec![child("and"), child("or")]))
    );
    assert_eq!(
        names("* * *")?,
        Expression::binary(
            BinaryOperator::Multiply,
            Expression::location(LocationPath::relative(vec![Step::new(
                Axis::Child,
                NodeTest::ElementOrAttribute
            )])),
            Expression::location(LocationPath::relative(vec![Step::new(
                Axis::Child,
                NodeTest::ElementOrAttribute
            )])),
        )
    );
    Ok(())
}

#[test]
fn test_operator_keywords_before_groups() -> TestResult {
    let child = |name: &str| {
        Expression::location(LocationPath::relative(vec![Step::new(
            Axis::Child,
            NodeTest::NameExact(name.into()),
        )]))
    };
    assert_eq!(
        parse_expression("a and (b)")?,
        Expression::binary(BinaryOperator::And, child("a"), child("b"))
    );
    assert_eq!(
        parse_expression("x or(y)")?,
        Expression::binary(BinaryOperator::Or, child("x"), child("y"))
    );
    assert_eq!(
        parse_expression("6 div (3)")?,
        Expression::binary(
            BinaryOperator::Divide,
            Expression::number(6.0),
            Expression::number(3.0)
        )
    );

    let doc = XmlDocument::parse("<r/>")?;
    let ctx = Context::new(doc.root_element());
    for (text, expected) in [
        ("true() and (1 = 1)", Value::Boolean(true)),
        ("false() or (2)", Value::Boolean(true)),
        ("6 div (3)", Value::Number(2.0)),
        ("7 mod (4)", Value::Number(3.0)),
        ("count(r) and(1)", Value::Boolean(false)),
    ] {
        assert_eq!(compile(text)?.evaluate(&ctx)?, expected, "{}", text);
    }
    Ok(())
}

#[test]
fn test_display_reparses_to_the_same_tree() -> TestResult {
    for text in [
        "//a[@x = 'y'][2]/b",
        "(a | b)[last()]/c",
        "$doc/item[position() < 3]",
        "-count(//x) div 2 mod 3",
        "ancestor-or-self::node()/@*",
        "ext-if(a, 'x', concat(b, c))",
        "/",
    ] {
        let parsed = parse_expression(text)?;
        let rendered = parsed.to_string();
        assert_eq!(parse_expression(&rendered)?, parsed, "{} rendered as {}", text, rendered);
    }
    Ok(())
}

#[test]
fn test_programmatic_trees_evaluate() -> TestResult {
    let doc = XmlDocument::parse("<r><n>3</n><n>4</n></r>")?;
    let ctx = Context::new(doc.root_element());

    let path = LocationPath::relative(vec![
        Step::new(Axis::Child, NodeTest::NameExact("n".into()))
            .with_predicate(Expression::number(2.0)),
    ]);
    let expr = Expression::binary(
        BinaryOperator::Plus,
        Expression::location(path),
        Expression::function("count", vec![Expression::location(LocationPath::relative(
            vec![Step::new(Axis::Child, NodeTest::ElementOrAttribute)],
        ))]),
    );
    assert_eq!(expr.evaluate(&ctx)?, Value::Number(6.0));
    Ok(())
}
