//! Parser → AST shape tests.

use lockstep_engine::parser::ast::{
    BinaryOperator, ExpressionType, StatementType, UnaryOperator,
};
use lockstep_engine::JsParser;

fn parse(source: &str) -> Vec<std::rc::Rc<StatementType>> {
    JsParser::parse_to_ast_from_str(source)
        .expect("source should parse")
        .body
}

fn first_expression(source: &str) -> std::rc::Rc<ExpressionType> {
    match parse(source).first().expect("one statement").as_ref() {
        StatementType::ExpressionStatement { expression, .. } => expression.clone(),
        other => panic!("expected expression statement, got {}", other.kind()),
    }
}

#[test]
fn test_statement_kinds() {
    let body = parse("let x = 1; if (x) { x = 2 } while (x) break; do x-- ; while (x)");
    let kinds: Vec<&str> = body.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "VariableDeclaration",
            "IfStatement",
            "WhileStatement",
            "DoWhileStatement"
        ]
    );
}

#[test]
fn test_precedence_shape() {
    let expr = first_expression("1 + 2 * 3");
    let ExpressionType::BinaryExpression {
        operator, right, ..
    } = expr.as_ref()
    else {
        panic!("expected binary expression");
    };
    assert_eq!(*operator, BinaryOperator::Add);
    let ExpressionType::BinaryExpression { operator, .. } = right.as_ref() else {
        panic!("expected nested multiply");
    };
    assert_eq!(*operator, BinaryOperator::Multiply);
}

#[test]
fn test_exponent_is_right_associative() {
    let expr = first_expression("2 ** 3 ** 2");
    let ExpressionType::BinaryExpression {
        operator, left, right, ..
    } = expr.as_ref()
    else {
        panic!("expected binary expression");
    };
    assert_eq!(*operator, BinaryOperator::Exponent);
    assert!(matches!(left.as_ref(), ExpressionType::Literal(_)));
    assert!(matches!(
        right.as_ref(),
        ExpressionType::BinaryExpression { .. }
    ));
}

#[test]
fn test_logical_operators_parse_as_binary() {
    for (source, expected) in [
        ("a && b", BinaryOperator::LogicalAnd),
        ("a || b", BinaryOperator::LogicalOr),
        ("a ?? b", BinaryOperator::NullishCoalescing),
        ("a |> f", BinaryOperator::Pipeline),
        ("a in b", BinaryOperator::In),
        ("a instanceof b", BinaryOperator::InstanceOf),
    ] {
        let expr = first_expression(source);
        let ExpressionType::BinaryExpression { operator, .. } = expr.as_ref() else {
            panic!("expected binary expression for {}", source);
        };
        assert_eq!(*operator, expected, "operator of {}", source);
    }
}

#[test]
fn test_member_and_call_chain() {
    let expr = first_expression("a.b[c]()?.d");
    // Outermost: optional member .d
    let ExpressionType::MemberExpression {
        optional: true,
        computed: false,
        object,
        ..
    } = expr.as_ref()
    else {
        panic!("expected optional member at the top");
    };
    let ExpressionType::CallExpression { callee, .. } = object.as_ref() else {
        panic!("expected call under the optional member");
    };
    let ExpressionType::MemberExpression {
        computed: true, ..
    } = callee.as_ref()
    else {
        panic!("expected computed member callee");
    };
}

#[test]
fn test_new_binds_first_call() {
    let expr = first_expression("new Promise(executor)");
    let ExpressionType::NewExpression { arguments, .. } = expr.as_ref() else {
        panic!("expected new expression");
    };
    assert_eq!(arguments.len(), 1);
}

#[test]
fn test_array_holes_and_spread() {
    let expr = first_expression("[1, , 3, ...rest]");
    let ExpressionType::ArrayExpression { elements, .. } = expr.as_ref() else {
        panic!("expected array expression");
    };
    assert_eq!(elements.len(), 4);
    assert!(elements[0].is_some());
    assert!(elements[1].is_none());
    assert!(elements[3].is_some());
}

#[test]
fn test_arrow_forms() {
    assert!(matches!(
        first_expression("x => x + 1").as_ref(),
        ExpressionType::ArrowFunctionExpression(_)
    ));
    assert!(matches!(
        first_expression("(a, b) => { return a + b }").as_ref(),
        ExpressionType::ArrowFunctionExpression(_)
    ));
    let expr = first_expression("async () => 1");
    let ExpressionType::ArrowFunctionExpression(data) = expr.as_ref() else {
        panic!("expected async arrow");
    };
    assert!(data.is_async && data.is_arrow);
}

#[test]
fn test_await_and_async_function() {
    let body = parse("async function f() { await g() }");
    assert_eq!(body[0].kind(), "FunctionDeclaration");
    assert!(matches!(
        first_expression("await p").as_ref(),
        ExpressionType::AwaitExpression { .. }
    ));
}

#[test]
fn test_delete_parses_as_unary() {
    let expr = first_expression("delete x");
    let ExpressionType::UnaryExpression { operator, .. } = expr.as_ref() else {
        panic!("expected unary expression");
    };
    assert_eq!(*operator, UnaryOperator::Delete);
}

#[test]
fn test_syntax_errors() {
    assert!(JsParser::parse_to_ast_from_str("let = 5").is_err());
    assert!(JsParser::parse_to_ast_from_str("1 = 2").is_err());
    assert!(JsParser::parse_to_ast_from_str("if (").is_err());
}

#[test]
fn test_regex_literal() {
    let expr = first_expression("/ab+c/i");
    let ExpressionType::Literal(lit) = expr.as_ref() else {
        panic!("expected literal");
    };
    match &lit.value {
        lockstep_engine::parser::ast::LiteralType::RegExpLiteral { pattern, flags } => {
            assert_eq!(pattern, "ab+c");
            assert_eq!(flags, "i");
        }
        other => panic!("expected regex literal, got {:?}", other),
    }
}
