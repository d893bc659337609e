//! pest pair tree → AST builder.
//!
//! Each `build_*` function consumes exactly one grammar pair and produces
//! the corresponding AST node. Keyword pairs emitted by the grammar are
//! used as flags (`kw_async`) or skipped.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::rc::Rc;

use crate::parser::ast::{
    AssignmentOperator, BinaryOperator, ExpressionOrSpread, ExpressionType, ForInit, FunctionBodyType,
    FunctionData, HasMeta, IdentifierData, LiteralData, LiteralType, Meta, ObjectPropertyType,
    PatternType, ProgramData, StatementType, UnaryOperator, UpdateOperator,
    VariableDeclarationData, VariableDeclarationKind, VariableDeclaratorData,
};
use crate::runner::ds::error::EngineError;

#[derive(Parser)]
#[grammar = "parser/js_grammar.pest"]
pub struct JsParser;

type BuildResult<T> = Result<T, EngineError>;

impl JsParser {
    pub fn parse_to_ast(script: Rc<String>) -> BuildResult<ProgramData> {
        match Self::parse(Rule::script, &script) {
            Ok(pairs) => build_program(pairs, &script),
            Err(err) => Err(EngineError::Syntax(err.to_string())),
        }
    }

    pub fn parse_to_ast_from_str(script: &str) -> BuildResult<ProgramData> {
        Self::parse_to_ast(Rc::new(script.to_string()))
    }
}

fn get_meta(pair: &Pair<Rule>, script: &Rc<String>) -> Meta {
    Meta {
        start_index: pair.as_span().start(),
        end_index: pair.as_span().end(),
        script: script.clone(),
    }
}

fn span_meta(start: usize, end: usize, script: &Rc<String>) -> Meta {
    Meta {
        start_index: start,
        end_index: end,
        script: script.clone(),
    }
}

fn unexpected(src: &'static str, pair: &Pair<Rule>) -> EngineError {
    EngineError::Syntax(format!(
        "internal parser error in {}: unexpected rule {:?} at \"{}\"",
        src,
        pair.as_rule(),
        pair.as_str()
    ))
}

fn build_program(pairs: Pairs<Rule>, script: &Rc<String>) -> BuildResult<ProgramData> {
    let mut body = vec![];
    let mut end = 0;
    for pair in pairs {
        match pair.as_rule() {
            Rule::script => {
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::statement => {
                            end = end.max(inner.as_span().end());
                            body.push(Rc::new(build_statement(inner, script)?));
                        }
                        Rule::EOI => {}
                        _ => return Err(unexpected("build_program", &inner)),
                    }
                }
            }
            Rule::EOI => {}
            _ => return Err(unexpected("build_program", &pair)),
        }
    }
    Ok(ProgramData {
        meta: span_meta(0, end, script),
        body,
    })
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn build_statement(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<StatementType> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| EngineError::Syntax("empty statement rule".to_string()))?;
    let meta = get_meta(&inner, script);
    match inner.as_rule() {
        Rule::block_statement => build_block_statement(inner, script),
        Rule::variable_declaration => {
            let no_semi = inner
                .into_inner()
                .next()
                .ok_or_else(|| EngineError::Syntax("empty variable declaration".to_string()))?;
            Ok(StatementType::VariableDeclaration(Rc::new(
                build_variable_declaration(no_semi, script)?,
            )))
        }
        Rule::if_statement => build_if_statement(inner, script),
        Rule::for_statement => build_for_statement(inner, script),
        Rule::while_statement => {
            let mut parts = inner.into_inner().filter(|p| !is_keyword_rule(p.as_rule()));
            let test = build_expression(parts.next().unwrap(), script)?;
            let body = build_statement(parts.next().unwrap(), script)?;
            Ok(StatementType::WhileStatement {
                meta,
                test: Rc::new(test),
                body: Rc::new(body),
            })
        }
        Rule::do_while_statement => {
            let mut parts = inner.into_inner().filter(|p| !is_keyword_rule(p.as_rule()));
            let body = build_statement(parts.next().unwrap(), script)?;
            let test = build_expression(parts.next().unwrap(), script)?;
            Ok(StatementType::DoWhileStatement {
                meta,
                test: Rc::new(test),
                body: Rc::new(body),
            })
        }
        Rule::break_statement => Ok(StatementType::BreakStatement { meta }),
        Rule::continue_statement => Ok(StatementType::ContinueStatement { meta }),
        Rule::return_statement => {
            let argument = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::expression)
                .map(|p| build_expression(p, script))
                .transpose()?
                .map(Rc::new);
            Ok(StatementType::ReturnStatement { meta, argument })
        }
        Rule::function_declaration => {
            let function = build_function(inner, script, false)?;
            if function.name.is_none() {
                return Err(EngineError::Syntax(
                    "function declaration requires a name".to_string(),
                ));
            }
            Ok(StatementType::FunctionDeclaration {
                meta,
                function: Rc::new(function),
            })
        }
        Rule::empty_statement => Ok(StatementType::EmptyStatement { meta }),
        Rule::expression_statement => {
            let expr = inner.into_inner().next().unwrap();
            Ok(StatementType::ExpressionStatement {
                meta,
                expression: Rc::new(build_expression(expr, script)?),
            })
        }
        _ => Err(unexpected("build_statement", &inner)),
    }
}

fn build_block_statement(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<StatementType> {
    let meta = get_meta(&pair, script);
    let mut body = vec![];
    for stmt in pair.into_inner() {
        body.push(Rc::new(build_statement(stmt, script)?));
    }
    Ok(StatementType::BlockStatement { meta, body })
}

fn build_variable_declaration(
    pair: Pair<Rule>,
    script: &Rc<String>,
) -> BuildResult<VariableDeclarationData> {
    let meta = get_meta(&pair, script);
    let mut inner = pair.into_inner();
    let kind_pair = inner.next().unwrap();
    let kind = match kind_pair.as_str() {
        "var" => VariableDeclarationKind::Var,
        "let" => VariableDeclarationKind::Let,
        "const" => VariableDeclarationKind::Const,
        _ => return Err(unexpected("build_variable_declaration", &kind_pair)),
    };
    let mut declarations = vec![];
    for declarator in inner {
        declarations.push(build_variable_declarator(declarator, script)?);
    }
    Ok(VariableDeclarationData {
        meta,
        kind,
        declarations,
    })
}

fn build_variable_declarator(
    pair: Pair<Rule>,
    script: &Rc<String>,
) -> BuildResult<VariableDeclaratorData> {
    let meta = get_meta(&pair, script);
    let mut inner = pair.into_inner();
    let id_pair = inner.next().unwrap();
    let id = IdentifierData {
        meta: get_meta(&id_pair, script),
        name: id_pair.as_str().to_string(),
    };
    let mut init = None;
    for p in inner {
        match p.as_rule() {
            Rule::assign_init => {}
            Rule::assignment_expression => {
                init = Some(Rc::new(build_expression(p, script)?));
            }
            _ => return Err(unexpected("build_variable_declarator", &p)),
        }
    }
    Ok(VariableDeclaratorData { meta, id, init })
}

fn build_if_statement(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<StatementType> {
    let meta = get_meta(&pair, script);
    let mut parts = pair.into_inner().filter(|p| !is_keyword_rule(p.as_rule()));
    let test = build_expression(parts.next().unwrap(), script)?;
    let consequent = build_statement(parts.next().unwrap(), script)?;
    let alternate = parts
        .next()
        .map(|p| build_statement(p, script))
        .transpose()?
        .map(Rc::new);
    Ok(StatementType::IfStatement {
        meta,
        test: Rc::new(test),
        consequent: Rc::new(consequent),
        alternate,
    })
}

fn build_for_statement(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<StatementType> {
    let meta = get_meta(&pair, script);
    let mut init = None;
    let mut test = None;
    let mut update = None;
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_for => {}
            Rule::for_init_part => {
                if let Some(p) = part.into_inner().next() {
                    init = Some(build_for_init(p, script)?);
                }
            }
            Rule::for_test_part => {
                if let Some(p) = part.into_inner().next() {
                    test = Some(Rc::new(build_expression(p, script)?));
                }
            }
            Rule::for_update_part => {
                if let Some(p) = part.into_inner().next() {
                    update = Some(Rc::new(build_expression(p, script)?));
                }
            }
            Rule::statement => {
                body = Some(Rc::new(build_statement(part, script)?));
            }
            _ => return Err(unexpected("build_for_statement", &part)),
        }
    }
    Ok(StatementType::ForStatement {
        meta,
        init,
        test,
        update,
        body: body.ok_or_else(|| EngineError::Syntax("for statement without a body".to_string()))?,
    })
}

fn build_for_init(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ForInit> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::variable_declaration_no_semi => Ok(ForInit::Declaration(Rc::new(
            build_variable_declaration(inner, script)?,
        ))),
        Rule::expression => Ok(ForInit::Expression(Rc::new(build_expression(inner, script)?))),
        _ => Err(unexpected("build_for_init", &inner)),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn build_expression(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    match pair.as_rule() {
        Rule::expression
        | Rule::lhs_expression
        | Rule::arrow_body
        | Rule::unary_expression => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner, script)
        }
        Rule::assignment_expression => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner, script)
        }
        Rule::assignment => build_assignment(pair, script),
        Rule::arrow_function => build_arrow_function(pair, script),
        Rule::conditional_expression => build_conditional(pair, script),
        Rule::pipeline_expression
        | Rule::nullish_expression
        | Rule::logical_or_expression
        | Rule::logical_and_expression
        | Rule::bit_or_expression
        | Rule::bit_xor_expression
        | Rule::bit_and_expression
        | Rule::equality_expression
        | Rule::relational_expression
        | Rule::shift_expression
        | Rule::additive_expression
        | Rule::multiplicative_expression => build_left_associative(pair, script),
        Rule::exponent_expression => build_exponent(pair, script),
        Rule::await_expression => {
            let meta = get_meta(&pair, script);
            let inner = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::unary_expression)
                .unwrap();
            Ok(ExpressionType::AwaitExpression {
                meta,
                argument: Rc::new(build_expression(inner, script)?),
            })
        }
        Rule::prefix_update_expression => {
            let meta = get_meta(&pair, script);
            let mut inner = pair.into_inner();
            let op_pair = inner.next().unwrap();
            let operator = match op_pair.as_str() {
                "++" => UpdateOperator::Increment,
                "--" => UpdateOperator::Decrement,
                _ => return Err(unexpected("build_expression", &op_pair)),
            };
            let argument = build_expression(inner.next().unwrap(), script)?;
            Ok(ExpressionType::UpdateExpression {
                meta,
                operator,
                prefix: true,
                argument: Rc::new(argument),
            })
        }
        Rule::unary_operator_expression => {
            let meta = get_meta(&pair, script);
            let mut inner = pair.into_inner();
            let op_pair = inner.next().unwrap();
            let operator = match op_pair.as_str() {
                "!" => UnaryOperator::Not,
                "~" => UnaryOperator::BitNot,
                "+" => UnaryOperator::Plus,
                "-" => UnaryOperator::Minus,
                "typeof" => UnaryOperator::TypeOf,
                "void" => UnaryOperator::Void,
                "delete" => UnaryOperator::Delete,
                "throw" => UnaryOperator::Throw,
                _ => return Err(unexpected("build_expression", &op_pair)),
            };
            let argument = build_expression(inner.next().unwrap(), script)?;
            Ok(ExpressionType::UnaryExpression {
                meta,
                operator,
                argument: Rc::new(argument),
            })
        }
        Rule::postfix_expression => {
            let meta = get_meta(&pair, script);
            let mut inner = pair.into_inner();
            let base = build_expression(inner.next().unwrap(), script)?;
            match inner.next() {
                None => Ok(base),
                Some(op_pair) => {
                    let operator = match op_pair.as_str() {
                        "++" => UpdateOperator::Increment,
                        "--" => UpdateOperator::Decrement,
                        _ => return Err(unexpected("build_expression", &op_pair)),
                    };
                    Ok(ExpressionType::UpdateExpression {
                        meta,
                        operator,
                        prefix: false,
                        argument: Rc::new(base),
                    })
                }
            }
        }
        Rule::call_member_expression => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner, script)
        }
        Rule::primary_with_tails => {
            let mut inner = pair.into_inner();
            let base = build_primary(inner.next().unwrap(), script)?;
            build_tails(base, inner, script, false)
        }
        Rule::new_expression => build_new_expression(pair, script),
        Rule::primary_expression => build_primary(pair, script),
        _ => Err(unexpected("build_expression", &pair)),
    }
}

fn build_assignment(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut inner = pair.into_inner();
    let left = build_expression(inner.next().unwrap(), script)?;
    let op_pair = inner.next().unwrap();
    let operator = match op_pair.as_str() {
        "=" => AssignmentOperator::Equals,
        "+=" => AssignmentOperator::AddEquals,
        "-=" => AssignmentOperator::SubtractEquals,
        "*=" => AssignmentOperator::MultiplyEquals,
        "/=" => AssignmentOperator::DivideEquals,
        "%=" => AssignmentOperator::ModuloEquals,
        "**=" => AssignmentOperator::ExponentEquals,
        "<<=" => AssignmentOperator::ShiftLeftEquals,
        ">>=" => AssignmentOperator::ShiftRightEquals,
        ">>>=" => AssignmentOperator::ShiftRightUnsignedEquals,
        "&=" => AssignmentOperator::BitAndEquals,
        "|=" => AssignmentOperator::BitOrEquals,
        "^=" => AssignmentOperator::BitXorEquals,
        "&&=" => AssignmentOperator::LogicalAndEquals,
        "||=" => AssignmentOperator::LogicalOrEquals,
        "??=" => AssignmentOperator::NullishEquals,
        _ => return Err(unexpected("build_assignment", &op_pair)),
    };
    if !is_assignable(&left) {
        return Err(EngineError::Syntax(format!(
            "invalid assignment target at \"{}\"",
            meta.line_slice()
        )));
    }
    let right = build_expression(inner.next().unwrap(), script)?;
    Ok(ExpressionType::AssignmentExpression {
        meta,
        operator,
        left: Rc::new(left),
        right: Rc::new(right),
    })
}

fn is_assignable(expr: &ExpressionType) -> bool {
    matches!(
        expr,
        ExpressionType::Identifier(_) | ExpressionType::MemberExpression { optional: false, .. }
    )
}

fn build_conditional(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut inner = pair.into_inner();
    let test = build_expression(inner.next().unwrap(), script)?;
    match inner.find(|p| p.as_rule() != Rule::question) {
        None => Ok(test),
        Some(consequent_pair) => {
            let consequent = build_expression(consequent_pair, script)?;
            let alternate = build_expression(inner.next().unwrap(), script)?;
            Ok(ExpressionType::ConditionalExpression {
                meta,
                test: Rc::new(test),
                consequent: Rc::new(consequent),
                alternate: Rc::new(alternate),
            })
        }
    }
}

fn binary_operator_from_str(op: &str) -> Option<BinaryOperator> {
    Some(match op {
        "|>" => BinaryOperator::Pipeline,
        "??" => BinaryOperator::NullishCoalescing,
        "||" => BinaryOperator::LogicalOr,
        "&&" => BinaryOperator::LogicalAnd,
        "|" => BinaryOperator::BitOr,
        "^" => BinaryOperator::BitXor,
        "&" => BinaryOperator::BitAnd,
        "===" => BinaryOperator::StrictEquals,
        "!==" => BinaryOperator::StrictNotEquals,
        "==" => BinaryOperator::LooseEquals,
        "!=" => BinaryOperator::LooseNotEquals,
        "<=" => BinaryOperator::LessThanEquals,
        ">=" => BinaryOperator::GreaterThanEquals,
        "<" => BinaryOperator::LessThan,
        ">" => BinaryOperator::GreaterThan,
        "instanceof" => BinaryOperator::InstanceOf,
        "in" => BinaryOperator::In,
        "<<" => BinaryOperator::ShiftLeft,
        ">>>" => BinaryOperator::ShiftRightUnsigned,
        ">>" => BinaryOperator::ShiftRight,
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Subtract,
        "*" => BinaryOperator::Multiply,
        "/" => BinaryOperator::Divide,
        "%" => BinaryOperator::Modulo,
        "**" => BinaryOperator::Exponent,
        _ => return None,
    })
}

fn build_left_associative(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let start = pair.as_span().start();
    let mut inner = pair.into_inner();
    let mut expr = build_expression(inner.next().unwrap(), script)?;
    while let Some(op_pair) = inner.next() {
        let operator = binary_operator_from_str(op_pair.as_str().trim())
            .ok_or_else(|| unexpected("build_left_associative", &op_pair))?;
        let right_pair = inner
            .next()
            .ok_or_else(|| EngineError::Syntax("binary operator without right operand".to_string()))?;
        let end = right_pair.as_span().end();
        let right = build_expression(right_pair, script)?;
        expr = ExpressionType::BinaryExpression {
            meta: span_meta(start, end, script),
            operator,
            left: Rc::new(expr),
            right: Rc::new(right),
        };
    }
    Ok(expr)
}

fn build_exponent(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut inner = pair.into_inner();
    let base = build_expression(inner.next().unwrap(), script)?;
    match inner.next() {
        None => Ok(base),
        Some(op_pair) => {
            debug_assert_eq!(op_pair.as_rule(), Rule::exponent_operator);
            let right = build_expression(inner.next().unwrap(), script)?;
            Ok(ExpressionType::BinaryExpression {
                meta,
                operator: BinaryOperator::Exponent,
                left: Rc::new(base),
                right: Rc::new(right),
            })
        }
    }
}

fn build_arrow_function(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut is_async = false;
    let mut params = vec![];
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::function_params => params = build_params(part, script)?,
            Rule::identifier => {
                params = vec![PatternType::Identifier(IdentifierData {
                    meta: get_meta(&part, script),
                    name: part.as_str().to_string(),
                })];
            }
            Rule::arrow_body => {
                let inner = part.into_inner().next().unwrap();
                body = Some(match inner.as_rule() {
                    Rule::block_statement => match build_block_statement(inner, script)? {
                        StatementType::BlockStatement { body, .. } => FunctionBodyType::Block(body),
                        _ => unreachable!(),
                    },
                    _ => FunctionBodyType::Expression(Rc::new(build_expression(inner, script)?)),
                });
            }
            _ => return Err(unexpected("build_arrow_function", &part)),
        }
    }
    Ok(ExpressionType::ArrowFunctionExpression(Rc::new(FunctionData {
        meta,
        name: None,
        params,
        body: body.ok_or_else(|| EngineError::Syntax("arrow function without a body".to_string()))?,
        is_async,
        is_arrow: true,
    })))
}

fn build_function(pair: Pair<Rule>, script: &Rc<String>, is_arrow: bool) -> BuildResult<FunctionData> {
    let meta = get_meta(&pair, script);
    let mut is_async = false;
    let mut name = None;
    let mut params = vec![];
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_async => is_async = true,
            Rule::kw_function => {}
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::function_params => params = build_params(part, script)?,
            Rule::block_statement => match build_block_statement(part, script)? {
                StatementType::BlockStatement { body: stmts, .. } => {
                    body = Some(FunctionBodyType::Block(stmts));
                }
                _ => unreachable!(),
            },
            _ => return Err(unexpected("build_function", &part)),
        }
    }
    Ok(FunctionData {
        meta,
        name,
        params,
        body: body.ok_or_else(|| EngineError::Syntax("function without a body".to_string()))?,
        is_async,
        is_arrow,
    })
}

fn build_params(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<Vec<PatternType>> {
    let mut params = vec![];
    for param in pair.into_inner() {
        let inner = param.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::identifier => params.push(PatternType::Identifier(IdentifierData {
                meta: get_meta(&inner, script),
                name: inner.as_str().to_string(),
            })),
            Rule::rest_param => {
                let id = inner.into_inner().next().unwrap();
                params.push(PatternType::RestElement(IdentifierData {
                    meta: get_meta(&id, script),
                    name: id.as_str().to_string(),
                }));
            }
            Rule::unsupported_param => {
                let pattern = inner.into_inner().next().unwrap();
                let kind = match pattern.as_rule() {
                    Rule::object_param_pattern => "ObjectPattern",
                    Rule::array_param_pattern => "ArrayPattern",
                    _ => return Err(unexpected("build_params", &pattern)),
                };
                params.push(PatternType::Unsupported {
                    meta: get_meta(&pattern, script),
                    kind,
                });
            }
            _ => return Err(unexpected("build_params", &inner)),
        }
    }
    Ok(params)
}

/// A single trailing `.x`, `[x]`, `(...)` or `?.…` applied while folding a
/// member/call chain.
enum Tail {
    Member { property: ExpressionType, computed: bool, optional: bool, end: usize },
    Call { arguments: Vec<ExpressionOrSpread>, optional: bool, end: usize },
}

fn build_tail(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<Tail> {
    let end = pair.as_span().end();
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::member_dot_tail => {
            let id = inner.into_inner().next().unwrap();
            Ok(Tail::Member {
                property: ExpressionType::Identifier(IdentifierData {
                    meta: get_meta(&id, script),
                    name: id.as_str().to_string(),
                }),
                computed: false,
                optional: false,
                end,
            })
        }
        Rule::member_bracket_tail => {
            let expr = inner.into_inner().next().unwrap();
            Ok(Tail::Member {
                property: build_expression(expr, script)?,
                computed: true,
                optional: false,
                end,
            })
        }
        Rule::call_tail => Ok(Tail::Call {
            arguments: build_arguments(inner, script)?,
            optional: false,
            end,
        }),
        Rule::optional_chain_tail => {
            let chained = inner.into_inner().next().unwrap();
            match chained.as_rule() {
                Rule::identifier => Ok(Tail::Member {
                    property: ExpressionType::Identifier(IdentifierData {
                        meta: get_meta(&chained, script),
                        name: chained.as_str().to_string(),
                    }),
                    computed: false,
                    optional: true,
                    end,
                }),
                Rule::member_bracket_tail => {
                    let expr = chained.into_inner().next().unwrap();
                    Ok(Tail::Member {
                        property: build_expression(expr, script)?,
                        computed: true,
                        optional: true,
                        end,
                    })
                }
                Rule::call_tail => Ok(Tail::Call {
                    arguments: build_arguments(chained, script)?,
                    optional: true,
                    end,
                }),
                _ => Err(unexpected("build_tail", &chained)),
            }
        }
        _ => Err(unexpected("build_tail", &inner)),
    }
}

fn build_tails<'i>(
    base: ExpressionType,
    tails: impl Iterator<Item = Pair<'i, Rule>>,
    script: &Rc<String>,
    new_target: bool,
) -> BuildResult<ExpressionType> {
    let start = base.meta().start_index;
    let mut expr = base;
    // `new f(args).x` binds the first call in the chain to the `new`.
    let mut pending_new = new_target;
    for tail_pair in tails {
        match build_tail(tail_pair, script)? {
            Tail::Member { property, computed, optional, end } => {
                expr = ExpressionType::MemberExpression {
                    meta: span_meta(start, end, script),
                    object: Rc::new(expr),
                    property: Rc::new(property),
                    computed,
                    optional,
                };
            }
            Tail::Call { arguments, optional, end } => {
                if pending_new {
                    pending_new = false;
                    expr = ExpressionType::NewExpression {
                        meta: span_meta(start, end, script),
                        callee: Rc::new(expr),
                        arguments,
                    };
                } else {
                    expr = ExpressionType::CallExpression {
                        meta: span_meta(start, end, script),
                        callee: Rc::new(expr),
                        arguments,
                        optional,
                    };
                }
            }
        }
    }
    if pending_new {
        let end = expr.meta().end_index;
        expr = ExpressionType::NewExpression {
            meta: span_meta(start, end, script),
            callee: Rc::new(expr),
            arguments: vec![],
        };
    }
    Ok(expr)
}

fn build_new_expression(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_new);
    let base = build_primary(inner.next().unwrap(), script)?;
    build_tails(base, inner, script, true)
}

fn build_arguments(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<Vec<ExpressionOrSpread>> {
    let mut arguments = vec![];
    for list in pair.into_inner() {
        debug_assert_eq!(list.as_rule(), Rule::argument_list);
        for argument in list.into_inner() {
            let inner = argument.into_inner().next().unwrap();
            match inner.as_rule() {
                Rule::spread_argument => {
                    let expr = inner.into_inner().next().unwrap();
                    arguments.push(ExpressionOrSpread::Spread(Rc::new(build_expression(
                        expr, script,
                    )?)));
                }
                _ => arguments.push(ExpressionOrSpread::Expression(Rc::new(build_expression(
                    inner, script,
                )?))),
            }
        }
    }
    Ok(arguments)
}

// ---------------------------------------------------------------------------
// Primary expressions
// ---------------------------------------------------------------------------

fn build_primary(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let inner = pair.into_inner().next().unwrap();
    let meta = get_meta(&inner, script);
    match inner.as_rule() {
        Rule::literal => build_literal(inner, script),
        Rule::array_expression => build_array(inner, script),
        Rule::object_expression => build_object(inner, script),
        Rule::function_expression => Ok(ExpressionType::FunctionExpression(Rc::new(
            build_function(inner, script, false)?,
        ))),
        Rule::this_expression => Ok(ExpressionType::ThisExpression { meta }),
        Rule::paren_expression => {
            let expr = inner.into_inner().next().unwrap();
            build_expression(expr, script)
        }
        Rule::identifier_expression => {
            let id = inner.into_inner().next().unwrap();
            Ok(ExpressionType::Identifier(IdentifierData {
                meta: get_meta(&id, script),
                name: id.as_str().to_string(),
            }))
        }
        _ => Err(unexpected("build_primary", &inner)),
    }
}

fn build_literal(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let inner = pair.into_inner().next().unwrap();
    let meta = get_meta(&inner, script);
    let value = match inner.as_rule() {
        Rule::null_literal => LiteralType::NullLiteral,
        Rule::boolean_literal => LiteralType::BooleanLiteral(inner.as_str() == "true"),
        Rule::number_literal => LiteralType::NumberLiteral(parse_number(inner.as_str())?),
        Rule::string_literal => LiteralType::StringLiteral(build_string_value(inner)?),
        Rule::regex_literal => {
            let mut parts = inner.into_inner();
            let pattern = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let flags = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            LiteralType::RegExpLiteral { pattern, flags }
        }
        _ => return Err(unexpected("build_literal", &inner)),
    };
    Ok(ExpressionType::Literal(LiteralData { meta, value }))
}

fn parse_number(text: &str) -> BuildResult<f64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .map_err(|e| EngineError::Syntax(format!("invalid hex literal \"{}\": {}", text, e)));
    }
    text.parse::<f64>()
        .map_err(|e| EngineError::Syntax(format!("invalid number literal \"{}\": {}", text, e)))
}

fn build_string_value(pair: Pair<Rule>) -> BuildResult<String> {
    let chars = pair
        .into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    Ok(unescape(&chars))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('v') => out.push('\u{000B}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn build_array(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut elements = vec![];
    let mut element_since_comma = false;
    for list in pair.into_inner() {
        debug_assert_eq!(list.as_rule(), Rule::array_elements);
        for entry in list.into_inner() {
            match entry.as_rule() {
                Rule::array_comma => {
                    if !element_since_comma {
                        elements.push(None);
                    }
                    element_since_comma = false;
                }
                Rule::array_element => {
                    let inner = entry.into_inner().next().unwrap();
                    let element = match inner.as_rule() {
                        Rule::spread_argument => {
                            let expr = inner.into_inner().next().unwrap();
                            ExpressionOrSpread::Spread(Rc::new(build_expression(expr, script)?))
                        }
                        _ => ExpressionOrSpread::Expression(Rc::new(build_expression(
                            inner, script,
                        )?)),
                    };
                    elements.push(Some(element));
                    element_since_comma = true;
                }
                _ => return Err(unexpected("build_array", &entry)),
            }
        }
    }
    Ok(ExpressionType::ArrayExpression { meta, elements })
}

fn build_object(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let meta = get_meta(&pair, script);
    let mut properties = vec![];
    for prop in pair.into_inner() {
        let inner = prop.into_inner().next().unwrap();
        let prop_meta = get_meta(&inner, script);
        match inner.as_rule() {
            Rule::spread_property => {
                let expr = inner.into_inner().next().unwrap();
                properties.push(ObjectPropertyType::Spread {
                    meta: prop_meta,
                    argument: Rc::new(build_expression(expr, script)?),
                });
            }
            Rule::object_method => {
                let mut is_async = false;
                let mut key = None;
                let mut params = vec![];
                let mut body = None;
                let method_meta = prop_meta.clone();
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::kw_async => is_async = true,
                        Rule::property_key => key = Some(build_property_key(part, script)?),
                        Rule::function_params => params = build_params(part, script)?,
                        Rule::block_statement => match build_block_statement(part, script)? {
                            StatementType::BlockStatement { body: stmts, .. } => {
                                body = Some(FunctionBodyType::Block(stmts));
                            }
                            _ => unreachable!(),
                        },
                        _ => return Err(unexpected("build_object", &part)),
                    }
                }
                let key = key
                    .ok_or_else(|| EngineError::Syntax("object method without a key".to_string()))?;
                properties.push(ObjectPropertyType::Method {
                    meta: prop_meta,
                    key: Rc::new(key),
                    function: Rc::new(FunctionData {
                        meta: method_meta,
                        name: None,
                        params,
                        body: body.ok_or_else(|| {
                            EngineError::Syntax("object method without a body".to_string())
                        })?,
                        is_async,
                        is_arrow: false,
                    }),
                });
            }
            Rule::key_value_property => {
                let mut parts = inner.into_inner();
                let key = build_property_key(parts.next().unwrap(), script)?;
                let value = build_expression(parts.next().unwrap(), script)?;
                properties.push(ObjectPropertyType::Property {
                    meta: prop_meta,
                    key: Rc::new(key),
                    value: Rc::new(value),
                    shorthand: false,
                });
            }
            Rule::shorthand_property => {
                let id = inner.into_inner().next().unwrap();
                let id_meta = get_meta(&id, script);
                let name = id.as_str().to_string();
                properties.push(ObjectPropertyType::Property {
                    meta: prop_meta,
                    key: Rc::new(ExpressionType::Identifier(IdentifierData {
                        meta: id_meta.clone(),
                        name: name.clone(),
                    })),
                    value: Rc::new(ExpressionType::Identifier(IdentifierData {
                        meta: id_meta,
                        name,
                    })),
                    shorthand: true,
                });
            }
            _ => return Err(unexpected("build_object", &inner)),
        }
    }
    Ok(ExpressionType::ObjectExpression { meta, properties })
}

fn build_property_key(pair: Pair<Rule>, script: &Rc<String>) -> BuildResult<ExpressionType> {
    let inner = pair.into_inner().next().unwrap();
    let meta = get_meta(&inner, script);
    match inner.as_rule() {
        Rule::identifier => Ok(ExpressionType::Identifier(IdentifierData {
            meta,
            name: inner.as_str().to_string(),
        })),
        Rule::string_literal => Ok(ExpressionType::Literal(LiteralData {
            meta,
            value: LiteralType::StringLiteral(build_string_value(inner)?),
        })),
        Rule::number_literal => Ok(ExpressionType::Literal(LiteralData {
            meta,
            value: LiteralType::NumberLiteral(parse_number(inner.as_str())?),
        })),
        _ => Err(unexpected("build_property_key", &inner)),
    }
}

fn is_keyword_rule(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_return
            | Rule::kw_function
            | Rule::kw_async
            | Rule::kw_await
            | Rule::kw_new
            | Rule::kw_this
            | Rule::kw_null
    )
}
