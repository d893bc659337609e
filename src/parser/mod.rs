pub mod api;
pub mod ast;
pub mod util;

pub use api::JsParser;

#[cfg(test)]
mod tests {
    use super::api::{JsParser, Rule};
    use pest::Parser;

    fn parses(rule: Rule, input: &str) -> bool {
        match JsParser::parse(rule, input) {
            Ok(mut pairs) => pairs.next().map(|p| p.as_str() == input).unwrap_or(false),
            Err(_) => false,
        }
    }

    #[test]
    fn test_numbers() {
        assert!(parses(Rule::number_literal, "10"));
        assert!(parses(Rule::number_literal, "3.14"));
        assert!(parses(Rule::number_literal, ".5"));
        assert!(parses(Rule::number_literal, "1e9"));
        assert!(parses(Rule::number_literal, "2.5e-3"));
        assert!(parses(Rule::number_literal, "0xff"));
    }

    #[test]
    fn test_strings() {
        assert!(parses(Rule::string_literal, "\"hello\""));
        assert!(parses(Rule::string_literal, "'it\\'s'"));
        assert!(parses(Rule::string_literal, "\"\""));
    }

    #[test]
    fn test_identifiers() {
        assert!(parses(Rule::identifier, "foo"));
        assert!(parses(Rule::identifier, "_private"));
        assert!(parses(Rule::identifier, "$jq"));
        assert!(parses(Rule::identifier, "ifx"));
        assert!(!parses(Rule::identifier, "if"));
        assert!(!parses(Rule::identifier, "await"));
    }

    #[test]
    fn test_statements() {
        assert!(JsParser::parse(Rule::script, "let x = 1;").is_ok());
        assert!(JsParser::parse(Rule::script, "const f = a => a * 2").is_ok());
        assert!(JsParser::parse(Rule::script, "for (let i = 0; i < 10; i++) { x += i }").is_ok());
        assert!(JsParser::parse(Rule::script, "do { x-- } while (x > 0)").is_ok());
        assert!(JsParser::parse(Rule::script, "async function f() { await g() }").is_ok());
    }
}
