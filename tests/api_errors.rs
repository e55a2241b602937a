// API error path tests
// These test error rendering, diagnostics and the error variants surfaced by the API

use miette::Diagnostic;
use tyco::{load, load_text, Registry, TycoError};

#[test]
fn test_api_load_text_parse_error() {
    let result = load_text("int port: eighty\n");
    assert!(matches!(result, Err(TycoError::Parse(_))));
}

#[test]
fn test_api_validation_error_variant() {
    let ctx = load_text("P:\n *int id:\n  - 1\n").unwrap();
    let mut registry = Registry::new();
    registry.register("P", |_: &tyco::Object| -> Result<(), String> {
        Err("always wrong".to_string())
    });
    let result = ctx.materialize(&registry);
    assert!(matches!(result, Err(TycoError::Validation(_))));
}

#[test]
fn test_render_with_caret() {
    let TycoError::Parse(err) = load_text("str a: x\nint b: nope\n").unwrap_err() else {
        panic!("expected a parse error");
    };
    assert_eq!(
        err.render(),
        "File \"<string>\", line 2, column 8:\nint b: nope\n       ^\nTycoParseError: 'nope' is not a valid integer literal"
    );
}

#[test]
fn test_render_expands_tabs_before_caret() {
    let TycoError::Parse(err) = load_text("P:\n\tint x:\n\t- oops\n").unwrap_err() else {
        panic!("expected a parse error");
    };
    let rendered = err.render();
    assert!(rendered.starts_with("File \"<string>\", line 3, column 4:\n\t- oops\n"));
    assert!(rendered.contains("\n          ^\n"));
}

#[test]
fn test_render_without_location() {
    let TycoError::Parse(err) = load("no/such/dir/file.tyco").unwrap_err() else {
        panic!("expected a parse error");
    };
    assert!(err.location().is_none());
    assert_eq!(
        err.render(),
        "TycoParseError: Unable to find path no/such/dir/file.tyco"
    );
}

#[test]
fn test_parse_diagnostic() {
    let err = load_text("bool flag: maybe\n").unwrap_err();
    assert_eq!(err.code().unwrap().to_string(), "tyco::parse");
    let label = err.labels().unwrap().next().unwrap();
    assert_eq!(label.offset(), 11);
    assert!(err.source_code().is_some());
}

#[test]
fn test_validation_diagnostic() {
    let ctx = load_text("Port:\n *int number:\n  - 80\n").unwrap();
    let mut registry = Registry::new();
    registry.register("Port", |o: &tyco::Object| match o.get("number") {
        Some(tyco::Native::Scalar(tyco::ast::Literal::Int(n))) if *n >= 1024 => Ok(()),
        _ => Err("privileged ports are not allowed".to_string()),
    });
    let err = ctx.materialize(&registry).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation failed for Port: privileged ports are not allowed"
    );
    assert_eq!(err.code().unwrap().to_string(), "tyco::validation");
    assert!(err.help().is_some());
}

#[test]
fn test_miette_report_wraps_parse_error() {
    let err = load_text("str a: x\nstr a: y\n").unwrap_err();
    let report = miette::Report::new(err);
    assert_eq!(
        report.to_string(),
        "Global attribute 'a' is defined more than once"
    );
}

#[test]
fn test_substituted_text_is_not_expanded_again() {
    let source = "str a: \"{b}\"\nstr b: '{c}'\nstr c: z\n";
    let value = load_text(source).unwrap().to_value();
    assert_eq!(value.get("a").and_then(tyco::Value::as_str), Some("{c}"));
}
