//! Tests for guest errors and try/catch

use super::helpers::*;
use crate::interpreter::errors;
use crate::interpreter::types::Val;

fn code_of(error: &Val) -> &str {
    match error {
        Val::Error(info) => &info.code,
        other => panic!("Expected an error value, got {:?}", other),
    }
}

#[test]
fn test_user_error_is_caught() {
    let source = r#"
try {
    error("boom")
    return "unreachable"
} catch (e) {
    return e.code + ":" + e.message
}
"#;
    assert_eq!(returned(source), text("USER:boom"));
}

#[test]
fn test_uncaught_error_escapes() {
    assert_eq!(code_of(&thrown("error('bad')")), errors::USER);
}

#[test]
fn test_division_by_zero() {
    let error = thrown("return 1 / 0");
    assert_eq!(code_of(&error), errors::WRONG_ARG_TYPE);
}

#[test]
fn test_wrong_types() {
    assert_eq!(code_of(&thrown("return 1 - 'a'")), errors::WRONG_ARG_TYPE);
    assert_eq!(code_of(&thrown("return len(1)")), errors::WRONG_ARG_TYPE);
    assert_eq!(code_of(&thrown("return 1 < 'a'")), errors::WRONG_ARG_TYPE);
}

#[test]
fn test_calling_a_non_function() {
    assert_eq!(code_of(&thrown("let x = 1\nx()")), errors::NOT_CALLABLE);
}

#[test]
fn test_bad_index() {
    assert_eq!(code_of(&thrown("return (1).x")), errors::BAD_ACCESS);
    assert_eq!(
        code_of(&thrown("let l = []\nl[3] = 1")),
        errors::BAD_ACCESS
    );
}

#[test]
fn test_catch_binding_is_scoped() {
    let source = r#"
let e = "outer"
try {
    error("inner")
} catch (e) {
    print(e.message)
}
return e
"#;
    assert_eq!(returned(source), text("outer"));
}

#[test]
fn test_error_in_catch_propagates_to_outer_try() {
    let source = r#"
try {
    try {
        error("first")
    } catch (e) {
        error("second")
    }
} catch (e) {
    return e.message
}
"#;
    assert_eq!(returned(source), text("second"));
}

#[test]
fn test_error_inside_loop_unwinds_loop() {
    let source = r#"
let i = 0
try {
    while (true) {
        i = i + 1
        if (i == 3) { error("stop") }
    }
} catch (e) {
    return i
}
"#;
    assert_eq!(returned(source), num(3.0));
}

#[test]
fn test_synchronized_native_needs_the_host() {
    // Calling the bound send directly from the coroutine is refused
    let error = thrown("component.invoke('gpu', 'bind')()");
    assert_eq!(code_of(&error), errors::SYNCHRONIZED_ONLY);
}
