//! # Label Compiler Unit Tests
//!
//! These tests verify:
//! - Overrides win over defaults
//! - `defaults` never mutates a shared compiler

use cf_controller::controller::labels::Compiler;

#[test]
fn test_override_wins_on_collision() {
    let compiler = Compiler::new().defaults([("pod-security.kubernetes.io/enforce", "restricted")]);

    let compiled = compiler.compile([
        ("pod-security.kubernetes.io/enforce", "baseline"),
        ("korifi.cloudfoundry.org/space-guid", "cf-space-1"),
    ]);

    assert_eq!(compiled["pod-security.kubernetes.io/enforce"], "baseline");
    assert_eq!(compiled["korifi.cloudfoundry.org/space-guid"], "cf-space-1");
}

#[test]
fn test_shared_compiler_is_not_mutated() {
    let shared = Compiler::new().defaults([("a", "1")]);
    let extended = shared.defaults([("b", "2")]);

    let from_shared = shared.compile(std::iter::empty::<(String, String)>());
    let from_extended = extended.compile(std::iter::empty::<(String, String)>());

    assert_eq!(from_shared.len(), 1);
    assert_eq!(from_extended.len(), 2);
}

#[test]
fn test_later_defaults_override_earlier_ones() {
    let compiler = Compiler::new().defaults([("a", "1")]).defaults([("a", "2")]);
    assert_eq!(compiler.compile([("b", "3")])["a"], "2");
}
