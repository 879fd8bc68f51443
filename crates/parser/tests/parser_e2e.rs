//! End-to-end lowering of realistic modules
use lantern_parser::{AstNode, Literal, MAX_NESTING, PythonParser, extract_imports};
use std::path::Path;

/// Helper function to parse and return the module body
fn parse_body(source: &str) -> Vec<AstNode> {
    let mut parser = PythonParser::new().unwrap();
    let parsed = parser.parse(source).unwrap();
    match parser.to_ast(&parsed).unwrap() {
        AstNode::Module { body } => body,
        _ => panic!("Expected Module node"),
    }
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_model_module_shape() {
    let source = r#"
from django.db import models
from .managers import ArticleManager

class Article(models.Model):
    title = models.CharField(max_length=200)
    objects = ArticleManager()

    @property
    def slug(self):
        return self.title.lower().replace(" ", "-")

    def __str__(self):
        return f"{self.title}"
"#;
    let body = parse_body(source);
    assert_eq!(body.len(), 3);
    assert!(matches!(body[0], AstNode::ImportFrom { dots: 0, .. }));
    assert!(matches!(body[1], AstNode::ImportFrom { dots: 1, .. }));

    match &body[2] {
        AstNode::ClassDef { name, bases, body, .. } => {
            assert_eq!(name, "Article");
            assert!(matches!(&bases[0], AstNode::Attribute { attribute, .. } if attribute == "Model"));
            assert_eq!(body.len(), 4);
            let methods: Vec<_> = body
                .iter()
                .filter_map(|stmt| match stmt {
                    AstNode::FunctionDef { name, .. } => Some(name.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(methods, vec!["slug", "__str__"]);
        }
        other => panic!("Expected class, got {other:?}"),
    }
}

#[test]
fn test_imports_of_module() {
    let source = "import os\nfrom . import sibling\nfrom pkg.sub import *\n\ndef lazy():\n    import json\n";
    let mut parser = PythonParser::new().unwrap();
    let ast = parser.parse_module(source).unwrap();
    let decls = extract_imports(Path::new("app/views.py"), &ast);

    assert_eq!(decls.len(), 4);
    assert_eq!(decls[0].path, vec!["os"]);
    assert_eq!(decls[1].dots, 1);
    assert_eq!(decls[1].name.as_deref(), Some("sibling"));
    assert!(decls[2].wildcard);
    assert_eq!(decls[2].path, vec!["pkg", "sub"]);
    assert_eq!(decls[3].path, vec!["json"]);
}

#[test]
fn test_eval_style_snippet() {
    let body = parse_body("'abc'.upper()");
    match &body[0] {
        AstNode::Call { function, .. } => match function.as_ref() {
            AstNode::Attribute { object, attribute } => {
                assert_eq!(attribute, "upper");
                assert_eq!(**object, AstNode::Literal { value: Literal::Str("abc".to_string()) });
            }
            other => panic!("Expected attribute, got {other:?}"),
        },
        other => panic!("Expected call, got {other:?}"),
    }
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_python2_print_is_approximated() {
    let body = parse_body("print 'hello'\nx = 1\n");
    assert!(body.iter().any(|stmt| matches!(stmt, AstNode::Assignment { .. })));
}

#[test]
fn test_broken_definition_keeps_following_statements() {
    let body = parse_body("def broken(:\n    pass\n\ny = 2\n");
    assert!(!body.is_empty());
}

#[test]
fn test_walrus_and_conditional() {
    let body = parse_body("if (n := len(a)) > 10:\n    r = 'big' if n else 'small'\n");
    match &body[0] {
        AstNode::If { branches, .. } => {
            let (test, block) = &branches[0];
            match test {
                AstNode::Compare { left, .. } => assert!(matches!(left.as_ref(), AstNode::NamedExpr { target, .. } if target == "n")),
                other => panic!("Expected comparison, got {other:?}"),
            }
            assert!(matches!(&block[0], AstNode::Assignment { value, .. } if matches!(value.as_ref(), AstNode::IfExp { .. })));
        }
        other => panic!("Expected if, got {other:?}"),
    }
}

// ============================================================================
// Deep nesting
// ============================================================================

fn assigned_value(source: &str) -> AstNode {
    match parse_body(source).remove(0) {
        AstNode::Assignment { value, .. } => *value,
        other => panic!("Expected assignment, got {other:?}"),
    }
}

#[test]
fn test_long_operator_chain_is_truncated() {
    let source = format!("x = 1{}\n", " + 1".repeat(499));
    let mut node = assigned_value(&source);
    assert!(matches!(&node, AstNode::BinaryOp { right, .. } if matches!(right.as_ref(), AstNode::Literal { .. })));
    let mut spine = 0;
    while let AstNode::BinaryOp { left, .. } = node {
        spine += 1;
        node = *left;
    }
    assert!(spine > 0 && spine < MAX_NESTING);
    assert_eq!(node, AstNode::Bad { approximation: Vec::new() });
}

#[test]
fn test_long_method_chain_is_truncated() {
    let source = format!("x = q{}\n", ".f()".repeat(50));
    let mut node = assigned_value(&source);
    let mut links = 0;
    loop {
        match node {
            AstNode::Call { function, .. } => node = *function,
            AstNode::Attribute { object, attribute } => {
                assert_eq!(attribute, "f");
                links += 1;
                node = *object;
            }
            other => {
                node = other;
                break;
            }
        }
    }
    assert!(links > 10 && links < 50);
    assert!(matches!(node, AstNode::Bad { .. }));
}

#[test]
fn test_parser_recovers_after_deep_input() {
    let mut parser = PythonParser::new().unwrap();
    let deep = format!("x = {}0{}\n", "[".repeat(300), "]".repeat(300));
    assert!(parser.parse_module(&deep).is_ok());

    match parser.parse_module("y = [[1]]\n").unwrap() {
        AstNode::Module { body } => match &body[0] {
            AstNode::Assignment { value, .. } => {
                assert!(matches!(value.as_ref(), AstNode::List { elements } if matches!(elements[0], AstNode::List { .. })))
            }
            other => panic!("Expected assignment, got {other:?}"),
        },
        other => panic!("Expected module, got {other:?}"),
    }
}
