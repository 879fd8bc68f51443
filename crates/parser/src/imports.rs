//! Import declarations used to order files before analysis

use crate::ast::AstNode;
use std::path::{Path, PathBuf};

/// One imported module reference
///
/// `from ..pkg import mod` yields `dots = 2`, `path = ["pkg"]`, `name = Some("mod")`: the name may
/// refer to a submodule file, so it is kept separately from the dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub origin: PathBuf,
    pub dots: usize,
    pub path: Vec<String>,
    pub name: Option<String>,
    pub wildcard: bool,
}

impl ImportDecl {
    pub fn is_relative(&self) -> bool {
        self.dots > 0
    }
}

/// Collect every import statement in `ast`, including ones nested in functions, classes and
/// conditional blocks
pub fn extract_imports(origin: &Path, ast: &AstNode) -> Vec<ImportDecl> {
    let mut decls = Vec::new();
    walk_statements(ast, &mut |stmt| match stmt {
        AstNode::Import { names } => {
            for alias in names {
                decls.push(ImportDecl {
                    origin: origin.to_path_buf(),
                    dots: 0,
                    path: alias.path.clone(),
                    name: None,
                    wildcard: false,
                });
            }
        }
        AstNode::ImportFrom { dots, module, names, wildcard } => {
            let decl = |name: Option<String>, wildcard: bool| ImportDecl {
                origin: origin.to_path_buf(),
                dots: *dots,
                path: module.clone(),
                name,
                wildcard,
            };
            if *wildcard {
                decls.push(decl(None, true));
            }
            for alias in names {
                decls.push(decl(alias.path.first().cloned(), false));
            }
        }
        _ => {}
    });
    decls
}

fn walk_statements(node: &AstNode, f: &mut dyn FnMut(&AstNode)) {
    f(node);
    match node {
        AstNode::Module { body }
        | AstNode::FunctionDef { body, .. }
        | AstNode::ClassDef { body, .. }
        | AstNode::With { body, .. } => walk_block(body, f),
        AstNode::If { branches, else_body } => {
            for (_, body) in branches {
                walk_block(body, f);
            }
            walk_block(else_body, f);
        }
        AstNode::For { body, else_body, .. } | AstNode::While { body, else_body, .. } => {
            walk_block(body, f);
            walk_block(else_body, f);
        }
        AstNode::Try { body, handlers, else_body, finally_body } => {
            walk_block(body, f);
            for handler in handlers {
                walk_block(&handler.body, f);
            }
            walk_block(else_body, f);
            walk_block(finally_body, f);
        }
        AstNode::Bad { approximation } => walk_block(approximation, f),
        _ => {}
    }
}

fn walk_block(block: &[AstNode], f: &mut dyn FnMut(&AstNode)) {
    for stmt in block {
        walk_statements(stmt, f);
    }
}
