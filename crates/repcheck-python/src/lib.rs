use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tree_sitter::{
    Language as TsLanguage, Node, Parser, Query, QueryCursor, StreamingIterator, Tree,
};

use repcheck_core::analyzer::{ScriptLanguage, ToolCommand};
use repcheck_core::types::Language;

/// A parsed Python script with its tree-sitter AST and source text.
struct ParsedScript {
    tree: Tree,
    content: String,
}

/// A `from <dots><module> import <names>` statement.
#[derive(Debug, PartialEq, Eq)]
struct RelativeImport {
    level: usize,
    module: Option<String>,
    names: Vec<String>,
}

/// Python script support: `import` analysis with tree-sitter, flake8, python3.
pub struct PythonLanguage {
    language: TsLanguage,
    import_query: Query,
    from_query: Query,
}

impl PythonLanguage {
    pub fn new() -> Result<Self> {
        let language: TsLanguage = tree_sitter_python::LANGUAGE.into();

        let import_query = Query::new(
            &language,
            r#"
            (import_statement
              name: (dotted_name) @module)
            (import_statement
              name: (aliased_import
                name: (dotted_name) @module))
            "#,
        )
        .context("failed to compile import query")?;

        let from_query = Query::new(
            &language,
            r#"
            (import_from_statement
              module_name: (relative_import) @relative) @statement
            "#,
        )
        .context("failed to compile from-import query")?;

        Ok(Self {
            language,
            import_query,
            from_query,
        })
    }

    fn parse(&self, path: &Path) -> Result<ParsedScript> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set Python language")?;
        let tree = parser
            .parse(&content, None)
            .context("failed to parse Python file")?;
        if tree.root_node().has_error() {
            anyhow::bail!("syntax error in {}", path.display());
        }
        Ok(ParsedScript { tree, content })
    }

    /// Dotted names from plain `import a.b` / `import a as b` statements.
    fn plain_imports(&self, parsed: &ParsedScript) -> Vec<String> {
        let mut modules = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(
            &self.import_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            for capture in m.captures {
                modules.push(node_text(capture.node, &parsed.content));
            }
        }
        modules
    }

    fn relative_imports(&self, parsed: &ParsedScript) -> Vec<RelativeImport> {
        let statement_idx = capture_index(&self.from_query, "statement");
        let relative_idx = capture_index(&self.from_query, "relative");

        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(
            &self.from_query,
            parsed.tree.root_node(),
            parsed.content.as_bytes(),
        );
        while let Some(m) = matches.next() {
            let mut statement = None;
            let mut relative = None;
            for capture in m.captures {
                if Some(capture.index) == statement_idx {
                    statement = Some(capture.node);
                } else if Some(capture.index) == relative_idx {
                    relative = Some(capture.node);
                }
            }
            let (Some(statement), Some(relative)) = (statement, relative) else {
                continue;
            };
            imports.push(read_relative_import(statement, relative, &parsed.content));
        }
        imports
    }
}

impl ScriptLanguage for PythonLanguage {
    fn language(&self) -> Language {
        Language::Python
    }

    fn default_patterns(&self) -> &[&str] {
        &["**/*.py"]
    }

    fn extract_dependencies(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        let parsed = self.parse(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut deps = BTreeSet::new();

        for import in self.relative_imports(&parsed) {
            deps.extend(resolve_relative_import(dir, &import));
        }
        for module in self.plain_imports(&parsed) {
            // Only sibling files count; everything else is a library import.
            if let Some(found) = module_file(dir, &module) {
                deps.insert(found);
            }
        }
        Ok(deps)
    }

    fn lint_command(&self, path: &Path) -> Option<ToolCommand> {
        Some(ToolCommand::new(
            "flake8",
            [path.to_string_lossy().to_string(), "--max-line-length=100".to_string()],
        ))
    }

    fn run_command(&self, file_name: &str) -> ToolCommand {
        ToolCommand::new("python3", [file_name])
    }
}

fn capture_index(query: &Query, name: &str) -> Option<u32> {
    query
        .capture_names()
        .iter()
        .position(|n| *n == name)
        .map(|i| i as u32)
}

fn read_relative_import(statement: Node, relative: Node, source: &str) -> RelativeImport {
    let mut level = 0;
    let mut module = None;
    let mut cursor = relative.walk();
    for child in relative.children(&mut cursor) {
        match child.kind() {
            "import_prefix" => level = node_text(child, source).matches('.').count(),
            "dotted_name" => module = Some(node_text(child, source)),
            _ => {}
        }
    }

    let mut names = Vec::new();
    let mut cursor = statement.walk();
    for child in statement.children_by_field_name("name", &mut cursor) {
        let name_node = match child.kind() {
            "aliased_import" => child.child_by_field_name("name"),
            _ => Some(child),
        };
        if let Some(n) = name_node {
            names.push(node_text(n, source));
        }
    }

    RelativeImport {
        level,
        module,
        names,
    }
}

/// Resolve a relative import from a script in `dir`. One dot is the script's
/// own package; each extra dot climbs one directory.
fn resolve_relative_import(dir: &Path, import: &RelativeImport) -> Vec<PathBuf> {
    let mut base = dir.to_path_buf();
    for _ in 1..import.level {
        if !base.pop() {
            return Vec::new();
        }
    }

    match &import.module {
        Some(module) => module_file(&base, module).into_iter().collect(),
        None => {
            // `from . import a, b`: the package init plus any sibling modules named.
            let mut found: Vec<PathBuf> = existing(base.join("__init__.py")).into_iter().collect();
            found.extend(import.names.iter().filter_map(|n| module_file(&base, n)));
            found
        }
    }
}

/// `<base>/<a/b>.py` or `<base>/<a/b>/__init__.py` for module `a.b`, if either exists.
fn module_file(base: &Path, module: &str) -> Option<PathBuf> {
    let rel: PathBuf = module.split('.').collect();
    existing(base.join(&rel).with_extension("py"))
        .or_else(|| existing(base.join(&rel).join("__init__.py")))
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.canonicalize().unwrap_or(path))
    } else {
        None
    }
}

/// Extract text from a tree-sitter node.
fn node_text(node: Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}
