pub mod units;

use serde::Deserialize;
use tree_sitter::{Node, Parser, Point};

use crate::error::ParseError;
pub use units::{SourceTree, StructuralUnit};

/// How a unit is written into the `code` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// The declaration's source text.
    #[default]
    Source,
    /// The declaration's tree-sitter S-expression.
    Sexp,
}

impl Representation {
    pub fn render(self, unit: StructuralUnit) -> String {
        match self {
            Representation::Source => unit.text,
            Representation::Sexp => unit.sexp,
        }
    }
}

/// Parse Java source into its top-level declarations.
///
/// Any `ERROR` or `MISSING` node in the tree fails the whole file. Blank
/// input is a valid, empty compilation unit.
pub fn parse(source: &str) -> Result<SourceTree, ParseError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_java::LANGUAGE.into())?;

    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    let root = tree.root_node();

    if root.has_error() {
        let point = first_error(root).unwrap_or_else(|| root.start_position());
        return Err(ParseError::Syntax {
            line: point.row + 1,
            column: point.column + 1,
        });
    }

    Ok(SourceTree {
        units: units::collect_top_level(root, source.as_bytes()),
    })
}

fn first_error(node: Node<'_>) -> Option<Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(point) = first_error(child) {
                return Some(point);
            }
        }
    }
    None
}

// ── Tests ──
