use tree_sitter::Node;

/// Declarations that count as top-level structural units of a Java file.
pub const TOP_LEVEL_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
    "module_declaration",
];

const BODY_KINDS: &[&str] = &[
    "class_body",
    "interface_body",
    "enum_body",
    "annotation_type_body",
    "module_body",
];

/// One declaration from a parsed file, with its nested member declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralUnit {
    pub kind: String,
    pub name: Option<String>,
    /// Source text of the declaration, modifiers and annotations included.
    pub text: String,
    /// Tree-sitter S-expression of the declaration.
    pub sexp: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub children: Vec<StructuralUnit>,
}

impl StructuralUnit {
    pub(crate) fn from_node(node: Node<'_>, source: &[u8]) -> Self {
        StructuralUnit {
            kind: node.kind().to_string(),
            name: declared_name(node, source),
            text: node.utf8_text(source).unwrap_or_default().to_string(),
            sexp: node.to_sexp(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            children: members(node, source),
        }
    }

    /// Number of units in this subtree, this one included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(StructuralUnit::size).sum::<usize>()
    }
}

/// The parse result of one file: its top-level declarations in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
    pub units: Vec<StructuralUnit>,
}

impl SourceTree {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}

pub(crate) fn collect_top_level(root: Node<'_>, source: &[u8]) -> Vec<StructuralUnit> {
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|n| TOP_LEVEL_KINDS.contains(&n.kind()))
        .map(|n| StructuralUnit::from_node(n, source))
        .collect()
}

fn members(node: Node<'_>, source: &[u8]) -> Vec<StructuralUnit> {
    let Some(body) = body_of(node) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_members(body, source, &mut out);
    out
}

fn collect_members(body: Node<'_>, source: &[u8], out: &mut Vec<StructuralUnit>) {
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        let kind = child.kind();
        if kind == "enum_body_declarations" {
            // Members after the constant list live one level down.
            collect_members(child, source, out);
        } else if is_member(kind) {
            out.push(StructuralUnit::from_node(child, source));
        }
    }
}

fn is_member(kind: &str) -> bool {
    kind.ends_with("_declaration")
        || kind.ends_with("_directive")
        || kind == "enum_constant"
        || kind == "static_initializer"
}

fn body_of(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(body) = node.child_by_field_name("body") {
        return Some(body);
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|c| BODY_KINDS.contains(&c.kind()));
    found
}

fn declared_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let name_node = node.child_by_field_name("name").or_else(|| {
        // field_declaration / constant_declaration: `int a = 1, b;` takes the first declarator
        node.child_by_field_name("declarator")
            .and_then(|d| d.child_by_field_name("name"))
    })?;
    name_node.utf8_text(source).ok().map(str::to_string)
}
