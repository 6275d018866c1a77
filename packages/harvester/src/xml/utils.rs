//! Helper functions for navigating `roxmltree` DOM nodes.

use roxmltree::Node;

/// Local tag name, without the namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use cfdi_harvester::xml::get_tag_name;
///
/// let xml = r#"<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "Comprobante");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Trimmed text content; `None` for empty or whitespace-only text.
pub fn get_text(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Element children only: text, comments and processing instructions
/// are skipped.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Strip a leading UTF-8 byte order mark.
///
/// # Examples
/// ```
/// use cfdi_harvester::xml::strip_bom;
///
/// assert_eq!(strip_bom("\u{feff}<a/>"), "<a/>");
/// assert_eq!(strip_bom("<a/>"), "<a/>");
/// ```
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
