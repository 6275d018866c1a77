//! Owned element tree with an explicit one-or-many accessor.
//!
//! Wherever a schema allows an element to repeat, lookups return a
//! [`OneOrMany`]: a single occurrence and a collection resolve through the
//! same API, so call sites never inspect the shape themselves.

use roxmltree::{Document, Node};

use super::utils::{element_children, get_tag_name, get_text};

/// One or more occurrences of the same element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Wrap a collection; `None` when it is empty.
    pub fn from_vec(mut items: Vec<T>) -> Option<Self> {
        match items.len() {
            0 => None,
            1 => items.pop().map(Self::One),
            _ => Some(Self::Many(items)),
        }
    }

    /// The first occurrence in document order.
    pub fn first(&self) -> Option<&T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.first(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(item) => std::slice::from_ref(item).iter(),
            Self::Many(items) => items.iter(),
        }
    }
}

/// An XML element with local names and its namespace kept aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, roxmltree::Error> {
        let doc = Document::parse(xml)?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            name: get_tag_name(node).to_string(),
            namespace: node.tag_name().namespace().map(str::to_string),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: get_text(node),
            children: element_children(node).map(Self::from_node).collect(),
        }
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First present attribute among `names`, trimmed and non-empty.
    pub fn attr_any(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.attr(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// All elements reached by following `path` from this element.
    ///
    /// Every step fans out over all occurrences of the previous step, so a
    /// repeated container and a repeated item both contribute.
    ///
    /// # Examples
    /// ```
    /// use cfdi_harvester::xml::Element;
    ///
    /// let root = Element::parse(
    ///     "<r><c><i n='1'/></c><c><i n='2'/><i n='3'/></c></r>",
    /// ).unwrap();
    /// let items = root.lookup(&["c", "i"]).unwrap();
    /// assert_eq!(items.iter().count(), 3);
    /// assert_eq!(items.first().and_then(|i| i.attr("n")), Some("1"));
    /// ```
    pub fn lookup(&self, path: &[&str]) -> Option<OneOrMany<&Element>> {
        let mut current: Vec<&Element> = vec![self];
        for step in path {
            current = current
                .into_iter()
                .flat_map(|element| element.children.iter().filter(move |c| c.name == *step))
                .collect();
            if current.is_empty() {
                return None;
            }
        }
        OneOrMany::from_vec(current)
    }

    /// First element reached by `path`.
    pub fn first(&self, path: &[&str]) -> Option<&Element> {
        self.lookup(path).and_then(|found| found.first().copied())
    }
}
