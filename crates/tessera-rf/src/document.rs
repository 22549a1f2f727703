//! A minimal structured-document node used for model export and import.

use std::collections::BTreeMap;

/// A named node of a hierarchical document with string attributes and
/// ordered children.
///
/// Implement this for an existing document tree to export a forest into it;
/// [`Element`] is the in-memory implementation.
pub trait DocumentElement: Sized {
    /// Return the element's name.
    fn name(&self) -> &str;

    /// Return an attribute value, if set.
    fn attribute(&self, key: &str) -> Option<&str>;

    /// Set an attribute, replacing any previous value.
    fn set_attribute(&mut self, key: &str, value: String);

    /// Return the child elements in document order.
    fn children(&self) -> &[Self];

    /// Append an empty child named `name` and return it.
    fn append_child(&mut self, name: &str) -> &mut Self;
}

/// An in-memory document element.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Element {
    name: String,
    attributes: BTreeMap<String, String>,
    children: Vec<Element>,
}

impl Element {
    /// Create an element with no attributes or children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Return all attributes, sorted by key.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Return the first child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Mutable access to the children, for editing a document in place.
    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        &mut self.children
    }
}

impl DocumentElement for Element {
    fn name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    fn set_attribute(&mut self, key: &str, value: String) {
        self.attributes.insert(key.to_string(), value);
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn append_child(&mut self, name: &str) -> &mut Self {
        self.children.push(Element::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_query() {
        let mut root = Element::new("root");
        root.set_attribute("k", "v".to_string());
        let child = root.append_child("leaf");
        child.set_attribute("n", "1".to_string());
        root.append_child("leaf");

        assert_eq!(root.name(), "root");
        assert_eq!(root.attribute("k"), Some("v"));
        assert_eq!(root.attribute("missing"), None);
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.child("leaf").and_then(|c| c.attribute("n")), Some("1"));
    }

    #[test]
    fn json_round_trip() {
        let mut root = Element::new("root");
        root.append_child("a").set_attribute("x", "1.5".to_string());
        let json = serde_json::to_string(&root).unwrap();
        let back: Element = serde_json::from_str(&json).unwrap();
        assert_eq!(root, back);
    }
}
