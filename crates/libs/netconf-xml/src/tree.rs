//! Mutable XML element tree.
//!
//! Tags are stored as written, prefix included; protocol code matches on
//! [`XmlElement::local_name`] so `nc:rpc` and `rpc` compare equal.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), ..Self::default() }
    }

    /// Tag with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        local_name_of(&self.tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name || local_name_of(key) == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(key, _)| *key == name) {
            entry.1 = value;
            return;
        }
        self.attrs.push((name, value));
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Trimmed element text; empty when the element carries none.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    pub fn has_text(&self) -> bool {
        !self.trimmed_text().is_empty()
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.local_name() == local)
    }

    pub fn children_named<'a>(
        &'a self,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.local_name() == local)
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Append a fresh child element and return a handle to it.
    pub fn subelm(&mut self, tag: impl Into<String>) -> &mut XmlElement {
        self.children.push(XmlElement::new(tag));
        self.children.last_mut().expect("child just pushed")
    }

    /// A copy of this element without text or children, attributes kept.
    pub fn shell(&self) -> XmlElement {
        XmlElement { tag: self.tag.clone(), attrs: self.attrs.clone(), ..XmlElement::default() }
    }
}

pub fn elm(tag: impl Into<String>) -> XmlElement {
    XmlElement::new(tag)
}

pub fn leaf(tag: impl Into<String>, value: impl Into<String>) -> XmlElement {
    let mut element = XmlElement::new(tag);
    element.text = value.into();
    element
}

pub fn local_name_of(tag: &str) -> &str {
    match tag.rsplit_once(':') {
        Some((_, local)) => local,
        None => tag,
    }
}

#[cfg(test)]
mod tests {
    use super::{elm, leaf, local_name_of, XmlElement};

    #[test]
    fn local_name_strips_prefix() {
        assert_eq!(local_name_of("nc:rpc"), "rpc");
        assert_eq!(local_name_of("rpc"), "rpc");
        assert_eq!(XmlElement::new("sys:system-state").local_name(), "system-state");
    }

    #[test]
    fn attr_lookup_ignores_prefix() {
        let mut element = elm("filter");
        element.set_attr("nc:type", "subtree");
        assert_eq!(element.attr("type"), Some("subtree"));
        assert_eq!(element.attr("select"), None);
    }

    #[test]
    fn set_attr_replaces_existing_value() {
        let mut element = elm("rpc");
        element.set_attr("message-id", "1");
        element.set_attr("message-id", "2");
        assert_eq!(element.attr("message-id"), Some("2"));
        assert_eq!(element.attrs.len(), 1);
    }

    #[test]
    fn subelm_appends_and_returns_child() {
        let mut data = elm("data");
        data.subelm("devs").push(leaf("name", "dev1"));
        assert_eq!(data.children.len(), 1);
        assert_eq!(data.child("devs").and_then(|devs| devs.child("name")).map(XmlElement::trimmed_text), Some("dev1"));
    }

    #[test]
    fn shell_keeps_attrs_only() {
        let mut element = leaf("dev", "text");
        element.set_attr("id", "7");
        element.push(elm("slots"));
        let shell = element.shell();
        assert_eq!(shell.attr("id"), Some("7"));
        assert!(shell.children.is_empty());
        assert!(!shell.has_text());
    }
}
