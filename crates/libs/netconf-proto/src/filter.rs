//! Response filtering: subtree and xpath pruning of result trees.
//!
//! Handlers return the full result tree; the session asks this module to
//! prune it against the caller-supplied filter before reply framing.

use log::debug;
use netconf_xml::XmlElement;

use crate::error::RpcError;
use crate::xpath::XPathExpr;

/// Prune `data` by `filter`, if one was supplied.
pub fn filter_results(
    data: XmlElement,
    filter: Option<&XmlElement>,
) -> Result<XmlElement, RpcError> {
    let Some(filter) = filter else {
        return Ok(data);
    };

    match filter.attr("type") {
        None => {
            if filter.children.is_empty() {
                // Pathological "select nothing" filter.
                return Ok(data.shell());
            }
            // RFC 6241 defaults an untyped filter to subtree.
            debug!("filtering with untyped subtree filter");
            Ok(subtree_filter(&data, filter))
        }
        Some("subtree") => {
            debug!("filtering with subtree");
            Ok(subtree_filter(&data, filter))
        }
        Some("xpath") => {
            let select = filter.attr("select").ok_or(RpcError::MissingAttribute {
                element: "filter".to_string(),
                attribute: "select".to_string(),
            })?;
            debug!("filtering on xpath expression: {select}");
            xpath_filter(&data, select)
        }
        Some(other) => {
            debug!("unexpected filter type: {other}");
            Err(RpcError::BadAttribute {
                element: "filter".to_string(),
                attribute: "type".to_string(),
            })
        }
    }
}

/// Structural tree-pattern pruning. Sibling filter constraints are ANDed:
/// content-match leaves gate the candidate, containment children select
/// which of its subtrees survive.
fn subtree_filter(data: &XmlElement, filter: &XmlElement) -> XmlElement {
    let mut result = data.shell();
    for filter_child in &filter.children {
        for data_child in data.children_named(filter_child.local_name()) {
            if let Some(kept) = subtree_match(data_child, filter_child) {
                result.push(kept);
            }
        }
    }
    result
}

fn subtree_match(data: &XmlElement, filter: &XmlElement) -> Option<XmlElement> {
    // A content-match leaf compared directly: keep on exact text equality.
    if filter.has_text() {
        return (data.trimmed_text() == filter.trimmed_text()).then(|| data.clone());
    }

    // Selection node: the whole subtree is wanted.
    if filter.children.is_empty() {
        return Some(data.clone());
    }

    let (content_matches, selectors): (Vec<&XmlElement>, Vec<&XmlElement>) =
        filter.children.iter().partition(|child| child.has_text());

    // Every sibling content-match leaf must hold or the candidate is dropped.
    for leaf in &content_matches {
        let matched = data
            .children_named(leaf.local_name())
            .any(|child| child.trimmed_text() == leaf.trimmed_text());
        if !matched {
            return None;
        }
    }

    // Only content matches: return the entire matching instance.
    if selectors.is_empty() {
        return Some(data.clone());
    }

    let mut kept = data.shell();
    for leaf in &content_matches {
        if let Some(key) = data
            .children_named(leaf.local_name())
            .find(|child| child.trimmed_text() == leaf.trimmed_text())
        {
            kept.push(key.clone());
        }
    }
    for data_child in &data.children {
        let Some(selector) = selectors
            .iter()
            .find(|filter_child| filter_child.local_name() == data_child.local_name())
        else {
            continue;
        };
        if let Some(survivor) = subtree_match(data_child, selector) {
            kept.push(survivor);
        }
    }
    Some(kept)
}

/// Two-phase mark-then-prune against an xpath expression. The expression is
/// evaluated per top-level child of `data` (re-rooted, so `select` does not
/// need a container prefix); matched nodes keep their whole subtree and
/// their ancestor path is rebuilt from shells.
fn xpath_filter(data: &XmlElement, select: &str) -> Result<XmlElement, RpcError> {
    let expr = XPathExpr::parse(select).map_err(|err| {
        debug!("rejecting xpath select: {err}");
        RpcError::BadAttribute {
            element: "filter".to_string(),
            attribute: "select".to_string(),
        }
    })?;

    let mut matches: Vec<Vec<usize>> = Vec::new();
    for (index, child) in data.children.iter().enumerate() {
        for mut path in expr.matches(child) {
            path.insert(0, index);
            matches.push(path);
        }
    }

    let mut result = data.shell();
    let mut path = Vec::new();
    for (index, child) in data.children.iter().enumerate() {
        path.push(index);
        if let Some(kept) = prune_marked(child, &mut path, &matches) {
            result.push(kept);
        }
        path.pop();
    }
    Ok(result)
}

fn prune_marked(
    node: &XmlElement,
    path: &mut Vec<usize>,
    matches: &[Vec<usize>],
) -> Option<XmlElement> {
    // Matched nodes are kept verbatim, descendants included.
    if matches.iter().any(|marked| marked == path) {
        return Some(node.clone());
    }
    // Ancestors of a match are rebuilt as shells around their kept children.
    if !matches.iter().any(|marked| marked.starts_with(path)) {
        return None;
    }
    let mut kept = node.shell();
    kept.text = node.text.clone();
    for (index, child) in node.children.iter().enumerate() {
        path.push(index);
        if let Some(survivor) = prune_marked(child, path, matches) {
            kept.push(survivor);
        }
        path.pop();
    }
    Some(kept)
}

#[cfg(test)]
mod tests {
    use super::filter_results;
    use netconf_xml::{elm, parse, serialize};

    fn device_data() -> netconf_xml::XmlElement {
        parse(
            "<data><devs>\
             <dev><name>dev1</name><slots>1</slots></dev>\
             <dev><name>dev2</name><slots>2</slots></dev>\
             </devs></data>",
        )
        .expect("fixture")
    }

    #[test]
    fn no_filter_is_identity() {
        let data = device_data();
        let result = filter_results(data.clone(), None).expect("filter");
        assert_eq!(result, data);
    }

    #[test]
    fn empty_untyped_filter_selects_nothing() {
        let filter = elm("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(result.local_name(), "data");
        assert!(result.children.is_empty());

        let no_data = filter_results(elm("data"), Some(&filter)).expect("filter");
        assert!(no_data.children.is_empty());
    }

    #[test]
    fn subtree_content_match_keeps_full_instance() {
        let filter = parse(
            "<filter type=\"subtree\"><devs><dev><name>dev1</name></dev></devs></filter>",
        )
        .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(
            serialize(&result),
            "<data><devs><dev><name>dev1</name><slots>1</slots></dev></devs></data>"
        );
    }

    #[test]
    fn subtree_selection_node_keeps_selected_children_only() {
        let filter = parse(
            "<filter type=\"subtree\"><devs><dev><name>dev2</name><slots/></dev></devs></filter>",
        )
        .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(
            serialize(&result),
            "<data><devs><dev><name>dev2</name><slots>2</slots></dev></devs></data>"
        );
    }

    #[test]
    fn subtree_sibling_constraints_are_anded() {
        let filter = parse(
            "<filter type=\"subtree\"><devs><dev><name>dev1</name><slots>2</slots></dev></devs></filter>",
        )
        .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        // dev1 has slots=1, so no instance satisfies both constraints.
        assert_eq!(serialize(&result), "<data><devs/></data>");
    }

    #[test]
    fn subtree_mismatch_drops_whole_branch() {
        let filter = parse(
            "<filter type=\"subtree\"><devs><dev><name>dev9</name></dev></devs></filter>",
        )
        .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(serialize(&result), "<data><devs/></data>");
    }

    #[test]
    fn untyped_filter_with_children_acts_as_subtree() {
        let filter =
            parse("<filter><devs><dev><name>dev2</name></dev></devs></filter>").expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(
            serialize(&result),
            "<data><devs><dev><name>dev2</name><slots>2</slots></dev></devs></data>"
        );
    }

    #[test]
    fn xpath_filter_preserves_ancestor_path() {
        let filter = parse("<filter type=\"xpath\" select=\"/devs/dev[name='dev2']\"/>")
            .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(
            serialize(&result),
            "<data><devs><dev><name>dev2</name><slots>2</slots></dev></devs></data>"
        );
    }

    #[test]
    fn xpath_union_keeps_both_entries_in_document_order() {
        let filter = parse(
            "<filter type=\"xpath\" select=\"/devs/dev[name='dev2'] | /devs/dev[name='dev1']\"/>",
        )
        .expect("filter");
        let result = filter_results(device_data(), Some(&filter)).expect("filter");
        assert_eq!(
            serialize(&result),
            "<data><devs>\
             <dev><name>dev1</name><slots>1</slots></dev>\
             <dev><name>dev2</name><slots>2</slots></dev>\
             </devs></data>"
        );
    }

    #[test]
    fn xpath_without_select_is_missing_attribute() {
        let filter = parse("<filter type=\"xpath\"/>").expect("filter");
        let err = filter_results(device_data(), Some(&filter)).expect_err("must fail");
        assert_eq!(err.tag(), "missing-attribute");
    }

    #[test]
    fn unknown_filter_type_is_bad_attribute() {
        let filter = parse("<filter type=\"csv\"/>").expect("filter");
        let err = filter_results(device_data(), Some(&filter)).expect_err("must fail");
        assert_eq!(err.tag(), "bad-attribute");
    }

    #[test]
    fn malformed_xpath_select_is_bad_attribute() {
        let filter =
            parse("<filter type=\"xpath\" select=\"//dev[position()=1]\"/>").expect("filter");
        let err = filter_results(device_data(), Some(&filter)).expect_err("must fail");
        assert_eq!(err.tag(), "bad-attribute");
    }
}
