use serde_json::Map;
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum TreeParseError {
    #[error("Invalid TREEXML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Convert a TREEXML document into the JSON shape published on the tree
/// topic and walked by discovery.
///
/// Child elements become keys, repeated element names become arrays,
/// text-only elements become strings and attributes are merged in as plain
/// keys. The root element keeps its tag as the single top-level key.
pub fn tree_to_json(xml: &str) -> Result<Value, TreeParseError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let mut top = Map::new();
    top.insert(root.tag_name().name().to_string(), element_to_value(root));
    Ok(Value::Object(top))
}

fn element_to_value(node: roxmltree::Node) -> Value {
    let children: Vec<roxmltree::Node> = node.children().filter(|child| child.is_element()).collect();

    if children.is_empty() && node.attributes().len() == 0 {
        let text = node.text().unwrap_or_default().trim();
        return Value::String(text.to_string());
    }

    let mut object = Map::new();
    for attribute in node.attributes() {
        object.insert(
            attribute.name().to_string(),
            Value::String(attribute.value().to_string()),
        );
    }
    for child in children {
        let key = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match object.remove(&key) {
            None => {
                object.insert(key, value);
            }
            Some(Value::Array(mut items)) => {
                items.push(value);
                object.insert(key, Value::Array(items));
            }
            Some(existing) => {
                object.insert(key, Value::Array(vec![existing, value]));
            }
        }
    }
    Value::Object(object)
}

/// Find the node describing `network` in a parsed tree.
///
/// C-Gate emits several tree shapes depending on how the request was
/// scoped; they are probed in a fixed order, ending with a one-level walk.
pub fn resolve_network_node<'a>(root: &'a Value, network: &str) -> Option<&'a Value> {
    probe_network_node(root, network).or_else(|| {
        root.as_object()?
            .values()
            .find_map(|child| probe_network_node(child, network))
    })
}

fn probe_network_node<'a>(root: &'a Value, network: &str) -> Option<&'a Value> {
    let nested = root.get("Network").and_then(|n| n.get("Interface")).and_then(|i| i.get("Network"));
    if let Some(node) = nested.filter(|node| network_number_matches(node, network)) {
        return Some(node);
    }

    if let Some(node) = root
        .get("Network")
        .filter(|node| network_number_matches(node, network))
    {
        return Some(node);
    }

    if network_number_matches(root, network) {
        return Some(root);
    }

    // A network-scoped tree omits the network number but lists units directly
    root.get("Network").filter(|node| node.get("Unit").is_some())
}

fn network_number_matches(node: &Value, network: &str) -> bool {
    node.get("NetworkNumber")
        .and_then(value_as_string)
        .is_some_and(|number| number == network)
}

/// One group advertised by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitGroup {
    pub app_id: String,
    pub group: String,
    pub label: Option<String>,
}

/// Collect the groups of the target applications from a network node.
///
/// Two TREEXML shapes exist: the structured one where `Application`
/// carries `ApplicationAddress` and `Group` children, and the flat one
/// where `Application` and `Groups` are comma-separated id lists. Groups
/// are de-duplicated per application, keeping the first label seen.
pub fn collect_unit_groups(network_node: &Value, target_apps: &[String]) -> Vec<UnitGroup> {
    let mut groups: Vec<UnitGroup> = Vec::new();

    for unit in values_of(network_node.get("Unit")) {
        match unit.get("Application") {
            Some(Value::String(apps)) => {
                collect_flat(apps, unit.get("Groups"), target_apps, &mut groups)
            }
            Some(application) => collect_structured(application, target_apps, &mut groups),
            None => (),
        }
    }

    groups
}

fn collect_flat(
    apps: &str,
    unit_groups: Option<&Value>,
    target_apps: &[String],
    groups: &mut Vec<UnitGroup>,
) {
    let listed: Option<&str> = unit_groups.and_then(Value::as_str);
    let Some(listed) = listed else { return };

    for app_id in apps.split(',').map(str::trim).filter(|app| !app.is_empty()) {
        if !target_apps.iter().any(|target| target == app_id) {
            continue;
        }
        for group in listed.split(',').map(str::trim).filter(|g| !g.is_empty()) {
            add_group(groups, app_id, group, None);
        }
    }
}

fn collect_structured(application: &Value, target_apps: &[String], groups: &mut Vec<UnitGroup>) {
    for app in values_of(Some(application)) {
        let Some(app_id) = app.get("ApplicationAddress").and_then(value_as_string) else {
            continue;
        };
        if !target_apps.iter().any(|target| *target == app_id) {
            continue;
        }

        for group in values_of(app.get("Group")) {
            match group {
                Value::Object(_) => {
                    if let Some(group_id) = group.get("GroupAddress").and_then(value_as_string) {
                        let label = group.get("Label").and_then(value_as_string);
                        add_group(groups, &app_id, &group_id, label);
                    }
                }
                other => {
                    if let Some(group_id) = value_as_string(other) {
                        add_group(groups, &app_id, &group_id, None);
                    }
                }
            }
        }
    }
}

fn add_group(groups: &mut Vec<UnitGroup>, app_id: &str, group: &str, label: Option<String>) {
    if let Some(existing) = groups
        .iter_mut()
        .find(|unit_group| unit_group.app_id == app_id && unit_group.group == group)
    {
        // Keep the first entry, only filling in a missing label
        if existing.label.is_none() {
            existing.label = label;
        }
        return;
    }
    groups.push(UnitGroup {
        app_id: app_id.to_string(),
        group: group.to_string(),
        label,
    });
}

/// Treat a missing value as nothing, an array as its items and anything
/// else as a single item.
fn values_of(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// The string form of a scalar, since TREEXML ids surface as strings or
/// numbers depending on the producing shape.
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn elements_become_keys_and_text_becomes_strings() {
        let tree = tree_to_json(
            "<Network><NetworkNumber>254</NetworkNumber><Name>Home</Name></Network>",
        )
        .unwrap();
        assert_eq!(
            tree,
            json!({"Network": {"NetworkNumber": "254", "Name": "Home"}})
        );
    }

    #[test]
    fn repeated_elements_become_arrays() {
        let tree = tree_to_json(
            "<Network><Unit><Address>1</Address></Unit><Unit><Address>2</Address></Unit></Network>",
        )
        .unwrap();
        assert_eq!(
            tree,
            json!({"Network": {"Unit": [{"Address": "1"}, {"Address": "2"}]}})
        );
    }

    #[test]
    fn attributes_are_merged_as_keys() {
        let tree = tree_to_json(r#"<Network NetworkNumber="254"><Name>Home</Name></Network>"#).unwrap();
        assert_eq!(
            tree,
            json!({"Network": {"NetworkNumber": "254", "Name": "Home"}})
        );
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(tree_to_json("<Network><unclosed>").is_err());
    }

    #[test]
    fn the_network_is_resolved_through_an_interface() {
        let tree = json!({
            "Network": {"Interface": {"Network": {"NetworkNumber": "254", "Unit": []}}}
        });
        let node = resolve_network_node(&tree, "254").unwrap();
        assert_eq!(node.get("NetworkNumber"), Some(&json!("254")));
    }

    #[test]
    fn the_network_is_resolved_directly_under_the_root() {
        let tree = json!({"Network": {"NetworkNumber": "254"}});
        assert!(resolve_network_node(&tree, "254").is_some());
        assert!(resolve_network_node(&tree, "253").is_none());
    }

    #[test]
    fn the_root_itself_can_be_the_network() {
        let tree = json!({"NetworkNumber": 254, "Unit": []});
        assert!(resolve_network_node(&tree, "254").is_some());
    }

    #[test]
    fn a_network_scoped_tree_is_recognized_by_its_units() {
        let tree = json!({"Network": {"Unit": [{"Address": "1"}]}});
        assert!(resolve_network_node(&tree, "254").is_some());
    }

    #[test]
    fn the_walk_descends_one_level_when_needed() {
        let tree = json!({
            "Installation": {"Network": {"NetworkNumber": "254", "Unit": []}}
        });
        assert!(resolve_network_node(&tree, "254").is_some());
    }

    fn structured_network() -> Value {
        json!({
            "Unit": [
                {
                    "Application": {
                        "ApplicationAddress": "56",
                        "Group": [
                            {"GroupAddress": "10", "Label": "Kitchen"},
                            {"GroupAddress": "11", "Label": "Living"},
                            {"GroupAddress": "12", "Label": "Bedroom"}
                        ]
                    }
                },
                {
                    "Application": {
                        "ApplicationAddress": "203",
                        "Group": [
                            {"GroupAddress": "15"},
                            {"GroupAddress": "16"},
                            {"GroupAddress": "17"},
                            {"GroupAddress": "20"}
                        ]
                    }
                }
            ]
        })
    }

    #[test]
    fn structured_units_yield_labelled_groups() {
        let groups = collect_unit_groups(
            &structured_network(),
            &["56".to_string(), "203".to_string()],
        );
        assert_eq!(groups.len(), 7);
        assert_eq!(
            groups[0],
            UnitGroup {
                app_id: "56".to_string(),
                group: "10".to_string(),
                label: Some("Kitchen".to_string()),
            }
        );
        assert!(groups.iter().filter(|g| g.app_id == "203").all(|g| g.label.is_none()));
    }

    #[test]
    fn non_target_applications_are_skipped() {
        let groups = collect_unit_groups(&structured_network(), &["56".to_string()]);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.app_id == "56"));
    }

    #[test]
    fn flat_units_yield_every_listed_group() {
        let network = json!({
            "Unit": {
                "Application": "56,203",
                "Groups": "1,2,3"
            }
        });

        let groups = collect_unit_groups(&network, &["56".to_string()]);
        assert_eq!(
            groups,
            vec![
                UnitGroup { app_id: "56".to_string(), group: "1".to_string(), label: None },
                UnitGroup { app_id: "56".to_string(), group: "2".to_string(), label: None },
                UnitGroup { app_id: "56".to_string(), group: "3".to_string(), label: None },
            ]
        );
    }

    #[test]
    fn duplicate_groups_keep_the_first_label() {
        let network = json!({
            "Unit": [
                {"Application": {"ApplicationAddress": "56", "Group": {"GroupAddress": "10"}}},
                {"Application": {"ApplicationAddress": "56", "Group": {"GroupAddress": "10", "Label": "Kitchen"}}},
                {"Application": {"ApplicationAddress": "56", "Group": {"GroupAddress": "10", "Label": "Other"}}}
            ]
        });

        let groups = collect_unit_groups(&network, &["56".to_string()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn numeric_ids_are_string_coerced() {
        let network = json!({
            "Unit": {"Application": {"ApplicationAddress": 56, "Group": {"GroupAddress": 10}}}
        });
        let groups = collect_unit_groups(&network, &["56".to_string()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group, "10");
    }
}
