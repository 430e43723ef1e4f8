use ipgre::utils::json_ext::{deep_merge, get_by_path, has_structure, set_by_path, JsonValueExt, MergeStrategy};
use serde_json::json;

#[test]
fn deep_merge_recurses_into_nested_objects() {
    let left = json!({"a": 1, "b": {"x": 10}});
    let right = json!({"b": {"y": 20}, "c": 3});

    let merged = deep_merge(&left, &right, MergeStrategy::DeepMerge).unwrap();
    assert_eq!(merged, json!({"a": 1, "b": {"x": 10, "y": 20}, "c": 3}));
}

#[test]
fn deep_merge_fail_on_conflict_reports_path() {
    let left = json!({"a": {"b": 1}});
    let right = json!({"a": {"b": "one"}});

    let err = deep_merge(&left, &right, MergeStrategy::FailOnConflict).unwrap_err();
    assert!(matches!(err, ipgre::utils::json_ext::JsonError::MergeConflict { path, .. } if path == "a.b"));
}

#[test]
fn deep_merge_array_strategies() {
    let left = json!([1, 2]);
    let right = json!([3, 4]);

    assert_eq!(deep_merge(&left, &right, MergeStrategy::PreferLeft).unwrap(), json!([1, 2]));
    assert_eq!(deep_merge(&left, &right, MergeStrategy::PreferRight).unwrap(), json!([3, 4]));
    assert_eq!(deep_merge(&left, &right, MergeStrategy::DeepMerge).unwrap(), json!([1, 2, 3, 4]));
}

#[test]
fn path_accessors_navigate_objects_and_arrays() {
    let data = json!({"user": {"profile": {"name": "Alice"}}, "tags": ["a", "b"]});
    assert_eq!(get_by_path(&data, "user.profile.name"), Some(&json!("Alice")));
    assert_eq!(get_by_path(&data, "tags.1"), Some(&json!("b")));
    assert_eq!(get_by_path(&data, "user.missing"), None);
}

#[test]
fn set_by_path_creates_intermediate_objects() {
    let mut data = json!({});
    set_by_path(&mut data, "user.profile.name", json!("Alice")).unwrap();
    assert_eq!(data, json!({"user": {"profile": {"name": "Alice"}}}));
}

#[test]
fn has_structure_checks_all_expected_keys_present() {
    let data = json!({"name": "Alice", "age": 30, "email": "alice@example.com"});
    assert!(has_structure(&data, &["name", "email"]));
    assert!(!has_structure(&data, &["name", "phone"]));
    assert!(!has_structure(&json!([1, 2, 3]), &["name"]));
}

#[test]
fn json_value_ext_helpers() {
    let data = json!({"a": 1, "b": 2});
    assert_eq!(data.element_count(), 2);
    assert!(!data.is_empty_container());
    assert!(json!({}).is_empty_container());

    let mut keys = data.keys();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

    let fallback = json!("default");
    assert_eq!(data.get_path_or("missing", &fallback), &fallback);
}
