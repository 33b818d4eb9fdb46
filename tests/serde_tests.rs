#![cfg(feature = "serde")]
//! Serde round-trip tests for `TreeMap`.

use evergreen::persistent::TreeMap;
use rstest::rstest;

#[rstest]
fn test_serialize_in_key_order() {
    let map = TreeMap::new()
        .insert(3, "three".to_string())
        .insert(1, "one".to_string())
        .insert(2, "two".to_string());

    let rendered = serde_json::to_string(&map).unwrap();
    assert_eq!(rendered, r#"{"1":"one","2":"two","3":"three"}"#);
}

#[rstest]
fn test_round_trip() {
    let map: TreeMap<i32, Vec<String>> = (0..20)
        .map(|key| (key, vec![key.to_string(), (key * 2).to_string()]))
        .collect();

    let rendered = serde_json::to_string(&map).unwrap();
    let decoded: TreeMap<i32, Vec<String>> = serde_json::from_str(&rendered).unwrap();
    assert_eq!(decoded, map);
}

#[rstest]
fn test_deserialize_empty() {
    let decoded: TreeMap<i32, i32> = serde_json::from_str("{}").unwrap();
    assert!(decoded.is_empty());
}
