//! Namespace specificity rules.

use beacon_core::{ConfigValue, Delta, NamespaceResolver, Snapshot};
use rstest::rstest;

fn layered() -> Vec<Delta> {
    vec![
        Delta::new("timeout", 1, "global"),
        Delta::new("a:timeout", 2, "a"),
        Delta::new("a.b:timeout", 3, "a.b"),
    ]
}

#[rstest]
#[case("a.b.c", "a.b")]
#[case("a.b", "a.b")]
#[case("a", "a")]
#[case("a.x", "a")]
#[case("z", "global")]
#[case("", "global")]
#[case("ab", "global")]
fn most_specific_namespace_wins(#[case] client: &str, #[case] expected: &str) {
    let snapshot = Snapshot::build(client, &layered());
    assert_eq!(snapshot.get("timeout"), Some(&ConfigValue::from(expected)));
}

#[test]
fn winner_does_not_depend_on_entry_order() {
    let mut reversed = layered();
    reversed.reverse();
    let snapshot = Snapshot::build("a.b.c", &reversed);
    assert_eq!(snapshot.raw("timeout").map(|r| r.namespace.as_str()), Some("a.b"));
}

#[test]
fn scoped_only_key_is_absent_for_other_namespaces() {
    let entries = vec![Delta::new("billing:rate", 1, 5i64)];
    assert_eq!(Snapshot::build("search", &entries).get("rate"), None);
    assert_eq!(
        Snapshot::build("billing.eu", &entries).get("rate"),
        Some(&ConfigValue::Int(5))
    );
}

#[test]
fn raw_exposes_type_and_version() {
    let resolver = NamespaceResolver::new("a.b.c");
    resolver.rebuild(&layered());
    let raw = resolver.raw("timeout").expect("resolved");
    assert_eq!(raw.entry.version, 3);
    assert_eq!(raw.entry.key, "a.b:timeout");
    assert_eq!(raw.entry.value_type().as_str(), "string");
}
