//! Partial-update application
//!
//! `apply` turns a base field map and a set of directives into the next field
//! map. It is pure: the base is only read and the result is a fresh map, so a
//! snapshot handed to other readers is never disturbed.

use timetravel_core::{Directive, Directives, Fields};

/// Apply `directives` to `base`, returning the new field map
///
/// - `Set(v)` inserts or replaces the field
/// - `Delete` removes the field; deleting a missing field is a no-op
/// - fields without a directive are carried over unchanged
pub fn apply(base: &Fields, directives: &Directives) -> Fields {
    let mut next = base.clone();
    for (key, directive) in directives.iter() {
        match directive {
            Directive::Set(value) => {
                next.insert(key.to_string(), value.to_string());
            }
            Directive::Delete => {
                next.remove(key);
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_partial_update() {
        let base = fields(&[("a", "1"), ("b", "2")]);
        let directives = Directives::new().delete("a").set("c", "3");

        let next = apply(&base, &directives);
        assert_eq!(next, fields(&[("b", "2"), ("c", "3")]));
        assert_eq!(base, fields(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let base = fields(&[("a", "1")]);
        let next = apply(&base, &Directives::new().delete("zzz"));
        assert_eq!(next, base);
    }

    #[test]
    fn test_set_overwrites() {
        let base = fields(&[("hello", "x")]);
        let next = apply(&base, &Directives::new().set("hello", "z"));
        assert_eq!(next, fields(&[("hello", "z")]));
    }

    #[test]
    fn test_set_empty_string_keeps_key() {
        let base = fields(&[("a", "1")]);
        let next = apply(&base, &Directives::new().set("a", ""));
        assert_eq!(next.get("a").map(String::as_str), Some(""));
    }

    #[test]
    fn test_empty_directives_copy_base() {
        let base = fields(&[("a", "1")]);
        let mut next = apply(&base, &Directives::new());
        assert_eq!(next, base);

        next.insert("b".to_string(), "2".to_string());
        assert!(!base.contains_key("b"));
    }

    fn arb_fields() -> impl Strategy<Value = Fields> {
        prop::collection::btree_map("[a-e]", "[a-z0-9]{0,4}", 0..6)
    }

    fn arb_directives() -> impl Strategy<Value = Directives> {
        prop::collection::btree_map("[a-h]", prop::option::of("[a-z0-9]{0,4}"), 0..6)
            .prop_map(Directives::from)
    }

    proptest! {
        #[test]
        fn prop_directive_keys_follow_directive(base in arb_fields(), directives in arb_directives()) {
            let next = apply(&base, &directives);
            for (key, directive) in directives.iter() {
                match directive {
                    Directive::Set(value) => prop_assert_eq!(next.get(key).map(String::as_str), Some(value)),
                    Directive::Delete => prop_assert!(!next.contains_key(key)),
                }
            }
        }

        #[test]
        fn prop_other_keys_untouched(base in arb_fields(), directives in arb_directives()) {
            let next = apply(&base, &directives);
            for (key, value) in &base {
                if directives.get(key).is_none() {
                    prop_assert_eq!(next.get(key), Some(value));
                }
            }
            for key in next.keys() {
                prop_assert!(base.contains_key(key) || directives.get(key).is_some());
            }
        }

        #[test]
        fn prop_apply_is_idempotent(base in arb_fields(), directives in arb_directives()) {
            let once = apply(&base, &directives);
            let twice = apply(&once, &directives);
            prop_assert_eq!(once, twice);
        }
    }
}
