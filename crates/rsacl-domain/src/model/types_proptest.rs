//! Property-based tests for tuple types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Acl, AclSubject};

    /// Strategy for `namespace:object#relation` positions
    fn position_strategy() -> impl Strategy<Value = (String, String, String)> {
        ("[a-z]{1,10}", "[a-z0-9_-]{1,20}", "[a-z]{1,10}")
    }

    proptest! {
        #[test]
        fn test_user_tuple_display_parses_back(
            (ns, obj, rel) in position_strategy(),
            user in "[a-z0-9]{1,16}"
        ) {
            let acl = Acl::user(&ns, &obj, &rel, &user);
            let parsed = Acl::parse(&acl.to_string()).unwrap();
            prop_assert_eq!(parsed.tag(), acl.tag());
            prop_assert_eq!(parsed.subject, acl.subject);
        }

        #[test]
        fn test_userset_subject_is_detected(
            (ns, obj, rel) in position_strategy(),
            (uns, uobj, urel) in position_strategy()
        ) {
            let input = format!("{ns}:{obj}#{rel}@{uns}:{uobj}#{urel}");
            let acl = Acl::parse(&input).unwrap();
            let is_userset = matches!(acl.subject, AclSubject::Userset { .. });
            prop_assert!(is_userset);
            prop_assert_eq!(acl.userset_tag(), Some(format!("{uns}:{uobj}#{urel}")));
        }

        #[test]
        fn test_tuple_without_subject_is_rejected((ns, obj, rel) in position_strategy()) {
            let input = format!("{ns}:{obj}#{rel}");
            prop_assert!(Acl::parse(&input).is_err());
        }
    }
}
