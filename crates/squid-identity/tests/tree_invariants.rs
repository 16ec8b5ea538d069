//! Property tests: arbitrary creation sequences never break the tree.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use squid_core::{IdentityId, IdentityType};
use squid_identity::{
    IdentityConfig, IdentityError, IdentityStore, MemoryIdentityRepository, RootAttributes,
    SubIdentityAttributes,
};
use squid_testkit::{strategies::arb_child_type, ControllableClock};
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn store(max_depth: u8) -> IdentityStore {
    IdentityStore::new(
        Arc::new(MemoryIdentityRepository::new()),
        Arc::new(ControllableClock::default()),
        IdentityConfig { max_depth },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn creation_sequences_preserve_invariants(
        max_depth in 1u8..=4,
        ops in prop::collection::vec((any::<prop::sample::Index>(), arb_child_type()), 1..40),
    ) {
        runtime().block_on(async {
            let store = store(max_depth);
            let root = store.bootstrap_root(RootAttributes::named("root")).await.unwrap();
            let mut known: Vec<IdentityId> = vec![root.did.clone()];

            for (pick, child_type) in ops {
                let parent = known[pick.index(known.len())].clone();
                let before = store.get_tree(&root.did).await.unwrap();

                match store
                    .create_sub_identity(&parent, child_type, SubIdentityAttributes::named("n"))
                    .await
                {
                    Ok(child) => {
                        prop_assert!(child.depth <= max_depth);
                        prop_assert_eq!(child.root_id.clone(), root.did.clone());
                        known.push(child.did);
                    }
                    Err(IdentityError::Validation(_)) => {
                        let after = store.get_tree(&root.did).await.unwrap();
                        prop_assert_eq!(before, after);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            let tree = store.get_tree(&root.did).await.unwrap();
            prop_assert_eq!(tree.len(), known.len());
            prop_assert!(tree.max_depth() <= max_depth);
            let violations = tree.invariant_violations();
            prop_assert!(violations.is_empty(), "{violations:?}");
            Ok(())
        })?;
    }

    #[test]
    fn leaf_types_never_gain_children(child_type in arb_child_type()) {
        runtime().block_on(async {
            let store = store(3);
            let root = store.bootstrap_root(RootAttributes::named("root")).await.unwrap();
            for leaf_type in [IdentityType::Aid, IdentityType::Consentida] {
                let leaf = store
                    .create_sub_identity(&root.did, leaf_type, SubIdentityAttributes::named("leaf"))
                    .await
                    .unwrap();
                let result = store
                    .create_sub_identity(&leaf.did, child_type, SubIdentityAttributes::named("x"))
                    .await;
                prop_assert!(result.is_err());
                prop_assert!(store.get(&leaf.did).await.unwrap().children.is_empty());
            }
            Ok(())
        })?;
    }
}
