use docbase::collection::CollectionKey;
use docbase_int_test::test_util::{cleanup, create_test_context, run_test};
use std::sync::{Arc, Barrier};
use std::thread;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_resolve_returns_cached_handle() {
    run_test(
        create_test_context,
        |ctx| {
            let registry = ctx.context().registry().clone();
            let before = ctx.documents().collection_requests();

            let key = CollectionKey::new("shop", "order");
            let first = registry.resolve(&key);
            let second = registry.resolve(&CollectionKey::new("shop", "order"));
            assert!(first.ptr_eq(&second));
            assert_eq!(ctx.documents().collection_requests(), before + 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_default_database_shares_handle_with_explicit_name() {
    run_test(
        create_test_context,
        |ctx| {
            let registry = ctx.context().registry().clone();
            let implicit = registry.resolve(&CollectionKey::new("", "event"));
            let explicit = registry.resolve(&CollectionKey::new(ctx.database(), "event"));
            assert!(implicit.ptr_eq(&explicit));
            assert_eq!(implicit.database(), ctx.database());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_distinct_keys_get_distinct_handles() {
    run_test(
        create_test_context,
        |ctx| {
            let registry = ctx.context().registry().clone();
            let a = registry.resolve(&CollectionKey::new("a", "user"));
            let b = registry.resolve(&CollectionKey::new("b", "user"));
            let c = registry.resolve(&CollectionKey::new("a", "order"));
            assert!(!a.ptr_eq(&b));
            assert!(!a.ptr_eq(&c));
            assert!(registry.contains(&CollectionKey::new("b", "user")));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_first_resolution_creates_one_handle() {
    run_test(
        create_test_context,
        |ctx| {
            let registry = ctx.context().registry().clone();
            let before = ctx.documents().collection_requests();
            let num_threads = 12;
            let barrier = Arc::new(Barrier::new(num_threads));

            let handles: Vec<_> = (0..num_threads)
                .map(|_| {
                    let registry = registry.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        registry.resolve(&CollectionKey::new("race", "counter"))
                    })
                })
                .collect();

            let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            for handle in &resolved[1..] {
                assert!(resolved[0].ptr_eq(handle));
            }
            assert_eq!(ctx.documents().collection_requests(), before + 1);
            Ok(())
        },
        cleanup,
    )
}
