use docbase::allocator::IdSource;
use docbase::common::CallContext;
use docbase::doc;
use docbase::errors::ErrorKind;
use docbase_int_test::test_util::{cleanup, create_test_context, run_test, ApiLog, User};
use std::collections::HashSet;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_empty_collection_starts_at_one() {
    run_test(
        create_test_context,
        |ctx| {
            let allocator = ctx.context().allocator().clone();
            let first = allocator.next_id(&ctx.call(), "user")?;
            assert_eq!(first.value, 1);
            assert_eq!(first.source, IdSource::Counter);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_thousand_ids_strictly_increase() {
    run_test(
        create_test_context,
        |ctx| {
            let allocator = ctx.context().allocator().clone();
            let call = ctx.call();
            let mut previous = 0;
            for _ in 0..1000 {
                let id = allocator.next_id(&call, "api_log")?;
                assert!(id.value > previous);
                previous = id.value;
            }
            assert_eq!(previous, 1000);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_restart_resumes_after_stored_maximum() {
    run_test(
        create_test_context,
        |ctx| {
            let users = ctx.context().model::<User>();
            let call = ctx.call();
            for i in 0..5 {
                users.create(&call, &mut User::new(&format!("u{}", i), &i.to_string(), 20))?;
            }
            // a row written by someone else with a higher id
            ctx.context()
                .collection("user")
                .create(&call, &doc! { "_id": 41, user_name: "imported", phone: "x" })?;

            let restarted = ctx.reopen()?;
            let next = restarted.context().allocator().next_id(&restarted.call(), "user")?;
            assert_eq!(next.value, 42);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_two_processes_share_the_counter() {
    run_test(
        create_test_context,
        |ctx| {
            let other = ctx.reopen()?;
            let a = ctx.context().allocator().clone();
            let b = other.context().allocator().clone();
            let call = CallContext::background();

            let mut seen = HashSet::new();
            for _ in 0..50 {
                assert!(seen.insert(a.next_id(&call, "api_log")?.value));
                assert!(seen.insert(b.next_id(&call, "api_log")?.value));
            }
            assert_eq!(seen.len(), 100);
            assert_eq!(seen.iter().max(), Some(&100));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_counter_outage_falls_back_to_local_state() {
    run_test(
        create_test_context,
        |ctx| {
            let logs = ctx.context().model::<ApiLog>();
            let allocator = ctx.context().allocator().clone();
            let call = ctx.call();
            for _ in 0..3 {
                logs.create(&call, &mut ApiLog::new(1, "/", 200))?;
            }

            ctx.counter().set_available(false);
            let fallback = allocator.next_id(&call, "api_log")?;
            assert_eq!(fallback.value, 4);
            assert_eq!(fallback.source, IdSource::LocalFallback);
            assert!(fallback.is_degraded());
            assert_eq!(allocator.degraded_allocations(), 1);

            // writes keep working during the outage
            let id = logs.create(&call, &mut ApiLog::new(1, "/", 200))?;
            assert_eq!(id.as_i64(), Some(5));
            assert_eq!(allocator.degraded_allocations(), 2);

            // the counter never saw the fallback values
            ctx.counter().set_available(true);
            let recovered = allocator.next_id(&call, "api_log")?;
            assert_eq!(recovered.source, IdSource::Counter);
            assert_eq!(recovered.value, 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cancelled_call_does_not_fall_back() {
    run_test(
        create_test_context,
        |ctx| {
            let allocator = ctx.context().allocator().clone();
            let call = CallContext::background();
            call.cancel();
            let err = allocator.next_id(&call, "user").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Cancelled);
            assert_eq!(allocator.degraded_allocations(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_untracked_collection_is_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let allocator = ctx.context().allocator().clone();
            let err = allocator.next_id(&ctx.call(), "order").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
            assert_eq!(
                allocator.tracked_collections(),
                vec!["api_log".to_string(), "user".to_string()]
            );
            Ok(())
        },
        cleanup,
    )
}
