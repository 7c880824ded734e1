use docbase::common::CallContext;
use docbase::doc;
use docbase_int_test::test_util::{cleanup, create_test_context, run_test, ApiLog, User};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_concurrent_allocation_is_unique_and_dense() {
    run_test(
        create_test_context,
        |ctx| {
            let allocator = ctx.context().allocator().clone();
            let num_threads = 8;
            let per_thread = 250;
            let barrier = Arc::new(Barrier::new(num_threads));

            let handles: Vec<_> = (0..num_threads)
                .map(|_| {
                    let allocator = allocator.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let call = CallContext::background();
                        barrier.wait();
                        (0..per_thread)
                            .map(|_| allocator.next_id(&call, "api_log").map(|id| id.value))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let mut all = HashSet::new();
            for handle in handles {
                let ids = handle.join().unwrap()?;
                // each thread sees its own ids in increasing order
                assert!(ids.windows(2).all(|w| w[0] < w[1]));
                all.extend(ids);
            }
            let expected: HashSet<i64> = (1..=(num_threads * per_thread) as i64).collect();
            assert_eq!(all, expected);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_model_creates() {
    run_test(
        create_test_context,
        |ctx| {
            let context = ctx.context();
            let num_threads = 5;
            let per_thread = 20;
            let barrier = Arc::new(Barrier::new(num_threads));

            let handles: Vec<_> = (0..num_threads)
                .map(|thread_id| {
                    let context = context.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let users = context.model::<User>();
                        let call = context.call_context();
                        barrier.wait();
                        for i in 0..per_thread {
                            let name = format!("t{}_{}", thread_id, i);
                            users.create(&call, &mut User::new(&name, &name, 1))?;
                        }
                        Ok::<_, docbase::errors::DataError>(())
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap()?;
            }

            let users = context.model::<User>();
            let call = ctx.call();
            assert_eq!(users.count(&call, &doc! {})?, (num_threads * per_thread) as u64);
            let ids: HashSet<i64> = users
                .get_all_by_map(&call, &doc! {}, None)?
                .into_iter()
                .map(|u| u.id)
                .collect();
            assert_eq!(ids.len(), num_threads * per_thread);
            assert_eq!(ids.iter().max(), Some(&((num_threads * per_thread) as i64)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_mixed_reads_and_writes() {
    run_test(
        create_test_context,
        |ctx| {
            let context = ctx.context();
            let logs = context.model::<ApiLog>();
            let call = ctx.call();
            for uid in 0..10 {
                logs.create(&call, &mut ApiLog::new(uid, "/seed", 200))?;
            }

            let num_threads = 4;
            let barrier = Arc::new(Barrier::new(num_threads));
            let handles: Vec<_> = (0..num_threads)
                .map(|thread_id| {
                    let context = context.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let logs = context.model::<ApiLog>();
                        let call = context.call_context();
                        barrier.wait();
                        for i in 0..25 {
                            if thread_id % 2 == 0 {
                                logs.create(&call, &mut ApiLog::new(i, "/write", 201))?;
                            } else {
                                let page = logs.list(&call, &doc! {}, 1, 5, None)?;
                                assert!(page.len() <= 5);
                            }
                        }
                        Ok::<_, docbase::errors::DataError>(())
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap()?;
            }
            assert_eq!(logs.count(&call, &doc! { path: "/write" })?, 50);
            Ok(())
        },
        cleanup,
    )
}
