use docbase::collection::Document;
use docbase::doc;
use docbase::errors::ErrorKind;
use docbase::pipeline::parse_pipeline;
use docbase_int_test::test_util::{cleanup, create_test_context, run_test, ApiLog, TestContext};
use serde::Deserialize;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn seed_logs(ctx: &TestContext) {
    let logs = ctx.context().model::<ApiLog>();
    let call = ctx.call();
    let entries = [
        (1, "/login", 200),
        (1, "/orders", 200),
        (1, "/orders", 500),
        (2, "/login", 200),
        (3, "/login", 401),
        (3, "/orders", 200),
    ];
    for (uid, path, status) in entries {
        logs.create(&call, &mut ApiLog::new(uid, path, status)).unwrap();
    }
}

#[derive(Debug, Deserialize)]
struct UidCount {
    #[serde(rename = "_id")]
    uid: i64,
    count: i64,
}

#[test]
fn test_group_and_sort_by_count() {
    run_test(
        create_test_context,
        |ctx| {
            seed_logs(&ctx);
            let logs = ctx.context().collection("api_log");
            let rows: Vec<UidCount> = logs.aggregate(
                &ctx.call(),
                r#"[
                    {"$group": {"_id": "$uid", "count": {"$sum": 1}}},
                    {"$sort": {"count": -1, "_id": 1}}
                ]"#,
            )?;
            let summary: Vec<(i64, i64)> = rows.iter().map(|r| (r.uid, r.count)).collect();
            assert_eq!(summary, vec![(1, 3), (3, 2), (2, 1)]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_single_stage_text() {
    run_test(
        create_test_context,
        |ctx| {
            seed_logs(&ctx);
            let logs = ctx.context().collection("api_log");

            #[derive(Deserialize)]
            struct Total {
                n: i64,
            }
            let totals: Vec<Total> = logs.aggregate(&ctx.call(), r#"{"$count": "n"}"#)?;
            assert_eq!(totals.len(), 1);
            assert_eq!(totals[0].n, 6);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_match_project_limit_keep_stage_order() {
    run_test(
        create_test_context,
        |ctx| {
            seed_logs(&ctx);
            let logs = ctx.context().collection("api_log");
            let rows: Vec<Document> = logs.aggregate(
                &ctx.call(),
                r#"[
                    {"$match": {"path": "/login"}},
                    {"$sort": {"uid": -1}},
                    {"$limit": 2},
                    {"$project": {"_id": 0, "uid": 1, "status": 1}}
                ]"#,
            )?;
            assert_eq!(rows, vec![doc! { uid: 3, status: 401 }, doc! { uid: 2, status: 200 }]);

            // limit before match changes the result
            let rows: Vec<Document> = logs.aggregate(
                &ctx.call(),
                r#"[{"$limit": 2}, {"$match": {"path": "/login"}}]"#,
            )?;
            assert_eq!(rows.len(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_malformed_text_is_parse_error() {
    run_test(
        create_test_context,
        |ctx| {
            let logs = ctx.context().collection("api_log");
            let err = logs
                .aggregate::<Document>(&ctx.call(), r#"[{"$match": {}}"#)
                .unwrap_err();
            assert!(err.is_parse_error());

            let err = logs
                .aggregate::<Document>(&ctx.call(), "not a pipeline")
                .unwrap_err();
            assert!(err.is_parse_error());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_unknown_stage_is_execution_error() {
    run_test(
        create_test_context,
        |ctx| {
            seed_logs(&ctx);
            let logs = ctx.context().collection("api_log");
            let err = logs
                .aggregate::<Document>(&ctx.call(), r#"[{"$bogus": {}}]"#)
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ExecutionError);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_parsed_pipeline_preserves_key_order() {
    run_test(
        create_test_context,
        |_ctx| {
            let pipeline = parse_pipeline(r#"[{"$sort": {"b": 1, "a": -1}}, {"$skip": 5}]"#)?;
            assert_eq!(pipeline.len(), 2);
            let sort = pipeline.stages()[0]
                .get("$sort")
                .and_then(|v| v.as_document())
                .cloned()
                .unwrap_or_default();
            let keys: Vec<&String> = sort.keys().collect();
            assert_eq!(keys, vec!["b", "a"]);
            Ok(())
        },
        cleanup,
    )
}
