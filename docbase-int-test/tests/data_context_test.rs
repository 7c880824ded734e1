use docbase::collection::CollectionKey;
use docbase::config::{DataConfig, DataSettings};
use docbase::data_context::DataContext;
use docbase::doc;
use docbase::errors::ErrorKind;
use docbase::store::memory::{InMemoryCounterStore, InMemoryDocumentStore};
use docbase::store::CounterStoreProvider;
use docbase_int_test::test_util::{cleanup, create_test_context, run_test, User};
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_open_from_json_config() {
    let config = DataConfig::from_json(
        r#"{
            "document_store": {"uri": "memory://", "default_database": "app"},
            "id_key_prefix": "seq:"
        }"#,
    )
    .unwrap();
    let context = DataContext::builder()
        .config(config)
        .track::<User>()
        .open()
        .unwrap();

    assert_eq!(context.document_store().default_database(), "app");
    assert_eq!(context.allocator().counter_key("user"), "seq:user");
    assert_eq!(context.config().settings(), {
        let mut expected = DataSettings::default();
        expected.document_store.default_database = "app".into();
        expected.id_key_prefix = "seq:".into();
        expected
    });
}

#[test]
fn test_counter_key_layout_in_counter_store() {
    let documents = InMemoryDocumentStore::new();
    let counter = InMemoryCounterStore::new();
    let context = DataContext::builder()
        .document_store(documents)
        .counter_store(counter.clone())
        .track_collection(CollectionKey::new("", "invoice"))
        .open()
        .unwrap();

    let call = context.call_context();
    context.allocator().next_id(&call, "invoice").unwrap();
    context.allocator().next_id(&call, "invoice").unwrap();

    assert_eq!(counter.get(&call, "auto_id:invoice").unwrap(), Some(2));
}

#[test]
fn test_unreachable_stores_fail_startup() {
    let documents = InMemoryDocumentStore::new();
    documents.set_available(false);
    let err = DataContext::builder()
        .document_store(documents)
        .counter_store(InMemoryCounterStore::new())
        .open()
        .err()
        .unwrap();
    assert_eq!(err.kind(), &ErrorKind::ConnectionError);

    let counter = InMemoryCounterStore::new();
    counter.set_available(false);
    let err = DataContext::builder()
        .document_store(InMemoryDocumentStore::new())
        .counter_store(counter)
        .open()
        .err()
        .unwrap();
    assert_eq!(err.kind(), &ErrorKind::ConnectionError);
}

#[test]
fn test_invalid_settings_fail_startup() {
    let err = DataContext::builder()
        .default_timeout(Duration::ZERO)
        .open()
        .err()
        .unwrap();
    assert_eq!(err.kind(), &ErrorKind::ConfigError);
}

#[test]
fn test_clones_share_state() {
    run_test(
        create_test_context,
        |ctx| {
            let a = ctx.context();
            let b = a.clone();
            let call = ctx.call();
            a.collection("event").create(&call, &doc! { kind: "x" })?;
            assert_eq!(b.collection("event").count(&call, &doc! {})?, 1);
            assert_eq!(a.allocator().next_id(&call, "user")?.value, 1);
            assert_eq!(b.allocator().next_id(&call, "user")?.value, 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_accessor_for_explicit_database() {
    run_test(
        create_test_context,
        |ctx| {
            let context = ctx.context();
            let call = ctx.call();
            let archive = context.accessor(CollectionKey::new("archive", "event"));
            archive.create(&call, &doc! { kind: "old" })?;
            assert_eq!(archive.count(&call, &doc! {})?, 1);
            assert_eq!(context.collection("event").count(&call, &doc! {})?, 0);
            assert_eq!(ctx.documents().collection_names("archive"), vec!["event"]);
            Ok(())
        },
        cleanup,
    )
}
