use docbase::common::{CallContext, SortSpec, Value};
use docbase::data_context::DataContext;
use docbase::errors::DataResult;
use docbase::repository::{Entity, EntityIndex};
use docbase::store::memory::{InMemoryCounterStore, InMemoryDocumentStore};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread; `after` runs even when the test fails.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DataResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DataResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A data context over in-memory stores, with direct access to the
/// stores for seeding data and simulating outages.
#[derive(Clone)]
pub struct TestContext {
    database: String,
    documents: InMemoryDocumentStore,
    counter: InMemoryCounterStore,
    context: DataContext,
}

impl TestContext {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn documents(&self) -> &InMemoryDocumentStore {
        &self.documents
    }

    pub fn counter(&self) -> &InMemoryCounterStore {
        &self.counter
    }

    pub fn context(&self) -> DataContext {
        self.context.clone()
    }

    pub fn call(&self) -> CallContext {
        self.context.call_context()
    }

    /// Opens another data context over the same stores, the way a second
    /// process or a restart would see them.
    pub fn reopen(&self) -> DataResult<TestContext> {
        let context = open_context(&self.documents, &self.counter)?;
        Ok(TestContext {
            database: self.database.clone(),
            documents: self.documents.clone(),
            counter: self.counter.clone(),
            context,
        })
    }
}

pub fn random_database() -> String {
    format!("test_{}", uuid::Uuid::new_v4().simple())
}

pub fn create_test_context() -> DataResult<TestContext> {
    let database = random_database();
    let documents = InMemoryDocumentStore::with_default_database(&database);
    let counter = InMemoryCounterStore::new();
    let context = open_context(&documents, &counter)?;
    Ok(TestContext {
        database,
        documents,
        counter,
        context,
    })
}

fn open_context(
    documents: &InMemoryDocumentStore,
    counter: &InMemoryCounterStore,
) -> DataResult<DataContext> {
    DataContext::builder()
        .document_store(documents.clone())
        .counter_store(counter.clone())
        .default_timeout(Duration::from_secs(5))
        .track::<User>()
        .track::<ApiLog>()
        .open()
}

pub fn cleanup(ctx: TestContext) -> DataResult<()> {
    ctx.documents.set_available(true);
    ctx.counter.set_available(true);
    ctx.documents.drop_database(&ctx.database);
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub age: i32,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub is_deleted: i32,
}

impl User {
    pub fn new(user_name: &str, phone: &str, age: i32) -> Self {
        User {
            user_name: user_name.to_string(),
            phone: phone.to_string(),
            age,
            ..User::default()
        }
    }
}

impl Entity for User {
    fn collection_name() -> &'static str {
        "user"
    }

    fn indexes() -> Vec<EntityIndex> {
        vec![
            EntityIndex::unique(SortSpec::new().asc("phone")),
            EntityIndex::unique(SortSpec::new().asc("user_name")),
            EntityIndex::new(SortSpec::new().desc("created"), false),
        ]
    }

    fn id(&self) -> Value {
        Value::from(self.id)
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn touch_created(&mut self, timestamp: i64) {
        self.created = timestamp;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiLog {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(default)]
    pub uid: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub created: i64,
}

impl ApiLog {
    pub fn new(uid: i64, path: &str, status: i32) -> Self {
        ApiLog {
            uid,
            path: path.to_string(),
            status,
            ..ApiLog::default()
        }
    }
}

impl Entity for ApiLog {
    fn collection_name() -> &'static str {
        "api_log"
    }

    fn indexes() -> Vec<EntityIndex> {
        vec![EntityIndex::new(
            SortSpec::new().desc("uid").desc("created"),
            false,
        )]
    }

    fn id(&self) -> Value {
        Value::from(self.id)
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn touch_created(&mut self, timestamp: i64) {
        self.created = timestamp;
    }
}
