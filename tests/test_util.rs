use dotenv::dotenv;
use lazy_static::lazy_static;
use rand::{Rng, thread_rng};
use sqlx::{Connection, PgConnection, PgPool};
use std::env;
use std::future::Future;
use todo_web::{app_env, db};
use tokio::runtime::Runtime;

lazy_static! {
    static ref TOKIO_RT: Runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Tokio runtime failed to initialize");
}

struct TestDatabase {
    base_url: String,
    template_db_name: String,
}

impl TestDatabase {
    async fn create(base_url: &str) -> Result<Self, sqlx::Error> {
        let schema_id: u32 = thread_rng().gen_range(10_000..99_999);
        let template_db_name = format!("test_db_{}", schema_id);
        let mut conn = PgConnection::connect(base_url).await?;

        sqlx::query("ALTER DATABASE postgres WITH is_template TRUE")
            .execute(&mut conn)
            .await?;
        sqlx::query(format!("CREATE DATABASE {} TEMPLATE postgres", template_db_name).as_str())
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        Ok(Self {
            base_url: String::from(base_url),
            template_db_name,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.template_db_name)
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let db_to_drop = self.template_db_name.clone();
        let conn_str = self.base_url.clone();

        // Runs on a fresh thread so it also works while TOKIO_RT is still driving the test
        let drop_thread = std::thread::spawn(move || {
            TOKIO_RT.block_on(async move {
                let mut conn = match PgConnection::connect(conn_str.as_str()).await {
                    Ok(cxn) => cxn,
                    Err(conn_err) => {
                        println!(
                            "Failed to reconnect to database to drop test database {}, please remove it manually. Error: {}",
                            db_to_drop, conn_err
                        );
                        return;
                    }
                };

                let drop_result =
                    sqlx::query(format!("DROP DATABASE {} WITH (FORCE)", db_to_drop).as_str())
                        .execute(&mut conn)
                        .await;
                if let Err(db_err) = drop_result {
                    println!(
                        "Failed to drop test database {}, please remove it manually. Error: {}",
                        db_to_drop, db_err
                    );
                }
            })
        });
        if drop_thread.join().is_err() {
            println!("Test database cleanup panicked");
        }
    }
}

/// Creates a temp database for a test by using the "postgres" default database's content as a template,
/// applies migrations to it, and hands a pool for it to [test_fn].
///
/// Expects that the TEST_DB_URL environment variable is populated
pub fn prepare_db_and_test<F, R>(test_fn: F)
where
    R: Future<Output = ()>,
    F: FnOnce(PgPool) -> R,
{
    if dotenv().is_err() {
        println!("Test is running without .env file.");
    }

    TOKIO_RT.block_on(async move {
        let pg_connection_base_url = env::var(app_env::test::TEST_DB_URL).unwrap_or_else(|_| {
            panic!(
                "You must provide the {} environment variable as the base postgres connection string",
                app_env::test::TEST_DB_URL
            )
        });
        let test_db = match TestDatabase::create(&pg_connection_base_url).await {
            Ok(tdb) => tdb,
            Err(db_err) => panic!("Failed to start test database: {}", db_err),
        };

        let sqlx_pool = db::connect_sqlx(&test_db.url())
            .await
            .expect("Could not connect to the test database");
        db::run_migrations(&sqlx_pool)
            .await
            .expect("Could not migrate the test database");

        test_fn(sqlx_pool.clone()).await;
        sqlx_pool.close().await;
    });
}
