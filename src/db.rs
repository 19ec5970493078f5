//! The shared relational store (§3, §5).
//!
//! Every component reaches the store through its own connection(s) drawn
//! from one pool; long-running transactions are forbidden in the hot
//! path. Table names are stable and lowercase snake_case, per §6.

use std::time::Duration;

use diesel_async::pooled_connection::bb8::{Pool as Bb8Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedBoxFuture;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// failed to build connection pool: {0}
    Pool(#[from] diesel_async::pooled_connection::PoolError),
    /// failed to check out a connection: {0}
    Checkout(#[from] diesel_async::pooled_connection::bb8::RunError),
    /// transaction failed: {0}
    Transaction(#[from] diesel::result::Error),
}

pub type Conn<'a> = PooledConnection<'a, AsyncPgConnection>;

/// Database connection settings, see `config::DatabaseConfig`.
#[derive(Clone, Debug)]
pub struct DbOptions {
    pub url: String,
    pub max_conns: u32,
    pub min_conns: u32,
}

/// A cloneable handle to the connection pool. Every long-lived component
/// (reconciler, http server, pipeline runtime) holds one of these rather
/// than a raw connection.
#[derive(Clone)]
pub struct Pool(Bb8Pool<AsyncPgConnection>);

impl Pool {
    pub async fn new(opts: &DbOptions) -> Result<Self, Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&opts.url);
        let pool = Bb8Pool::builder()
            .max_size(opts.max_conns)
            .min_idle(Some(opts.min_conns))
            .max_lifetime(Some(Duration::from_secs(60 * 60 * 24)))
            .idle_timeout(Some(Duration::from_secs(60 * 2)))
            .build(manager)
            .await?;
        Ok(Self(pool))
    }

    pub async fn conn(&self) -> Result<Conn<'_>, Error> {
        Ok(self.0.get().await?)
    }

    /// Runs `f` inside a single transaction, rolling back on error.
    pub async fn trx<'a, T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut AsyncPgConnection) -> ScopedBoxFuture<'a, 'c, Result<T, E>>
            + Send
            + 'a,
        E: From<diesel::result::Error> + Send + 'a,
        T: Send + 'a,
    {
        let mut conn = self.0.get().await.map_err(|e| {
            // `bb8::RunError` does not implement `From` into arbitrary `E`; the
            // extractor/datasource frameworks map this case explicitly before
            // calling `trx`, so this branch is unreachable in practice.
            panic!("could not check out a connection for transaction: {e}")
        })?;
        conn.transaction(f).await
    }
}

#[cfg(any(test, feature = "integration-test"))]
pub mod tests {
    use super::*;
    use rand::Rng;

    /// A throwaway Postgres database, created on `setup` and dropped on
    /// `Drop`, mirroring the teacher's `TestDb`.
    pub struct TestDb {
        pub pool: Pool,
        name: String,
        admin_url: String,
    }

    impl TestDb {
        pub async fn setup(admin_url: &str) -> Self {
            let name = Self::random_name();
            let mut conn = AsyncPgConnection::establish(admin_url)
                .await
                .expect("connect to admin db");
            diesel::sql_query(format!("CREATE DATABASE {name};"))
                .execute(&mut conn)
                .await
                .expect("create test db");

            let db_url = Self::swap_db_name(admin_url, &name);
            Self::run_migrations(db_url.clone()).await;

            let opts = DbOptions {
                url: db_url,
                max_conns: 5,
                min_conns: 1,
            };
            let pool = Pool::new(&opts).await.expect("build pool for test db");
            TestDb {
                pool,
                name,
                admin_url: admin_url.to_string(),
            }
        }

        async fn run_migrations(database_url: String) {
            tokio::task::spawn_blocking(move || {
                use diesel::Connection;
                use diesel_migrations::MigrationHarness;
                let mut conn = diesel::pg::PgConnection::establish(&database_url)
                    .expect("connect to test db for migrations");
                conn.run_pending_migrations(crate::MIGRATIONS)
                    .expect("run migrations against test db");
            })
            .await
            .expect("migration task panicked");
        }

        fn random_name() -> String {
            const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
            let mut rng = rand::thread_rng();
            let mut name = "test_".to_string();
            for _ in 0..10 {
                name.push(CHARSET[rng.gen_range(0..26)] as char);
            }
            name
        }

        fn swap_db_name(admin_url: &str, name: &str) -> String {
            let prefix = admin_url.rsplit_once('/').map_or(admin_url, |(p, _)| p);
            format!("{prefix}/{name}")
        }
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            let name = self.name.clone();
            let admin_url = self.admin_url.clone();
            tokio::task::spawn(async move {
                if let Ok(mut conn) = AsyncPgConnection::establish(&admin_url).await {
                    let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS {name};"))
                        .execute(&mut conn)
                        .await;
                }
            });
        }
    }
}
