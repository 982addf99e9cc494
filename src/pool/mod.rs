//! Bounded SQLite connection pool with lease/return semantics
//!
//! The pool is the admission-control point for the structured data store:
//! `acquire` blocks up to a timeout when every connection is leased, then
//! fails with a retryable [`ChunavError::PoolExhausted`]. Idle connections
//! past a configured age are retired and replaced rather than reused.

use crate::config::PoolConfig;
use crate::error::{ChunavError, Result};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A pooled connection wrapper with lease bookkeeping
struct PooledConnection {
    id: u64,
    conn: Connection,
    idle_since: Instant,
    lease_count: u64,
}

struct PoolState {
    idle: Vec<PooledConnection>,
    leased: usize,
    total_leases: u64,
    retired: u64,
    next_id: u64,
}

struct PoolInner {
    db_path: PathBuf,
    size: usize,
    acquire_timeout: Duration,
    max_idle: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Bounded connection pool for the election data store
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

/// RAII lease over a pooled connection; returns it on drop
pub struct PoolGuard {
    conn: Option<PooledConnection>,
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool and open all connections up front
    pub fn new(db_path: &Path, config: &PoolConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ChunavError::Io {
                    source: e,
                    context: format!("Failed to create database directory: {:?}", parent),
                })?;
            }
        }

        let inner = Arc::new(PoolInner {
            db_path: db_path.to_path_buf(),
            size: config.size,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            max_idle: Duration::from_secs(config.max_idle_secs),
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.size),
                leased: 0,
                total_leases: 0,
                retired: 0,
                next_id: 0,
            }),
            available: Condvar::new(),
        });

        {
            let mut state = inner.state.lock().unwrap();
            for _ in 0..config.size {
                let id = state.next_id;
                state.next_id += 1;
                let conn = open_connection(&inner.db_path)?;
                state.idle.push(PooledConnection {
                    id,
                    conn,
                    idle_since: Instant::now(),
                    lease_count: 0,
                });
            }
        }

        tracing::info!(
            "Connection pool initialized: size={}, timeout={:?}, max_idle={:?}",
            config.size,
            inner.acquire_timeout,
            inner.max_idle
        );

        Ok(Self { inner })
    }

    /// Acquire a connection, blocking up to the configured timeout
    pub fn acquire(&self) -> Result<PoolGuard> {
        self.acquire_timeout(self.inner.acquire_timeout)
    }

    /// Acquire with an explicit timeout
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PoolGuard> {
        let deadline = Instant::now() + timeout;
        let start = Instant::now();

        let mut state = self.inner.state.lock().unwrap();

        loop {
            if let Some(mut pooled) = state.idle.pop() {
                // Retire connections idle past their age bound instead of
                // reusing them silently. The replacement is opened before the
                // old connection goes away; if the open fails the old one is
                // still valid and is leased out so the pool keeps its size.
                if pooled.idle_since.elapsed() > self.inner.max_idle {
                    match open_connection(&self.inner.db_path) {
                        Ok(conn) => {
                            let old_id = pooled.id;
                            let id = state.next_id;
                            state.next_id += 1;
                            state.retired += 1;
                            tracing::debug!("Retired idle connection {} -> {}", old_id, id);
                            pooled = PooledConnection {
                                id,
                                conn,
                                idle_since: Instant::now(),
                                lease_count: 0,
                            };
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Replacement for idle connection {} failed, reusing it: {}",
                                pooled.id,
                                e
                            );
                        }
                    }
                }

                pooled.lease_count += 1;
                state.leased += 1;
                state.total_leases += 1;

                return Ok(PoolGuard {
                    conn: Some(pooled),
                    inner: Arc::clone(&self.inner),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChunavError::PoolExhausted {
                    waited: start.elapsed(),
                    size: self.inner.size,
                });
            }

            let (guard, wait_result) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;

            if wait_result.timed_out() && state.idle.is_empty() {
                return Err(ChunavError::PoolExhausted {
                    waited: start.elapsed(),
                    size: self.inner.size,
                });
            }
        }
    }

    /// Pool utilization snapshot for observability
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().unwrap();
        PoolStats {
            size: self.inner.size,
            active: state.leased,
            idle: state.idle.len(),
            total_leases: state.total_leases,
            retired: state.retired,
        }
    }
}

impl Deref for PoolGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn.as_ref().expect("connection present until drop").conn
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn.as_mut().expect("connection present until drop").conn
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(mut pooled) = self.conn.take() {
            pooled.idle_since = Instant::now();

            let mut state = match self.inner.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.leased = state.leased.saturating_sub(1);
            state.idle.push(pooled);
            drop(state);

            self.inner.available.notify_one();
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub active: usize,
    pub idle: usize,
    pub total_leases: u64,
    pub retired: u64,
}

/// Open a SQLite connection with WAL mode and read-path optimizations
fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        ",
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_pool(size: usize, timeout_ms: u64) -> (ConnectionPool, TempDir) {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");
        let pool = ConnectionPool::new(
            &db_path,
            &PoolConfig {
                size,
                acquire_timeout_ms: timeout_ms,
                max_idle_secs: 300,
            },
        )
        .unwrap();
        (pool, temp)
    }

    #[test]
    fn test_acquire_and_release() {
        let (pool, _temp) = test_pool(2, 1000);

        {
            let conn = pool.acquire().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
            assert_eq!(pool.stats().active, 1);
        }

        assert_eq!(pool.stats().active, 0);
        assert_eq!(pool.stats().idle, 2);
        assert_eq!(pool.stats().total_leases, 1);
    }

    #[test]
    fn test_pool_never_exceeds_size() {
        let (pool, _temp) = test_pool(3, 100);

        let g1 = pool.acquire().unwrap();
        let g2 = pool.acquire().unwrap();
        let g3 = pool.acquire().unwrap();

        assert_eq!(pool.stats().active, 3);

        let result = pool.acquire_timeout(Duration::from_millis(50));
        assert!(matches!(result, Err(ChunavError::PoolExhausted { .. })));

        drop(g1);
        drop(g2);
        drop(g3);
        assert_eq!(pool.stats().idle, 3);
    }

    #[test]
    fn test_exhausted_acquire_fails_within_timeout() {
        let (pool, _temp) = test_pool(1, 100);

        let _held = pool.acquire().unwrap();

        let start = Instant::now();
        let result = pool.acquire_timeout(Duration::from_millis(100));
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(ChunavError::PoolExhausted { .. })));
        // Small scheduling slack allowed.
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_release_unblocks_waiter() {
        let (pool, _temp) = test_pool(1, 2000);
        let pool = std::sync::Arc::new(pool);

        let guard = pool.acquire().unwrap();

        let pool2 = std::sync::Arc::clone(&pool);
        let handle = std::thread::spawn(move || pool2.acquire_timeout(Duration::from_millis(1000)));

        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        let result = handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_idle_connection_retired() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");
        let pool = ConnectionPool::new(
            &db_path,
            &PoolConfig {
                size: 1,
                acquire_timeout_ms: 1000,
                max_idle_secs: 0,
            },
        )
        .unwrap();

        // max_idle of zero forces retirement on every acquire.
        std::thread::sleep(Duration::from_millis(10));
        let _conn = pool.acquire().unwrap();
        assert_eq!(pool.stats().retired, 1);
    }

    #[test]
    fn test_failed_retirement_keeps_pool_size() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("db");
        std::fs::create_dir(&dir).unwrap();
        let pool = ConnectionPool::new(
            &dir.join("test.db"),
            &PoolConfig {
                size: 1,
                acquire_timeout_ms: 1000,
                max_idle_secs: 0,
            },
        )
        .unwrap();

        // Removing the database directory makes every replacement open
        // fail; the aged connection must be reused, not lost.
        std::fs::remove_dir_all(&dir).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        {
            let conn = pool.acquire().unwrap();
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
            assert_eq!(one, 1);
        }

        let stats = pool.stats();
        assert_eq!(stats.retired, 0);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.size, 1);
    }
}
