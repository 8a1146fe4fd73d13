//! Redis 连接池管理
//!
//! 借出/归还式连接池：信号量限制并发借出数，空闲列表保证每个连接同一时刻只被一个调用方持有

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use kvlab_errors::{AppError, AppResult};
use parking_lot::Mutex;
use redis::Client;
use redis::aio::ConnectionManager;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::error::map_redis_error;

/// 连接池状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// 总连接数
    pub total_connections: usize,
    /// 已借出的连接数
    pub active_connections: usize,
    /// 空闲连接数
    pub idle_connections: usize,
    /// 是否已关闭
    pub closed: bool,
}

struct PoolInner {
    idle: Mutex<Vec<ConnectionManager>>,
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    closed: AtomicBool,
    size: usize,
}

impl PoolInner {
    fn checkin(&self, conn: ConnectionManager) {
        if !self.closed.load(Ordering::SeqCst) {
            self.idle.lock().push(conn);
        }
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Redis 连接池
pub struct RedisPool {
    client: Client,
    inner: Arc<PoolInner>,
    config: RedisConfig,
}

impl RedisPool {
    /// 创建新的连接池，立即建立 `pool_size` 个连接
    pub async fn new(config: RedisConfig) -> AppResult<Self> {
        let pool_size = config.pool_size.max(1) as usize;

        let client = Client::open(config.connection_info())
            .map_err(|e| AppError::config(format!("Invalid Redis connection info: {}", e)))?;

        let mut connections = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let conn = ConnectionManager::new(client.clone())
                .await
                .map_err(|e| map_redis_error(&format!("connect #{}", i), e))?;
            connections.push(conn);
        }

        info!(
            pool_size = pool_size,
            url = %config.display_url(),
            "Redis connection pool created"
        );

        Ok(Self {
            client,
            inner: Arc::new(PoolInner {
                idle: Mutex::new(connections),
                semaphore: Arc::new(Semaphore::new(pool_size)),
                active_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                size: pool_size,
            }),
            config,
        })
    }

    /// 借出一个连接
    ///
    /// 连接池耗尽时等待，最多等待 `acquire_timeout`。
    /// 调用方可以在超时前丢弃返回的 future 来放弃等待。
    pub async fn acquire(&self) -> AppResult<PooledConnection> {
        let acquire = self.inner.semaphore.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.config.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(AppError::connection_unavailable(
                    "Redis connection pool is closed",
                ));
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    pool_size = self.inner.size,
                    "Timed out waiting for a Redis connection"
                );
                return Err(AppError::connection_unavailable(format!(
                    "No Redis connection available within {:?}",
                    self.config.acquire_timeout
                )));
            }
        };

        self.checkout(permit)
    }

    /// 尝试借出连接（非阻塞）
    pub fn try_acquire(&self) -> AppResult<Option<PooledConnection>> {
        match self.inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => self.checkout(permit).map(Some),
            Err(tokio::sync::TryAcquireError::NoPermits) => Ok(None),
            Err(tokio::sync::TryAcquireError::Closed) => Err(AppError::connection_unavailable(
                "Redis connection pool is closed",
            )),
        }
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> AppResult<PooledConnection> {
        // 许可数与空闲连接数一致，只有关闭后才会取不到连接
        let conn = self.inner.idle.lock().pop().ok_or_else(|| {
            AppError::connection_unavailable("Redis connection pool is closed")
        })?;
        self.inner.active_count.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            conn,
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// 归还连接，等价于丢弃连接句柄
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// 关闭连接池
    ///
    /// 正在等待和之后的 `acquire` 都会失败，已借出的连接在归还时被关闭
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.semaphore.close();
        let dropped = {
            let mut idle = self.inner.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        info!(idle_closed = dropped, "Redis connection pool closed");
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// 获取连接池状态
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            total_connections: self.inner.size,
            active_connections: self.inner.active_count.load(Ordering::SeqCst),
            idle_connections: self.inner.idle.lock().len(),
            closed: self.is_closed(),
        }
    }

    /// 获取配置
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// 底层客户端，用于池外的长连接（订阅）
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 检查连接
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.acquire().await?;
        let reply = tokio::time::timeout(
            self.config.operation_timeout,
            redis::cmd("PING").query_async::<String>(conn.connection_mut()),
        )
        .await
        .map_err(|_| AppError::backend_unavailable("Redis PING timed out"))?;

        reply.map_err(|e| map_redis_error("PING", e))?;
        debug!("Redis PING ok");
        Ok(())
    }
}

/// 池化的连接，离开作用域时自动归还
pub struct PooledConnection {
    conn: ConnectionManager,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// 获取底层连接
    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.inner.checkin(self.conn.clone());
    }
}
