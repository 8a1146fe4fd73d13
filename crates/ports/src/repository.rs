//! Repository trait 定义

use async_trait::async_trait;
use kvlab_errors::AppResult;

/// 基础 Repository trait
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// 根据 ID 查找
    async fn find_by_id(&self, id: &ID) -> AppResult<Option<T>>;

    /// 保存实体
    async fn save(&self, entity: &T) -> AppResult<()>;

    /// 删除实体，返回是否确实删除了数据
    async fn delete(&self, id: &ID) -> AppResult<bool>;

    /// 检查是否存在
    async fn exists(&self, id: &ID) -> AppResult<bool>;
}

/// 键值仓储，在命名空间内维护 ID 索引
#[async_trait]
pub trait KeyValueRepository<T>: Repository<T, String> {
    /// 查询命名空间内所有未过期的实体
    async fn find_all(&self) -> AppResult<Vec<T>>;

    /// 统计索引中的实体数
    async fn count(&self) -> AppResult<u64>;

    /// 删除命名空间内所有实体
    async fn delete_all(&self) -> AppResult<u64>;
}
