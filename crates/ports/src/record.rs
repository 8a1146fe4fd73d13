//! Hash 记录映射

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use kvlab_errors::{AppError, AppResult};

/// 可映射为 Redis Hash 的记录
pub trait HashRecord: Sized + Send + Sync {
    /// 命名空间内唯一的 ID
    fn id(&self) -> &str;

    /// 转换为字段列表，每个值都是字符串形式
    fn to_hash(&self) -> Vec<(String, String)>;

    /// 从字段映射还原，字段缺失或无法解析时返回 `AppError::Serialization`
    fn from_hash(fields: HashMap<String, String>) -> AppResult<Self>;

    /// 记录级别的 TTL
    fn ttl(&self) -> Option<Duration> {
        None
    }
}

/// Hash 字段解析辅助方法
pub trait FieldMapExt {
    /// 取出必填字段
    fn required(&self, field: &str) -> AppResult<&str>;

    /// 取出并解析必填字段
    fn parse<T: FromStr>(&self, field: &str) -> AppResult<T>
    where
        T::Err: std::fmt::Display;

    /// 取出并解析可选字段
    fn parse_optional<T: FromStr>(&self, field: &str) -> AppResult<Option<T>>
    where
        T::Err: std::fmt::Display;
}

impl FieldMapExt for HashMap<String, String> {
    fn required(&self, field: &str) -> AppResult<&str> {
        self.get(field)
            .map(String::as_str)
            .ok_or_else(|| AppError::serialization(format!("Missing field `{}`", field)))
    }

    fn parse<T: FromStr>(&self, field: &str) -> AppResult<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.required(field)?;
        raw.parse::<T>().map_err(|e| {
            AppError::serialization(format!("Invalid value for `{}` ({}): {}", field, raw, e))
        })
    }

    fn parse_optional<T: FromStr>(&self, field: &str) -> AppResult<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(field) {
            Some(_) => self.parse(field).map(Some),
            None => Ok(None),
        }
    }
}

/// 通用记录：ID + 字符串字段 + 可选 TTL
///
/// 相等性按 ID 和字段值比较，TTL 不参与比较（读回的记录不携带 TTL）
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub fields: BTreeMap<String, String>,
    pub ttl: Option<Duration>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            ttl: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.fields == other.fields
    }
}

impl Eq for Record {}

impl HashRecord for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn to_hash(&self) -> Vec<(String, String)> {
        let mut hash = Vec::with_capacity(self.fields.len() + 1);
        hash.push(("id".to_string(), self.id.clone()));
        hash.extend(
            self.fields
                .iter()
                .filter(|(name, _)| name.as_str() != "id")
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        hash
    }

    fn from_hash(mut fields: HashMap<String, String>) -> AppResult<Self> {
        let id = fields
            .remove("id")
            .ok_or_else(|| AppError::serialization("Missing field `id`"))?;
        Ok(Self {
            id,
            fields: fields.into_iter().collect(),
            ttl: None,
        })
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hash_mapping() {
        let record = Record::new("1")
            .with_field("name", "Mie Ayam Goreng")
            .with_field("price", 20_000);

        let hash: HashMap<String, String> = record.to_hash().into_iter().collect();
        assert_eq!(hash.get("id").map(String::as_str), Some("1"));
        assert_eq!(hash.get("price").map(String::as_str), Some("20000"));

        let loaded = Record::from_hash(hash).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_record_equality_ignores_ttl() {
        let a = Record::new("1").with_field("name", "X");
        let b = Record::new("1")
            .with_field("name", "X")
            .with_ttl(Duration::from_secs(3));
        assert_eq!(a, b);
        assert_ne!(a, Record::new("1").with_field("name", "Y"));
    }

    #[test]
    fn test_record_without_id_fails() {
        let fields = HashMap::from([("name".to_string(), "X".to_string())]);
        let err = Record::from_hash(fields).unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_field_parsing() {
        let fields = HashMap::from([
            ("price".to_string(), "20000".to_string()),
            ("stock".to_string(), "many".to_string()),
        ]);

        assert_eq!(fields.parse::<i64>("price").unwrap(), 20_000);
        assert!(matches!(
            fields.parse::<i64>("stock"),
            Err(AppError::Serialization(_))
        ));
        assert!(matches!(
            fields.required("name"),
            Err(AppError::Serialization(_))
        ));
        assert_eq!(fields.parse_optional::<i64>("discount").unwrap(), None);
    }
}
