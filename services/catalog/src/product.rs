//! 商品记录

use std::collections::HashMap;
use std::time::Duration;

use kvlab_errors::AppResult;
use kvlab_ports::{FieldMapExt, HashRecord};
use serde::{Deserialize, Serialize};

/// 商品仓储的命名空间
pub const PRODUCT_NAMESPACE: &str = "products";

/// 商品
///
/// `ttl` 只在保存时生效，读回的商品不携带 TTL，也不参与相等比较
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Option<i64>,
    /// 过期秒数
    #[serde(skip)]
    pub ttl: Option<u64>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price: None,
            ttl: None,
        }
    }

    pub fn with_price(mut self, price: i64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }
}

impl PartialEq for Product {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.price == other.price
    }
}

impl HashRecord for Product {
    fn id(&self) -> &str {
        &self.id
    }

    fn to_hash(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("id".to_string(), self.id.clone()),
            ("name".to_string(), self.name.clone()),
        ];
        if let Some(price) = self.price {
            fields.push(("price".to_string(), price.to_string()));
        }
        fields
    }

    fn from_hash(fields: HashMap<String, String>) -> AppResult<Self> {
        Ok(Self {
            id: fields.required("id")?.to_string(),
            name: fields.required("name")?.to_string(),
            price: fields.parse_optional("price")?,
            ttl: None,
        })
    }

    fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}
