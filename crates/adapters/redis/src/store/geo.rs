//! Geo 命令

use kvlab_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::RedisStore;

/// 经纬度坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Redis 可索引的坐标范围（EPSG:3857）
    pub fn validate(&self) -> AppResult<()> {
        const MAX_LATITUDE: f64 = 85.051_128_78;
        if !(-180.0..=180.0).contains(&self.longitude)
            || !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&self.latitude)
        {
            return Err(AppError::validation(format!(
                "Coordinates out of range: ({}, {})",
                self.longitude, self.latitude
            )));
        }
        Ok(())
    }
}

/// 距离单位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Meters,
    #[default]
    Kilometers,
    Miles,
    Feet,
}

impl DistanceUnit {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Miles => "mi",
            Self::Feet => "ft",
        }
    }
}

/// 搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub name: String,
    pub point: GeoPoint,
    /// 到搜索中心的距离，单位与查询一致
    pub distance: f64,
}

impl RedisStore {
    /// 添加位置，返回是否为新成员
    pub async fn geo_add(&self, key: &str, point: GeoPoint, label: &str) -> AppResult<bool> {
        point.validate()?;
        let added: i64 = self
            .query(
                "GEOADD",
                redis::cmd("GEOADD")
                    .arg(key)
                    .arg(point.longitude)
                    .arg(point.latitude)
                    .arg(label),
            )
            .await?;
        Ok(added > 0)
    }

    /// 两个成员之间的距离，任一成员不存在时返回 None
    pub async fn geo_distance(
        &self,
        key: &str,
        a: &str,
        b: &str,
        unit: DistanceUnit,
    ) -> AppResult<Option<f64>> {
        self.query(
            "GEODIST",
            redis::cmd("GEODIST")
                .arg(key)
                .arg(a)
                .arg(b)
                .arg(unit.as_arg()),
        )
        .await
    }

    /// 圆形范围搜索，按距离由近到远返回
    pub async fn geo_search(
        &self,
        key: &str,
        center: GeoPoint,
        radius: f64,
        unit: DistanceUnit,
    ) -> AppResult<Vec<GeoLocation>> {
        center.validate()?;
        if radius.is_nan() || radius < 0.0 {
            return Err(AppError::validation(format!("Invalid radius: {}", radius)));
        }

        // 回复字段顺序：成员名、距离、坐标
        let raw: Vec<(String, f64, (f64, f64))> = self
            .query(
                "GEOSEARCH",
                redis::cmd("GEOSEARCH")
                    .arg(key)
                    .arg("FROMLONLAT")
                    .arg(center.longitude)
                    .arg(center.latitude)
                    .arg("BYRADIUS")
                    .arg(radius)
                    .arg(unit.as_arg())
                    .arg("ASC")
                    .arg("WITHCOORD")
                    .arg("WITHDIST"),
            )
            .await?;

        Ok(raw
            .into_iter()
            .map(|(name, distance, (longitude, latitude))| GeoLocation {
                name,
                point: GeoPoint::new(longitude, latitude),
                distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(106.822702, -6.177590).validate().is_ok());
        assert!(GeoPoint::new(180.0, 85.0).validate().is_ok());
        assert!(GeoPoint::new(181.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, 86.0).validate().is_err());
    }

    #[test]
    fn test_unit_args() {
        assert_eq!(DistanceUnit::Meters.as_arg(), "m");
        assert_eq!(DistanceUnit::default().as_arg(), "km");
        assert_eq!(DistanceUnit::Miles.as_arg(), "mi");
        assert_eq!(DistanceUnit::Feet.as_arg(), "ft");
    }
}
