//! Typed key/value configuration entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::Store;

/// A typed configuration value; the `data_type` column records which
/// variant so round-tripping through text doesn't lose type information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl ConfigValue {
    fn data_type(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Boolean(_) => "boolean",
            ConfigValue::Json(_) => "json",
        }
    }

    fn to_text(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Boolean(b) => b.to_string(),
            ConfigValue::Json(v) => v.to_string(),
        }
    }

    fn from_text(data_type: &str, value: &str) -> crate::Result<Self> {
        Ok(match data_type {
            "integer" => ConfigValue::Integer(
                value
                    .parse()
                    .map_err(|_| crate::Error::config(format!("bad integer config value: {value}")))?,
            ),
            "float" => ConfigValue::Float(
                value
                    .parse()
                    .map_err(|_| crate::Error::config(format!("bad float config value: {value}")))?,
            ),
            "boolean" => ConfigValue::Boolean(
                value
                    .parse()
                    .map_err(|_| crate::Error::config(format!("bad boolean config value: {value}")))?,
            ),
            "json" => ConfigValue::Json(serde_json::from_str(value)?),
            _ => ConfigValue::String(value.to_string()),
        })
    }

    /// Best-fit conversion from a raw string, preferring the narrowest type
    /// that parses cleanly: bool, then int, then float, then string.
    pub fn infer_from_str(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return ConfigValue::Boolean(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ConfigValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return ConfigValue::Float(f);
        }
        ConfigValue::String(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: ConfigValue,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub async fn get_config(&self, key: &str) -> crate::Result<Option<ConfigEntry>> {
        let row = sqlx::query("SELECT key, value, data_type, updated_at FROM app_config WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        let Some(row) = row else { return Ok(None) };
        let data_type: String = row.try_get("data_type")?;
        let raw_value: String = row.try_get("value")?;

        Ok(Some(ConfigEntry {
            key: row.try_get("key")?,
            value: ConfigValue::from_text(&data_type, &raw_value)?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    pub async fn set_config(&self, key: &str, value: ConfigValue) -> crate::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_config (key, value, data_type, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                data_type = excluded.data_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value.to_text())
        .bind(value.data_type())
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn all_config(&self) -> crate::Result<Vec<ConfigEntry>> {
        let rows = sqlx::query("SELECT key, value, data_type, updated_at FROM app_config ORDER BY key")
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|row| {
                let data_type: String = row.try_get("data_type")?;
                let raw_value: String = row.try_get("value")?;
                Ok(ConfigEntry {
                    key: row.try_get("key")?,
                    value: ConfigValue::from_text(&data_type, &raw_value)?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_bool_before_int() {
        assert_eq!(ConfigValue::infer_from_str("true"), ConfigValue::Boolean(true));
    }

    #[test]
    fn infers_int_before_float() {
        assert_eq!(ConfigValue::infer_from_str("42"), ConfigValue::Integer(42));
    }

    #[test]
    fn infers_float_then_falls_back_to_string() {
        assert_eq!(ConfigValue::infer_from_str("3.14"), ConfigValue::Float(3.14));
        assert_eq!(
            ConfigValue::infer_from_str("best"),
            ConfigValue::String("best".to_string())
        );
    }
}
