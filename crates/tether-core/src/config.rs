//! 配置装载辅助。
//!
//! # 契约（What）
//! - 所有时长字段在 TOML 中以毫秒整数书写，通过 [`millis`] / [`optional_millis`] 反序列化；
//! - [`from_toml_str`] 统一把解析错误收敛为 [`TetherError::ConfigParse`]。

use serde::de::DeserializeOwned;

use crate::error::TetherError;

/// 从 TOML 文本解析配置结构。
pub fn from_toml_str<T: DeserializeOwned>(text: &str) -> Result<T, TetherError> {
    Ok(toml::from_str(text)?)
}

/// `Duration` ↔ 毫秒整数。
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// `Option<Duration>` ↔ 可缺省的毫秒整数。
pub mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
