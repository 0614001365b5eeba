//! `tether-otel`：为 `tether-core` 与 `tether-pool` 的结构化日志安装全局订阅者。
//!
//! # 模块定位（Why）
//! - 库代码只通过 `tracing` 宏输出事件（重连、放弃、组合体中止、通道池伸缩），
//!   是否输出、输出到哪里由宿主进程决定；
//! - 本 crate 提供“一次调用即可用”的默认组合：`EnvFilter` + `fmt` + OpenTelemetry 桥接层。

use std::borrow::Cow;
use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{self, TracerProvider};
use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// 安装状态的全局缓存，确保 `install` 仅执行一次。
static INSTALL_STATE: OnceLock<InstallState> = OnceLock::new();

/// 安装过程可能出现的错误。
#[derive(Debug, Error)]
pub enum Error {
    /// `install` 被重复调用。
    #[error("tether-otel is already installed")]
    AlreadyInstalled,
    /// 外部提前设置了全局 `tracing` 订阅者。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    /// 设置全局订阅者失败的底层错误。
    #[error("failed to set the global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// 安装后保持存活的 Provider。
struct InstallState {
    provider: TracerProvider,
}

/// 以默认资源安装全局订阅者。
///
/// # 教案式说明
/// - **意图（Why）**：宿主只需在 `main` 开头调用一次，即可看到状态机与通道池的结构化日志，
///   同时 span 被桥接到 OpenTelemetry；
/// - **逻辑（How）**：
///   1. 拒绝重复安装与外部已设置的订阅者；
///   2. 构建 `TracerProvider` 并注册到 `opentelemetry::global`；
///   3. 组装 `registry + EnvFilter + fmt + OpenTelemetry` 并设为全局默认；
/// - **契约（What）**：`RUST_LOG` 未设置时过滤级别为 `info`；重复调用返回 [`Error::AlreadyInstalled`]。
pub fn install() -> Result<(), Error> {
    install_with_resource(Resource::default())
}

/// 与 [`install`] 相同，但使用调用方提供的 `Resource`（如 `service.name`）。
pub fn install_with_resource(resource: Resource) -> Result<(), Error> {
    if INSTALL_STATE.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(Error::SubscriberAlreadySet);
    }

    let state = install_impl(resource)?;
    INSTALL_STATE
        .set(state)
        .map_err(|_| Error::AlreadyInstalled)
}

/// 是否已经成功安装。
pub fn is_installed() -> bool {
    INSTALL_STATE.get().is_some()
}

/// 把 `service.name` 与附加属性组装为 OpenTelemetry `Resource`。
///
/// 重复键保留最后一次出现的值。
pub fn service_resource<'a>(
    service_name: &str,
    attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Resource {
    let pairs = std::iter::once(KeyValue::new("service.name", service_name.to_string())).chain(
        attributes
            .into_iter()
            .map(|(key, value)| KeyValue::new(key.to_string(), value.to_string())),
    );
    Resource::new(pairs)
}

/// 强制刷新已安装的 Provider；未安装时什么也不做。
pub fn force_flush() {
    if let Some(state) = INSTALL_STATE.get() {
        for result in state.provider.force_flush() {
            if let Err(err) = result {
                tracing::warn!(error = %err, "tracer provider flush failed");
            }
        }
    }
}

fn install_impl(resource: Resource) -> Result<InstallState, Error> {
    let provider = build_tracer_provider(resource);
    global::set_tracer_provider(provider.clone());

    let tracer = provider.versioned_tracer(
        "tether",
        Some(env!("CARGO_PKG_VERSION")),
        Some(Cow::Borrowed(env!("CARGO_PKG_NAME"))),
        None,
    );

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer));
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(InstallState { provider })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_tracer_provider(resource: Resource) -> TracerProvider {
    TracerProvider::builder()
        .with_config(
            trace::config()
                .with_sampler(trace::Sampler::AlwaysOn)
                .with_resource(resource),
        )
        .build()
}
