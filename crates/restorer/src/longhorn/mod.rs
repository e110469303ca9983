/// Longhorn 服务访问
///
/// `api` 定义接口，`client` 是基于 HTTP 的实现

pub mod api;
pub mod client;

pub use api::LonghornApi;
pub use client::LonghornClient;
