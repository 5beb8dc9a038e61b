//! 构建版本信息。

use serde::Serialize;

use crate::envelope::Envelope;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    version: &'static str,
    commit: &'static str,
    build_time: &'static str,
    build_env: String,
}

/// `GET /version`：返回当前构建信息。
pub async fn get_version_info() -> Envelope<VersionInfo> {
    Envelope::ok_with(VersionInfo {
        version: crate::build::PKG_VERSION,
        commit: crate::build::SHORT_COMMIT,
        build_time: crate::build::BUILD_TIME,
        build_env: format!(
            "{},{}",
            crate::build::RUST_VERSION,
            crate::build::RUST_CHANNEL
        ),
    })
}
