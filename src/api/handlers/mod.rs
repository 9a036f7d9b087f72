pub mod console;
pub mod players;
pub mod server;
pub mod status;

use super::auth::Identity;

/// 운영자 작업 감사 로그 (target `audit`)
pub(crate) fn audit(identity: &Identity, category: &str, action: &str) {
    tracing::info!(target: "audit", "[{}] {}: {}", identity.label(), category, action);
}
