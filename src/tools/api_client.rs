//! 模拟 HTTP API 客户端：用于演示反思重试的三种分支
//!
//! - GET /api/v1/users/{id}：缺少 params.include_profile=true 时返回 400（RETRY_FIX）
//! - POST /api/v1/sync/data：前两次 503，第三次成功（RETRY_WAIT）
//! - DELETE /api/v1/admin/system：403（ABORT）
//! - GET /health：直接成功；其他端点返回 404 结果（不算失败）

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolSchema, ValueKind};

/// sync 端点在第几次调用时恢复
const SYNC_SUCCESS_ATTEMPT: u32 = 3;

/// 模拟的内部 API 客户端
#[derive(Default)]
pub struct ApiClientTool {
    sync_attempts: AtomicU32,
}

impl ApiClientTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for ApiClientTool {
    fn name(&self) -> &str {
        "api_client"
    }

    fn description(&self) -> &str {
        "A generic HTTP API client for internal services. Supports GET, POST, DELETE."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("endpoint", ValueKind::String, "API endpoint path (e.g. /api/v1/users/123)")
            .required("method", ValueKind::String, "One of GET, POST, DELETE")
            .optional("params", ValueKind::Object, "Query parameters or body data")
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, String> {
        let endpoint = args
            .get("endpoint")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        let method = args
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();
        let include_profile = args
            .get("params")
            .and_then(|p| p.get("include_profile"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match (method.as_str(), endpoint) {
            ("GET", ep) if ep.contains("/api/v1/users/") => {
                if !include_profile {
                    return Err(
                        "400 Bad Request: Missing required query parameter 'include_profile' for user fetch."
                            .to_string(),
                    );
                }
                let id = ep.rsplit('/').next().unwrap_or_default();
                Ok(json!({"status": 200, "data": {"id": id, "name": "Alice", "profile": "active"}}))
            }
            ("POST", "/api/v1/sync/data") => {
                let attempt = self.sync_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < SYNC_SUCCESS_ATTEMPT {
                    return Err(
                        "503 Service Unavailable: Upstream data sync service is overloaded. Retry-After: 1s"
                            .to_string(),
                    );
                }
                Ok(json!({
                    "status": 201,
                    "message": format!("Data synced successfully on attempt {}", attempt),
                }))
            }
            ("DELETE", ep) if ep.contains("/admin/system") => Err(
                "403 Forbidden: API credentials lack 'system.delete' scope. This action is not allowed."
                    .to_string(),
            ),
            (_, "/health") => Ok(json!({"status": 200, "health": "ok"})),
            _ => Ok(json!({"status": 404, "error": format!("Endpoint not found: {} {}", method, endpoint)})),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(tool: &ApiClientTool, args: Value) -> Result<Value, String> {
        tool.execute(args.as_object().unwrap()).await
    }

    #[tokio::test]
    async fn test_user_fetch_needs_profile_flag() {
        let tool = ApiClientTool::new();
        let err = call(&tool, json!({"endpoint": "/api/v1/users/123", "method": "GET"}))
            .await
            .unwrap_err();
        assert!(err.starts_with("400 Bad Request"));
        let ok = call(
            &tool,
            json!({"endpoint": "/api/v1/users/123", "method": "GET", "params": {"include_profile": true}}),
        )
        .await
        .unwrap();
        assert_eq!(ok["data"]["id"], "123");
    }

    #[tokio::test]
    async fn test_sync_recovers_on_third_attempt() {
        let tool = ApiClientTool::new();
        let args = json!({"endpoint": "/api/v1/sync/data", "method": "POST"});
        assert!(call(&tool, args.clone()).await.is_err());
        assert!(call(&tool, args.clone()).await.is_err());
        let ok = call(&tool, args).await.unwrap();
        assert_eq!(ok["status"], 201);
    }

    #[tokio::test]
    async fn test_admin_delete_forbidden() {
        let tool = ApiClientTool::new();
        let err = call(&tool, json!({"endpoint": "/api/v1/admin/system", "method": "DELETE"}))
            .await
            .unwrap_err();
        assert!(err.starts_with("403 Forbidden"));
    }
}
