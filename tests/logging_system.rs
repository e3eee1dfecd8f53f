//! 日志系统集成测试.
//!
//! tracing 的全局订阅器每个进程只能安装一次, 所以初始化相关的断言放在同一个测试里.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use zhen::logging::{LoggingConfig, init};

/// 等待后台写线程把目标文本写进日志文件
fn wait_for_log(path: &Path, needle: &str) -> Option<String> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if let Ok(content) = fs::read_to_string(path) {
            if content.contains(needle) {
                return Some(content);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn test_logging_writes_tracing_and_log_records() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let log_dir = dir.path().join("logs");
    let config = LoggingConfig {
        level: "info".to_string(),
        directory: log_dir.to_string_lossy().to_string(),
        file_prefix: "zhen-test".to_string(),
    };

    init(&config).expect("日志初始化失败");
    assert!(log_dir.exists(), "日志目录应该被创建");

    tracing::info!("tracing 记录: 帧线程池已启动");
    tracing::debug!("低于过滤级别的记录");
    log::warn!("log 门面记录: 参考帧缺失");

    let path = config.current_log_path();
    let content = wait_for_log(&path, "参考帧缺失")
        .unwrap_or_else(|| panic!("日志文件中缺少 log 门面的记录: {}", path.display()));
    assert!(content.contains("帧线程池已启动"));
    assert!(content.contains("WARN"));
    assert!(!content.contains("低于过滤级别的记录"));
    assert!(!content.contains("\x1b["), "文件日志不应包含颜色控制符");

    let second = init(&config);
    assert!(second.is_err(), "重复初始化应该失败");
}

#[test]
fn test_logging_config_from_json() {
    let config: LoggingConfig =
        serde_json::from_str(r#"{"level": "zhen_codec=debug"}"#).expect("解析日志配置失败");
    assert_eq!(config.level, "zhen_codec=debug");
    assert_eq!(config.directory, "logs");
    assert_eq!(config.file_prefix, "zhen");
}
