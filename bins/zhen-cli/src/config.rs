//! 命令行配置: JSON 配置文件 + 命令行覆盖.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use zhen::logging::LoggingConfig;
use zhen_codec::decoders::hevc::StreamConfig;
use zhen_codec::frame_thread::FrameThreadConfig;

use crate::Cli;

/// 完整运行配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub stream: StreamConfig,
    pub threads: FrameThreadConfig,
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// 从 JSON 文件加载, 缺失字段取默认值
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("解析配置文件失败, path={}", path.display()))
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_cli(&mut self, cli: &Cli) {
        let stream = &mut self.stream;
        if let Some(width) = cli.width {
            stream.width = width;
        }
        if let Some(height) = cli.height {
            stream.height = height;
        }
        if let Some(bit_depth) = cli.bit_depth {
            stream.bit_depth = bit_depth;
        }
        if let Some(gop_size) = cli.gop_size {
            stream.gop_size = gop_size;
        }
        if let Some(gops) = cli.gops {
            stream.gop_count = gops;
        }
        if let Some(b_frames) = cli.b_frames {
            stream.b_frames = b_frames;
        }
        if let Some(slices) = cli.slices {
            stream.slices_per_picture = slices;
        }
        if let Some(drop_every) = cli.drop_every {
            stream.drop_every = drop_every;
        }
        if let Some(threads) = cli.threads {
            self.threads.thread_count = threads;
        }
        if cli.delay.is_some() {
            self.threads.delay = cli.delay;
        }
        if cli.debug_threads {
            self.threads.debug_threads = true;
        }
        if let Some(dir) = &cli.log_dir {
            self.logging.directory = dir.clone();
        }
        self.logging = std::mem::take(&mut self.logging).with_verbosity(cli.verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stream": {{"b_frames": 3}}, "threads": {{"thread_count": 2}}}}"#)
            .unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.stream.b_frames, 3);
        assert_eq!(config.stream.width, StreamConfig::default().width);
        assert_eq!(config.threads.thread_count, 2);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = RunConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("解析配置文件失败"));
    }

    #[test]
    fn test_cli_overrides_file() {
        use clap::Parser;
        let cli = Cli::parse_from(["zhen-cli", "--threads", "3", "--b-frames", "1", "-vv"]);
        let mut config = RunConfig::default();
        config.apply_cli(&cli);
        assert_eq!(config.threads.thread_count, 3);
        assert_eq!(config.stream.b_frames, 1);
        assert_eq!(config.logging.level, "trace");
    }
}
