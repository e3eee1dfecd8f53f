//! zhen - 帧线程解码演示工具
//!
//! 生成合成 HEVC 访问单元码流, 用单线程或帧线程方式解码,
//! 逐帧打印输出顺序与样本校验和.

mod config;
mod run;

use std::path::PathBuf;
use std::process;

use clap::Parser;

use config::RunConfig;

#[derive(Parser, Debug)]
#[command(name = "zhen", version, about = "帧线程解码演示工具")]
pub struct Cli {
    /// JSON 配置文件 (stream / threads / logging 三节, 均可省略)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 工作线程数 (0 = 按 CPU 数自动选择)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// 开始输出前积累的单元数
    #[arg(long)]
    delay: Option<usize>,

    /// 不使用线程池, 直接单线程解码
    #[arg(long)]
    single: bool,

    /// 同时运行单线程与帧线程解码并比较输出
    #[arg(long)]
    compare: bool,

    /// 帧率, 决定输出帧的时间基
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// 图像宽度
    #[arg(long)]
    width: Option<u16>,

    /// 图像高度
    #[arg(long)]
    height: Option<u16>,

    /// 样本位深 (8 或 10)
    #[arg(long)]
    bit_depth: Option<u8>,

    /// 每个 GOP 的图像数
    #[arg(long)]
    gop_size: Option<u32>,

    /// GOP 数量
    #[arg(long)]
    gops: Option<u32>,

    /// 锚点帧之间的 B 帧数
    #[arg(short = 'b', long)]
    b_frames: Option<u8>,

    /// 每个图像的 slice 数
    #[arg(long)]
    slices: Option<u8>,

    /// 每隔 N 个 P 锚点丢弃一个, 产生缺失参考帧
    #[arg(long)]
    drop_every: Option<u32>,

    /// 输出帧线程等待/上报的调试日志
    #[arg(long)]
    debug_threads: bool,

    /// 日志目录
    #[arg(long)]
    log_dir: Option<String>,

    /// 只打印汇总, 不打印逐帧信息
    #[arg(short, long)]
    quiet: bool,

    /// 打印合并后的配置 (JSON) 并退出
    #[arg(long)]
    dump_config: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = real_main(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn real_main(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    config.apply_cli(cli);

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    zhen::logging::init(&config.logging)?;
    eprintln!("zhen 版本 {} -- 帧线程解码演示", zhen::version());

    let packets = run::build_stream(&config.stream)?;
    if cli.compare {
        return run::compare(&packets, &config.threads, cli.fps);
    }

    let report = if cli.single {
        run::decode_single(&packets, cli.fps, !cli.quiet)?
    } else {
        run::decode_threaded(&packets, &config.threads, cli.fps, !cli.quiet)?
    };
    report.print_summary();
    if report.order_violations > 0 {
        anyhow::bail!("输出顺序错误 {} 处", report.order_violations);
    }
    Ok(())
}
