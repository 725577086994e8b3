//! # 图像工具：命令行入口
//!
//! 本文件只负责日志初始化、参数解析与运行时初始化；
//! 每个子命令都通过 `ImageTools` 的容器入口完成，结果容器以 JSON 打印到标准输出。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use image_tools::container::keys;
use image_tools::{CodecConfig, CodecRuntime, Container, ImageTools};

#[derive(Debug, Parser)]
#[command(name = "image-tools", version, about = "光栅 / FITS 图像读写与像素运算")]
struct Cli {
    /// 编解码配置文件（JSON，缺省字段使用默认值）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 读取图像并打印形状、深度与亮度范围
    Info { path: String },
    /// 读取图像并按目标扩展名另存
    Convert { input: String, output: String },
    /// 按图像自身的亮度范围反相后保存
    Invert { input: String, output: String },
    /// 相减后保存工作图（默认：参考图 − 工作图）
    Diff {
        working: String,
        reference: String,
        output: String,
        /// 0：负值置 0；1：无条件相减；2：绝对差
        #[arg(long, default_value_t = 2)]
        mode: i64,
        /// 改为 工作图 − 参考图
        #[arg(long)]
        reverse: bool,
    },
}

fn print(container: &Container) {
    match serde_json::to_string_pretty(container) {
        Ok(json) => println!("{}", json),
        Err(err) => log::error!("❌ 结果序列化失败: {}", err),
    }
}

/// 打印结果容器；失败时返回 `None` 以便提前结束。
fn checked(container: Container) -> Option<Container> {
    print(&container);
    container.is_success().then_some(container)
}

fn save_to(tools: &mut ImageTools<'_>, image: &Container, output: &str) -> Option<Container> {
    checked(tools.save_image_file(&image.clone().with(keys::PATH, output)))
}

fn run(tools: &mut ImageTools<'_>, command: Command) -> Option<()> {
    match command {
        Command::Info { path } => {
            checked(tools.open_image_file(&path))?;
        }
        Command::Convert { input, output } => {
            let image = checked(tools.open_image_file(&input))?;
            save_to(tools, &image, &output)?;
        }
        Command::Invert { input, output } => {
            let image = checked(tools.open_image_file(&input))?;
            checked(tools.invert_image(&image))?;
            save_to(tools, &image, &output)?;
        }
        Command::Diff {
            working,
            reference,
            output,
            mode,
            reverse,
        } => {
            let working = checked(tools.open_image_file(&working))?;
            let reference = checked(tools.open_image_file(&reference))?;

            for key in [keys::WIDTH, keys::HEIGHT, keys::CHANNELS, keys::DEPTH] {
                if working.get(key) != reference.get(key) {
                    print(&Container::failure(format!("工作图与参考图的 '{}' 不一致", key)));
                    return None;
                }
            }

            let mut params = working.clone();
            if let Some(buffer) = reference.get(keys::BUFFER) {
                params.insert(keys::REFERENCE_IMAGE_BUFFER, buffer.clone());
            }

            let result = if reverse {
                tools.subtract_reference_from_working_image(&params, mode)
            } else {
                tools.subtract_working_image_from_reference(&params, mode)
            };
            checked(result)?;
            save_to(tools, &working, &output)?;
        }
    }
    Some(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(CodecConfig::from_json_file).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            log::error!("❌ 读取配置失败: {}", err);
            print(&Container::failure(err.to_string()));
            return ExitCode::FAILURE;
        }
    };

    let runtime = match CodecRuntime::initialize(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("❌ 编解码运行时初始化失败: {}", err);
            print(&Container::failure(err.to_string()));
            return ExitCode::FAILURE;
        }
    };

    let mut tools = ImageTools::new(runtime);
    match run(&mut tools, cli.command) {
        Some(()) => ExitCode::SUCCESS,
        None => ExitCode::FAILURE,
    }
}
