use std::fs::File;
use std::io::{self, IsTerminal, Read, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute, queue,
    terminal::{
        BeginSynchronizedUpdate, EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
        SetTitle, disable_raw_mode, enable_raw_mode,
    },
};
use log::{LevelFilter, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};

use phx::app::App;
use phx::buffer::Document;
use phx::convert::ByteOrder;
use phx::editor::{EditError, Editor};
use phx::layout::{DEFAULT_PACKET, LayoutConfig};

/// Packet hex editor with live length and checksum fields
#[derive(Parser, Debug)]
#[command(name = "phx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Packet file to open (default: stdin, or a sample UDP packet)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Input is hex text instead of raw bytes
    #[arg(short = 'x', long)]
    hex: bool,

    /// Field layout (TOML). Default: bundled UDP/IPv4 layout
    #[arg(short, long, value_name = "TOML")]
    layout: Option<PathBuf>,

    /// Bytes per row (default: from layout)
    #[arg(short, long)]
    bytes_per_row: Option<usize>,

    /// Ports are stored with their two bytes swapped
    #[arg(long)]
    swap_ports: bool,

    /// Read-only mode
    #[arg(short, long)]
    readonly: bool,

    /// Write logs to this file (the screen is never used for logging)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    // 標準入力からデータを読み込む（パイプされている場合）
    let stdin_data = if args.file.is_none() && !io::stdin().is_terminal() {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Some(data)
    } else {
        None
    };

    // 端末を初期化する前に読み込んでおく（エラーを通常の画面に出すため）
    let (editor, failure) = build_editor(&args, stdin_data)?;
    let mut app = App::new(editor);
    if let Some(e) = failure {
        app.show_error(e);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // ターミナルの後処理
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// `--log-file` が指定された場合だけファイルへログを出す
fn init_logging(path: Option<&PathBuf>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("cannot create log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("PHX_LOG", "debug"))
        .filter_module("ratatui", LevelFilter::Warn)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

/// 計算フィールドを整合できなかった場合はその理由も返す
fn build_editor(args: &Args, stdin_data: Option<Vec<u8>>) -> Result<(Editor, Option<EditError>)> {
    let mut layout = match &args.layout {
        Some(path) => LayoutConfig::load(path).with_context(|| format!("layout {}", path.display()))?,
        None => LayoutConfig::udp_ipv4(),
    };
    if args.swap_ports {
        layout.port_byte_order = ByteOrder::Swapped;
    }

    // 優先順位: ファイル > 標準入力 > サンプルパケット
    let document = match (&args.file, stdin_data) {
        (Some(path), _) if args.hex => Document::open_hex(path)?,
        (Some(path), _) => Document::open(path)?,
        (None, Some(data)) if args.hex => Document::from_hex(&String::from_utf8_lossy(&data))?,
        (None, Some(data)) => Document::from_bytes(&data),
        (None, None) => Document::from_hex(DEFAULT_PACKET)?,
    };
    info!("loaded {} bytes", document.len());

    // 読み込み時の再計算は読み取り専用でも行う
    let bytes_per_row = args.bytes_per_row.unwrap_or(layout.bytes_per_row);
    let (mut editor, failure) = Editor::load(document, layout.to_fields(), bytes_per_row)?;
    if let Some(e) = &failure {
        warn!("computed fields left as loaded: {}", e);
    }
    editor.set_readonly(args.readonly);
    Ok((editor, failure))
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut title = String::new();

    loop {
        update_title(terminal.backend_mut(), app, &mut title)?;

        // Synchronized Update: 描画のちらつきを防止
        queue!(terminal.backend_mut(), BeginSynchronizedUpdate)?;
        terminal.draw(|f| app.draw(f))?;
        queue!(terminal.backend_mut(), EndSynchronizedUpdate)?;
        terminal.backend_mut().flush()?;

        app.handle_event()?;

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// ウィンドウタイトルを更新（変化した場合のみ）
fn update_title(backend: &mut CrosstermBackend<io::Stdout>, app: &App, last: &mut String) -> Result<()> {
    let title = format!(
        "phx - {}{}",
        app.filename().unwrap_or("[New]"),
        if app.is_modified() { " [+]" } else { "" }
    );
    if *last != title {
        execute!(backend, SetTitle(&title))?;
        *last = title;
    }
    Ok(())
}
