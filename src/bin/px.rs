//! px - Packet field tool for pipes
//!
//! Reads a packet (raw bytes or hex text), applies the field layout and
//! prints, edits or verifies it.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{debug, warn};
use unicode_width::UnicodeWidthStr;

use phx::buffer::Document;
use phx::convert::{ByteOrder, checksum::ones_complement, hex_to_bytes};
use phx::editor::{Editor, FieldRun, Line, Render, check_computed};
use phx::layout::LayoutConfig;

/// Packet field tool for pipes
#[derive(Parser, Debug)]
#[command(name = "px")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Field layout (TOML). Default: bundled UDP/IPv4 layout
    #[arg(short, long, global = true, value_name = "TOML")]
    layout: Option<PathBuf>,

    /// Ports are stored with their two bytes swapped
    #[arg(long, global = true)]
    swap_ports: bool,

    #[command(subcommand)]
    command: Command,
}

/// Packet source
#[derive(ClapArgs, Debug)]
struct Input {
    /// Input file (default: stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Input is hex text (output of set/fix is then hex too)
    #[arg(short = 'x', long)]
    hex: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show hex rows annotated with the fields they contain
    Show {
        #[command(flatten)]
        input: Input,

        /// Bytes per row (default: from layout)
        #[arg(short, long)]
        width: Option<usize>,
    },

    /// List fields with offset, hex value and decoded text
    Fields {
        #[command(flatten)]
        input: Input,
    },

    /// Edit fields ("LABEL=TEXT"), update computed fields, write the packet
    Set {
        /// Edits in format "label=text" (e.g., "Source IP=192.168.0.1" "Payload=hi")
        edits: Vec<String>,

        #[command(flatten)]
        input: Input,
    },

    /// Recompute lengths and checksums, write the packet
    Fix {
        #[command(flatten)]
        input: Input,
    },

    /// Compare stored lengths and checksums with computed ones
    Verify {
        #[command(flatten)]
        input: Input,
    },

    /// One's-complement checksum of a hex string
    Checksum {
        /// Hex string (whitespace ignored)
        hex: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("PHX_LOG", "warn")).init();
    let args = Args::parse();

    let mut layout = match &args.layout {
        Some(path) => LayoutConfig::load(path).with_context(|| format!("layout {}", path.display()))?,
        None => LayoutConfig::udp_ipv4(),
    };
    if args.swap_ports {
        layout.port_byte_order = ByteOrder::Swapped;
    }

    match args.command {
        Command::Show { input, width } => cmd_show(&layout, &input, width),
        Command::Fields { input } => cmd_fields(&layout, &input),
        Command::Set { edits, input } => cmd_set(&layout, &input, &edits),
        Command::Fix { input } => cmd_fix(&layout, &input),
        Command::Verify { input } => cmd_verify(&layout, &input),
        Command::Checksum { hex } => cmd_checksum(&hex),
    }
}

/// Read the packet from file or stdin
fn read_input(input: &Input) -> Result<Document> {
    let document = match (&input.input, input.hex) {
        (Some(path), true) => Document::open_hex(path)?,
        (Some(path), false) => Document::open(path)?,
        (None, hex) => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            if hex {
                Document::from_hex(&String::from_utf8_lossy(&data))?
            } else {
                Document::from_bytes(&data)
            }
        }
    };
    debug!("read {} bytes", document.len());
    Ok(document)
}

fn open_editor(layout: &LayoutConfig, input: &Input, width: Option<usize>) -> Result<Editor> {
    let document = read_input(input)?;
    let width = width.unwrap_or(layout.bytes_per_row);
    Ok(Editor::new(document, layout.to_fields(), width)?)
}

/// Open for display: computed fields that cannot be updated are shown as stored
fn view_editor(layout: &LayoutConfig, input: &Input, width: Option<usize>) -> Result<Editor> {
    let document = read_input(input)?;
    let width = width.unwrap_or(layout.bytes_per_row);
    let (editor, failure) = Editor::load(document, layout.to_fields(), width)?;
    if let Some(e) = failure {
        warn!("showing stored values: {}", e);
    }
    Ok(editor)
}

/// Write the packet in the input's format
fn write_output(editor: &Editor, hex: bool) -> Result<()> {
    let mut stdout = io::stdout();
    if hex {
        writeln!(stdout, "{}", editor.buffer())?;
    } else {
        stdout.write_all(&hex_to_bytes(editor.buffer())?)?;
    }
    Ok(())
}

/// Plain-text rows: address, hex bytes, then the fields starting on the row
struct TextRows {
    width: usize,
    bytes: Vec<String>,
    notes: Vec<String>,
    out: String,
}

impl TextRows {
    fn new(width: usize) -> Self {
        Self {
            width,
            bytes: Vec::new(),
            notes: Vec::new(),
            out: String::new(),
        }
    }

    fn push_bytes(&mut self, hex: &str) {
        for i in (0..hex.len()).step_by(2) {
            self.bytes.push(hex[i..(i + 2).min(hex.len())].to_uppercase());
        }
    }
}

impl Render for TextRows {
    fn line_start(&mut self, line: &Line) {
        self.out.push_str(&format!("{:08X}  ", line.offset()));
    }

    fn literal(&mut self, hex: &str) {
        self.push_bytes(hex);
    }

    fn field(&mut self, run: FieldRun<'_>) {
        self.push_bytes(run.hex);
        if !run.continued {
            let marker = if run.computed { "*" } else { "" };
            let text = run.text.unwrap_or_else(|| "?".to_string());
            self.notes.push(format!("{}{}={}", marker, run.label, text));
        }
    }

    fn line_end(&mut self, _line: &Line) {
        let hex = self.bytes.join(" ");
        self.out.push_str(&format!("{:<w$}", hex, w = self.width * 3));
        if !self.notes.is_empty() {
            self.out.push_str(&format!(" ; {}", self.notes.join(", ")));
        }
        let trimmed = self.out.trim_end().len();
        self.out.truncate(trimmed);
        self.out.push('\n');
        self.bytes.clear();
        self.notes.clear();
    }
}

// === Commands ===

fn cmd_show(layout: &LayoutConfig, input: &Input, width: Option<usize>) -> Result<()> {
    let editor = view_editor(layout, input, width)?;
    let mut rows = TextRows::new(editor.bytes_per_row());
    editor.render(&mut rows);
    print!("{}", rows.out);
    Ok(())
}

fn cmd_fields(layout: &LayoutConfig, input: &Input) -> Result<()> {
    let editor = view_editor(layout, input, None)?;
    let label_width = editor.fields().iter().map(|f| f.label().width()).max().unwrap_or(0);

    for (id, field) in editor.fields().iter().enumerate() {
        let label = field.label();
        let pad = " ".repeat(label_width - label.width());
        let marker = if field.is_computed() { "*" } else { " " };
        if !editor.is_attached(id) {
            println!("{}{}{}  {:>5}  (not in packet)", marker, label, pad, field.offset());
            continue;
        }
        let text = field.display_text().unwrap_or_else(|e| format!("<{}>", e));
        println!("{}{}{}  {:>5}  {:<12}  {}", marker, label, pad, field.offset(), field.value(), text);
    }
    Ok(())
}

fn cmd_set(layout: &LayoutConfig, input: &Input, edits: &[String]) -> Result<()> {
    let mut editor = open_editor(layout, input, None)?;

    for edit in edits {
        let Some((label, text)) = edit.split_once('=') else {
            bail!("Edit must be in format 'label=text': {}", edit);
        };
        let settlement = editor
            .edit_field_by_label(label.trim(), text)
            .with_context(|| format!("cannot set '{}'", label.trim()))?;
        debug!("'{}' settled in {} pass(es)", label.trim(), settlement.passes);
    }

    write_output(&editor, input.hex)
}

fn cmd_fix(layout: &LayoutConfig, input: &Input) -> Result<()> {
    // 作成時に計算フィールドが整合する
    let editor = open_editor(layout, input, None)?;
    write_output(&editor, input.hex)
}

fn cmd_verify(layout: &LayoutConfig, input: &Input) -> Result<()> {
    let document = read_input(input)?;
    let checks = check_computed(document.hex(), &layout.to_fields())?;

    let mut failed = 0;
    for check in &checks {
        let status = if check.is_ok() { "OK" } else { "MISMATCH" };
        println!(
            "{:<8}  {}  stored {}  computed {}",
            status, check.label, check.stored, check.expected
        );
        if !check.is_ok() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} computed fields do not match", failed, checks.len());
    }
    Ok(())
}

fn cmd_checksum(hex: &str) -> Result<()> {
    let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    println!("{}", ones_complement(&cleaned)?);
    Ok(())
}
