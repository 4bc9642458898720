use clap::Parser;
use docent_context::splitter::{RawSegment, TextSplitter, separators_for_path};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// A CLI tool to split a text file into retrieval chunks, printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Category recorded in chunk metadata.
    #[arg(short, long, default_value = ".")]
    category: String,

    /// Maximum length of each chunk, in characters.
    #[arg(short = 's', long, default_value_t = 200)]
    chunk_size: usize,

    /// Characters repeated between consecutive chunks.
    #[arg(short = 'o', long, default_value_t = 20)]
    chunk_overlap: usize,

    /// Comma-separated list of regex patterns for separators.
    /// Defaults to separators chosen from the input file extension.
    #[arg(short, long, value_delimiter = ',')]
    separators: Option<Vec<String>>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (text, source_path) = if let Some(input_path) = &args.input {
        (fs::read_to_string(input_path)?, input_path.clone())
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (buffer, "<stdin>".to_string())
    };

    let separator_patterns: Vec<String> = match args.separators {
        Some(patterns) => patterns,
        None => separators_for_path(Path::new(&source_path))
            .iter()
            .map(|&s| s.to_string())
            .collect(),
    };
    let separator_refs: Vec<&str> = separator_patterns.iter().map(|s| s.as_str()).collect();

    let splitter = TextSplitter::new(args.chunk_size, args.chunk_overlap, &separator_refs)?;

    let filename = Path::new(&source_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_path.clone());

    let segment = RawSegment {
        text,
        category: args.category,
        filename,
        source_path,
        page: None,
    };

    let chunks = splitter.split_segments(std::slice::from_ref(&segment));
    println!("{}", serde_json::to_string_pretty(&chunks)?);

    Ok(())
}
