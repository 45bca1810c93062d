use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

fn main() {
    if let Err(err) = run() {
        eprintln!("{}: {err}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let mut options = Options::default();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", usage(&program));
                return Ok(());
            }
            "-V" | "--version" => {
                println!("{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "-c" | "--compact" => options.compact = true,
            _ if options.input.is_some() => {
                return Err(format!("unexpected argument: {arg}\n{}", usage(&program)));
            }
            "-" => options.input = Some(Input::Stdin),
            _ => options.input = Some(Input::File(arg.clone())),
        }
    }

    let html = match options.input.unwrap_or(Input::Stdin) {
        Input::Stdin => read_stdin()?,
        Input::File(path) => {
            let bytes = fs::read(&path).map_err(|err| format!("failed to read '{path}': {err}"))?;
            lossy(bytes)
        }
    };

    let images = gif_alt::find_gif_images(&html);
    let json = if options.compact {
        serde_json::to_string(&images)
    } else {
        serde_json::to_string_pretty(&images)
    }
    .map_err(|err| format!("failed to serialize JSON: {err}"))?;
    println!("{json}");
    Ok(())
}

#[derive(Default)]
struct Options {
    input: Option<Input>,
    compact: bool,
}

enum Input {
    Stdin,
    File(String),
}

fn read_stdin() -> Result<String, String> {
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .map_err(|err| format!("failed to read stdin: {err}"))?;
    Ok(lossy(buf))
}

// archived pages are rarely valid UTF-8
fn lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [-c|--compact] [HTML_FILE|-]\n\n\
         Prints the src/alt pairs of GIF images found in an archived HTML page.\n\
         Pass '-' or no file to read the page from stdin.\n\n\
         Options:\n  -c, --compact   Print JSON on a single line\n  \
         -h, --help      Show this message\n  -V, --version   Print package version"
    )
}
