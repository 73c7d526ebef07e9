//! Command line parsing and the top level run: options, loading, scripts,
//! then either an offscreen PNG or the desktop window.

use crate::app::{self, AppError};
use crate::interactor::{CommandError, Interactor};
use crate::options::{Options, OptionsError};
use crate::window::{Window, WindowError};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: lumaview [OPTIONS] [FILES]...

Options:
  --config FILE            Apply a JSON configuration file (repeatable)
  --set KEY=VALUE          Set an option, e.g. --set render.show-edges=true (repeatable)
  --reader-option KEY=VALUE
                           Forward an option to the file readers (repeatable)
  --script FILE            Run a command script before showing the scene
  --output FILE            Render offscreen once and save a PNG
  --no-background          With --output, keep the background transparent
  --resolution WxH         Window or output size in pixels
  --list-readers           Print the supported file formats and exit
  -h, --help               Print this help

Logging verbosity follows RUST_LOG.";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0} expects a value")]
    MissingValue(String),
    #[error("unknown flag {0}")]
    UnknownFlag(String),
    #[error("expected KEY=VALUE, got \"{0}\"")]
    InvalidAssignment(String),
    #[error("expected WIDTHxHEIGHT, got \"{0}\"")]
    InvalidResolution(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CliArgs {
    pub configs: Vec<PathBuf>,
    pub assignments: Vec<(String, String)>,
    pub reader_options: Vec<(String, String)>,
    pub script: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub no_background: bool,
    pub resolution: Option<[u32; 2]>,
    pub list_readers: bool,
    pub help: bool,
    pub files: Vec<PathBuf>,
}

fn split_assignment(text: &str) -> Result<(String, String), CliError> {
    match text.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidAssignment(text.to_string())),
    }
}

fn parse_resolution(text: &str) -> Result<[u32; 2], CliError> {
    let invalid = || CliError::InvalidResolution(text.to_string());
    let (width, height) = text.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok([width, height])
}

/// Parses arguments, program name excluded. Flags accept `--flag value`
/// and `--flag=value`; everything after `--` is a file.
pub fn parse<I>(args: I) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--" {
            parsed.files.extend(args.by_ref().map(PathBuf::from));
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            parsed.files.push(PathBuf::from(arg));
            continue;
        }
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |flag: &str| -> Result<String, CliError> {
            match inline.clone() {
                Some(value) => Ok(value),
                None => args.next().ok_or_else(|| CliError::MissingValue(flag.to_string())),
            }
        };
        match flag.as_str() {
            "--config" => parsed.configs.push(PathBuf::from(value(&flag)?)),
            "--set" => parsed.assignments.push(split_assignment(&value(&flag)?)?),
            "--reader-option" => parsed.reader_options.push(split_assignment(&value(&flag)?)?),
            "--script" => parsed.script = Some(PathBuf::from(value(&flag)?)),
            "--output" => parsed.output = Some(PathBuf::from(value(&flag)?)),
            "--resolution" => parsed.resolution = Some(parse_resolution(&value(&flag)?)?),
            "--no-background" => parsed.no_background = true,
            "--list-readers" => parsed.list_readers = true,
            "-h" | "--help" => parsed.help = true,
            _ => return Err(CliError::UnknownFlag(arg)),
        }
    }
    Ok(parsed)
}

/// One line per registered reader: name, extensions and description.
pub fn reader_listing(window: &Window) -> Vec<String> {
    window
        .scene()
        .registry()
        .readers()
        .map(|reader| {
            format!(
                "{:<12} {:<16} {}",
                reader.name(),
                reader.extensions().join(","),
                reader.long_description()
            )
        })
        .collect()
}

/// Builds the window from `args`, then saves a PNG or opens the desktop app.
pub fn run(args: &CliArgs) -> Result<(), RunError> {
    let mut window = Window::new(args.output.is_some());
    if args.list_readers {
        for line in reader_listing(&window) {
            println!("{line}");
        }
        return Ok(());
    }

    let mut options = Options::default();
    for config in &args.configs {
        options.load_config_file(config)?;
    }
    for (key, value) in &args.assignments {
        options.set_as_string(key, value)?;
    }
    window.set_options(options);
    for (key, value) in &args.reader_options {
        window.set_reader_option(key.clone(), value.clone());
    }
    if let Some([width, height]) = args.resolution {
        window.set_size(width, height);
    }
    window.load(&args.files)?;

    let mut interactor = Interactor::new(window);
    if let Some(script) = &args.script {
        let succeeded = interactor.play_script(script)?;
        log::debug!("Ran {succeeded} commands from {}", script.display());
    }

    match &args.output {
        Some(path) => interactor.save_png(path, args.no_background)?,
        None => app::run(interactor)?,
    }
    Ok(())
}
