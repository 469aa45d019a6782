use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;

use crate::io::DEFAULT_MAX_SIZE;

#[derive(Parser, Debug)]
#[command(name = "seewxapkg")]
#[command(version)]
#[command(about = "Decrypt and unpack WeChat mini-program packages into ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  seewxapkg __APP__.wxapkg                      unpack a plain package to __APP__.zip\n  \
  seewxapkg -a wx0123456789abcdef -b app.wxapkg decrypt, unpack and beautify\n  \
  seewxapkg -l https://example.com/app.wxapkg   list files of a remote package")]
pub struct Cli {
    /// Package path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Mini-program AppID, required for encrypted (V1MMWX) packages
    #[arg(short = 'a', long = "appid", value_name = "APPID", env = "SEEWXAPKG_APPID")]
    pub app_id: Option<String>,

    /// Reformat JSON and WXML/HTML files
    #[arg(short = 'b', long)]
    pub beautify: bool,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// Output archive path (default: <package name>.zip in the output directory)
    #[arg(short = 'o', long, value_name = "ZIP")]
    pub output: Option<PathBuf>,

    /// Directory for output archives
    #[arg(long, value_name = "DIR", env = "SEEWXAPKG_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Parent directory for the per-run scratch tree
    #[arg(long, value_name = "DIR", env = "SEEWXAPKG_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Largest package accepted, in bytes
    #[arg(long, value_name = "BYTES", env = "SEEWXAPKG_MAX_SIZE", default_value_t = DEFAULT_MAX_SIZE)]
    pub max_size: u64,

    /// Keep the scratch tree instead of deleting it
    #[arg(long)]
    pub keep_scratch: bool,

    /// Verbose logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => errors only)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    /// Default log filter for the chosen verbosity
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "error",
            (1, _) => "warn",
            (_, 0) => "info",
            (_, 1) => "debug",
            _ => "trace",
        }
    }

    /// Validated AppID, if one was given
    pub fn app_id(&self) -> Result<Option<&str>> {
        match self.app_id.as_deref() {
            None | Some("") => Ok(None),
            Some(id) if is_valid_app_id(id) => Ok(Some(id)),
            Some(id) => {
                bail!("invalid AppID '{id}': expected 'wx' followed by 16 lowercase hex digits")
            }
        }
    }
}

/// `wx` followed by 16 lowercase hex digits
pub fn is_valid_app_id(id: &str) -> bool {
    id.len() == 18
        && id.starts_with("wx")
        && id[2..]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
