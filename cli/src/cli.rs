use clap::Parser;
use libck101::{
    grab_thread, CancellationToken, Ck101Error, DownloadRule, Session, SessionConfig,
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MIN_IMAGE_SIZE,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;

const URL_HINT: &str = "URL should be in the form of http://ck101.com/thread-2593278-1-1.html";
const PICTURES_SUB_DIRECTORY: &str = "Pictures/go-ck101";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Grab the photos of a ck101 forum thread",
    long_about = "Downloads every full size photo of a ck101 forum thread, skipping thumbnails, \
    and saves them as JPEG under <output directory>/<thread id> - <title>."
)]
pub struct Cli {
    #[arg(long, help = "url to grab images from. should have pattern http://ck101.com/thread-2593278-1-1.html")]
    url: String,
    #[arg(short, long, help = "username, enables login")]
    username: Option<String>,
    #[arg(long, help = "password for --username. Prompted for when omitted.")]
    password: Option<String>,
    #[arg(
        short,
        long,
        help = "Directory receiving one sub directory per thread. Defaults to ~/Pictures/go-ck101"
    )]
    output_directory: Option<PathBuf>,
    #[arg(short, long, help = "verbose output")]
    pub verbose: bool,
    #[arg(default_value_t = DEFAULT_MAX_CONCURRENT_DOWNLOADS, long)]
    max_concurrent_downloads: usize,
    #[arg(
        default_value_t = DEFAULT_MIN_IMAGE_SIZE,
        long,
        help = "Images narrower or shorter than this many pixels are skipped."
    )]
    min_size: u32,
    #[arg(
        default_value_t = DEFAULT_JPEG_QUALITY,
        long,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    jpeg_quality: u8,
}

impl Cli {
    fn pictures_root(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.output_directory {
            return Some(dir.clone());
        }
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(PICTURES_SUB_DIRECTORY))
    }

    fn password(&self) -> Option<String> {
        self.username.as_ref()?;
        if self.password.is_some() {
            return self.password.clone();
        }
        match dialoguer::Password::new()
            .with_prompt("Enter password")
            .interact()
        {
            Ok(p) => Some(p),
            Err(e) => {
                println!("{}", format!("A password should be entered. {e}").red());
                None
            }
        }
    }
}

/// Returns false when the run failed and the process should exit non zero.
pub async fn download(cli: Cli) -> bool {
    if cli.url.is_empty() || !cli.url.starts_with("http") {
        println!("{}", URL_HINT.red());
        return false;
    }
    let pictures_root = match cli.pictures_root() {
        Some(p) => p,
        None => {
            println!("{}", "Failed to find the home directory, use --output-directory".red());
            return false;
        }
    };

    let password = match cli.password() {
        None if cli.username.is_some() => return false,
        p => p,
    };
    let session = match Session::new(
        cli.username.as_deref(),
        password.as_deref(),
        SessionConfig::default(),
    ) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            println!("{}", e.red());
            return false;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    println!("Grabbing {}....", cli.url);
    match grab_thread(
        session,
        &cli.url,
        &pictures_root,
        DownloadRule {
            min_width: cli.min_size,
            min_height: cli.min_size,
            jpeg_quality: cli.jpeg_quality,
            max_concurrent_downloads: cli.max_concurrent_downloads,
        },
        &cancel,
    )
    .await
    {
        Ok(target_dir) => {
            println!(
                "{} {}",
                "Images saved to".green(),
                target_dir.to_string_lossy()
            );
            true
        }
        Err(Ck101Error::InvalidInput(_)) => {
            println!("{}", URL_HINT.red());
            false
        }
        Err(e) => {
            println!("{}", "Failed to grab the thread".red());
            println!("{}", e);
            false
        }
    }
}
