use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use snapb64::config::Config;
use snapb64::error::SnapError;
use snapb64::fetch::HttpFetcher;
use snapb64::history::{FileStore, ImageHistory};
use snapb64::image_utils::{
    detect_mime_type, extension_for_mime, guess_image_media_type, EncodedImage, OCTET_STREAM,
};
use snapb64::logging;
use snapb64::payload::normalize_pasted;
use snapb64::photo_bucket::{latest_photo_url, SupabaseBucket};
use snapb64::pipeline::{self, CheckResponse};
use snapb64::vision::{self, GeminiClient, ImageClassifier};

fn print_help() {
    println!(
        r#"snapb64 {version}

USAGE:
    snapb64 <COMMAND> [ARGS]

COMMANDS:
    sniff <BASE64>              Print the image type of a Base64 string
    encode <FILE>               Print a file as a data URL
    decode <BASE64|DATA_URL> [OUT]
                                Decode an image and write the bytes to OUT (default image.<ext>)
    fetch <URL>                 Download an image, print it as a data URL, record it in history
    payload <URL>               Render the image carried in a #b64= payload URL
    history [clear]             List (or clear) recently rendered images
    latest                      Print the URL of the newest bucket photo
    check                       Run the litter check on the newest bucket photo
    analyze <FILE|URL>          Describe an image with the vision model
    gen-url <LOCATION> <FILE|->
                                Build a payload URL from a code snippet
    serve                       Serve GET /api/check (feature "web")
    help                        Show this message

CONFIG:
    SNAPB64_CONFIG or ./snapb64.config.yaml; secrets fall back to
    SUPABASE_URL, SUPABASE_KEY, GEMINI_API_KEY / API_KEY.
"#,
        version = env!("CARGO_PKG_VERSION")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match args.first().map(|s| s.as_str()) {
        None | Some("help" | "--help" | "-h") => {
            print_help();
            return Ok(());
        }
        Some(command) => command,
    };
    let rest = &args[1..];

    let config = Config::load()?;
    logging::init_logging(&config.log_level);
    config.log_source();

    match command {
        "sniff" => sniff(rest),
        "encode" => encode(rest),
        "decode" => decode(rest),
        "fetch" => fetch(&config, rest).await,
        "payload" => payload(&config, rest),
        "history" => history(&config, rest),
        "latest" => latest(&config).await,
        "check" => check(&config).await,
        "analyze" => analyze(&config, rest).await,
        "gen-url" => gen_url(&config, rest).await,
        "serve" => serve(&config).await,
        other => Err(anyhow!(
            "Unknown command: {other}. Run `snapb64 help` for usage."
        )),
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("Missing required argument: <{name}>"))
}

fn open_history(config: &Config) -> ImageHistory<FileStore> {
    ImageHistory::new(FileStore::new(&config.history_path))
}

fn http_fetcher(config: &Config) -> Result<HttpFetcher> {
    Ok(HttpFetcher::new(
        config.fetch_timeout_secs.map(Duration::from_secs),
    )?)
}

fn sniff(args: &[String]) -> Result<()> {
    let input = required(args, 0, "BASE64")?;
    let mime = detect_mime_type(input.trim()).ok_or(SnapError::UnrecognizedFormat)?;
    println!("{mime}");
    Ok(())
}

fn load_file_image(path: &Path) -> Result<EncodedImage> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime = guess_image_media_type(&data).unwrap_or(OCTET_STREAM);
    Ok(EncodedImage::from_bytes(&data, mime))
}

fn encode(args: &[String]) -> Result<()> {
    let path = required(args, 0, "FILE")?;
    println!("{}", load_file_image(Path::new(path))?.to_data_url());
    Ok(())
}

fn decode(args: &[String]) -> Result<()> {
    let input = required(args, 0, "BASE64|DATA_URL")?;
    let image = normalize_pasted(input)?;
    let out = match args.get(1) {
        Some(out) => out.clone(),
        None => format!("image.{}", extension_for_mime(image.mime_type())),
    };
    let bytes = image.decode()?;
    std::fs::write(&out, &bytes).with_context(|| format!("Failed to write {out}"))?;
    println!("Wrote {} bytes ({}) to {out}", bytes.len(), image.mime_type());
    Ok(())
}

async fn fetch(config: &Config, args: &[String]) -> Result<()> {
    let url = required(args, 0, "URL")?;
    let fetcher = http_fetcher(config)?;
    let image = pipeline::render_remote_image(&fetcher, &open_history(config), url).await?;
    println!("{}", image.to_data_url());
    Ok(())
}

fn payload(config: &Config, args: &[String]) -> Result<()> {
    let location = required(args, 0, "URL")?;
    match pipeline::render_payload_url(&open_history(config), location)? {
        Some(data_url) => println!("{data_url}"),
        None => println!("No b64 payload in URL. Expected: <location>#b64=<URL-encoded Base64>"),
    }
    Ok(())
}

fn history(config: &Config, args: &[String]) -> Result<()> {
    let history = open_history(config);
    match args.first().map(|s| s.as_str()) {
        None => {
            let entries = history.get_history();
            if entries.is_empty() {
                println!("(no recent images)");
            }
            for (i, entry) in entries.iter().enumerate() {
                println!("{}. {}", i + 1, entry);
            }
            Ok(())
        }
        Some("clear") => {
            history.clear_history();
            println!("History cleared");
            Ok(())
        }
        Some(other) => bail!("Unknown history action: {other}. Use: history [clear]"),
    }
}

async fn latest(config: &Config) -> Result<()> {
    config.validate_for_listing()?;
    let url = latest_photo_url(&SupabaseBucket::new(config)).await?;
    println!("{url}");
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    config.validate_for_check()?;
    let bucket = SupabaseBucket::new(config);
    let fetcher = http_fetcher(config)?;
    let classifier = GeminiClient::new(config)?;

    let result = pipeline::run_check(&bucket, &fetcher, &classifier).await;
    let response = CheckResponse::from_result(result, chrono::Utc::now());
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn analyze(config: &Config, args: &[String]) -> Result<()> {
    let source = required(args, 0, "FILE|URL")?;
    let classifier = GeminiClient::new(config)?;

    let image = if source.starts_with("http://") || source.starts_with("https://") {
        let fetcher = http_fetcher(config)?;
        pipeline::render_remote_image(&fetcher, &open_history(config), source).await?
    } else {
        load_file_image(Path::new(source))?
    };

    println!("{}", classifier.analyze_image(&image).await?);
    Ok(())
}

async fn gen_url(config: &Config, args: &[String]) -> Result<()> {
    let location = required(args, 0, "LOCATION")?;
    let source = required(args, 1, "FILE|-")?;
    let snippet = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };

    let classifier = GeminiClient::new(config)?;
    println!(
        "{}",
        vision::generate_api_url(&classifier, &snippet, location).await?
    );
    Ok(())
}

#[cfg(feature = "web")]
async fn serve(config: &Config) -> Result<()> {
    use std::sync::Arc;
    use snapb64::web::{self, WebState};

    config.validate_for_check()?;
    let state = Arc::new(WebState {
        lister: Arc::new(SupabaseBucket::new(config)),
        fetcher: Arc::new(http_fetcher(config)?),
        classifier: Arc::new(GeminiClient::new(config)?),
    });
    web::serve(&config.listen_addr, state).await?;
    Ok(())
}

#[cfg(not(feature = "web"))]
async fn serve(_config: &Config) -> Result<()> {
    bail!("This build does not include the HTTP endpoint. Rebuild with --features web.")
}
