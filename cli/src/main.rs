//! Glance CLI - summarize a web page from the terminal.
//!
//! ```text
//! glance https://example.com/article        # stream a summary to stdout
//! glance --json https://example.com/article # single-shot response
//! cat page.html | glance --stdin            # summarize piped HTML
//! ```
//!
//! The binary is a thin shell around [`glance_session::PanelSession`]: fetch
//! and extract the page, start the summary, then print deltas until the
//! stream finishes or Ctrl-C cancels it.

use std::{
    env,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow, bail};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use glance_config::Settings;
use glance_extract::{
    ContentScript, SelectionOnly, UrlRule, fetch_html, is_forbidden, readable_markdown,
};
use glance_session::PanelSession;
use glance_types::{ChatStatus, Notice, StreamEvent};

const USAGE: &str = "\
Usage: glance [OPTIONS] [URL]

Summarize a web page with Gemini.

Options:
  --json           Request the whole answer at once instead of streaming
  --model <NAME>   Override the configured model for this run
  --stdin          Read HTML on stdin instead of fetching a URL
  -h, --help       Show this help
";

#[derive(Debug, Default)]
struct CliArgs {
    url: Option<Url>,
    json: bool,
    model: Option<String>,
    stdin: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => parsed.json = true,
            "--stdin" => parsed.stdin = true,
            "--model" => {
                let value = args.next().context("--model requires a value")?;
                parsed.model = Some(value);
            }
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}\n{USAGE}"),
            other => {
                if parsed.url.is_some() {
                    bail!("only one URL can be given\n{USAGE}");
                }
                let url = Url::parse(other).with_context(|| format!("invalid URL: {other}"))?;
                parsed.url = Some(url);
            }
        }
    }
    Ok(parsed)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    if let Some(file) = open_log_file() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        return;
    }

    // No log file: stay quiet rather than mixing log lines into the summary.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> Option<std::fs::File> {
    let path = log_file_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

fn log_file_path() -> Option<PathBuf> {
    let config_path = Settings::path().ok()?;
    let config_dir = config_path.parent()?;
    Some(config_dir.join("logs").join("glance.log"))
}

async fn read_stdin() -> Result<String> {
    use tokio::io::AsyncReadExt;
    let mut content = String::new();
    tokio::io::stdin()
        .read_to_string(&mut content)
        .await
        .context("failed to read stdin")?;
    Ok(content)
}

async fn load_content(args: &CliArgs, settings: &Settings) -> Result<String> {
    if args.stdin {
        let raw = read_stdin().await?;
        return stdin_markdown(&raw);
    }

    let url = args.url.as_ref().context("no URL given\n\nUsage: glance [OPTIONS] [URL]")?;
    if is_forbidden(url, &settings.url_rules()) {
        bail!("summarizing {url} is not allowed by the configured rules");
    }

    if let Some(script) = site_script(settings, url) {
        match SelectionOnly.evaluate(script, "") {
            Ok(content) => return Ok(content),
            Err(err) => {
                tracing::warn!(%url, %err, "per-site rule skipped, extracting normally");
            }
        }
    }

    tracing::info!(%url, "fetching page");
    let html = fetch_html(url)
        .await
        .with_context(|| format!("failed to fetch {url}"))?;
    let content = readable_markdown(&html)
        .with_context(|| format!("no readable content found at {url}"))?;
    Ok(content)
}

/// Piped input goes through the same extraction as a fetched page; plain
/// text survives as paragraphs.
fn stdin_markdown(raw: &str) -> Result<String> {
    readable_markdown(raw).context("no readable content on stdin")
}

/// First advanced rule whose URL pattern matches the target page, if any.
fn site_script<'a>(settings: &'a Settings, url: &Url) -> Option<&'a str> {
    settings.advanced_rules.iter().find_map(|rule| {
        let parsed = UrlRule::parse(&rule.url).ok()?;
        parsed.matches(url).then_some(rule.script.as_str())
    })
}

enum Step {
    Event(Option<StreamEvent>),
    Cancel,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = parse_args(env::args().skip(1))?;

    let mut settings = Settings::load_or_default();
    if args.json {
        settings.response_mode = glance_types::ResponseMode::Json;
    }
    if let Some(model) = args.model.clone() {
        settings.model = Some(model);
    }

    let content = load_content(&args, &settings).await?;

    let mut session = PanelSession::new(settings);
    session.summarize(&content);

    let mut stdout = std::io::stdout();
    let mut cancelled = false;

    loop {
        let step = tokio::select! {
            event = session.next_event() => Step::Event(event),
            _ = tokio::signal::ctrl_c() => Step::Cancel,
        };

        match step {
            Step::Event(Some(StreamEvent::TextDelta(text))) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Step::Event(Some(StreamEvent::Done)) => {
                writeln!(stdout)?;
                break;
            }
            Step::Event(Some(StreamEvent::Error(_)) | None) => break,
            Step::Cancel => {
                session.cancel();
                cancelled = true;
                eprintln!();
                eprintln!("cancelled");
                break;
            }
        }
    }

    let notices = session.take_notices();
    for notice in &notices {
        match notice {
            Notice::Toast(msg) | Notice::System(msg) => eprintln!("{msg}"),
        }
    }

    if cancelled {
        return Ok(());
    }
    let completed = session
        .transcript()
        .last()
        .is_some_and(|turn| turn.status() == ChatStatus::Done);
    if !completed {
        let reason = notices
            .first()
            .map_or_else(|| "summary did not complete".to_string(), |n| n.message().to_string());
        return Err(anyhow!(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{parse_args, stdin_markdown};

    fn args(values: &[&str]) -> impl Iterator<Item = String> + use<> {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_url_and_flags() {
        let parsed = parse_args(args(&[
            "--json",
            "--model",
            "gemini-1.5-pro",
            "https://example.com/a",
        ]))
        .unwrap();
        assert!(parsed.json);
        assert_eq!(parsed.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(parsed.url.unwrap().as_str(), "https://example.com/a");
        assert!(!parsed.stdin);
    }

    #[test]
    fn rejects_unknown_flags_and_extra_urls() {
        assert!(parse_args(args(&["--frobnicate"])).is_err());
        assert!(parse_args(args(&["https://a.test/", "https://b.test/"])).is_err());
        assert!(parse_args(args(&["--model"])).is_err());
        assert!(parse_args(args(&["not a url"])).is_err());
    }

    #[test]
    fn stdin_mode_needs_no_url() {
        let parsed = parse_args(args(&["--stdin"])).unwrap();
        assert!(parsed.stdin);
        assert!(parsed.url.is_none());
    }

    #[test]
    fn stdin_input_is_extracted() {
        let md =
            stdin_markdown("<body><p>keep this</p><script>var hidden = 1;</script></body>")
                .unwrap();
        assert!(md.contains("keep this"));
        assert!(!md.contains("hidden"));

        let plain = stdin_markdown("just some notes").unwrap();
        assert!(plain.contains("just some notes"));

        assert!(stdin_markdown("").is_err());
    }
}
