use std::path::PathBuf;
use std::sync::Arc;

use barblocks::config::Settings;
use barblocks::host::{Host, SystemHost};
use barblocks::providers::{BlockResponse, ProviderId, ProviderRegistry};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    block: Option<String>,
    format: OutputFormat,
    pretty: bool,
    config: Option<PathBuf>,
    count: Option<u64>,
    debug_log: bool,
}

#[derive(Serialize)]
struct BlockPayload<'a> {
    name: &'static str,
    #[serde(flatten)]
    response: &'a BlockResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListPayload {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    cache_seconds: i64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("barblocks {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    barblocks::init_logging(args.debug_log);

    let result = match args.command.as_str() {
        "poll" => run_poll(args).await,
        "watch" => run_watch(args).await,
        "list" => run_list(args).await,
        _ => Err(format!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    if let Err(message) = result {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut format = OutputFormat::Text;
    let mut pretty = false;
    let mut command = String::new();
    let mut block = None;
    let mut config = None;
    let mut count = None;
    let mut debug_log = false;

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            command = argv.remove(0);
        }
    }

    if command.is_empty() {
        command = "poll".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                if let Some(value) = iter.next() {
                    if value == "json" {
                        format = OutputFormat::Json;
                    } else if value == "text" {
                        format = OutputFormat::Text;
                    }
                }
            }
            "--json" => format = OutputFormat::Json,
            "--pretty" => pretty = true,
            "--config" => config = iter.next().map(PathBuf::from),
            "--count" => count = iter.next().and_then(|value| value.parse().ok()),
            "--debug-log" => debug_log = true,
            "--help" | "-h" | "--version" | "-V" => {
                command = arg;
                break;
            }
            value if !value.starts_with('-') && block.is_none() => {
                block = Some(value.to_string());
            }
            _ => {}
        }
    }

    CliArgs {
        command,
        block,
        format,
        pretty,
        config,
        count,
        debug_log,
    }
}

fn load_registry(args: &CliArgs) -> Result<(ProviderRegistry, Arc<dyn Host>), String> {
    let settings = Settings::load(args.config.as_deref()).map_err(|err| err.to_string())?;
    let host: Arc<dyn Host> = Arc::new(SystemHost::new(settings.colors.clone()));
    Ok((ProviderRegistry::new(&settings, host.clone()), host))
}

fn select_block(block: Option<&str>) -> Result<ProviderId, String> {
    let block = block.ok_or_else(|| "Missing block id. Use `barblocks list`.".to_string())?;
    ProviderId::parse(block).map_err(|err| err.to_string())
}

async fn run_poll(args: CliArgs) -> Result<(), String> {
    let id = select_block(args.block.as_deref())?;
    let (registry, _) = load_registry(&args)?;

    let response = registry.poll(&id).await.map_err(|err| err.to_string())?;
    print_response(&registry, id, &response, &args).await
}

/// Poll a block whenever its previous response expires
async fn run_watch(args: CliArgs) -> Result<(), String> {
    let id = select_block(args.block.as_deref())?;
    let (registry, host) = load_registry(&args)?;
    let mut polls = 0u64;

    loop {
        let wait = match registry.poll_cached(&id).await {
            Ok(response) => {
                print_response(&registry, id, &response, &args).await?;
                (response.cached_until - host.now())
                    .to_std()
                    .unwrap_or_default()
            }
            Err(err) => {
                tracing::error!("Polling {} failed: {}", id.as_str(), err);
                let seconds = registry.cache_seconds(&id).await.unwrap_or(60);
                std::time::Duration::from_secs(seconds.max(1).unsigned_abs())
            }
        };

        polls += 1;
        if args.count.is_some_and(|count| polls >= count) {
            return Ok(());
        }

        tokio::time::sleep(wait).await;
    }
}

async fn run_list(args: CliArgs) -> Result<(), String> {
    let (registry, _) = load_registry(&args)?;
    let mut payloads = Vec::new();

    for id in ProviderId::all() {
        let Some((name, description)) = registry.describe(&id).await else {
            continue;
        };
        payloads.push(ListPayload {
            id: id.as_str(),
            name,
            description,
            cache_seconds: registry.cache_seconds(&id).await.unwrap_or_default(),
        });
    }

    match args.format {
        OutputFormat::Text => {
            for payload in &payloads {
                println!(
                    "{:<10} {} ({}s) - {}",
                    payload.id, payload.name, payload.cache_seconds, payload.description
                );
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&payloads, args.pretty),
    }
}

async fn print_response(
    registry: &ProviderRegistry,
    id: ProviderId,
    response: &BlockResponse,
    args: &CliArgs,
) -> Result<(), String> {
    match args.format {
        OutputFormat::Text => {
            println!("{}", response.full_text);
            Ok(())
        }
        OutputFormat::Json => {
            let name = registry
                .describe(&id)
                .await
                .map(|(name, _)| name)
                .unwrap_or(id.as_str());
            print_json(&BlockPayload { name, response }, args.pretty)
        }
    }
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), String> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .map_err(|err| err.to_string())?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "barblocks {}\n\nUsage:\n  barblocks poll <block> [--format text|json] [--pretty] [--config <path>]\n  barblocks watch <block> [--count <n>] [--format text|json] [--config <path>]\n  barblocks list [--format text|json]\n\nCommands:\n  poll   Poll a block once and print it\n  watch  Poll a block again whenever its output expires\n  list   Print the available blocks\n\nBlocks:\n  ee_quota  EE data allowance\n  huawei    Huawei modem signal and network type\n\nFlags:\n  --format <text|json>  Output format\n  --json                Shortcut for --format json\n  --pretty              Pretty-print JSON output\n  --config <path>       Settings file (default: <config dir>/barblocks/config.json)\n  --count <n>           Stop watching after n polls\n  --debug-log           Also write logs to the debug log file\n  -h, --help            Show help\n  -V, --version         Show version",
        env!("CARGO_PKG_VERSION")
    );
}
