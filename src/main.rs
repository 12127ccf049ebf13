#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, ArgMatches, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn common_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("tool")
                .short('t')
                .long("tool")
                .value_name("TOOL")
                .help("CLI backend to use (claude-code or codex)")
                .default_value("claude-code"),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("MODEL")
                .help("Model identifier passed to the backend"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Wall-clock timeout per attempt")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
}

fn cli() -> Command {
    Command::new("envelope")
        .version(VERSION)
        .about("Envelope - call AI command-line tools as request/response APIs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(common_args(
            Command::new("text")
                .about("Send a prompt and print the text reply")
                .arg(
                    Arg::new("prompt")
                        .value_name("PROMPT")
                        .help("Prompt text, or '-' to read it from stdin")
                        .required(true),
                )
                .arg(
                    Arg::new("stream")
                        .long("stream")
                        .help("Print the reply through the streaming model interface")
                        .action(ArgAction::SetTrue),
                ),
        ))
        .subcommand(common_args(
            Command::new("structured")
                .about("Send a prompt and print JSON that follows a schema")
                .arg(
                    Arg::new("schema")
                        .short('s')
                        .long("schema")
                        .value_name("FILE")
                        .help("JSON Schema file the output must follow")
                        .required(true),
                )
                .arg(
                    Arg::new("prompt")
                        .value_name("PROMPT")
                        .help("Prompt text, or '-' to read it from stdin")
                        .required(true),
                ),
        ))
        .subcommand(common_args(
            Command::new("health").about("Check that the backend CLI is installed"),
        ))
}

async fn dispatch(name: &str, matches: &ArgMatches) -> anyhow::Result<()> {
    let settings = commands::Settings::load(matches)?;
    settings.init_tracing();

    match name {
        "text" => commands::text::run(matches, &settings).await,
        "structured" => commands::structured::run(matches, &settings).await,
        "health" => commands::health::run(&settings).await,
        other => anyhow::bail!("unknown command '{}'", other),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some((name, sub_matches)) => dispatch(name, sub_matches).await,
        None => {
            println!("Envelope v{}", VERSION);
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
