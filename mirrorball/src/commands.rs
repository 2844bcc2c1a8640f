use clap::{ArgAction, arg, command, value_parser};
use std::path::PathBuf;
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("mirrorball")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("mirrorball")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and progress output").required(false))
        .arg(
            arg!(-v --"verbose" ...)
                .help("Increase log verbosity (-v info, -vv debug)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("mirror")
                .about(
                    "Capture a storefront into a self-contained static tree. Pages, assets and \
                CDN files are saved locally and their links rewritten to relative paths.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The origin to mirror")
                        .value_parser(value_parser!(Url)),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Output directory (cleared before the run)")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("./mirror"),
                )
                .arg(
                    arg!(--"profile" <PATH>)
                        .required(false)
                        .help("JSON site profile naming hosts, seeds and route patterns")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"host" <HOST>)
                        .required(false)
                        .help("Additional host whose assets are mirrored (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"seed" <ROUTE>)
                        .required(false)
                        .help("Additional seed route or URL (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"seeds-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of seed routes")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"max-pages" <N>)
                        .required(false)
                        .help("Maximum number of pages to capture")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-queue" <N>)
                        .required(false)
                        .help("Maximum length of the page queue")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-depth" <N>)
                        .required(false)
                        .help("Maximum link depth from the seeds (default: unlimited)")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-passes" <N>)
                        .required(false)
                        .help("Maximum number of asset resolution passes")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of concurrent fetches per batch")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    arg!(--"delay-ms" <MS>)
                        .required(false)
                        .help("Minimum spacing between requests in milliseconds")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(--"retries" <N>)
                        .required(false)
                        .help("Extra attempts for transport errors and 5xx responses")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    arg!(--"report" <PATH>)
                        .required(false)
                        .help("Save a run report to file")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown", "md"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"strict")
                        .required(false)
                        .help("Exit with status 2 when any resource failed")
                        .action(ArgAction::SetTrue),
                ),
        )
}
