use colored::Colorize;
use mirrorball::{command_argument_builder, handle_mirror, init_tracing};
use mirrorball_core::print_banner;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    init_tracing(chosen_command.get_count("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("mirror", primary_command)) => match handle_mirror(primary_command, quiet).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{} {:#}", "✗".red().bold(), e);
                ExitCode::FAILURE
            }
        },
        // No subcommand provided, just show the banner
        None => ExitCode::SUCCESS,
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
