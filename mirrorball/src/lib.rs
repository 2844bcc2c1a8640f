pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, command_argument_builder};
pub use handlers::{
    build_config, build_profile, exit_status, handle_mirror, init_tracing, load_seeds_from_file,
    parse_seed_line, parse_url_line,
};
