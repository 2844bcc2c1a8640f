pub mod mirror;
pub mod profile;
pub mod report;

use colored::Colorize;

const BANNER: &str = r#"
           _                         __          ____
   ____ ___  (_)_____________  _____/ /_  ____ _/ / /
  / __ `__ \/ / ___/ ___/ __ \/ ___/ __ \/ __ `/ / /
 / / / / / / / /  / /  / /_/ / /  / /_/ / /_/ / / /
/_/ /_/ /_/_/_/  /_/   \____/_/  /_.___/\__,_/_/_/
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_magenta().bold());
    println!(
        "  {} {}\n",
        "static mirrors of dynamic storefronts".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
